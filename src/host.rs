use std::collections::HashMap;
use std::ffi::OsString;

/// Read access to environment variables.
pub trait Environment {
    fn var_os(&self, key: &str) -> Option<OsString>;

    /// The variable as UTF-8, treating unset, empty and non-Unicode values alike.
    fn var(&self, key: &str) -> Option<String> {
        self.var_os(key)
            .and_then(|value| value.into_string().ok())
            .filter(|value| !value.is_empty())
    }
}

/// The environment of the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var_os(&self, key: &str) -> Option<OsString> {
        std::env::var_os(key)
    }
}

impl Environment for HashMap<String, OsString> {
    fn var_os(&self, key: &str) -> Option<OsString> {
        // Windows environment variable names are case insensitive.
        self.get(key).cloned().or_else(|| {
            self.iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(key))
                .map(|(_, value)| value.clone())
        })
    }
}

impl<E: Environment + ?Sized> Environment for &E {
    fn var_os(&self, key: &str) -> Option<OsString> {
        (**self).var_os(key)
    }
}

#[cfg(test)]
pub(crate) fn env_of(vars: &[(&str, &str)]) -> HashMap<String, OsString> {
    vars.iter()
        .map(|(name, value)| (name.to_string(), OsString::from(value)))
        .collect()
}
