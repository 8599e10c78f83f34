//! `VS*COMNTOOLS` variables left behind by pre-2017 installers.

use std::path::{Path, PathBuf};

use crate::{DiscoveryError, Environment, Strategy, VsInstance};

const COMMON_TOOLS: [(&str, &str); 4] = [
    ("VS140COMNTOOLS", "14"),
    ("VS120COMNTOOLS", "12"),
    ("VS110COMNTOOLS", "11"),
    ("VS90COMNTOOLS", "9"),
];

pub struct CommonToolsProbe<E> {
    env: E,
}

impl<E: Environment> CommonToolsProbe<E> {
    pub fn new(env: E) -> Self {
        Self { env }
    }
}

impl<E: Environment> Strategy for CommonToolsProbe<E> {
    fn name(&self) -> &'static str {
        "common tools environment"
    }

    fn discover(&self) -> Result<Vec<VsInstance>, DiscoveryError> {
        let found = COMMON_TOOLS
            .iter()
            .filter_map(|&(key, version)| {
                let tools = PathBuf::from(self.env.var_os(key)?);
                tools
                    .is_dir()
                    .then(|| VsInstance::new(version).with_location(install_dir(&tools)))
            })
            .collect();
        Ok(found)
    }
}

/// `<install>\Common7\Tools\` to `<install>`.
fn install_dir(tools: &Path) -> PathBuf {
    let mut dir = tools.to_path_buf();
    // Trailing separators don't produce components, so two pops always go up two levels.
    dir.pop();
    dir.pop();
    dir
}
