//! The fallback chain.

use std::path::PathBuf;

use crate::comntools::CommonToolsProbe;
use crate::ewdk::DriverKitProbe;
use crate::vswhere::VsWhereProbe;
use crate::{DiscoveryError, Environment, ProcessEnvironment, VsInstance};

/// One way of finding installations.
pub trait Strategy {
    /// Used in log messages.
    fn name(&self) -> &'static str;

    /// Every installation this strategy can see, in the order it reports them.
    ///
    /// An error means the strategy could not run at all. It is logged and the
    /// next strategy in the chain is tried.
    fn discover(&self) -> Result<Vec<VsInstance>, DiscoveryError>;
}

/// Which tiers of the default chain to run, and how.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    driver_kit: bool,
    package_details: bool,
    vswhere_path: Option<PathBuf>,
    legacy_environment: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            driver_kit: true,
            package_details: true,
            vswhere_path: None,
            legacy_environment: true,
        }
    }
}

impl DiscoveryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look for an activated Enterprise WDK build environment first.
    pub fn driver_kit(mut self, enabled: bool) -> Self {
        self.driver_kit = enabled;
        self
    }

    /// Walk each setup instance's packages to fill in the SDK flags and target chip.
    ///
    /// This is the slow part of the COM enumeration.
    pub fn package_details(mut self, enabled: bool) -> Self {
        self.package_details = enabled;
        self
    }

    /// Run this `vswhere.exe` instead of the one installed with the Visual Studio installer.
    pub fn vswhere_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.vswhere_path = Some(path.into());
        self
    }

    /// Fall back to the `VS*COMNTOOLS` variables when nothing else found anything.
    pub fn legacy_environment(mut self, enabled: bool) -> Self {
        self.legacy_environment = enabled;
        self
    }
}

/// Runs strategies in order and returns the first non-empty result.
///
/// Results from different strategies are never merged.
pub struct Discovery {
    strategies: Vec<Box<dyn Strategy>>,
}

impl Default for Discovery {
    fn default() -> Self {
        Self::new(DiscoveryOptions::default())
    }
}

impl Discovery {
    /// The default chain for this host, reading the process environment.
    pub fn new(options: DiscoveryOptions) -> Self {
        Self::with_environment(options, ProcessEnvironment)
    }

    /// The default chain, with environment variables read from `env`.
    ///
    /// Driver kit, setup configuration (Windows only), `vswhere`, registry
    /// (Windows only), then the legacy tools variables.
    pub fn with_environment<E>(options: DiscoveryOptions, env: E) -> Self
    where
        E: Environment + Clone + 'static,
    {
        let mut strategies: Vec<Box<dyn Strategy>> = Vec::new();
        if options.driver_kit {
            strategies.push(Box::new(DriverKitProbe::new(env.clone())));
        }
        #[cfg(windows)]
        strategies.push(Box::new(
            crate::SetupConfigurationProbe::new(crate::com::SystemRuntime).package_details(options.package_details),
        ));
        let vswhere = VsWhereProbe::new(env.clone());
        strategies.push(Box::new(match options.vswhere_path {
            Some(path) => vswhere.with_path(path),
            None => vswhere,
        }));
        #[cfg(windows)]
        strategies.push(Box::new(crate::RegistryProbe::new(crate::LocalMachine)));
        if options.legacy_environment {
            strategies.push(Box::new(CommonToolsProbe::new(env)));
        }
        Self::from_strategies(strategies)
    }

    /// An explicit chain, tried front to back.
    pub fn from_strategies(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies }
    }

    /// The names of the strategies in the order they are tried.
    pub fn strategy_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.strategies.iter().map(|strategy| strategy.name())
    }

    /// Installed instances according to the first strategy that finds any.
    ///
    /// Empty if none of them does. Records without a version are dropped.
    pub fn discover(&self) -> Vec<VsInstance> {
        for strategy in &self.strategies {
            let name = strategy.name();
            match strategy.discover() {
                Ok(found) => {
                    let found: Vec<_> = found.into_iter().filter(|i| !i.version.is_empty()).collect();
                    if !found.is_empty() {
                        log::debug!("{name}: found {} instance(s)", found.len());
                        return found;
                    }
                    log::debug!("{name}: nothing found");
                }
                Err(error) if error.is_not_available() => log::debug!("{name}: {error}"),
                Err(error) => log::warn!("{name} failed: {error}"),
            }
        }
        Vec::new()
    }
}

/// Installed Visual Studio instances, using the default chain.
///
/// ```
/// for instance in vslocate::discover() {
///     println!("{} at {:?}", instance.version, instance.install_location);
/// }
/// ```
pub fn discover() -> Vec<VsInstance> {
    Discovery::default().discover()
}
