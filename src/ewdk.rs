//! The Enterprise Windows Driver Kit build environment.
//!
//! An EWDK build window is a self-contained toolchain: it sets up the compiler
//! environment itself and asks tools not to look anything up in the registry.
//! When we are running inside one, that toolchain is the only right answer.

use std::fs;
use std::path::{Path, PathBuf};

use crate::{DiscoveryError, Environment, SdkPresence, Strategy, VsInstance};

/// Version reported when neither the environment nor the kit says which one it is.
pub const DRIVER_KIT_VERSION_SENTINEL: &str = "0.0";

/// Relative to the Visual Studio directory of the kit.
const KIT_METADATA_FILE: &str = "Common7/IDE/devenv.isolation.ini";

pub struct DriverKitProbe<E> {
    env: E,
}

impl<E: Environment> DriverKitProbe<E> {
    pub fn new(env: E) -> Self {
        Self { env }
    }

    fn is_enabled(&self, key: &str) -> bool {
        self.env
            .var(key)
            .is_some_and(|value| value.eq_ignore_ascii_case("true"))
    }

    pub fn instance(&self) -> Option<VsInstance> {
        if !(self.is_enabled("EnterpriseWDK") && self.is_enabled("DisableRegistryUse")) {
            return None;
        }
        let location = self.env.var("VSINSTALLDIR").map(PathBuf::from);
        let version = self
            .env
            .var("VisualStudioVersion")
            .or_else(|| location.as_deref().and_then(read_kit_version))
            .unwrap_or_else(|| DRIVER_KIT_VERSION_SENTINEL.to_owned());

        log::debug!("running inside an EWDK build environment ({version})");
        Some(VsInstance {
            install_location: location,
            version,
            toolset_version: self.env.var("VCToolsVersion"),
            // The kit always ships a Windows 10 SDK. 8.1 is an optional extra.
            win10_sdk: SdkPresence::Present,
            win81_sdk: SdkPresence::from_found(self.env.var("WindowsSdkDir_81").is_some()),
            chip: self.env.var("VSCMD_ARG_TGT_ARCH"),
        })
    }
}

impl<E: Environment> Strategy for DriverKitProbe<E> {
    fn name(&self) -> &'static str {
        "driver kit"
    }

    fn discover(&self) -> Result<Vec<VsInstance>, DiscoveryError> {
        self.instance()
            .map(|instance| vec![instance])
            .ok_or_else(|| DiscoveryError::not_available("EWDK build environment"))
    }
}

/// `InstallationVersion=...` from the kit's isolation file.
fn read_kit_version(vs_dir: &Path) -> Option<String> {
    let contents = fs::read_to_string(vs_dir.join(KIT_METADATA_FILE)).ok()?;
    contents.lines().find_map(|line| {
        let (key, value) = line.split_once('=')?;
        let value = value.trim();
        (key.trim().eq_ignore_ascii_case("InstallationVersion") && !value.is_empty())
            .then(|| value.to_owned())
    })
}
