//! Discovery by running `vswhere.exe`, the locator that ships with the Visual Studio installer.
//!
//! vswhere only reports the installation path, product version and product
//! architecture in the fields we read. Toolset and SDK information stay unknown.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::Deserialize;

use crate::{DiscoveryError, Environment, Strategy, VsInstance};

const VSWHERE_ARGS: [&str; 7] = ["-all", "-products", "*", "-format", "json", "-utf8", "-nologo"];

// Used if the ProgramFiles variables aren't set.
const DEFAULT_PROGRAM_FILES: &str = r"C:\Program Files (x86)";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VsWhereInstance {
    installation_path: Option<String>,
    installation_version: Option<String>,
    catalog: Option<VsWhereCatalog>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VsWhereCatalog {
    product_arch: Option<String>,
}

pub struct VsWhereProbe<E> {
    env: E,
    path: Option<PathBuf>,
}

impl<E: Environment> VsWhereProbe<E> {
    pub fn new(env: E) -> Self {
        Self { env, path: None }
    }

    /// Use this executable instead of searching the installer directory.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// `<ProgramFiles>\Microsoft Visual Studio\Installer\vswhere.exe`, if it exists.
    pub fn locate(&self) -> Option<PathBuf> {
        if let Some(path) = &self.path {
            return path.is_file().then(|| path.clone());
        }
        ["ProgramFiles(x86)", "ProgramFiles"]
            .iter()
            .filter_map(|key| self.env.var_os(key).map(PathBuf::from))
            .chain([PathBuf::from(DEFAULT_PROGRAM_FILES)])
            .map(|mut path| {
                path.extend(["Microsoft Visual Studio", "Installer", "vswhere.exe"]);
                path
            })
            .find(|path| path.is_file())
    }

    fn run(&self) -> Result<Vec<u8>, DiscoveryError> {
        let vswhere = self
            .locate()
            .ok_or_else(|| DiscoveryError::not_available("vswhere.exe"))?;
        log::debug!("running {}", vswhere.display());
        let output = Command::new(&vswhere)
            .args(VSWHERE_ARGS)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()?;
        if !output.status.success() {
            return Err(DiscoveryError::ToolFailed(output.status.code()));
        }
        Ok(output.stdout)
    }
}

impl<E: Environment> Strategy for VsWhereProbe<E> {
    fn name(&self) -> &'static str {
        "vswhere"
    }

    fn discover(&self) -> Result<Vec<VsInstance>, DiscoveryError> {
        parse_output(&self.run()?)
    }
}

/// Parse the output of `vswhere -format json`.
///
/// Entries without an installation version are skipped.
pub fn parse_output(output: &[u8]) -> Result<Vec<VsInstance>, DiscoveryError> {
    let entries: Vec<VsWhereInstance> = serde_json::from_slice(output)?;
    let found = entries
        .into_iter()
        .filter_map(|entry| {
            let version = entry.installation_version.filter(|v| !v.is_empty())?;
            Some(VsInstance {
                install_location: entry.installation_path.filter(|p| !p.is_empty()).map(PathBuf::from),
                version,
                chip: entry.catalog.and_then(|catalog| catalog.product_arch),
                ..VsInstance::default()
            })
        })
        .collect();
    Ok(found)
}
