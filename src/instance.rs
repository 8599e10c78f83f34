use std::path::PathBuf;

use crate::version::parse_major;

/// Whether an optional component is installed.
///
/// Only the setup configuration probe can see an instance's packages.
/// Every other probe reports [`Unknown`](Self::Unknown) rather than guessing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdkPresence {
    Present,
    Absent,
    #[default]
    Unknown,
}

impl SdkPresence {
    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Present => Some(true),
            Self::Absent => Some(false),
            Self::Unknown => None,
        }
    }

    pub(crate) fn from_found(found: bool) -> Self {
        if found { Self::Present } else { Self::Absent }
    }
}

/// One installed Visual Studio (or driver kit) toolchain.
///
/// # Example
///
/// ```text
/// install_location: D:\Program Files\Microsoft Visual Studio\2022\Community
/// version:          17.4.33213.308
/// toolset_version:  14.34.31933
/// win10_sdk:        Present
/// win81_sdk:        Absent
/// chip:             x64
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VsInstance {
    pub install_location: Option<PathBuf>,
    /// The product version. Never empty in a discovery result.
    pub version: String,
    /// Version of the bundled MSVC build tools.
    pub toolset_version: Option<String>,
    pub win10_sdk: SdkPresence,
    pub win81_sdk: SdkPresence,
    /// Target architecture, e.g. `x64`.
    pub chip: Option<String>,
}

impl VsInstance {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Self::default()
        }
    }

    pub fn with_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.install_location = Some(location.into());
        self
    }

    pub fn version_major(&self) -> Option<&str> {
        parse_major(&self.version)
    }
}
