use thiserror::Error;
use windows_result::HRESULT;

/// Why a discovery strategy produced nothing.
///
/// None of these reach the caller of [`discover`](crate::discover). They are
/// logged and the next strategy is tried.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The component, tool, key or marker this strategy relies on is absent.
    #[error("{0} is not available")]
    NotAvailable(String),

    /// A COM call failed.
    #[error("COM call failed with {0:?}")]
    Com(HRESULT),

    /// A registry call failed with a Win32 error code.
    #[error("registry call failed with error {0}")]
    Registry(u32),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The external locator printed something we could not read.
    #[error("unreadable locator output: {0}")]
    Json(#[from] serde_json::Error),

    /// The external locator exited unsuccessfully.
    #[error("locator exited with status {0:?}")]
    ToolFailed(Option<i32>),
}

impl DiscoveryError {
    pub fn not_available(what: impl Into<String>) -> Self {
        Self::NotAvailable(what.into())
    }

    pub fn is_not_available(&self) -> bool {
        matches!(self, Self::NotAvailable(_))
    }
}

impl From<HRESULT> for DiscoveryError {
    fn from(hresult: HRESULT) -> Self {
        Self::Com(hresult)
    }
}
