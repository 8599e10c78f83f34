//! Locate installed Visual Studio toolchains without any user configuration.
//!
//! Several strategies are tried in order and the first one that finds anything wins:
//!
//! 1. an activated Enterprise WDK build environment,
//! 2. the Visual Studio setup configuration COM component (Windows only),
//! 3. `vswhere.exe`,
//! 4. the legacy registry keys written by Visual Studio 2015 and earlier (Windows only),
//! 5. the `VS*COMNTOOLS` environment variables.
//!
//! The COM component is driven through raw vtables, without a COM binding library.
//! Consult the [`Microsoft.VisualStudio.Setup.Configuration`] documentation for more information on that API.
//!
//! ## Example
//!
//! ```rust
//! use vslocate::{Discovery, DiscoveryOptions};
//!
//! let discovery = Discovery::new(DiscoveryOptions::new().package_details(false));
//! for instance in discovery.discover() {
//!     println!("{} {:?}", instance.version, instance.install_location);
//! }
//! ```
//!
//! Nothing is ever reported as an error. Strategies that cannot run are logged
//! through the [`log`] facade and skipped.
//!
//! [`Microsoft.VisualStudio.Setup.Configuration`]: https://learn.microsoft.com/en-us/dotnet/api/microsoft.visualstudio.setup.configuration

// We should use the same style as the official documentation
#![allow(nonstandard_style)]
#![allow(clippy::upper_case_acronyms)]

mod defs;
use defs::*;

mod raw;

pub mod com;

mod comntools;
mod discover;
mod error;
mod ewdk;
mod host;
mod instance;
mod registry;
mod setup;
mod version;
mod vswhere;

#[cfg(test)]
mod testing;

pub use windows_result::HRESULT;

pub use comntools::CommonToolsProbe;
pub use discover::{Discovery, DiscoveryOptions, Strategy, discover};
pub use error::DiscoveryError;
pub use ewdk::{DRIVER_KIT_VERSION_SENTINEL, DriverKitProbe};
pub use host::{Environment, ProcessEnvironment};
pub use instance::{SdkPresence, VsInstance};
#[cfg(windows)]
pub use registry::LocalMachine;
pub use registry::{RegistryProbe, RegistryView};
pub use setup::SetupConfigurationProbe;
pub use version::{major_number, parse_major};
pub use vswhere::{VsWhereProbe, parse_output};

trait AssertOk {
    type T;
    fn assert_ok(self) -> Result<Self::T, HRESULT>;
}
impl<T> AssertOk for Option<T> {
    type T = T;

    /// Use this for cases where an API that returns success must also have initialized a COM ptr.
    ///
    /// Panics in debug mode, returns `Err(E_POINTER)` in release mode.
    #[inline(always)]
    fn assert_ok(self) -> Result<T, HRESULT> {
        // A successful call that hands back nothing is a broken component.
        debug_assert!(self.is_some());
        self.ok_or(E_POINTER)
    }
}

trait OkHresult {
    fn ok_hresult(self) -> Result<(), HRESULT>;
}
impl OkHresult for HRESULT {
    fn ok_hresult(self) -> Result<(), HRESULT> {
        if self.is_ok() { Ok(()) } else { Err(self) }
    }
}
