//! Discovery through the Visual Studio setup configuration COM component.
//!
//! This is the only probe that sees Visual Studio 2017 and later in full detail.
//! Every interface pointer, BSTR and SAFEARRAY obtained here is wrapped in an
//! owning value the moment it crosses the vtable boundary (before the HRESULT is
//! even looked at), so every exit path releases it. Locals drop in reverse
//! declaration order, which releases pointers in reverse order of acquisition
//! and leaves the apartment last.

use core::ffi::c_void;
use core::ptr::null_mut as null;
use std::fs;
use std::path::{Path, PathBuf};

use windows_result::HRESULT;

use crate::com::{Apartment, ComRuntime};
use crate::defs::*;
use crate::raw::*;
use crate::version::major_number;
use crate::{AssertOk, DiscoveryError, OkHresult, SdkPresence, Strategy, VsInstance};

const WIN10_SDK_COMPONENT: &str = "Microsoft.VisualStudio.Component.Windows10SDK";
const WIN81_SDK_COMPONENT: &str = "Microsoft.VisualStudio.Component.Windows81SDK";
// Community, Professional, Enterprise, BuildTools...
const PRODUCT_PREFIX: &str = "Microsoft.VisualStudio.Product.";

/// The setup configuration component first shipped with Visual Studio 2017.
const FIRST_SETUP_MAJOR: u32 = 15;

/// Enumerates instances registered with the Visual Studio installer.
pub struct SetupConfigurationProbe<R> {
    runtime: R,
    package_details: bool,
}

impl<R: ComRuntime> SetupConfigurationProbe<R> {
    pub fn new(runtime: R) -> Self {
        Self {
            runtime,
            package_details: true,
        }
    }

    /// Whether to walk each instance's package list to find SDKs and the target chip.
    ///
    /// Walking the packages is the slow part of the enumeration.
    /// When disabled those fields are left unknown.
    pub fn package_details(mut self, enabled: bool) -> Self {
        self.package_details = enabled;
        self
    }

    pub fn instances(&self) -> Result<Vec<VsInstance>, DiscoveryError> {
        let _apartment = Apartment::enter(&self.runtime)
            .map_err(|hresult| DiscoveryError::not_available(format!("COM apartment ({hresult:?})")))?;

        let configuration = self.create_configuration()?;
        let instances = enum_instances(&configuration)?;

        let mut found = Vec::new();
        loop {
            let mut item = None;
            let mut fetched = 0;
            let result = unsafe { instances.Next(1, &mut item, &mut fetched) };
            if result.is_err() {
                log::debug!("setup instance enumeration stopped early: {result:?}");
                break;
            }
            // Fewer items than requested is the end of the sequence, not an error.
            let Some(instance) = item.filter(|_| fetched > 0) else {
                break;
            };
            match self.read_instance(&instance) {
                Ok(Some(record)) => found.push(record),
                Ok(None) => {}
                Err(hresult) => log::debug!("skipping setup instance: {hresult:?}"),
            }
            drop(instance);
            if result == S_FALSE {
                break;
            }
        }
        Ok(found)
    }

    fn create_configuration(&self) -> Result<ISetupConfiguration, DiscoveryError> {
        let mut raw = null();
        let result = unsafe {
            self.runtime
                .create_instance(&SETUP_CONFIGURATION_CLSID, &ISetupConfiguration::IID, &mut raw)
        };
        let configuration = unsafe { ISetupConfiguration::from_raw(raw) };
        if result == REGDB_E_CLASSNOTREG {
            return Err(DiscoveryError::not_available("setup configuration component"));
        }
        result.ok_hresult()?;
        Ok(configuration.assert_ok()?)
    }

    /// `Ok(None)` means the instance is not one we report.
    /// `Err` means reading it failed part way.
    fn read_instance(&self, instance: &ISetupInstance) -> Result<Option<VsInstance>, HRESULT> {
        let instance2 = match instance.cast::<ISetupInstance2>() {
            Ok(instance2) => instance2,
            Err(E_NOINTERFACE) => return self.read_baseline(instance),
            Err(hresult) => return Err(hresult),
        };

        let mut state = InstanceState::eNone;
        unsafe { instance2.GetState(&mut state) }.ok_hresult()?;
        if state == InstanceState::eNone {
            log::debug!("ignoring setup instance that is neither local nor registered");
            return Ok(None);
        }

        let version = self.read_string(|out| unsafe { instance.GetInstallationVersion(out) })?;
        if !is_supported_version(&version) {
            return Ok(None);
        }
        let mut record = VsInstance::new(version);

        // Until a pending reboot has happened the installation path may not exist yet.
        if state.contains(InstanceState::eLocal) {
            let path = self.read_string(|out| unsafe { instance.GetInstallationPath(out) })?;
            if !path.is_empty() {
                let path = PathBuf::from(path);
                record.toolset_version = read_default_toolset(&path);
                record.install_location = Some(path);
            }
        }

        if self.package_details {
            // The same goes for the product packages.
            let packages = if state.contains(InstanceState::eRegistered) {
                self.scan_packages(&instance2)?
            } else {
                PackageScan::default()
            };
            record.win10_sdk = SdkPresence::from_found(packages.win10_sdk);
            record.win81_sdk = SdkPresence::from_found(packages.win81_sdk);
            record.chip = packages.chip;
        }
        Ok(Some(record))
    }

    /// Instances from setup components older than `ISetupInstance2`.
    fn read_baseline(&self, instance: &ISetupInstance) -> Result<Option<VsInstance>, HRESULT> {
        let version = self.read_string(|out| unsafe { instance.GetInstallationVersion(out) })?;
        if !is_supported_version(&version) {
            return Ok(None);
        }
        let path = self.read_string(|out| unsafe { instance.GetInstallationPath(out) })?;
        let mut record = VsInstance::new(version);
        if !path.is_empty() {
            record.install_location = Some(path.into());
        }
        Ok(Some(record))
    }

    fn scan_packages(&self, instance: &ISetupInstance2) -> Result<PackageScan, HRESULT> {
        let mut raw = null();
        let result = unsafe { instance.GetPackages(&mut raw) };
        let packages = unsafe { SafeArray::from_raw(&self.runtime, raw) };
        result.ok_hresult()?;
        let mut packages = packages.assert_ok()?;

        let mut scan = PackageScan::default();
        for &element in packages.elements()? {
            // Elements belong to the array. Upgrading one takes a reference of our own.
            let Some(unknown) = (unsafe { IUnknown::borrowed(element) }) else {
                continue;
            };
            let Ok(package) = unknown.cast::<ISetupPackageReference>() else {
                continue;
            };
            let id = self.read_string(|out| unsafe { package.GetId(out) })?;
            let kind = self.read_string(|out| unsafe { package.GetType(out) })?;
            match kind.as_str() {
                "Component" => {
                    scan.win10_sdk |= id.contains(WIN10_SDK_COMPONENT);
                    scan.win81_sdk |= id == WIN81_SDK_COMPONENT;
                }
                "Product" if id.starts_with(PRODUCT_PREFIX) => {
                    let chip = self.read_string(|out| unsafe { package.GetChip(out) })?;
                    if !chip.is_empty() {
                        scan.chip = Some(chip);
                    }
                }
                _ => {}
            }
        }
        Ok(scan)
    }

    /// Call a BSTR getter, taking ownership of whatever it writes.
    fn read_string(&self, get: impl FnOnce(*mut BSTR) -> HRESULT) -> Result<String, HRESULT> {
        let mut raw: BSTR = null();
        let result = get(&mut raw);
        let string = unsafe { Bstr::from_raw(&self.runtime, raw) };
        result.ok_hresult()?;
        Ok(string.to_string_lossy())
    }
}

impl<R: ComRuntime> Strategy for SetupConfigurationProbe<R> {
    fn name(&self) -> &'static str {
        "setup configuration"
    }

    fn discover(&self) -> Result<Vec<VsInstance>, DiscoveryError> {
        self.instances()
    }
}

fn enum_instances(configuration: &ISetupConfiguration) -> Result<IEnumSetupInstances, HRESULT> {
    let mut instances = None;
    // `EnumAllInstances` also returns instances that are not yet complete.
    let result = match configuration.cast::<ISetupConfiguration2>() {
        Ok(configuration) => unsafe { configuration.EnumAllInstances(&mut instances) },
        Err(_) => unsafe { configuration.EnumInstances(&mut instances) },
    };
    result.ok_hresult()?;
    instances.assert_ok()
}

fn is_supported_version(version: &str) -> bool {
    match major_number(version) {
        Some(major) if major >= FIRST_SETUP_MAJOR => true,
        _ => {
            log::debug!("ignoring setup instance with version {version:?}");
            false
        }
    }
}

/// The default MSVC toolset of an installation, if it is actually installed.
fn read_default_toolset(install: &Path) -> Option<String> {
    let file = install.join("VC/Auxiliary/Build/Microsoft.VCToolsVersion.default.txt");
    let contents = fs::read_to_string(file).ok()?;
    let version = contents.lines().next()?.trim();
    if version.is_empty() {
        return None;
    }
    // The default file can be left behind by a toolset that has since been removed.
    install
        .join("VC/Tools/MSVC")
        .join(version)
        .is_dir()
        .then(|| version.to_owned())
}

#[derive(Debug, Default)]
struct PackageScan {
    win10_sdk: bool,
    win81_sdk: bool,
    chip: Option<String>,
}

/// An owned BSTR, freed on drop.
struct Bstr<'r> {
    raw: BSTR,
    runtime: &'r dyn ComRuntime,
}

impl<'r> Bstr<'r> {
    /// # Safety
    ///
    /// `raw` must be null or a BSTR whose ownership is passed to the returned value.
    unsafe fn from_raw(runtime: &'r dyn ComRuntime, raw: BSTR) -> Self {
        Self { raw, runtime }
    }

    fn as_wide(&self) -> &[u16] {
        if self.raw.is_null() {
            return &[];
        }
        unsafe {
            // The byte length is stored in the four bytes before the first character.
            let bytes = self.raw.cast::<u8>().sub(4).cast::<u32>().read_unaligned();
            core::slice::from_raw_parts(self.raw, bytes as usize / 2)
        }
    }

    fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(self.as_wide())
    }
}

impl Drop for Bstr<'_> {
    fn drop(&mut self) {
        if !self.raw.is_null() {
            unsafe { self.runtime.free_string(self.raw) };
        }
    }
}

/// An owned one dimensional SAFEARRAY of interface pointers, destroyed on drop.
struct SafeArray<'r> {
    raw: *mut SAFEARRAY,
    runtime: &'r dyn ComRuntime,
    locked: bool,
}

impl<'r> SafeArray<'r> {
    /// # Safety
    ///
    /// `raw` must be null or a SAFEARRAY whose ownership is passed to the returned value.
    unsafe fn from_raw(runtime: &'r dyn ComRuntime, raw: *mut SAFEARRAY) -> Option<Self> {
        (!raw.is_null()).then(|| Self {
            raw,
            runtime,
            locked: false,
        })
    }

    fn elements(&mut self) -> Result<&[*mut c_void], HRESULT> {
        unsafe {
            if !self.locked {
                self.runtime.lock_array(self.raw).ok_hresult()?;
                self.locked = true;
            }
            let array = &*self.raw;
            if array.cDims != 1 || array.cbElements as usize != size_of::<*mut c_void>() {
                return Err(E_UNEXPECTED);
            }
            let len = array.rgsabound[0].cElements as usize;
            if len == 0 || array.pvData.is_null() {
                Ok(&[])
            } else {
                Ok(core::slice::from_raw_parts(array.pvData.cast::<*mut c_void>(), len))
            }
        }
    }
}

impl Drop for SafeArray<'_> {
    fn drop(&mut self) {
        unsafe {
            if self.locked {
                let _ = self.runtime.unlock_array(self.raw);
            }
            let _ = self.runtime.destroy_array(self.raw);
        }
    }
}
