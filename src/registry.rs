//! Pre-2017 installations, which register themselves under `HKLM\SOFTWARE\Microsoft`.

use crate::version::{is_numeric_version, major_number};
use crate::{DiscoveryError, Strategy, VsInstance};

const PRODUCT_ROOTS: [&str; 3] = [
    r"SOFTWARE\Microsoft\VisualStudio",
    r"SOFTWARE\Microsoft\VCExpress",
    r"SOFTWARE\Microsoft\WDExpress",
];

/// Visual Studio 2015. Later versions register with the setup configuration component instead.
const LAST_LEGACY_MAJOR: u32 = 14;

/// Read-only access to the (32-bit view of the) local machine registry hive.
pub trait RegistryView {
    /// Names of the subkeys of `path`.
    ///
    /// A missing key is [`DiscoveryError::NotAvailable`].
    fn subkeys(&self, path: &str) -> Result<Vec<String>, DiscoveryError>;

    /// A string value, or `None` if the key or the value does not exist.
    fn string_value(&self, path: &str, name: &str) -> Result<Option<String>, DiscoveryError>;
}

pub struct RegistryProbe<R> {
    registry: R,
}

impl<R: RegistryView> RegistryProbe<R> {
    pub fn new(registry: R) -> Self {
        Self { registry }
    }

    fn location(&self, key: &str) -> Result<Option<String>, DiscoveryError> {
        let install_dir = self.registry.string_value(key, "InstallDir")?;
        let location = match install_dir {
            Some(dir) if !dir.is_empty() => Some(dir),
            _ => self.registry.string_value(&format!(r"{key}\Setup\VC"), "ProductDir")?,
        };
        Ok(location.filter(|dir| !dir.is_empty()))
    }
}

impl<R: RegistryView> Strategy for RegistryProbe<R> {
    fn name(&self) -> &'static str {
        "registry"
    }

    fn discover(&self) -> Result<Vec<VsInstance>, DiscoveryError> {
        let mut any_root = false;
        let mut found = Vec::new();
        for root in PRODUCT_ROOTS {
            let subkeys = match self.registry.subkeys(root) {
                Ok(subkeys) => subkeys,
                Err(error) if error.is_not_available() => continue,
                Err(error) => return Err(error),
            };
            any_root = true;
            for version in subkeys {
                if !is_numeric_version(&version) {
                    continue;
                }
                let Some(major) = major_number(&version).filter(|&major| major <= LAST_LEGACY_MAJOR) else {
                    continue;
                };
                if let Some(location) = self.location(&format!(r"{root}\{version}"))? {
                    found.push((major, VsInstance::new(version).with_location(location)));
                }
            }
        }
        if !any_root {
            return Err(DiscoveryError::not_available("legacy Visual Studio registry keys"));
        }

        // Newest first. The sort is stable so Visual Studio wins over the Express editions.
        found.sort_by(|(a, _), (b, _)| b.cmp(a));
        let mut instances: Vec<VsInstance> = Vec::with_capacity(found.len());
        for (_, instance) in found {
            if !instances.iter().any(|seen| seen.version == instance.version) {
                instances.push(instance);
            }
        }
        Ok(instances)
    }
}

#[cfg(windows)]
pub use win::LocalMachine;

#[cfg(windows)]
mod win {
    use core::ffi::c_void;
    use core::ptr::{null, null_mut};

    use windows_strings::{HSTRING, PCWSTR};

    use super::RegistryView;
    use crate::DiscoveryError;
    use crate::defs::FILETIME;

    type HKEY = *mut c_void;
    const HKEY_LOCAL_MACHINE: HKEY = -2147483646i32 as isize as HKEY;
    const KEY_READ: u32 = 0x20019;
    const KEY_WOW64_32KEY: u32 = 0x0200;
    const REG_SZ: u32 = 1;
    const REG_EXPAND_SZ: u32 = 2;
    const ERROR_SUCCESS: u32 = 0;
    const ERROR_FILE_NOT_FOUND: u32 = 2;
    const ERROR_NO_MORE_ITEMS: u32 = 259;
    // Key names are limited to 255 characters.
    const MAX_KEY_LENGTH: usize = 256;

    /// `HKEY_LOCAL_MACHINE`, as seen by a 32-bit process.
    ///
    /// The legacy installers were 32-bit and registered themselves there.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct LocalMachine;

    impl RegistryView for LocalMachine {
        fn subkeys(&self, path: &str) -> Result<Vec<String>, DiscoveryError> {
            Key::open(path)?
                .ok_or_else(|| DiscoveryError::not_available(format!(r"HKLM\{path}")))?
                .subkeys()
        }

        fn string_value(&self, path: &str, name: &str) -> Result<Option<String>, DiscoveryError> {
            match Key::open(path)? {
                Some(key) => key.string_value(name),
                None => Ok(None),
            }
        }
    }

    /// An open key, closed on drop.
    struct Key(HKEY);

    impl Key {
        fn open(path: &str) -> Result<Option<Self>, DiscoveryError> {
            let path = HSTRING::from(path);
            let mut key = null_mut();
            let error = unsafe {
                RegOpenKeyExW(
                    HKEY_LOCAL_MACHINE,
                    PCWSTR(path.as_ptr()),
                    0,
                    KEY_READ | KEY_WOW64_32KEY,
                    &mut key,
                )
            };
            match error {
                ERROR_SUCCESS => Ok(Some(Self(key))),
                ERROR_FILE_NOT_FOUND => Ok(None),
                error => Err(DiscoveryError::Registry(error)),
            }
        }

        fn subkeys(&self) -> Result<Vec<String>, DiscoveryError> {
            let mut names = Vec::new();
            let mut buffer = [0u16; MAX_KEY_LENGTH];
            for index in 0.. {
                let mut len = buffer.len() as u32;
                let error = unsafe {
                    RegEnumKeyExW(
                        self.0,
                        index,
                        buffer.as_mut_ptr(),
                        &mut len,
                        null(),
                        null_mut(),
                        null_mut(),
                        null_mut(),
                    )
                };
                match error {
                    ERROR_SUCCESS => names.push(String::from_utf16_lossy(&buffer[..len as usize])),
                    ERROR_NO_MORE_ITEMS => break,
                    error => return Err(DiscoveryError::Registry(error)),
                }
            }
            Ok(names)
        }

        fn string_value(&self, name: &str) -> Result<Option<String>, DiscoveryError> {
            let name = HSTRING::from(name);
            let mut kind = 0;
            let mut size = 0;
            let error = unsafe {
                RegQueryValueExW(self.0, PCWSTR(name.as_ptr()), null(), &mut kind, null_mut(), &mut size)
            };
            match error {
                ERROR_SUCCESS => {}
                ERROR_FILE_NOT_FOUND => return Ok(None),
                error => return Err(DiscoveryError::Registry(error)),
            }
            if kind != REG_SZ && kind != REG_EXPAND_SZ {
                return Ok(None);
            }

            let mut buffer = vec![0u16; (size as usize).div_ceil(2)];
            let error = unsafe {
                RegQueryValueExW(
                    self.0,
                    PCWSTR(name.as_ptr()),
                    null(),
                    &mut kind,
                    buffer.as_mut_ptr().cast(),
                    &mut size,
                )
            };
            if error != ERROR_SUCCESS {
                return Err(DiscoveryError::Registry(error));
            }
            // The stored string may or may not include its null terminator.
            let mut value = &buffer[..(size as usize / 2).min(buffer.len())];
            while let [rest @ .., 0] = value {
                value = rest;
            }
            Ok(Some(String::from_utf16_lossy(value)))
        }
    }

    impl Drop for Key {
        fn drop(&mut self) {
            unsafe {
                RegCloseKey(self.0);
            }
        }
    }

    windows_link::link!("advapi32.dll" "system" fn RegOpenKeyExW(
        hKey: HKEY,
        lpSubKey: PCWSTR,
        ulOptions: u32,
        samDesired: u32,
        phkResult: *mut HKEY,
    ) -> u32);
    windows_link::link!("advapi32.dll" "system" fn RegEnumKeyExW(
        hKey: HKEY,
        dwIndex: u32,
        lpName: *mut u16,
        lpcchName: *mut u32,
        lpReserved: *const u32,
        lpClass: *mut u16,
        lpcchClass: *mut u32,
        lpftLastWriteTime: *mut FILETIME,
    ) -> u32);
    windows_link::link!("advapi32.dll" "system" fn RegQueryValueExW(
        hKey: HKEY,
        lpValueName: PCWSTR,
        lpReserved: *const u32,
        lpType: *mut u32,
        lpData: *mut u8,
        lpcbData: *mut u32,
    ) -> u32);
    windows_link::link!("advapi32.dll" "system" fn RegCloseKey(hKey: HKEY) -> u32);
}
