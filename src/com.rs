//! The handful of COM runtime calls the setup probe needs, and a scoped apartment.
//!
//! Everything the probe does through vtables is plain pointer chasing. The only
//! things that need the COM runtime are entering and leaving an apartment,
//! creating the setup configuration object and freeing the BSTRs and SAFEARRAYs
//! that the setup API hands back. Those go through [`ComRuntime`] so that the
//! same vtable code can be driven by [`SystemRuntime`] on Windows or by a fake.

use core::ffi::c_void;
use core::marker::PhantomData;

use windows_core::GUID;
use windows_result::HRESULT;

use crate::defs::*;
pub use crate::defs::{BSTR, SAFEARRAY, SAFEARRAYBOUND};

/// Access to the COM runtime.
///
/// # Safety
///
/// Implementations must behave like the corresponding COM functions.
/// In particular `create_instance` must hand out an owned reference and
/// `destroy_array` must release any interface pointers stored in the array.
pub unsafe trait ComRuntime {
    /// `CoInitializeEx` for the calling thread.
    fn initialize(&self) -> HRESULT;

    /// `CoUninitialize`.
    ///
    /// # Safety
    ///
    /// Must balance a successful [`initialize`](Self::initialize) on the same thread,
    /// after every COM object obtained since then has been released.
    unsafe fn uninitialize(&self);

    /// `CoCreateInstance`.
    ///
    /// # Safety
    ///
    /// `interface` must be valid for writes.
    unsafe fn create_instance(&self, clsid: &GUID, iid: &GUID, interface: *mut *mut c_void) -> HRESULT;

    /// `SysFreeString`.
    ///
    /// # Safety
    ///
    /// `bstr` must be null or a BSTR owned by the caller.
    unsafe fn free_string(&self, bstr: BSTR);

    /// `SafeArrayLock`.
    ///
    /// # Safety
    ///
    /// `array` must point to a valid SAFEARRAY.
    unsafe fn lock_array(&self, array: *mut SAFEARRAY) -> HRESULT;

    /// `SafeArrayUnlock`.
    ///
    /// # Safety
    ///
    /// `array` must point to a SAFEARRAY locked by [`lock_array`](Self::lock_array).
    unsafe fn unlock_array(&self, array: *mut SAFEARRAY) -> HRESULT;

    /// `SafeArrayDestroy`.
    ///
    /// # Safety
    ///
    /// `array` must point to an unlocked SAFEARRAY owned by the caller.
    unsafe fn destroy_array(&self, array: *mut SAFEARRAY) -> HRESULT;
}

/// A COM apartment that lives exactly as long as this value.
///
/// Declare it before any interface pointer in a scope so that it is dropped last.
#[must_use = "the apartment is left as soon as this is dropped"]
pub struct Apartment<'r> {
    runtime: &'r dyn ComRuntime,
    uninitialize: bool,
    // Apartments are per thread.
    _not_send: PhantomData<*const ()>,
}

impl<'r> Apartment<'r> {
    /// Enter (or join) the calling thread's multithreaded apartment.
    ///
    /// `S_OK` and `S_FALSE` are balanced with `CoUninitialize` on drop.
    /// `RPC_E_CHANGED_MODE` means the thread already lives in a single threaded
    /// apartment. COM is still usable there but there is nothing for us to undo.
    pub fn enter(runtime: &'r dyn ComRuntime) -> Result<Self, HRESULT> {
        let result = runtime.initialize();
        let uninitialize = if result == S_OK || result == S_FALSE {
            true
        } else if result == RPC_E_CHANGED_MODE {
            log::warn!("thread already has a single threaded apartment, using it instead of the MTA");
            false
        } else {
            return Err(result);
        };
        Ok(Self {
            runtime,
            uninitialize,
            _not_send: PhantomData,
        })
    }
}

impl Drop for Apartment<'_> {
    fn drop(&mut self) {
        if self.uninitialize {
            // SAFETY: `enter` succeeded on this thread (the type is !Send) and
            // anything borrowed from the runtime is gone by the time this drops.
            unsafe { self.runtime.uninitialize() };
        }
    }
}

/// The real COM runtime.
#[cfg(windows)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRuntime;

#[cfg(windows)]
unsafe impl ComRuntime for SystemRuntime {
    fn initialize(&self) -> HRESULT {
        unsafe { api::CoInitializeEx(core::ptr::null(), COINIT_MULTITHREADED) }
    }

    unsafe fn uninitialize(&self) {
        unsafe { api::CoUninitialize() }
    }

    unsafe fn create_instance(&self, clsid: &GUID, iid: &GUID, interface: *mut *mut c_void) -> HRESULT {
        unsafe { api::CoCreateInstance(clsid, core::ptr::null_mut(), CLSCTX_ALL, iid, interface) }
    }

    unsafe fn free_string(&self, bstr: BSTR) {
        if !bstr.is_null() {
            // Dropping the BSTR calls SysFreeString.
            drop(unsafe { windows_strings::BSTR::from_raw(bstr) });
        }
    }

    unsafe fn lock_array(&self, array: *mut SAFEARRAY) -> HRESULT {
        unsafe { api::SafeArrayLock(array) }
    }

    unsafe fn unlock_array(&self, array: *mut SAFEARRAY) -> HRESULT {
        unsafe { api::SafeArrayUnlock(array) }
    }

    unsafe fn destroy_array(&self, array: *mut SAFEARRAY) -> HRESULT {
        unsafe { api::SafeArrayDestroy(array) }
    }
}

#[cfg(windows)]
mod api {
    use super::*;
    #[cfg(not(target_vendor = "win7"))]
    windows_link::link!("combase.dll" "system" fn CoInitializeEx(pvReserved: *const (), dwCoInit: u32) -> HRESULT);
    #[cfg(target_vendor = "win7")]
    windows_link::link!("ole32.dll" "system" fn CoInitializeEx(pvReserved: *const (), dwCoInit: u32) -> HRESULT);
    #[cfg(not(target_vendor = "win7"))]
    windows_link::link!("combase.dll" "system" fn CoUninitialize());
    #[cfg(target_vendor = "win7")]
    windows_link::link!("ole32.dll" "system" fn CoUninitialize());
    #[cfg(not(target_vendor = "win7"))]
    windows_link::link!("combase.dll" "system" fn CoCreateInstance(
        rclsid: *const GUID,
        pUnkOuter: *mut c_void,
        dwClsContext: u32,
        riid: *const GUID,
        ppv: *mut *mut c_void,
    ) -> HRESULT);
    #[cfg(target_vendor = "win7")]
    windows_link::link!("ole32.dll" "system" fn CoCreateInstance(
        rclsid: *const GUID,
        pUnkOuter: *mut c_void,
        dwClsContext: u32,
        riid: *const GUID,
        ppv: *mut *mut c_void,
    ) -> HRESULT);
    windows_link::link!("oleaut32.dll" "system" fn SafeArrayLock(psa: *const SAFEARRAY) -> HRESULT);
    windows_link::link!("oleaut32.dll" "system" fn SafeArrayUnlock(psa: *const SAFEARRAY) -> HRESULT);
    windows_link::link!("oleaut32.dll" "system" fn SafeArrayDestroy(psa: *const SAFEARRAY) -> HRESULT);
}
