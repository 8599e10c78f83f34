use windows_result::HRESULT;

// Windows.Win32.Foundation.FILETIME
#[repr(C)]
#[derive(Default, Debug, Clone, Copy)]
pub struct FILETIME {
    pub dwLowDateTime: u32,
    pub dwHighDateTime: u32,
}

// Windows.Win32.System.Com.SAFEARRAYBOUND
#[repr(C)]
pub struct SAFEARRAYBOUND {
    pub cElements: u32,
    pub lLbound: i32,
}
// Windows.Win32.System.Com.SAFEARRAY
#[repr(C)]
pub struct SAFEARRAY {
    pub cDims: u16,
    pub fFeatures: u16,
    pub cbElements: u32,
    pub cLocks: u32,
    pub pvData: *mut (),
    pub rgsabound: [SAFEARRAYBOUND; 1],
}

pub type LCID = u32;
pub type LPCOLESTR = *const u16;
pub type VARIANT_BOOL = i16;

/// A raw, owning BSTR as it crosses the vtable boundary.
///
/// Anything written through a `*mut BSTR` out parameter must be freed exactly once.
pub type BSTR = *mut u16;

pub const CLSCTX_ALL: u32 = 23;
pub const COINIT_MULTITHREADED: u32 = 0;
pub const S_OK: HRESULT = HRESULT(0);
pub const S_FALSE: HRESULT = HRESULT(0x1);
pub const E_NOINTERFACE: HRESULT = HRESULT(0x80004002_u32 as i32);
pub const E_POINTER: HRESULT = HRESULT(0x80004003_u32 as i32);
#[cfg(test)]
pub const E_FAIL: HRESULT = HRESULT(0x80004005_u32 as i32);
pub const E_UNEXPECTED: HRESULT = HRESULT(0x8000FFFF_u32 as i32);
pub const REGDB_E_CLASSNOTREG: HRESULT = HRESULT(0x80040154_u32 as i32);
pub const RPC_E_CHANGED_MODE: HRESULT = HRESULT(0x80010106_u32 as i32);
