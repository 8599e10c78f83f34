//! Fake setup configuration objects for tests.
//!
//! The fakes are real COM objects as far as the probe can tell: heap objects whose
//! first field points at a vtable laid out by `com_interface!`. A shared [`Tracker`]
//! counts live objects, BSTRs, SAFEARRAYs and apartments so a test can check that
//! everything handed out was given back.

use core::ffi::c_void;
use core::ptr::{self, null_mut};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use windows_core::GUID;
use windows_result::HRESULT;

use crate::com::ComRuntime;
use crate::defs::*;
use crate::raw::{vtable, *};

const E_NOTIMPL: HRESULT = HRESULT(0x80004001_u32 as i32);

#[derive(Default)]
struct Counts {
    objects: Cell<isize>,
    objects_created: Cell<usize>,
    strings: Cell<isize>,
    arrays: Cell<isize>,
    arrays_created: Cell<usize>,
    apartments: Cell<isize>,
    uninitialize_calls: Cell<usize>,
}

fn bump(cell: &Cell<isize>, by: isize) {
    cell.set(cell.get() + by);
}

#[derive(Clone, Default)]
pub(crate) struct Tracker(Rc<Counts>);

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_objects(&self) -> isize {
        self.0.objects.get()
    }

    pub fn objects_created(&self) -> usize {
        self.0.objects_created.get()
    }

    pub fn strings(&self) -> isize {
        self.0.strings.get()
    }

    pub fn arrays(&self) -> isize {
        self.0.arrays.get()
    }

    pub fn arrays_created(&self) -> usize {
        self.0.arrays_created.get()
    }

    pub fn apartments(&self) -> isize {
        self.0.apartments.get()
    }

    pub fn uninitialize_calls(&self) -> usize {
        self.0.uninitialize_calls.get()
    }

    /// Every object, string, array and apartment handed out has been released.
    pub fn assert_balanced(&self) {
        assert_eq!(self.live_objects(), 0, "leaked interface references");
        assert_eq!(self.strings(), 0, "leaked BSTRs");
        assert_eq!(self.arrays(), 0, "leaked SAFEARRAYs");
        assert_eq!(self.apartments(), 0, "apartment left initialized");
    }
}

#[derive(Clone)]
pub(crate) struct FakePackage {
    id: String,
    kind: String,
    chip: String,
    failing: bool,
}

impl FakePackage {
    pub fn new(id: &str, kind: &str) -> Self {
        Self {
            id: id.to_owned(),
            kind: kind.to_owned(),
            chip: String::new(),
            failing: false,
        }
    }

    pub fn chip(mut self, chip: &str) -> Self {
        self.chip = chip.to_owned();
        self
    }

    /// Every getter fails.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }
}

#[derive(Clone)]
pub(crate) struct FakeInstance {
    path: String,
    version: String,
    state: InstanceState,
    extended: Result<(), HRESULT>,
    packages: Result<Vec<FakePackage>, HRESULT>,
    version_error: Option<HRESULT>,
    state_error: Option<HRESULT>,
}

impl FakeInstance {
    pub fn new(path: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            version: version.into(),
            state: InstanceState::eComplete,
            extended: Ok(()),
            packages: Ok(Vec::new()),
            version_error: None,
            state_error: None,
        }
    }

    pub fn package(mut self, package: FakePackage) -> Self {
        if let Ok(packages) = &mut self.packages {
            packages.push(package);
        }
        self
    }

    pub fn state(mut self, state: InstanceState) -> Self {
        self.state = state;
        self
    }

    /// `QueryInterface` for `ISetupInstance2` fails with `error`.
    pub fn extended_fails(mut self, error: HRESULT) -> Self {
        self.extended = Err(error);
        self
    }

    pub fn packages_fail(mut self, error: HRESULT) -> Self {
        self.packages = Err(error);
        self
    }

    pub fn version_fails(mut self, error: HRESULT) -> Self {
        self.version_error = Some(error);
        self
    }

    pub fn state_fails(mut self, error: HRESULT) -> Self {
        self.state_error = Some(error);
        self
    }
}

pub(crate) struct FakeRuntime {
    tracker: Tracker,
    initialize_result: HRESULT,
    configuration: Result<FakeConfiguration, HRESULT>,
}

#[derive(Clone)]
struct FakeConfiguration {
    instances: Vec<FakeInstance>,
    enum_all: bool,
    next_failure: Option<(usize, HRESULT)>,
}

impl FakeRuntime {
    /// A runtime on which the setup configuration component is not registered.
    pub fn new(tracker: &Tracker) -> Self {
        Self {
            tracker: tracker.clone(),
            initialize_result: S_OK,
            configuration: Err(REGDB_E_CLASSNOTREG),
        }
    }

    pub fn with_initialize_result(mut self, result: HRESULT) -> Self {
        self.initialize_result = result;
        self
    }

    pub fn with_instances(mut self, instances: Vec<FakeInstance>) -> Self {
        self.configuration = Ok(FakeConfiguration {
            instances,
            enum_all: true,
            next_failure: None,
        });
        self
    }

    /// `IEnumSetupInstances::Next` fails with `error` once `count` instances have been handed out.
    pub fn next_fails_after(mut self, count: usize, error: HRESULT) -> Self {
        if let Ok(configuration) = &mut self.configuration {
            configuration.next_failure = Some((count, error));
        }
        self
    }

    /// Only `ISetupConfiguration` is implemented.
    pub fn without_enum_all(mut self) -> Self {
        if let Ok(configuration) = &mut self.configuration {
            configuration.enum_all = false;
        }
        self
    }
}

unsafe impl ComRuntime for FakeRuntime {
    fn initialize(&self) -> HRESULT {
        if self.initialize_result == S_OK || self.initialize_result == S_FALSE {
            bump(&self.tracker.0.apartments, 1);
        }
        self.initialize_result
    }

    unsafe fn uninitialize(&self) {
        bump(&self.tracker.0.apartments, -1);
        let calls = &self.tracker.0.uninitialize_calls;
        calls.set(calls.get() + 1);
    }

    unsafe fn create_instance(&self, clsid: &GUID, iid: &GUID, interface: *mut *mut c_void) -> HRESULT {
        unsafe {
            *interface = null_mut();
            if *clsid != SETUP_CONFIGURATION_CLSID {
                return REGDB_E_CLASSNOTREG;
            }
            let configuration = match &self.configuration {
                Ok(configuration) => configuration.clone(),
                Err(error) => return *error,
            };
            let object = new_object(&CONFIGURATION_VTABLE, &self.tracker, configuration);
            let result = query_interface::<vtable::ISetupConfiguration2, FakeConfiguration>(object, iid, interface);
            release::<vtable::ISetupConfiguration2, FakeConfiguration>(object);
            result
        }
    }

    unsafe fn free_string(&self, bstr: BSTR) {
        if !bstr.is_null() {
            unsafe { free_bstr(bstr) };
            bump(&self.tracker.0.strings, -1);
        }
    }

    unsafe fn lock_array(&self, array: *mut SAFEARRAY) -> HRESULT {
        unsafe { (*array).cLocks += 1 };
        S_OK
    }

    unsafe fn unlock_array(&self, array: *mut SAFEARRAY) -> HRESULT {
        unsafe {
            if (*array).cLocks == 0 {
                return E_UNEXPECTED;
            }
            (*array).cLocks -= 1;
        }
        S_OK
    }

    unsafe fn destroy_array(&self, array: *mut SAFEARRAY) -> HRESULT {
        unsafe {
            // Like DISP_E_ARRAYISLOCKED, a locked array is leaked (and the tracker notices).
            if (*array).cLocks != 0 {
                return E_UNEXPECTED;
            }
            let array = Box::from_raw(array);
            let len = array.rgsabound[0].cElements as usize;
            let elements = Box::from_raw(ptr::slice_from_raw_parts_mut(array.pvData.cast::<*mut c_void>(), len));
            for &element in elements.iter() {
                release_unknown(element);
            }
        }
        bump(&self.tracker.0.arrays, -1);
        S_OK
    }
}

// Objects

#[repr(C)]
struct Object<V, D> {
    vtable: *const V,
    refs: Cell<u32>,
    tracker: Tracker,
    data: D,
}

trait Supports {
    fn supports(&self, iid: &GUID) -> Result<(), HRESULT>;
}

fn new_object<V, D>(vtable: &'static V, tracker: &Tracker, data: D) -> *mut c_void {
    bump(&tracker.0.objects, 1);
    let created = &tracker.0.objects_created;
    created.set(created.get() + 1);
    let object = Box::new(Object {
        vtable: ptr::from_ref(vtable),
        refs: Cell::new(1),
        tracker: tracker.clone(),
        data,
    });
    Box::into_raw(object).cast()
}

unsafe fn object<'a, V, D>(this: *mut c_void) -> &'a Object<V, D> {
    unsafe { &*this.cast::<Object<V, D>>() }
}

unsafe extern "system" fn query_interface<V, D: Supports>(
    this: *mut c_void,
    iid: *const GUID,
    interface: *mut *mut c_void,
) -> HRESULT {
    unsafe {
        let object = object::<V, D>(this);
        match object.data.supports(&*iid) {
            Ok(()) => {
                add_ref::<V, D>(this);
                *interface = this;
                S_OK
            }
            Err(error) => {
                *interface = null_mut();
                error
            }
        }
    }
}

unsafe extern "system" fn add_ref<V, D>(this: *mut c_void) -> u32 {
    let object = unsafe { object::<V, D>(this) };
    let refs = object.refs.get() + 1;
    object.refs.set(refs);
    refs
}

unsafe extern "system" fn release<V, D>(this: *mut c_void) -> u32 {
    let object = unsafe { object::<V, D>(this) };
    let refs = object.refs.get();
    assert!(refs > 0, "released an object with no references");
    object.refs.set(refs - 1);
    if refs == 1 {
        let object = unsafe { Box::from_raw(this.cast::<Object<V, D>>()) };
        bump(&object.tracker.0.objects, -1);
    }
    refs - 1
}

unsafe fn release_unknown(unknown: *mut c_void) {
    if !unknown.is_null() {
        unsafe {
            let vtable = *unknown.cast::<*const IUnknown_Vtbl>();
            ((*vtable).Release)(unknown);
        }
    }
}

unsafe fn set_string(tracker: &Tracker, out: *mut BSTR, value: &str) -> HRESULT {
    unsafe { *out = alloc_bstr(value) };
    bump(&tracker.0.strings, 1);
    S_OK
}

// BSTR layout: a u32 byte length, the characters, then a null.
fn bstr_words(units: usize) -> usize {
    1 + (units + 1).div_ceil(2)
}

fn alloc_bstr(value: &str) -> BSTR {
    let wide: Vec<u16> = value.encode_utf16().collect();
    let mut buffer = vec![0u32; bstr_words(wide.len())].into_boxed_slice();
    buffer[0] = (wide.len() * 2) as u32;
    let raw = Box::into_raw(buffer).cast::<u32>();
    unsafe {
        let chars = raw.add(1).cast::<u16>();
        ptr::copy_nonoverlapping(wide.as_ptr(), chars, wide.len());
        chars
    }
}

unsafe fn free_bstr(bstr: BSTR) {
    unsafe {
        let raw = bstr.cast::<u32>().sub(1);
        let units = *raw as usize / 2;
        drop(Box::from_raw(ptr::slice_from_raw_parts_mut(raw, bstr_words(units))));
    }
}

// Stubs for slots the probe never calls.

unsafe extern "system" fn not_impl_bstr(_: *mut c_void, _: *mut BSTR) -> HRESULT {
    E_NOTIMPL
}
unsafe extern "system" fn not_impl_lcid_bstr(_: *mut c_void, _: LCID, _: *mut BSTR) -> HRESULT {
    E_NOTIMPL
}
unsafe extern "system" fn not_impl_bool(_: *mut c_void, _: *mut VARIANT_BOOL) -> HRESULT {
    E_NOTIMPL
}
unsafe extern "system" fn not_impl_ptr(_: *mut c_void, _: *mut *mut c_void) -> HRESULT {
    E_NOTIMPL
}

// ISetupConfiguration2

impl Supports for FakeConfiguration {
    fn supports(&self, iid: &GUID) -> Result<(), HRESULT> {
        if *iid == IID_IUnknown
            || *iid == ISetupConfiguration::IID
            || (self.enum_all && *iid == ISetupConfiguration2::IID)
        {
            Ok(())
        } else {
            Err(E_NOINTERFACE)
        }
    }
}

static CONFIGURATION_VTABLE: vtable::ISetupConfiguration2 = vtable::ISetupConfiguration2 {
    base__: vtable::ISetupConfiguration {
        base__: IUnknown_Vtbl {
            QueryInterface: query_interface::<vtable::ISetupConfiguration2, FakeConfiguration>,
            AddRef: add_ref::<vtable::ISetupConfiguration2, FakeConfiguration>,
            Release: release::<vtable::ISetupConfiguration2, FakeConfiguration>,
        },
        EnumInstances: configuration_enum_instances,
        GetInstanceForCurrentProcess: configuration_instance_for_process,
        GetInstanceForPath: configuration_instance_for_path,
    },
    EnumAllInstances: configuration_enum_instances,
};

unsafe extern "system" fn configuration_enum_instances(
    this: *mut c_void,
    out: *mut Option<IEnumSetupInstances>,
) -> HRESULT {
    unsafe {
        let object = object::<vtable::ISetupConfiguration2, FakeConfiguration>(this);
        let items = object
            .data
            .instances
            .iter()
            .map(|instance| new_object(&INSTANCE_VTABLE, &object.tracker, instance.clone()))
            .collect();
        let enumerator = new_object(
            &ENUM_VTABLE,
            &object.tracker,
            FakeEnum {
                items: RefCell::new(items),
                handed_out: Cell::new(0),
                failure: object.data.next_failure,
            },
        );
        ptr::write(out.cast::<*mut c_void>(), enumerator);
        S_OK
    }
}

unsafe extern "system" fn configuration_instance_for_process(
    _: *mut c_void,
    _: *mut Option<ISetupInstance>,
) -> HRESULT {
    E_NOTIMPL
}

unsafe extern "system" fn configuration_instance_for_path(
    _: *mut c_void,
    _: LPCOLESTR,
    _: *mut Option<ISetupInstance>,
) -> HRESULT {
    E_NOTIMPL
}

// IEnumSetupInstances

struct FakeEnum {
    items: RefCell<VecDeque<*mut c_void>>,
    handed_out: Cell<usize>,
    failure: Option<(usize, HRESULT)>,
}

impl Supports for FakeEnum {
    fn supports(&self, iid: &GUID) -> Result<(), HRESULT> {
        if *iid == IID_IUnknown || *iid == IEnumSetupInstances::IID {
            Ok(())
        } else {
            Err(E_NOINTERFACE)
        }
    }
}

impl Drop for FakeEnum {
    fn drop(&mut self) {
        for item in self.items.get_mut().drain(..) {
            unsafe { release_unknown(item) };
        }
    }
}

static ENUM_VTABLE: vtable::IEnumSetupInstances = vtable::IEnumSetupInstances {
    base__: IUnknown_Vtbl {
        QueryInterface: query_interface::<vtable::IEnumSetupInstances, FakeEnum>,
        AddRef: add_ref::<vtable::IEnumSetupInstances, FakeEnum>,
        Release: release::<vtable::IEnumSetupInstances, FakeEnum>,
    },
    Next: enum_next,
    Skip: enum_skip,
    Reset: enum_reset,
    Clone: enum_clone,
};

unsafe extern "system" fn enum_next(
    this: *mut c_void,
    celt: u32,
    rgelt: *mut Option<ISetupInstance>,
    fetched: *mut u32,
) -> HRESULT {
    unsafe {
        let object = object::<vtable::IEnumSetupInstances, FakeEnum>(this);
        if let Some((after, error)) = object.data.failure {
            if object.data.handed_out.get() >= after {
                if !fetched.is_null() {
                    *fetched = 0;
                }
                return error;
            }
        }
        let mut items = object.data.items.borrow_mut();
        let mut count = 0;
        while count < celt {
            let Some(item) = items.pop_front() else { break };
            ptr::write(rgelt.cast::<*mut c_void>().add(count as usize), item);
            count += 1;
        }
        let handed_out = &object.data.handed_out;
        handed_out.set(handed_out.get() + count as usize);
        if !fetched.is_null() {
            *fetched = count;
        }
        if count == celt { S_OK } else { S_FALSE }
    }
}

unsafe extern "system" fn enum_skip(_: *mut c_void, _: u32) -> HRESULT {
    E_NOTIMPL
}

unsafe extern "system" fn enum_reset(_: *mut c_void) -> HRESULT {
    E_NOTIMPL
}

unsafe extern "system" fn enum_clone(_: *mut c_void, _: *mut Option<IEnumSetupInstances>) -> HRESULT {
    E_NOTIMPL
}

// ISetupInstance2

impl Supports for FakeInstance {
    fn supports(&self, iid: &GUID) -> Result<(), HRESULT> {
        if *iid == IID_IUnknown || *iid == ISetupInstance::IID {
            Ok(())
        } else if *iid == ISetupInstance2::IID {
            self.extended
        } else {
            Err(E_NOINTERFACE)
        }
    }
}

static INSTANCE_VTABLE: vtable::ISetupInstance2 = vtable::ISetupInstance2 {
    base__: vtable::ISetupInstance {
        base__: IUnknown_Vtbl {
            QueryInterface: query_interface::<vtable::ISetupInstance2, FakeInstance>,
            AddRef: add_ref::<vtable::ISetupInstance2, FakeInstance>,
            Release: release::<vtable::ISetupInstance2, FakeInstance>,
        },
        GetInstanceId: not_impl_bstr,
        GetInstallDate: instance_install_date,
        GetInstallationName: not_impl_bstr,
        GetInstallationPath: instance_path,
        GetInstallationVersion: instance_version,
        GetDisplayName: not_impl_lcid_bstr,
        GetDescription: not_impl_lcid_bstr,
        ResolvePath: instance_resolve_path,
    },
    GetState: instance_state,
    GetPackages: instance_packages,
    GetProduct: instance_product,
    GetProductPath: not_impl_bstr,
    GetErrors: not_impl_ptr,
    IsLaunchable: not_impl_bool,
    IsComplete: not_impl_bool,
    GetProperties: not_impl_ptr,
    GetEnginePath: not_impl_bstr,
};

unsafe fn instance<'a>(this: *mut c_void) -> &'a Object<vtable::ISetupInstance2, FakeInstance> {
    unsafe { object::<vtable::ISetupInstance2, FakeInstance>(this) }
}

unsafe extern "system" fn instance_install_date(_: *mut c_void, _: *mut FILETIME) -> HRESULT {
    E_NOTIMPL
}

unsafe extern "system" fn instance_resolve_path(_: *mut c_void, _: LPCOLESTR, _: *mut BSTR) -> HRESULT {
    E_NOTIMPL
}

unsafe extern "system" fn instance_path(this: *mut c_void, out: *mut BSTR) -> HRESULT {
    unsafe {
        let object = instance(this);
        set_string(&object.tracker, out, &object.data.path)
    }
}

unsafe extern "system" fn instance_version(this: *mut c_void, out: *mut BSTR) -> HRESULT {
    unsafe {
        let object = instance(this);
        match object.data.version_error {
            Some(error) => error,
            None => set_string(&object.tracker, out, &object.data.version),
        }
    }
}

unsafe extern "system" fn instance_state(this: *mut c_void, out: *mut InstanceState) -> HRESULT {
    unsafe {
        let object = instance(this);
        if let Some(error) = object.data.state_error {
            return error;
        }
        *out = object.data.state;
    }
    S_OK
}

unsafe extern "system" fn instance_packages(this: *mut c_void, out: *mut *mut SAFEARRAY) -> HRESULT {
    unsafe {
        let object = instance(this);
        let packages = match &object.data.packages {
            Ok(packages) => packages,
            Err(error) => return *error,
        };
        let elements: Box<[*mut c_void]> = packages
            .iter()
            .map(|package| new_object(&PACKAGE_VTABLE, &object.tracker, package.clone()))
            .collect();
        let len = elements.len() as u32;
        let array = Box::new(SAFEARRAY {
            cDims: 1,
            fFeatures: 0x200, // FADF_UNKNOWN
            cbElements: size_of::<*mut c_void>() as u32,
            cLocks: 0,
            pvData: Box::into_raw(elements).cast(),
            rgsabound: [SAFEARRAYBOUND {
                cElements: len,
                lLbound: 0,
            }],
        });
        bump(&object.tracker.0.arrays, 1);
        let created = &object.tracker.0.arrays_created;
        created.set(created.get() + 1);
        *out = Box::into_raw(array);
        S_OK
    }
}

unsafe extern "system" fn instance_product(_: *mut c_void, _: *mut Option<ISetupPackageReference>) -> HRESULT {
    E_NOTIMPL
}

// ISetupPackageReference

impl Supports for FakePackage {
    fn supports(&self, iid: &GUID) -> Result<(), HRESULT> {
        if *iid == IID_IUnknown || *iid == ISetupPackageReference::IID {
            Ok(())
        } else {
            Err(E_NOINTERFACE)
        }
    }
}

static PACKAGE_VTABLE: vtable::ISetupPackageReference = vtable::ISetupPackageReference {
    base__: IUnknown_Vtbl {
        QueryInterface: query_interface::<vtable::ISetupPackageReference, FakePackage>,
        AddRef: add_ref::<vtable::ISetupPackageReference, FakePackage>,
        Release: release::<vtable::ISetupPackageReference, FakePackage>,
    },
    GetId: package_id,
    GetVersion: not_impl_bstr,
    GetChip: package_chip,
    GetLanguage: not_impl_bstr,
    GetBranch: not_impl_bstr,
    GetType: package_type,
    GetUniqueId: not_impl_bstr,
    GetIsExtension: not_impl_bool,
};

unsafe fn package_string(this: *mut c_void, out: *mut BSTR, field: fn(&FakePackage) -> &str) -> HRESULT {
    unsafe {
        let object = object::<vtable::ISetupPackageReference, FakePackage>(this);
        if object.data.failing {
            return E_FAIL;
        }
        set_string(&object.tracker, out, field(&object.data))
    }
}

unsafe extern "system" fn package_id(this: *mut c_void, out: *mut BSTR) -> HRESULT {
    unsafe { package_string(this, out, |package| package.id.as_str()) }
}

unsafe extern "system" fn package_type(this: *mut c_void, out: *mut BSTR) -> HRESULT {
    unsafe { package_string(this, out, |package| package.kind.as_str()) }
}

unsafe extern "system" fn package_chip(this: *mut c_void, out: *mut BSTR) -> HRESULT {
    unsafe { package_string(this, out, |package| package.chip.as_str()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_bstr_has_a_length_prefix() {
        let bstr = alloc_bstr("x64");
        unsafe {
            assert_eq!(*bstr.cast::<u32>().sub(1), 6);
            assert_eq!(*bstr.add(3), 0);
            free_bstr(bstr);
        }
    }

    #[test]
    fn references_are_counted() {
        let tracker = Tracker::new();
        let raw = new_object(&PACKAGE_VTABLE, &tracker, FakePackage::new("id", "Component"));
        let package = unsafe { ISetupPackageReference::from_raw(raw) }.unwrap();
        let unknown: IUnknown = package.cast().unwrap();
        drop(package);
        assert_eq!(tracker.live_objects(), 1);
        drop(unknown);
        tracker.assert_balanced();
    }
}
