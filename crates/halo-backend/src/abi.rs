//! Raw C ABI shared with dynamically loaded backends.
//!
//! A backend shared library exports `halo_backend_properties`,
//! `halo_backend_init`, and one table getter per object category (see
//! [`halo_core::category_table_symbol`]). Each getter receives the
//! requested interface version and fills a `#[repr(C)]` table of function
//! pointers; entries a backend does not implement stay null and surface
//! to callers as unsupported-version errors.
//!
//! Handles are bare `u64` values on this boundary. Strings are fixed-size
//! NUL-terminated byte arrays.

use std::os::raw::c_char;

use halo_core::{AcceleratorClass, ApiVersion, LoaderError, Result};

/// Interface version spoken by this loader build, in wire encoding.
pub const ABI_VERSION: u32 = ApiVersion::CURRENT.as_raw();

/// Capacity of fixed-size name fields.
pub const MAX_NAME_BYTES: usize = 64;

/// Success.
pub const CODE_SUCCESS: i32 = 0;
/// Backend not initialized.
pub const CODE_UNINITIALIZED: i32 = -1;
/// Requested interface version not supported.
pub const CODE_UNSUPPORTED_VERSION: i32 = -2;
/// Operation not supported.
pub const CODE_UNSUPPORTED: i32 = -3;
/// Handle argument invalid.
pub const CODE_INVALID_HANDLE: i32 = -4;
/// Object still has dependents.
pub const CODE_OBJECT_IN_USE: i32 = -5;
/// Argument outside the operation's contract.
pub const CODE_INVALID_ARGUMENT: i32 = -6;
/// Required pointer argument null.
pub const CODE_INVALID_NULL_POINTER: i32 = -7;
/// Enumeration tag out of range.
pub const CODE_INVALID_ENUMERATION: i32 = -8;
/// Catch-all for loader-side errors with no wire representation.
pub const CODE_UNKNOWN: i32 = -0x7fff_ffff;

/// Map a wire code onto the loader error taxonomy.
///
/// Codes without a modeled meaning pass through as
/// [`LoaderError::Backend`].
pub fn error_from_code(code: i32) -> LoaderError {
    match code {
        CODE_UNINITIALIZED => LoaderError::Uninitialized,
        CODE_UNSUPPORTED_VERSION => {
            LoaderError::UnsupportedVersion("reported by backend".to_string())
        }
        CODE_UNSUPPORTED => LoaderError::Unsupported("reported by backend".to_string()),
        CODE_INVALID_HANDLE => LoaderError::InvalidHandle,
        CODE_OBJECT_IN_USE => LoaderError::ObjectInUse,
        CODE_INVALID_ARGUMENT => LoaderError::InvalidArgument("reported by backend".to_string()),
        CODE_INVALID_NULL_POINTER => LoaderError::InvalidNullPointer,
        CODE_INVALID_ENUMERATION => {
            LoaderError::InvalidEnumeration("reported by backend".to_string())
        }
        other => LoaderError::Backend(other),
    }
}

/// Map a loader error onto its wire code.
pub fn code_from_error(error: &LoaderError) -> i32 {
    match error {
        LoaderError::Uninitialized => CODE_UNINITIALIZED,
        LoaderError::UnsupportedVersion(_) => CODE_UNSUPPORTED_VERSION,
        LoaderError::Unsupported(_) => CODE_UNSUPPORTED,
        LoaderError::InvalidHandle => CODE_INVALID_HANDLE,
        LoaderError::ObjectInUse => CODE_OBJECT_IN_USE,
        LoaderError::InvalidArgument(_) => CODE_INVALID_ARGUMENT,
        LoaderError::InvalidNullPointer => CODE_INVALID_NULL_POINTER,
        LoaderError::InvalidEnumeration(_) => CODE_INVALID_ENUMERATION,
        LoaderError::Backend(code) => *code,
        _ => CODE_UNKNOWN,
    }
}

/// Turn a wire code into a `Result`.
pub fn check(code: i32) -> Result<()> {
    if code == CODE_SUCCESS {
        Ok(())
    } else {
        Err(error_from_code(code))
    }
}

/// Accelerator class wire tags.
pub fn class_from_tag(tag: u32) -> AcceleratorClass {
    match tag {
        1 => AcceleratorClass::DiscreteGpu,
        2 => AcceleratorClass::IntegratedGpu,
        3 => AcceleratorClass::Npu,
        _ => AcceleratorClass::Other,
    }
}

/// Inverse of [`class_from_tag`].
pub fn class_tag(class: AcceleratorClass) -> u32 {
    match class {
        AcceleratorClass::DiscreteGpu => 1,
        AcceleratorClass::IntegratedGpu => 2,
        AcceleratorClass::Npu => 3,
        AcceleratorClass::Other => 0,
    }
}

/// Decode a fixed-size NUL-terminated name field.
pub fn name_from_bytes(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Signature of `halo_backend_init`.
pub type BackendInitFn = unsafe extern "C" fn(flags: u32) -> i32;

/// Signature of `halo_backend_properties`.
pub type BackendPropertiesFn = unsafe extern "C" fn(properties: *mut RawBackendProperties) -> i32;

/// Signature shared by every category table getter.
pub type TableGetterFn<T> = unsafe extern "C" fn(version: u32, table: *mut T) -> i32;

/// Identity a backend library reports before initialization.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawBackendProperties {
    /// NUL-terminated backend name.
    pub name: [u8; MAX_NAME_BYTES],
    /// Accelerator class wire tag.
    pub class: u32,
    /// Implemented interface version, wire encoded.
    pub version: u32,
}

impl Default for RawBackendProperties {
    fn default() -> Self {
        Self {
            name: [0; MAX_NAME_BYTES],
            class: 0,
            version: 0,
        }
    }
}

/// Driver identity on the wire.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawDriverProperties {
    /// NUL-terminated driver name.
    pub name: [u8; MAX_NAME_BYTES],
    /// Driver build version, wire encoded.
    pub version: u32,
    /// Installation identity.
    pub uuid: [u8; 16],
}

impl Default for RawDriverProperties {
    fn default() -> Self {
        Self {
            name: [0; MAX_NAME_BYTES],
            version: 0,
            uuid: [0; 16],
        }
    }
}

/// Extension descriptor on the wire.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawExtensionProperties {
    /// NUL-terminated extension name.
    pub name: [u8; MAX_NAME_BYTES],
    /// Extension specification version.
    pub version: u32,
}

impl Default for RawExtensionProperties {
    fn default() -> Self {
        Self {
            name: [0; MAX_NAME_BYTES],
            version: 0,
        }
    }
}

/// Device identity on the wire.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawDeviceProperties {
    /// NUL-terminated device name.
    pub name: [u8; MAX_NAME_BYTES],
    /// Accelerator class wire tag.
    pub class: u32,
    /// Vendor-assigned device id.
    pub device_id: u32,
}

impl Default for RawDeviceProperties {
    fn default() -> Self {
        Self {
            name: [0; MAX_NAME_BYTES],
            class: 0,
            device_id: 0,
        }
    }
}

/// Context creation parameters on the wire.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawContextDesc {
    /// Backend-interpreted flags.
    pub flags: u32,
}

/// Queue creation parameters on the wire.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawQueueDesc {
    /// Queue group ordinal.
    pub ordinal: u32,
    /// Backend-interpreted flags.
    pub flags: u32,
}

/// Command buffer creation parameters on the wire.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCommandBufferDesc {
    /// Backend-interpreted flags.
    pub flags: u32,
}

/// Image creation parameters on the wire.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawImageDesc {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
}

/// Driver category table.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawDriverTable {
    /// Two-call driver enumeration.
    pub driver_handles: Option<unsafe extern "C" fn(count: *mut u32, handles: *mut u64) -> i32>,
    /// Interface version query.
    pub api_version: Option<unsafe extern "C" fn(driver: u64, version: *mut u32) -> i32>,
    /// Driver identity query.
    pub properties:
        Option<unsafe extern "C" fn(driver: u64, properties: *mut RawDriverProperties) -> i32>,
    /// Two-call extension enumeration.
    pub extension_properties: Option<
        unsafe extern "C" fn(
            driver: u64,
            count: *mut u32,
            properties: *mut RawExtensionProperties,
        ) -> i32,
    >,
}

/// Device category table.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawDeviceTable {
    /// Two-call device enumeration under a driver.
    pub device_handles:
        Option<unsafe extern "C" fn(driver: u64, count: *mut u32, handles: *mut u64) -> i32>,
    /// Device identity query.
    pub properties:
        Option<unsafe extern "C" fn(device: u64, properties: *mut RawDeviceProperties) -> i32>,
}

/// Context category table.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawContextTable {
    /// Context creation.
    pub create: Option<
        unsafe extern "C" fn(driver: u64, desc: *const RawContextDesc, context: *mut u64) -> i32,
    >,
    /// Context liveness query.
    pub status: Option<unsafe extern "C" fn(context: u64) -> i32>,
    /// Context destruction.
    pub destroy: Option<unsafe extern "C" fn(context: u64) -> i32>,
}

/// Command queue category table.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawQueueTable {
    /// Queue creation.
    pub create: Option<
        unsafe extern "C" fn(
            context: u64,
            device: u64,
            desc: *const RawQueueDesc,
            queue: *mut u64,
        ) -> i32,
    >,
    /// Submission of closed command buffers; `fence` may be zero.
    pub execute: Option<
        unsafe extern "C" fn(queue: u64, count: u32, buffers: *const u64, fence: u64) -> i32,
    >,
    /// Host-side wait.
    pub synchronize: Option<unsafe extern "C" fn(queue: u64, timeout_ns: u64) -> i32>,
    /// Queue destruction.
    pub destroy: Option<unsafe extern "C" fn(queue: u64) -> i32>,
}

/// Command buffer category table.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCommandTable {
    /// Command buffer creation.
    pub create: Option<
        unsafe extern "C" fn(
            context: u64,
            device: u64,
            desc: *const RawCommandBufferDesc,
            buffer: *mut u64,
        ) -> i32,
    >,
    /// Barrier recording; `signal` may be zero, `wait` may be empty.
    pub append_barrier: Option<
        unsafe extern "C" fn(buffer: u64, signal: u64, wait_count: u32, wait: *const u64) -> i32,
    >,
    /// Finish recording.
    pub close: Option<unsafe extern "C" fn(buffer: u64) -> i32>,
    /// Return to the recording state.
    pub reset: Option<unsafe extern "C" fn(buffer: u64) -> i32>,
    /// Command buffer destruction.
    pub destroy: Option<unsafe extern "C" fn(buffer: u64) -> i32>,
}

/// Synchronization category table (fences, event pools, events).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawSyncTable {
    /// Fence creation on a queue.
    pub fence_create: Option<unsafe extern "C" fn(queue: u64, fence: *mut u64) -> i32>,
    /// Fence destruction.
    pub fence_destroy: Option<unsafe extern "C" fn(fence: u64) -> i32>,
    /// Event pool creation over a device set.
    pub event_pool_create: Option<
        unsafe extern "C" fn(
            context: u64,
            device_count: u32,
            devices: *const u64,
            capacity: u32,
            pool: *mut u64,
        ) -> i32,
    >,
    /// Event creation within a pool.
    pub event_create: Option<unsafe extern "C" fn(pool: u64, index: u32, event: *mut u64) -> i32>,
    /// Event destruction.
    pub event_destroy: Option<unsafe extern "C" fn(event: u64) -> i32>,
    /// Event pool destruction.
    pub event_pool_destroy: Option<unsafe extern "C" fn(pool: u64) -> i32>,
}

/// Image category table.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawImageTable {
    /// Image creation.
    pub create: Option<
        unsafe extern "C" fn(
            context: u64,
            device: u64,
            desc: *const RawImageDesc,
            image: *mut u64,
        ) -> i32,
    >,
    /// Image destruction.
    pub destroy: Option<unsafe extern "C" fn(image: u64) -> i32>,
}

/// Module category table.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawModuleTable {
    /// Module build from program code.
    pub create: Option<
        unsafe extern "C" fn(
            context: u64,
            device: u64,
            code: *const u8,
            code_size: usize,
            module: *mut u64,
        ) -> i32,
    >,
    /// Module destruction.
    pub destroy: Option<unsafe extern "C" fn(module: u64) -> i32>,
}

/// Kernel category table.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawKernelTable {
    /// Kernel lookup by NUL-terminated entry point name.
    pub create:
        Option<unsafe extern "C" fn(module: u64, name: *const c_char, kernel: *mut u64) -> i32>,
    /// Kernel destruction.
    pub destroy: Option<unsafe extern "C" fn(kernel: u64) -> i32>,
}
