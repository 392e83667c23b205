//! Per-category operation traits.
//!
//! A backend's dispatch surface is grouped by object category; each group
//! is one of the traits below, handed out behind `Arc` so the composed
//! loader table, the registry, and in-flight calls can share it. All
//! methods take backend-native handles; the loader unwraps its own
//! handles before routing here.
//!
//! Handles documented as "may be null" accept [`RawHandle::NULL`], which
//! matches the wire contract of dynamically loaded backends.

use halo_core::{AcceleratorClass, ApiVersion, RawHandle, Result};

/// Properties reported by a driver object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverProperties {
    /// Backend-reported driver name.
    pub name: String,
    /// Driver build version.
    pub version: ApiVersion,
    /// Stable identity of the driver installation.
    pub uuid: [u8; 16],
}

/// One extension implemented by a driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionProperties {
    /// Extension name, unique per driver.
    pub name: String,
    /// Extension specification version.
    pub version: u32,
}

/// Properties reported by a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProperties {
    /// Device marketing name.
    pub name: String,
    /// Class of the accelerator.
    pub class: AcceleratorClass,
    /// Vendor-assigned device id.
    pub device_id: u32,
}

/// Creation parameters for a context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextDesc {
    /// Backend-interpreted creation flags.
    pub flags: u32,
}

/// Creation parameters for a command queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDesc {
    /// Queue group ordinal.
    pub ordinal: u32,
    /// Backend-interpreted creation flags.
    pub flags: u32,
}

/// Creation parameters for a command buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandBufferDesc {
    /// Backend-interpreted creation flags.
    pub flags: u32,
}

/// Creation parameters for an image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageDesc {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
}

/// Driver-level operations.
pub trait DriverOps: Send + Sync {
    /// Enumerate the driver handles this backend exposes.
    fn driver_handles(&self) -> Result<Vec<RawHandle>>;

    /// Interface version implemented by a driver.
    fn api_version(&self, driver: RawHandle) -> Result<ApiVersion>;

    /// Driver identity and build information.
    fn properties(&self, driver: RawHandle) -> Result<DriverProperties>;

    /// Extensions the driver implements.
    fn extension_properties(&self, driver: RawHandle) -> Result<Vec<ExtensionProperties>>;
}

/// Device enumeration and queries.
pub trait DeviceOps: Send + Sync {
    /// Devices exposed by a driver.
    fn device_handles(&self, driver: RawHandle) -> Result<Vec<RawHandle>>;

    /// Device identity.
    fn properties(&self, device: RawHandle) -> Result<DeviceProperties>;
}

/// Context lifecycle.
pub trait ContextOps: Send + Sync {
    /// Create a context under a driver.
    fn create(&self, driver: RawHandle, desc: &ContextDesc) -> Result<RawHandle>;

    /// Cheap liveness query; also serves as the teardown stability probe
    /// target.
    fn status(&self, context: RawHandle) -> Result<()>;

    /// Destroy a context.
    fn destroy(&self, context: RawHandle) -> Result<()>;
}

/// Command queue lifecycle and submission.
pub trait QueueOps: Send + Sync {
    /// Create a queue on a device within a context.
    fn create(&self, context: RawHandle, device: RawHandle, desc: &QueueDesc)
        -> Result<RawHandle>;

    /// Submit closed command buffers. `fence` may be null.
    fn execute(&self, queue: RawHandle, buffers: &[RawHandle], fence: RawHandle) -> Result<()>;

    /// Block until previously submitted work completes or the timeout
    /// elapses.
    fn synchronize(&self, queue: RawHandle, timeout_ns: u64) -> Result<()>;

    /// Destroy a queue.
    fn destroy(&self, queue: RawHandle) -> Result<()>;
}

/// Recordable command buffer operations.
pub trait CommandOps: Send + Sync {
    /// Create a command buffer on a device within a context.
    fn create(
        &self,
        context: RawHandle,
        device: RawHandle,
        desc: &CommandBufferDesc,
    ) -> Result<RawHandle>;

    /// Record an execution barrier. `signal` may be null; `wait` may be
    /// empty.
    fn append_barrier(
        &self,
        buffer: RawHandle,
        signal: RawHandle,
        wait: &[RawHandle],
    ) -> Result<()>;

    /// Finish recording.
    fn close(&self, buffer: RawHandle) -> Result<()>;

    /// Return the buffer to the recording state.
    fn reset(&self, buffer: RawHandle) -> Result<()>;

    /// Destroy a command buffer.
    fn destroy(&self, buffer: RawHandle) -> Result<()>;
}

/// Fences, event pools, and events.
pub trait SyncOps: Send + Sync {
    /// Create a fence on a queue.
    fn fence_create(&self, queue: RawHandle) -> Result<RawHandle>;

    /// Destroy a fence.
    fn fence_destroy(&self, fence: RawHandle) -> Result<()>;

    /// Create an event pool visible to the given devices.
    fn event_pool_create(
        &self,
        context: RawHandle,
        devices: &[RawHandle],
        capacity: u32,
    ) -> Result<RawHandle>;

    /// Create an event at an index within a pool.
    fn event_create(&self, pool: RawHandle, index: u32) -> Result<RawHandle>;

    /// Destroy an event.
    fn event_destroy(&self, event: RawHandle) -> Result<()>;

    /// Destroy an event pool.
    fn event_pool_destroy(&self, pool: RawHandle) -> Result<()>;
}

/// Image lifecycle.
pub trait ImageOps: Send + Sync {
    /// Create an image on a device within a context.
    fn create(&self, context: RawHandle, device: RawHandle, desc: &ImageDesc) -> Result<RawHandle>;

    /// Destroy an image.
    fn destroy(&self, image: RawHandle) -> Result<()>;
}

/// Program module lifecycle.
pub trait ModuleOps: Send + Sync {
    /// Build a module from backend-interpreted program code.
    fn create(&self, context: RawHandle, device: RawHandle, code: &[u8]) -> Result<RawHandle>;

    /// Destroy a module.
    fn destroy(&self, module: RawHandle) -> Result<()>;
}

/// Kernel lifecycle.
pub trait KernelOps: Send + Sync {
    /// Look up a kernel entry point in a module.
    fn create(&self, module: RawHandle, name: &str) -> Result<RawHandle>;

    /// Destroy a kernel.
    fn destroy(&self, kernel: RawHandle) -> Result<()>;
}
