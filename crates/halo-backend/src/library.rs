//! The backend contract.
//!
//! Anything the loader can route to implements [`BackendLibrary`]: the
//! dynamically loaded shared-library form, the in-process reference
//! backend, and test doubles. The contract mirrors the symbol surface of
//! a real backend library: one initialization entry point plus one
//! resolver per dispatch-table category.

use std::sync::Arc;

use halo_core::{AcceleratorClass, ApiVersion, CapabilityMask, Result};

use crate::ops::{
    CommandOps, ContextOps, DeviceOps, DriverOps, ImageOps, KernelOps, ModuleOps, QueueOps,
    SyncOps,
};

/// A loadable accelerator backend.
///
/// Initialization must be idempotent: the loader may re-run discovery
/// with overlapping capability requests and calls `init` at most once per
/// descriptor, but test harnesses may drive it repeatedly.
pub trait BackendLibrary: Send + Sync {
    /// Stable backend name used in logs and version reports.
    fn name(&self) -> &str;

    /// The accelerator class this backend serves.
    fn class(&self) -> AcceleratorClass;

    /// Interface version the backend implements.
    fn version(&self) -> ApiVersion;

    /// Run the backend's initialization entry point.
    ///
    /// The requested mask is informational; class filtering has already
    /// happened by the time the loader calls this.
    fn init(&self, requested: CapabilityMask) -> Result<()>;

    /// Resolve driver-level operations.
    fn driver_ops(&self, version: ApiVersion) -> Result<Arc<dyn DriverOps>>;

    /// Resolve device operations.
    fn device_ops(&self, version: ApiVersion) -> Result<Arc<dyn DeviceOps>>;

    /// Resolve context operations.
    fn context_ops(&self, version: ApiVersion) -> Result<Arc<dyn ContextOps>>;

    /// Resolve queue operations.
    fn queue_ops(&self, version: ApiVersion) -> Result<Arc<dyn QueueOps>>;

    /// Resolve command buffer operations.
    fn command_ops(&self, version: ApiVersion) -> Result<Arc<dyn CommandOps>>;

    /// Resolve synchronization operations.
    fn sync_ops(&self, version: ApiVersion) -> Result<Arc<dyn SyncOps>>;

    /// Resolve image operations.
    fn image_ops(&self, version: ApiVersion) -> Result<Arc<dyn ImageOps>>;

    /// Resolve module operations.
    fn module_ops(&self, version: ApiVersion) -> Result<Arc<dyn ModuleOps>>;

    /// Resolve kernel operations.
    fn kernel_ops(&self, version: ApiVersion) -> Result<Arc<dyn KernelOps>>;
}
