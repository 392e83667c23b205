//! Dispatch tables.
//!
//! One [`DispatchTable`] exists per initialized backend; the loader's
//! composed view references the same `Arc`-held groups, so group identity
//! doubles as the "which dispatch path minted this handle" witness used
//! by handle translation.

use std::sync::Arc;

use halo_core::{ApiVersion, ObjectCategory, Result};

use crate::library::BackendLibrary;
use crate::ops::{
    CommandOps, ContextOps, DeviceOps, DriverOps, ImageOps, KernelOps, ModuleOps, QueueOps,
    SyncOps,
};

/// A backend's resolved dispatch surface, one shared group per object
/// category.
#[derive(Clone)]
pub struct DispatchTable {
    /// Driver-level operations.
    pub driver: Arc<dyn DriverOps>,
    /// Device enumeration and queries.
    pub device: Arc<dyn DeviceOps>,
    /// Context lifecycle.
    pub context: Arc<dyn ContextOps>,
    /// Queue lifecycle and submission.
    pub queue: Arc<dyn QueueOps>,
    /// Recordable command buffers.
    pub command: Arc<dyn CommandOps>,
    /// Fences, event pools, events.
    pub sync: Arc<dyn SyncOps>,
    /// Images.
    pub image: Arc<dyn ImageOps>,
    /// Program modules.
    pub module: Arc<dyn ModuleOps>,
    /// Kernels.
    pub kernel: Arc<dyn KernelOps>,
}

impl DispatchTable {
    /// Resolve every category group from a backend at the given interface
    /// version.
    ///
    /// Fails if any group resolver reports an error; partial tables never
    /// escape.
    pub fn resolve(library: &dyn BackendLibrary, version: ApiVersion) -> Result<Self> {
        Ok(DispatchTable {
            driver: library.driver_ops(version)?,
            device: library.device_ops(version)?,
            context: library.context_ops(version)?,
            queue: library.queue_ops(version)?,
            command: library.command_ops(version)?,
            sync: library.sync_ops(version)?,
            image: library.image_ops(version)?,
            module: library.module_ops(version)?,
            kernel: library.kernel_ops(version)?,
        })
    }

    /// Opaque identity of the group serving a category.
    ///
    /// Stable for the lifetime of the table; used to compare dispatch
    /// linkage without naming concrete trait objects.
    pub fn group_key(&self, category: ObjectCategory) -> usize {
        match category {
            ObjectCategory::Driver => Arc::as_ptr(&self.driver) as *const () as usize,
            ObjectCategory::Device => Arc::as_ptr(&self.device) as *const () as usize,
            ObjectCategory::Context => Arc::as_ptr(&self.context) as *const () as usize,
            ObjectCategory::CommandQueue => Arc::as_ptr(&self.queue) as *const () as usize,
            ObjectCategory::CommandBuffer => Arc::as_ptr(&self.command) as *const () as usize,
            ObjectCategory::Fence | ObjectCategory::EventPool | ObjectCategory::Event => {
                Arc::as_ptr(&self.sync) as *const () as usize
            }
            ObjectCategory::Image => Arc::as_ptr(&self.image) as *const () as usize,
            ObjectCategory::Module => Arc::as_ptr(&self.module) as *const () as usize,
            ObjectCategory::Kernel => Arc::as_ptr(&self.kernel) as *const () as usize,
        }
    }
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTable")
            .field("driver", &self.group_key(ObjectCategory::Driver))
            .field("context", &self.group_key(ObjectCategory::Context))
            .finish_non_exhaustive()
    }
}
