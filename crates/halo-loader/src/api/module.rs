//! Program modules and kernels.

use halo_core::{ObjectCategory, RawHandle, Result};
use halo_validation::{HandleArg, OpDescriptor};

use crate::loader::Loader;

static MODULE_CREATE: OpDescriptor = OpDescriptor::new("module_create");
static MODULE_DESTROY: OpDescriptor = OpDescriptor::new("module_destroy");
static KERNEL_CREATE: OpDescriptor = OpDescriptor::new("kernel_create");
static KERNEL_DESTROY: OpDescriptor = OpDescriptor::new("kernel_destroy");

impl Loader {
    /// Build a module from `code` for `device` within `context`.
    pub fn module_create(
        &self,
        context: RawHandle,
        device: RawHandle,
        code: &[u8],
    ) -> Result<RawHandle> {
        self.prologue(
            &MODULE_CREATE,
            &[
                HandleArg::Required(ObjectCategory::Context, context),
                HandleArg::Required(ObjectCategory::Device, device),
            ],
        )?;
        let routed = self.route(ObjectCategory::Context, context)?;
        let native_device = self.route_with(&routed, ObjectCategory::Device, device)?;
        let native = routed
            .table
            .module
            .create(routed.native, native_device, code)?;
        Ok(self.adopt(
            native,
            ObjectCategory::Module,
            &routed.slot,
            &routed.table,
            &[context, device],
        ))
    }

    /// Destroy a module with no remaining kernels.
    pub fn module_destroy(&self, module: RawHandle) -> Result<()> {
        self.prologue(
            &MODULE_DESTROY,
            &[HandleArg::DestroyTarget(ObjectCategory::Module, module)],
        )?;
        let routed = self.route(ObjectCategory::Module, module)?;
        routed.table.module.destroy(routed.native)?;
        self.retire(module, ObjectCategory::Module)
    }

    /// Look up a kernel by name within a module.
    pub fn kernel_create(&self, module: RawHandle, name: &str) -> Result<RawHandle> {
        self.prologue(
            &KERNEL_CREATE,
            &[HandleArg::Required(ObjectCategory::Module, module)],
        )?;
        let routed = self.route(ObjectCategory::Module, module)?;
        let native = routed.table.kernel.create(routed.native, name)?;
        Ok(self.adopt(
            native,
            ObjectCategory::Kernel,
            &routed.slot,
            &routed.table,
            &[module],
        ))
    }

    /// Destroy a kernel.
    pub fn kernel_destroy(&self, kernel: RawHandle) -> Result<()> {
        self.prologue(
            &KERNEL_DESTROY,
            &[HandleArg::DestroyTarget(ObjectCategory::Kernel, kernel)],
        )?;
        let routed = self.route(ObjectCategory::Kernel, kernel)?;
        routed.table.kernel.destroy(routed.native)?;
        self.retire(kernel, ObjectCategory::Kernel)
    }
}
