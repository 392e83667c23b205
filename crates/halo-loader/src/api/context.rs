//! Context lifecycle.

use halo_backend::ContextDesc;
use halo_core::{ObjectCategory, RawHandle, Result};
use halo_validation::{HandleArg, OpDescriptor};

use crate::loader::Loader;

static CONTEXT_CREATE: OpDescriptor = OpDescriptor::new("context_create");
static CONTEXT_STATUS: OpDescriptor = OpDescriptor::new("context_status");
static CONTEXT_DESTROY: OpDescriptor = OpDescriptor::new("context_destroy");

impl Loader {
    /// Create a context on the backend owning `driver`.
    pub fn context_create(&self, driver: RawHandle, desc: &ContextDesc) -> Result<RawHandle> {
        self.prologue(
            &CONTEXT_CREATE,
            &[HandleArg::Required(ObjectCategory::Driver, driver)],
        )?;
        let routed = self.route(ObjectCategory::Driver, driver)?;
        let native = routed.table.context.create(routed.native, desc)?;
        Ok(self.adopt(
            native,
            ObjectCategory::Context,
            &routed.slot,
            &routed.table,
            &[driver],
        ))
    }

    /// Liveness query for a context.
    pub fn context_status(&self, context: RawHandle) -> Result<()> {
        self.prologue(
            &CONTEXT_STATUS,
            &[HandleArg::Required(ObjectCategory::Context, context)],
        )?;
        let routed = self.route(ObjectCategory::Context, context)?;
        routed.table.context.status(routed.native)
    }

    /// Destroy a context with no remaining dependents.
    pub fn context_destroy(&self, context: RawHandle) -> Result<()> {
        self.prologue(
            &CONTEXT_DESTROY,
            &[HandleArg::DestroyTarget(ObjectCategory::Context, context)],
        )?;
        let routed = self.route(ObjectCategory::Context, context)?;
        routed.table.context.destroy(routed.native)?;
        self.retire(context, ObjectCategory::Context)
    }
}
