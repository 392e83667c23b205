//! Driver-level entry points.

use halo_backend::{DriverProperties, ExtensionProperties};
use halo_core::{ApiVersion, LoaderError, ObjectCategory, RawHandle, Result};
use halo_validation::{HandleArg, OpDescriptor};

use crate::loader::Loader;

static DRIVER_API_VERSION: OpDescriptor = OpDescriptor::new("driver_api_version");
static DRIVER_PROPERTIES: OpDescriptor = OpDescriptor::new("driver_properties");
static DRIVER_EXTENSIONS: OpDescriptor = OpDescriptor::new("driver_extension_properties");

impl Loader {
    /// Driver handles of the current composition, one entry per backend
    /// driver, in backend rank order.
    pub fn driver_handles(&self) -> Result<Vec<RawHandle>> {
        let composition = self.snapshot();
        if composition.active.is_empty() {
            return Err(LoaderError::Uninitialized);
        }
        let mut handles = Vec::new();
        for slot in &composition.active {
            let natives = slot.driver_handles();
            if !composition.intercept {
                handles.extend(natives);
                continue;
            }
            let Some(table) = slot.snapshot_table() else {
                return Err(LoaderError::Uninitialized);
            };
            for native in natives {
                handles.push(self.adopt(native, ObjectCategory::Driver, slot, &table, &[]));
            }
        }
        Ok(handles)
    }

    /// Two-call variant of [`driver_handles`](Self::driver_handles):
    /// with no buffer the count is written; with a buffer up to
    /// `count.min(len)` handles are copied and the count updated to the
    /// number written.
    pub fn driver_handles_into(
        &self,
        count: &mut u32,
        out: Option<&mut [RawHandle]>,
    ) -> Result<()> {
        let handles = self.driver_handles()?;
        match out {
            None => {
                *count = handles.len() as u32;
                Ok(())
            }
            Some(buffer) => {
                let limit = handles.len().min(buffer.len()).min(*count as usize);
                buffer[..limit].copy_from_slice(&handles[..limit]);
                *count = limit as u32;
                Ok(())
            }
        }
    }

    /// Interface version reported by the backend owning `driver`.
    pub fn driver_api_version(&self, driver: RawHandle) -> Result<ApiVersion> {
        self.prologue(
            &DRIVER_API_VERSION,
            &[HandleArg::Required(ObjectCategory::Driver, driver)],
        )?;
        let routed = self.route(ObjectCategory::Driver, driver)?;
        routed.table.driver.api_version(routed.native)
    }

    /// Identity of the backend driver behind `driver`.
    pub fn driver_properties(&self, driver: RawHandle) -> Result<DriverProperties> {
        self.prologue(
            &DRIVER_PROPERTIES,
            &[HandleArg::Required(ObjectCategory::Driver, driver)],
        )?;
        let routed = self.route(ObjectCategory::Driver, driver)?;
        routed.table.driver.properties(routed.native)
    }

    /// Extensions the driver reports.
    pub fn driver_extension_properties(
        &self,
        driver: RawHandle,
    ) -> Result<Vec<ExtensionProperties>> {
        self.prologue(
            &DRIVER_EXTENSIONS,
            &[HandleArg::Required(ObjectCategory::Driver, driver)],
        )?;
        let routed = self.route(ObjectCategory::Driver, driver)?;
        routed.table.driver.extension_properties(routed.native)
    }

    /// Whether the driver reports an extension with exactly this name.
    pub fn driver_supports_extension(&self, driver: RawHandle, name: &str) -> Result<bool> {
        let extensions = self.driver_extension_properties(driver)?;
        Ok(extensions.iter().any(|extension| extension.name == name))
    }
}
