//! Device enumeration and queries.

use halo_backend::DeviceProperties;
use halo_core::{ObjectCategory, RawHandle, Result};
use halo_validation::{HandleArg, OpDescriptor};

use crate::loader::Loader;

static DEVICE_HANDLES: OpDescriptor = OpDescriptor::new("device_handles");
static DEVICE_PROPERTIES: OpDescriptor = OpDescriptor::new("device_properties");

impl Loader {
    /// Devices exposed under one driver.
    pub fn device_handles(&self, driver: RawHandle) -> Result<Vec<RawHandle>> {
        self.prologue(
            &DEVICE_HANDLES,
            &[HandleArg::Required(ObjectCategory::Driver, driver)],
        )?;
        let routed = self.route(ObjectCategory::Driver, driver)?;
        let natives = routed.table.device.device_handles(routed.native)?;
        Ok(natives
            .into_iter()
            .map(|native| {
                self.adopt(
                    native,
                    ObjectCategory::Device,
                    &routed.slot,
                    &routed.table,
                    &[driver],
                )
            })
            .collect())
    }

    /// Properties of one device.
    pub fn device_properties(&self, device: RawHandle) -> Result<DeviceProperties> {
        self.prologue(
            &DEVICE_PROPERTIES,
            &[HandleArg::Required(ObjectCategory::Device, device)],
        )?;
        let routed = self.route(ObjectCategory::Device, device)?;
        routed.table.device.properties(routed.native)
    }
}
