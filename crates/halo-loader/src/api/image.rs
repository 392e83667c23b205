//! Images.

use halo_backend::ImageDesc;
use halo_core::{ObjectCategory, RawHandle, Result};
use halo_validation::{HandleArg, OpDescriptor};

use crate::loader::Loader;

static IMAGE_CREATE: OpDescriptor = OpDescriptor::new("image_create");
static IMAGE_DESTROY: OpDescriptor = OpDescriptor::new("image_destroy");

impl Loader {
    /// Create an image on `device` within `context`.
    pub fn image_create(
        &self,
        context: RawHandle,
        device: RawHandle,
        desc: &ImageDesc,
    ) -> Result<RawHandle> {
        self.prologue(
            &IMAGE_CREATE,
            &[
                HandleArg::Required(ObjectCategory::Context, context),
                HandleArg::Required(ObjectCategory::Device, device),
            ],
        )?;
        let routed = self.route(ObjectCategory::Context, context)?;
        let native_device = self.route_with(&routed, ObjectCategory::Device, device)?;
        let native = routed
            .table
            .image
            .create(routed.native, native_device, desc)?;
        Ok(self.adopt(
            native,
            ObjectCategory::Image,
            &routed.slot,
            &routed.table,
            &[context, device],
        ))
    }

    /// Destroy an image.
    pub fn image_destroy(&self, image: RawHandle) -> Result<()> {
        self.prologue(
            &IMAGE_DESTROY,
            &[HandleArg::DestroyTarget(ObjectCategory::Image, image)],
        )?;
        let routed = self.route(ObjectCategory::Image, image)?;
        routed.table.image.destroy(routed.native)?;
        self.retire(image, ObjectCategory::Image)
    }
}
