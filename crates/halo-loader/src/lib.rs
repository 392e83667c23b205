//! HALO loader: backend discovery, dispatch composition, and handle
//! routing for a multi-vendor accelerator API.
//!
//! The [`Loader`] is an explicitly constructed context — no ambient
//! globals — that discovers backend libraries, initializes the ones
//! matching a capability request, composes their dispatch tables into
//! one routing surface, and wraps every object handle so calls always
//! reach the owning backend. An optional validation layer rejects
//! stale handles, in-use destroys, and recordable-state violations
//! before they cross into a backend.
//!
//! # Example
//!
//! ```
//! use halo_core::{AcceleratorClass, CapabilityMask, LoaderOptions};
//! use halo_loader::Loader;
//!
//! let loader = Loader::new(
//!     LoaderOptions::new()
//!         .with_validation(true)
//!         .with_null_backend(vec![AcceleratorClass::DiscreteGpu]),
//! );
//! let drivers = loader.init_backends(CapabilityMask::ALL)?;
//! let devices = loader.device_handles(drivers[0])?;
//! assert!(!devices.is_empty());
//! # Ok::<(), halo_core::LoaderError>(())
//! ```

mod api;
mod compose;
mod discovery;
pub mod loader;
mod registry;
pub mod teardown;
mod translate;

pub use loader::Loader;
pub use teardown::TeardownCoordinator;

pub use halo_backend::{
    BackendLibrary, BackendManifest, CommandBufferDesc, ContextDesc, ImageDesc, NullBackend,
    NullBackendConfig, QueueDesc,
};
pub use halo_core::{
    AcceleratorClass, ApiVersion, CapabilityMask, ComponentKind, ComponentVersion, LoaderError,
    LoaderOptions, ObjectCategory, RawHandle, Result,
};
pub use halo_validation::{ValidationConfig, ValidationLayer};

/// A loader configured from `HALO_*` environment variables.
pub fn create_loader() -> Loader {
    Loader::from_env()
}

/// A loader with explicit options.
pub fn create_loader_with(options: LoaderOptions) -> Loader {
    Loader::new(options)
}
