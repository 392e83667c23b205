//! Backend loading and dispatch for the HALO loader.
//!
//! This crate turns accelerator backends into uniform dispatch tables:
//!
//! - [`BackendLibrary`] is the seam every backend implements, whether it
//!   lives in a shared library or in process.
//! - [`DynamicBackend`] loads shared libraries and adapts their raw C
//!   tables onto the ops traits in [`ops`].
//! - [`NullBackend`] fulfils the whole surface in process, with fault
//!   injection for failure-path tests.
//! - [`DispatchTable`] is the composed result the loader routes through.
//!
//! # Example
//!
//! ```
//! use halo_backend::{BackendLibrary, DispatchTable, NullBackend, NullBackendConfig};
//! use halo_core::{ApiVersion, CapabilityMask};
//!
//! let backend = NullBackend::new(NullBackendConfig::default());
//! backend.init(CapabilityMask::ALL)?;
//! let table = DispatchTable::resolve(&backend, ApiVersion::CURRENT)?;
//! let drivers = table.driver.driver_handles()?;
//! assert_eq!(drivers.len(), 1);
//! # Ok::<(), halo_core::LoaderError>(())
//! ```

pub mod abi;
pub mod dynamic;
pub mod library;
pub mod manifest;
pub mod null;
pub mod ops;
pub mod table;

pub use dynamic::DynamicBackend;
pub use library::BackendLibrary;
pub use manifest::{BackendManifest, ManifestEntry};
pub use null::{NullBackend, NullBackendConfig, INIT_FAILURE_CODE, INJECTED_FAILURE_CODE};
pub use ops::{
    CommandBufferDesc, CommandOps, ContextDesc, ContextOps, DeviceOps, DeviceProperties,
    DriverOps, DriverProperties, ExtensionProperties, ImageDesc, ImageOps, KernelOps, ModuleOps,
    QueueDesc, QueueOps, SyncOps,
};
pub use table::DispatchTable;
