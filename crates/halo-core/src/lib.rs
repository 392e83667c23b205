//! Core vocabulary for the HALO accelerator loader.
//!
//! This crate defines the types every other workspace crate speaks:
//! opaque handles and object categories, accelerator classes and
//! capability masks, interface versions, the loader error taxonomy, and
//! the logging and option plumbing shared by the loader, the backend
//! contract, and the validation layer.
//!
//! Nothing in this crate talks to a backend; it is pure vocabulary.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod caps;
pub mod error;
pub mod handle;
pub mod logging;
pub mod options;
pub mod version;

pub use caps::{AcceleratorClass, CapabilityMask};
pub use error::{LoaderError, Result};
pub use handle::{ObjectCategory, RawHandle};
pub use logging::{init_default_logging, init_logging, try_init_logging, LogLevel, LoggingConfig};
pub use options::LoaderOptions;
pub use version::{
    category_table_symbol, ApiVersion, ComponentKind, ComponentVersion, BACKEND_INIT_SYMBOL,
    BACKEND_PROPERTIES_SYMBOL,
};
