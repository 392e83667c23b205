//! Interface and component version vocabulary.

use std::fmt;

use crate::handle::ObjectCategory;

/// A packed major.minor interface version.
///
/// Matches the wire encoding used across the backend boundary: major in
/// the upper 16 bits, minor in the lower 16.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion(u32);

impl ApiVersion {
    /// The interface version this loader implements.
    pub const CURRENT: ApiVersion = ApiVersion::new(1, 2);

    /// Build a version from major and minor parts.
    pub const fn new(major: u16, minor: u16) -> Self {
        ApiVersion(((major as u32) << 16) | minor as u32)
    }

    /// Decode a packed version value.
    pub const fn from_raw(raw: u32) -> Self {
        ApiVersion(raw)
    }

    /// The packed wire value.
    pub const fn as_raw(self) -> u32 {
        self.0
    }

    /// Major component.
    pub const fn major(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Minor component.
    pub const fn minor(self) -> u16 {
        self.0 as u16
    }

    /// True if a provider at version `self` can serve a caller requesting
    /// `requested`: same major, and at least the requested minor.
    pub const fn satisfies(self, requested: ApiVersion) -> bool {
        self.major() == requested.major() && self.minor() >= requested.minor()
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

/// The kind of component a version entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// The loader itself.
    Loader,
    /// The validation layer.
    Validation,
    /// An initialized backend library.
    Backend,
}

/// A versioned component visible through version reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentVersion {
    /// Component name as reported to applications.
    pub name: String,
    /// What the component is.
    pub kind: ComponentKind,
    /// The interface version the component implements.
    pub version: ApiVersion,
}

/// Fixed symbol name of a backend's initialization entry point.
pub const BACKEND_INIT_SYMBOL: &str = "halo_backend_init";

/// Fixed symbol name of a backend's properties query.
pub const BACKEND_PROPERTIES_SYMBOL: &str = "halo_backend_properties";

/// The fixed symbol name resolving one category's dispatch table.
pub fn category_table_symbol(category: ObjectCategory) -> &'static str {
    match category {
        ObjectCategory::Driver => "halo_driver_table",
        ObjectCategory::Device => "halo_device_table",
        ObjectCategory::Context => "halo_context_table",
        ObjectCategory::CommandQueue => "halo_queue_table",
        ObjectCategory::CommandBuffer => "halo_command_table",
        ObjectCategory::Fence | ObjectCategory::EventPool | ObjectCategory::Event => {
            "halo_sync_table"
        }
        ObjectCategory::Image => "halo_image_table",
        ObjectCategory::Module => "halo_module_table",
        ObjectCategory::Kernel => "halo_kernel_table",
    }
}
