//! Opaque handle and object category vocabulary.
//!
//! Every object the accelerator API exposes is represented to applications
//! as a [`RawHandle`], a 64-bit token with no visible structure. A handle is
//! either backend-native (minted by a backend library) or loader-minted
//! (wrapping a native handle; see the handle registry in `halo-loader`).
//! The distinction is invisible to applications.

use std::fmt;

use crate::error::{LoaderError, Result};

/// An opaque 64-bit object handle.
///
/// The zero value is reserved as the null handle and is never a valid
/// object.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawHandle(u64);

impl RawHandle {
    /// The null handle.
    pub const NULL: RawHandle = RawHandle(0);

    /// Construct a handle from its raw 64-bit value.
    pub const fn from_raw(raw: u64) -> Self {
        RawHandle(raw)
    }

    /// The raw 64-bit value of this handle.
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// True if this is the null handle.
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawHandle({:#x})", self.0)
    }
}

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Object categories the dispatch surface is grouped by.
///
/// Each category corresponds to one group of operations in a backend's
/// dispatch table. Fences, event pools, and events share the
/// synchronization group but remain distinct categories for handle
/// tracking and translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectCategory {
    /// Top-level backend entry object.
    Driver,
    /// Accelerator device exposed by a driver.
    Device,
    /// Execution context created under a driver.
    Context,
    /// Command queue attached to a context and device.
    CommandQueue,
    /// Recordable command buffer.
    CommandBuffer,
    /// Queue-level fence.
    Fence,
    /// Pool of synchronization events.
    EventPool,
    /// Synchronization event.
    Event,
    /// Image resource.
    Image,
    /// Compiled program module.
    Module,
    /// Kernel entry point within a module.
    Kernel,
}

impl ObjectCategory {
    /// All categories, in dispatch-group order.
    pub const ALL: [ObjectCategory; 11] = [
        ObjectCategory::Driver,
        ObjectCategory::Device,
        ObjectCategory::Context,
        ObjectCategory::CommandQueue,
        ObjectCategory::CommandBuffer,
        ObjectCategory::Fence,
        ObjectCategory::EventPool,
        ObjectCategory::Event,
        ObjectCategory::Image,
        ObjectCategory::Module,
        ObjectCategory::Kernel,
    ];

    /// Parse a raw category tag as carried across the C boundary.
    pub fn from_tag(tag: u32) -> Result<Self> {
        match tag {
            1 => Ok(ObjectCategory::Driver),
            2 => Ok(ObjectCategory::Device),
            3 => Ok(ObjectCategory::Context),
            4 => Ok(ObjectCategory::CommandQueue),
            5 => Ok(ObjectCategory::CommandBuffer),
            6 => Ok(ObjectCategory::Fence),
            7 => Ok(ObjectCategory::EventPool),
            8 => Ok(ObjectCategory::Event),
            9 => Ok(ObjectCategory::Image),
            10 => Ok(ObjectCategory::Module),
            11 => Ok(ObjectCategory::Kernel),
            other => Err(LoaderError::InvalidEnumeration(format!(
                "unknown object category tag {other}"
            ))),
        }
    }

    /// The raw tag for this category.
    pub fn tag(self) -> u32 {
        match self {
            ObjectCategory::Driver => 1,
            ObjectCategory::Device => 2,
            ObjectCategory::Context => 3,
            ObjectCategory::CommandQueue => 4,
            ObjectCategory::CommandBuffer => 5,
            ObjectCategory::Fence => 6,
            ObjectCategory::EventPool => 7,
            ObjectCategory::Event => 8,
            ObjectCategory::Image => 9,
            ObjectCategory::Module => 10,
            ObjectCategory::Kernel => 11,
        }
    }

    /// True for categories that record operations and carry open/closed
    /// state.
    pub fn is_recordable(self) -> bool {
        matches!(self, ObjectCategory::CommandBuffer)
    }
}

impl fmt::Display for ObjectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectCategory::Driver => "driver",
            ObjectCategory::Device => "device",
            ObjectCategory::Context => "context",
            ObjectCategory::CommandQueue => "command-queue",
            ObjectCategory::CommandBuffer => "command-buffer",
            ObjectCategory::Fence => "fence",
            ObjectCategory::EventPool => "event-pool",
            ObjectCategory::Event => "event",
            ObjectCategory::Image => "image",
            ObjectCategory::Module => "module",
            ObjectCategory::Kernel => "kernel",
        };
        write!(f, "{name}")
    }
}
