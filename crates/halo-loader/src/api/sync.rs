//! Fences, event pools, and events.

use halo_core::{ObjectCategory, RawHandle, Result};
use halo_validation::{HandleArg, OpDescriptor};

use crate::loader::Loader;

static FENCE_CREATE: OpDescriptor = OpDescriptor::new("fence_create");
static FENCE_DESTROY: OpDescriptor = OpDescriptor::new("fence_destroy");
static EVENT_POOL_CREATE: OpDescriptor = OpDescriptor::new("event_pool_create");
static EVENT_CREATE: OpDescriptor = OpDescriptor::new("event_create");
static EVENT_DESTROY: OpDescriptor = OpDescriptor::new("event_destroy");
static EVENT_POOL_DESTROY: OpDescriptor = OpDescriptor::new("event_pool_destroy");

impl Loader {
    /// Create a fence bound to `queue`.
    pub fn fence_create(&self, queue: RawHandle) -> Result<RawHandle> {
        self.prologue(
            &FENCE_CREATE,
            &[HandleArg::Required(ObjectCategory::CommandQueue, queue)],
        )?;
        let routed = self.route(ObjectCategory::CommandQueue, queue)?;
        let native = routed.table.sync.fence_create(routed.native)?;
        Ok(self.adopt(
            native,
            ObjectCategory::Fence,
            &routed.slot,
            &routed.table,
            &[queue],
        ))
    }

    /// Destroy a fence.
    pub fn fence_destroy(&self, fence: RawHandle) -> Result<()> {
        self.prologue(
            &FENCE_DESTROY,
            &[HandleArg::DestroyTarget(ObjectCategory::Fence, fence)],
        )?;
        let routed = self.route(ObjectCategory::Fence, fence)?;
        routed.table.sync.fence_destroy(routed.native)?;
        self.retire(fence, ObjectCategory::Fence)
    }

    /// Create an event pool visible to `devices` within `context`.
    ///
    /// An empty device list means all devices of the owning backend.
    pub fn event_pool_create(
        &self,
        context: RawHandle,
        devices: &[RawHandle],
        capacity: u32,
    ) -> Result<RawHandle> {
        self.prologue(
            &EVENT_POOL_CREATE,
            &[
                HandleArg::Required(ObjectCategory::Context, context),
                HandleArg::Array(ObjectCategory::Device, devices),
            ],
        )?;
        let routed = self.route(ObjectCategory::Context, context)?;
        let mut native_devices = Vec::with_capacity(devices.len());
        for device in devices {
            if device.is_null() {
                native_devices.push(RawHandle::NULL);
                continue;
            }
            native_devices.push(self.route_with(&routed, ObjectCategory::Device, *device)?);
        }
        let native = routed
            .table
            .sync
            .event_pool_create(routed.native, &native_devices, capacity)?;
        let mut parents = vec![context];
        parents.extend_from_slice(devices);
        Ok(self.adopt(
            native,
            ObjectCategory::EventPool,
            &routed.slot,
            &routed.table,
            &parents,
        ))
    }

    /// Create an event at `index` within a pool.
    pub fn event_create(&self, pool: RawHandle, index: u32) -> Result<RawHandle> {
        self.prologue(
            &EVENT_CREATE,
            &[HandleArg::Required(ObjectCategory::EventPool, pool)],
        )?;
        let routed = self.route(ObjectCategory::EventPool, pool)?;
        let native = routed.table.sync.event_create(routed.native, index)?;
        Ok(self.adopt(
            native,
            ObjectCategory::Event,
            &routed.slot,
            &routed.table,
            &[pool],
        ))
    }

    /// Destroy an event.
    pub fn event_destroy(&self, event: RawHandle) -> Result<()> {
        self.prologue(
            &EVENT_DESTROY,
            &[HandleArg::DestroyTarget(ObjectCategory::Event, event)],
        )?;
        let routed = self.route(ObjectCategory::Event, event)?;
        routed.table.sync.event_destroy(routed.native)?;
        self.retire(event, ObjectCategory::Event)
    }

    /// Destroy an event pool with no remaining events.
    pub fn event_pool_destroy(&self, pool: RawHandle) -> Result<()> {
        self.prologue(
            &EVENT_POOL_DESTROY,
            &[HandleArg::DestroyTarget(ObjectCategory::EventPool, pool)],
        )?;
        let routed = self.route(ObjectCategory::EventPool, pool)?;
        routed.table.sync.event_pool_destroy(routed.native)?;
        self.retire(pool, ObjectCategory::EventPool)
    }
}
