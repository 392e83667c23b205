//! Command queue lifecycle and submission.

use halo_backend::QueueDesc;
use halo_core::{ObjectCategory, RawHandle, Result};
use halo_validation::{HandleArg, OpDescriptor};

use crate::loader::Loader;

static QUEUE_CREATE: OpDescriptor = OpDescriptor::new("queue_create");
static QUEUE_EXECUTE: OpDescriptor = OpDescriptor::new("queue_execute");
static QUEUE_SYNCHRONIZE: OpDescriptor = OpDescriptor::new("queue_synchronize");
static QUEUE_DESTROY: OpDescriptor = OpDescriptor::new("queue_destroy");

impl Loader {
    /// Create a queue on `device` within `context`. Both handles must
    /// belong to the same backend.
    pub fn queue_create(
        &self,
        context: RawHandle,
        device: RawHandle,
        desc: &QueueDesc,
    ) -> Result<RawHandle> {
        self.prologue(
            &QUEUE_CREATE,
            &[
                HandleArg::Required(ObjectCategory::Context, context),
                HandleArg::Required(ObjectCategory::Device, device),
            ],
        )?;
        let routed = self.route(ObjectCategory::Context, context)?;
        let native_device = self.route_with(&routed, ObjectCategory::Device, device)?;
        let native = routed
            .table
            .queue
            .create(routed.native, native_device, desc)?;
        Ok(self.adopt(
            native,
            ObjectCategory::CommandQueue,
            &routed.slot,
            &routed.table,
            &[context, device],
        ))
    }

    /// Submit closed command buffers, optionally signalling `fence`.
    ///
    /// `fence` may be null.
    pub fn queue_execute(
        &self,
        queue: RawHandle,
        buffers: &[RawHandle],
        fence: RawHandle,
    ) -> Result<()> {
        self.prologue(
            &QUEUE_EXECUTE,
            &[
                HandleArg::Required(ObjectCategory::CommandQueue, queue),
                HandleArg::SubmitList(buffers),
                HandleArg::Optional(ObjectCategory::Fence, fence),
            ],
        )?;
        let routed = self.route(ObjectCategory::CommandQueue, queue)?;
        let mut native_buffers = Vec::with_capacity(buffers.len());
        for buffer in buffers {
            if buffer.is_null() {
                native_buffers.push(RawHandle::NULL);
                continue;
            }
            native_buffers.push(self.route_with(
                &routed,
                ObjectCategory::CommandBuffer,
                *buffer,
            )?);
        }
        let native_fence = if fence.is_null() {
            RawHandle::NULL
        } else {
            self.route_with(&routed, ObjectCategory::Fence, fence)?
        };
        routed
            .table
            .queue
            .execute(routed.native, &native_buffers, native_fence)
    }

    /// Block until previously submitted work completes or the timeout
    /// elapses.
    pub fn queue_synchronize(&self, queue: RawHandle, timeout_ns: u64) -> Result<()> {
        self.prologue(
            &QUEUE_SYNCHRONIZE,
            &[HandleArg::Required(ObjectCategory::CommandQueue, queue)],
        )?;
        let routed = self.route(ObjectCategory::CommandQueue, queue)?;
        routed.table.queue.synchronize(routed.native, timeout_ns)
    }

    /// Destroy a queue with no remaining dependents.
    pub fn queue_destroy(&self, queue: RawHandle) -> Result<()> {
        self.prologue(
            &QUEUE_DESTROY,
            &[HandleArg::DestroyTarget(ObjectCategory::CommandQueue, queue)],
        )?;
        let routed = self.route(ObjectCategory::CommandQueue, queue)?;
        routed.table.queue.destroy(routed.native)?;
        self.retire(queue, ObjectCategory::CommandQueue)
    }
}
