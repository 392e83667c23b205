//! Recordable command buffers.

use halo_backend::CommandBufferDesc;
use halo_core::{ObjectCategory, RawHandle, Result};
use halo_validation::{HandleArg, OpDescriptor};

use crate::loader::Loader;

static COMMAND_CREATE: OpDescriptor = OpDescriptor::new("command_buffer_create");
static COMMAND_APPEND_BARRIER: OpDescriptor = OpDescriptor::new("command_buffer_append_barrier");
static COMMAND_CLOSE: OpDescriptor = OpDescriptor::new("command_buffer_close");
static COMMAND_RESET: OpDescriptor = OpDescriptor::new("command_buffer_reset");
static COMMAND_DESTROY: OpDescriptor = OpDescriptor::new("command_buffer_destroy");

impl Loader {
    /// Create a command buffer, open for recording.
    pub fn command_buffer_create(
        &self,
        context: RawHandle,
        device: RawHandle,
        desc: &CommandBufferDesc,
    ) -> Result<RawHandle> {
        self.prologue(
            &COMMAND_CREATE,
            &[
                HandleArg::Required(ObjectCategory::Context, context),
                HandleArg::Required(ObjectCategory::Device, device),
            ],
        )?;
        let routed = self.route(ObjectCategory::Context, context)?;
        let native_device = self.route_with(&routed, ObjectCategory::Device, device)?;
        let native = routed
            .table
            .command
            .create(routed.native, native_device, desc)?;
        Ok(self.adopt(
            native,
            ObjectCategory::CommandBuffer,
            &routed.slot,
            &routed.table,
            &[context, device],
        ))
    }

    /// Record a barrier into an open buffer.
    ///
    /// `signal` may be null; `wait` may be empty.
    pub fn command_buffer_append_barrier(
        &self,
        buffer: RawHandle,
        signal: RawHandle,
        wait: &[RawHandle],
    ) -> Result<()> {
        self.prologue(
            &COMMAND_APPEND_BARRIER,
            &[
                HandleArg::AppendTarget(buffer),
                HandleArg::Optional(ObjectCategory::Event, signal),
                HandleArg::Array(ObjectCategory::Event, wait),
            ],
        )?;
        let routed = self.route(ObjectCategory::CommandBuffer, buffer)?;
        let native_signal = if signal.is_null() {
            RawHandle::NULL
        } else {
            self.route_with(&routed, ObjectCategory::Event, signal)?
        };
        let mut native_wait = Vec::with_capacity(wait.len());
        for event in wait {
            if event.is_null() {
                native_wait.push(RawHandle::NULL);
                continue;
            }
            native_wait.push(self.route_with(&routed, ObjectCategory::Event, *event)?);
        }
        routed
            .table
            .command
            .append_barrier(routed.native, native_signal, &native_wait)
    }

    /// Finish recording; the buffer becomes submittable.
    pub fn command_buffer_close(&self, buffer: RawHandle) -> Result<()> {
        self.prologue(
            &COMMAND_CLOSE,
            &[HandleArg::Required(ObjectCategory::CommandBuffer, buffer)],
        )?;
        let routed = self.route(ObjectCategory::CommandBuffer, buffer)?;
        routed.table.command.close(routed.native)?;
        self.epilogue_close(buffer)
    }

    /// Return the buffer to the open state for re-recording.
    pub fn command_buffer_reset(&self, buffer: RawHandle) -> Result<()> {
        self.prologue(
            &COMMAND_RESET,
            &[HandleArg::Required(ObjectCategory::CommandBuffer, buffer)],
        )?;
        let routed = self.route(ObjectCategory::CommandBuffer, buffer)?;
        routed.table.command.reset(routed.native)?;
        self.epilogue_reset(buffer)
    }

    /// Destroy a command buffer with no remaining dependents.
    pub fn command_buffer_destroy(&self, buffer: RawHandle) -> Result<()> {
        self.prologue(
            &COMMAND_DESTROY,
            &[HandleArg::DestroyTarget(ObjectCategory::CommandBuffer, buffer)],
        )?;
        let routed = self.route(ObjectCategory::CommandBuffer, buffer)?;
        routed.table.command.destroy(routed.native)?;
        self.retire(buffer, ObjectCategory::CommandBuffer)
    }
}
