//! Handle translation.
//!
//! Instrumentation layers that sit underneath the loader need the
//! native backend handle below a loader-issued one. Whether a given
//! handle carries loader indirection is a per-handle question, not a
//! process-wide one: handles of the same category may have been created
//! while interception was on or off at different times. The witness is
//! the dispatch-group identity captured at wrap time: if it still
//! matches the owning backend's current group for that category, the
//! handle is loader-issued and unwraps; anything else passes through
//! unchanged.

use halo_core::{LoaderError, ObjectCategory, RawHandle, Result};

use crate::loader::Loader;

impl Loader {
    /// Return the native handle underneath `handle`, or `handle`
    /// itself when it does not carry loader indirection.
    ///
    /// Never fails on unrecognized handles; a handle the loader did not
    /// issue is already native by definition.
    pub fn translate(&self, category: ObjectCategory, handle: RawHandle) -> Result<RawHandle> {
        if !self.snapshot().intercept {
            return Ok(handle);
        }
        let Some(entry) = self.handle_registry().resolve_as(handle, category) else {
            return Ok(handle);
        };
        let Some(slot) = entry.slot.upgrade() else {
            // Owning backend retired; the stored native is all there is.
            return Ok(entry.native);
        };
        let current_group = slot
            .snapshot_table()
            .map(|table| table.group_key(category));
        if current_group == Some(entry.group) {
            Ok(entry.native)
        } else {
            // Dispatch linkage was rebuilt since this wrap; the handle
            // no longer points at the loader's indirection.
            Ok(handle)
        }
    }

    /// Pointer-convention variant of [`translate`](Self::translate),
    /// matching the external interface: both slots must be present and
    /// the category arrives as a raw tag.
    pub fn translate_raw(
        &self,
        tag: u32,
        input: Option<&RawHandle>,
        output: Option<&mut RawHandle>,
    ) -> Result<()> {
        let input = input.ok_or(LoaderError::InvalidNullPointer)?;
        let output = output.ok_or(LoaderError::InvalidNullPointer)?;
        let category = ObjectCategory::from_tag(tag)?;
        *output = self.translate(category, *input)?;
        Ok(())
    }
}
