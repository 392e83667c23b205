//! Argument validation prologues and epilogues.
//!
//! Every entry point runs the same generic routine, parameterized by a
//! per-operation descriptor and the roles of its handle arguments,
//! instead of one hand-written check function per operation.

use tracing::debug;

use halo_core::{LoaderError, ObjectCategory, RawHandle, Result};

use crate::tracker::HandleTracker;

/// Which check families run.
#[derive(Debug, Clone, Copy)]
pub struct ValidationConfig {
    /// Reject null handles in required positions.
    pub parameter_validation: bool,
    /// Reject stale handles, in-use destroys, and state-machine
    /// violations via the tracker.
    pub handle_lifetime: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            parameter_validation: true,
            handle_lifetime: true,
        }
    }
}

/// Static description of one entry point, used in log lines.
#[derive(Debug, Clone, Copy)]
pub struct OpDescriptor {
    /// Entry point name.
    pub name: &'static str,
}

impl OpDescriptor {
    /// Describe an entry point.
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }
}

/// The role a handle argument plays in one call.
#[derive(Debug, Clone, Copy)]
pub enum HandleArg<'a> {
    /// Must be non-null and valid under the category.
    Required(ObjectCategory, RawHandle),
    /// May be null; when non-null, must be valid under the category.
    Optional(ObjectCategory, RawHandle),
    /// May be empty; null elements are skipped, and scanning stops at
    /// the first invalid element.
    Array(ObjectCategory, &'a [RawHandle]),
    /// The handle this call destroys: validity plus a no-dependents
    /// precheck.
    DestroyTarget(ObjectCategory, RawHandle),
    /// A recordable handle this call appends to: must be open.
    AppendTarget(RawHandle),
    /// Recordable handles this call submits: each must be closed.
    SubmitList(&'a [RawHandle]),
}

/// Runs prologue checks before a backend call and records lifecycle
/// transitions after it.
#[derive(Debug, Default)]
pub struct ValidationLayer {
    config: ValidationConfig,
    tracker: HandleTracker,
}

impl ValidationLayer {
    /// Create a layer with the given check families enabled.
    pub fn new(config: ValidationConfig) -> Self {
        Self {
            config,
            tracker: HandleTracker::new(),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> ValidationConfig {
        self.config
    }

    /// The underlying tracker.
    pub fn tracker(&self) -> &HandleTracker {
        &self.tracker
    }

    /// Check every handle argument of `op` before the backend runs.
    ///
    /// A rejected call reports the first failure and mutates nothing.
    pub fn prologue(&self, op: &OpDescriptor, args: &[HandleArg<'_>]) -> Result<()> {
        for arg in args {
            if let Err(e) = self.check_arg(arg) {
                debug!(op = op.name, error = %e, "validation rejected call");
                return Err(e);
            }
        }
        Ok(())
    }

    fn check_arg(&self, arg: &HandleArg<'_>) -> Result<()> {
        let params = self.config.parameter_validation;
        let lifetime = self.config.handle_lifetime;
        match *arg {
            HandleArg::Required(category, handle) => {
                if handle.is_null() {
                    if params {
                        return Err(LoaderError::InvalidHandle);
                    }
                    return Ok(());
                }
                if lifetime && !self.tracker.is_valid_as(handle, category) {
                    return Err(LoaderError::InvalidHandle);
                }
                Ok(())
            }
            HandleArg::Optional(category, handle) => {
                if handle.is_null() {
                    return Ok(());
                }
                if lifetime && !self.tracker.is_valid_as(handle, category) {
                    return Err(LoaderError::InvalidHandle);
                }
                Ok(())
            }
            HandleArg::Array(category, handles) => {
                if !lifetime {
                    return Ok(());
                }
                for handle in handles {
                    if handle.is_null() {
                        continue;
                    }
                    if !self.tracker.is_valid_as(*handle, category) {
                        return Err(LoaderError::InvalidHandle);
                    }
                }
                Ok(())
            }
            HandleArg::DestroyTarget(category, handle) => {
                if handle.is_null() {
                    if params {
                        return Err(LoaderError::InvalidHandle);
                    }
                    return Ok(());
                }
                if lifetime {
                    self.tracker.check_destroy(handle, category)?;
                }
                Ok(())
            }
            HandleArg::AppendTarget(handle) => {
                if handle.is_null() {
                    if params {
                        return Err(LoaderError::InvalidHandle);
                    }
                    return Ok(());
                }
                if lifetime {
                    if !self
                        .tracker
                        .is_valid_as(handle, ObjectCategory::CommandBuffer)
                    {
                        return Err(LoaderError::InvalidHandle);
                    }
                    self.tracker.require_open(handle)?;
                }
                Ok(())
            }
            HandleArg::SubmitList(handles) => {
                if !lifetime {
                    return Ok(());
                }
                for handle in handles {
                    if handle.is_null() {
                        continue;
                    }
                    if !self
                        .tracker
                        .is_valid_as(*handle, ObjectCategory::CommandBuffer)
                    {
                        return Err(LoaderError::InvalidHandle);
                    }
                    self.tracker.require_closed(*handle)?;
                }
                Ok(())
            }
        }
    }

    /// Record a handle returned by a successful creation call.
    ///
    /// Null parents are dropped from the link list; optional parent
    /// slots arrive null when the caller omitted them.
    pub fn register_creation(
        &self,
        handle: RawHandle,
        category: ObjectCategory,
        parents: &[RawHandle],
    ) {
        if !self.config.handle_lifetime {
            return;
        }
        let linked: Vec<RawHandle> = parents
            .iter()
            .copied()
            .filter(|parent| !parent.is_null())
            .collect();
        self.tracker.register(handle, category, &linked);
    }

    /// Evict a handle after its backend destruction succeeded.
    ///
    /// The precheck repeats atomically with the eviction, so a
    /// dependent created since the prologue still fails the call.
    pub fn finish_destroy(&self, handle: RawHandle, category: ObjectCategory) -> Result<()> {
        if self.config.handle_lifetime {
            self.tracker.destroy(handle, category)
        } else {
            Ok(())
        }
    }

    /// Mark a recordable handle closed after the backend accepted it.
    pub fn finish_close(&self, handle: RawHandle) -> Result<()> {
        if self.config.handle_lifetime {
            self.tracker.close(handle)
        } else {
            Ok(())
        }
    }

    /// Mark a recordable handle open again after a backend reset.
    pub fn finish_reset(&self, handle: RawHandle) -> Result<()> {
        if self.config.handle_lifetime {
            self.tracker.reset(handle)
        } else {
            Ok(())
        }
    }
}
