//! The loader context.
//!
//! [`Loader`] owns all process-wide state: discovered backend slots,
//! the composed dispatch surface, the handle registry, the optional
//! validation layer, and the teardown coordinator. Nothing lives in
//! ambient statics, so tests run as many independent loaders as they
//! like.

use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, warn};

use halo_backend::{BackendLibrary, DispatchTable};
use halo_core::{
    ApiVersion, CapabilityMask, ComponentKind, ComponentVersion, LoaderError, LoaderOptions,
    LoggingConfig, ObjectCategory, RawHandle, Result,
};
use halo_validation::{HandleArg, OpDescriptor, ValidationConfig, ValidationLayer};

use crate::compose::{BackendSlot, Composition};
use crate::discovery::{self, DiscoveryState};
use crate::registry::HandleRegistry;
use crate::teardown::TeardownCoordinator;

/// A resolved call target: the native handle, the owning backend, and
/// the table to dispatch through.
pub(crate) struct Routed {
    pub(crate) native: RawHandle,
    pub(crate) slot: Arc<BackendSlot>,
    pub(crate) table: DispatchTable,
}

/// An explicitly constructed loader instance.
///
/// Create one with [`Loader::new`] or [`Loader::from_env`], call
/// [`init_backends`](Self::init_backends) to discover and compose
/// backends, then route API calls through it. Dropping the loader (or
/// calling [`close`](Self::close)) runs the teardown sequence once.
pub struct Loader {
    options: LoaderOptions,
    validation: Option<ValidationLayer>,
    registry: HandleRegistry,
    state: Mutex<DiscoveryState>,
    composition: RwLock<Arc<Composition>>,
    teardown: TeardownCoordinator,
}

impl Loader {
    /// Create a loader from explicit options. No discovery happens
    /// until the first initialization request.
    pub fn new(options: LoaderOptions) -> Self {
        if options.debug_trace {
            // Best effort; a subscriber installed by the host wins.
            let _ = halo_core::try_init_logging(LoggingConfig::development());
        }
        let validation = options.enable_validation.then(|| {
            ValidationLayer::new(ValidationConfig {
                parameter_validation: options.parameter_validation,
                handle_lifetime: options.handle_lifetime,
            })
        });
        Self {
            options,
            validation,
            registry: HandleRegistry::new(),
            state: Mutex::new(DiscoveryState::new()),
            composition: RwLock::new(Arc::new(Composition::empty())),
            teardown: TeardownCoordinator::new(),
        }
    }

    /// Create a loader configured from `HALO_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(LoaderOptions::from_env())
    }

    /// The options this loader was built with.
    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// The validation layer, when enabled.
    pub fn validation(&self) -> Option<&ValidationLayer> {
        self.validation.as_ref()
    }

    /// Whether calls currently route through the loader indirection.
    pub fn intercept_active(&self) -> bool {
        self.snapshot().intercept
    }

    /// Monotonic composition counter; unchanged by requests that do not
    /// alter the active backend set.
    pub fn composition_epoch(&self) -> u64 {
        self.snapshot().epoch
    }

    /// Names of the backends in the current composition, in rank order.
    pub fn active_backend_names(&self) -> Vec<String> {
        self.snapshot()
            .active
            .iter()
            .map(|slot| slot.name().to_string())
            .collect()
    }

    /// Number of loader-wrapped handles currently live.
    pub fn wrapped_handle_count(&self) -> usize {
        self.registry.len()
    }

    /// Whether the loader has issued a wrap for this native handle.
    pub fn has_instance(&self, category: ObjectCategory, native: RawHandle) -> bool {
        self.registry.has_instance(category, native)
    }

    /// Add an in-process backend to the candidate set.
    ///
    /// Useful for tests and embedded backends; the slot participates in
    /// the next initialization request like any discovered library.
    pub fn register_backend(&self, library: Arc<dyn BackendLibrary>) {
        let mut state = self.state.lock().unwrap();
        discovery::append_unique(&mut state.slots, library);
        discovery::rank_slots(&mut state.slots);
    }

    /// Initialize backends using the capability mask from the options.
    pub fn init(&self) -> Result<Vec<RawHandle>> {
        self.init_backends(self.options.capabilities)
    }

    /// Discover, initialize, and compose backends matching `mask`, and
    /// return the driver handles of the resulting composition.
    ///
    /// Repeat calls are idempotent: already-initialized backends are
    /// not re-initialized, and an unchanged active set keeps the same
    /// composition. When nothing matches the request the loader stays
    /// uninitialized from the caller's point of view.
    pub fn init_backends(&self, mask: CapabilityMask) -> Result<Vec<RawHandle>> {
        mask.validate()?;
        if self.teardown.is_in_teardown() {
            return Err(LoaderError::Uninitialized);
        }

        {
            let mut state = self.state.lock().unwrap();
            self.ensure_enumerated(&mut state);

            let matching: Vec<Arc<BackendSlot>> = state
                .slots
                .iter()
                .filter(|slot| mask.matches_class(slot.class()))
                .cloned()
                .collect();

            let mut active = Vec::with_capacity(matching.len());
            for slot in matching {
                match slot.ensure_initialized(mask, ApiVersion::CURRENT) {
                    Ok(()) => active.push(slot),
                    Err(e) => warn!(
                        backend = slot.name(),
                        error = %e,
                        "backend initialization failed; excluded from composition"
                    ),
                }
            }

            if active.is_empty() {
                debug!(%mask, "no usable backend for the requested capabilities");
                return Err(LoaderError::Uninitialized);
            }
            self.recompose(active);
        }

        self.driver_handles()
    }

    fn ensure_enumerated(&self, state: &mut DiscoveryState) {
        if state.enumerated {
            return;
        }
        for library in discovery::enumerate(&self.options) {
            discovery::append_unique(&mut state.slots, library);
        }
        discovery::rank_slots(&mut state.slots);
        state.enumerated = true;
        debug!(candidates = state.slots.len(), "enumerated backend candidates");
    }

    /// Swap the composition to a new active set.
    ///
    /// Runs under the discovery lock. An unchanged set is left alone.
    /// Once any backend involved has handles out (`in_use`), the
    /// current composition stays authoritative even if it is a
    /// superset of the request: already-issued handles outrank the
    /// narrower table.
    fn recompose(&self, active: Vec<Arc<BackendSlot>>) {
        let current = self.snapshot();
        if current.same_active_set(&active) {
            return;
        }
        let pinned = current
            .active
            .iter()
            .chain(active.iter())
            .any(|slot| slot.is_in_use());
        if pinned {
            warn!("backend set change requested after handles escaped; keeping current composition");
            return;
        }
        let intercept =
            self.options.force_intercept || self.validation.is_some() || active.len() > 1;
        let next = Composition {
            epoch: current.epoch + 1,
            intercept,
            active,
        };
        debug!(
            epoch = next.epoch,
            intercept,
            backends = next.active.len(),
            "composed dispatch surface"
        );
        *self.composition.write().unwrap() = Arc::new(next);
    }

    pub(crate) fn snapshot(&self) -> Arc<Composition> {
        self.composition.read().unwrap().clone()
    }

    /// Resolve a handle to its native form, owning backend, and table.
    ///
    /// In pass-through mode the input already is the native handle and
    /// the single active backend owns it.
    pub(crate) fn route(&self, category: ObjectCategory, handle: RawHandle) -> Result<Routed> {
        let composition = self.snapshot();
        let Some(first) = composition.active.first() else {
            return Err(LoaderError::Uninitialized);
        };
        if !composition.intercept {
            let slot = first.clone();
            let table = slot.snapshot_table().ok_or(LoaderError::Uninitialized)?;
            return Ok(Routed {
                native: handle,
                slot,
                table,
            });
        }
        let entry = self
            .registry
            .resolve_as(handle, category)
            .ok_or(LoaderError::InvalidHandle)?;
        let slot = entry.slot.upgrade().ok_or(LoaderError::Uninitialized)?;
        let table = slot.snapshot_table().ok_or(LoaderError::Uninitialized)?;
        Ok(Routed {
            native: entry.native,
            slot,
            table,
        })
    }

    /// Resolve a secondary handle that must live on the same backend as
    /// an already-routed one.
    pub(crate) fn route_with(
        &self,
        anchor: &Routed,
        category: ObjectCategory,
        handle: RawHandle,
    ) -> Result<RawHandle> {
        let routed = self.route(category, handle)?;
        if !Arc::ptr_eq(&routed.slot, &anchor.slot) {
            return Err(LoaderError::InvalidArgument(format!(
                "{category} handle belongs to a different backend"
            )));
        }
        Ok(routed.native)
    }

    /// Wrap a native handle returned by a creation call and record it
    /// with the validation layer.
    ///
    /// In pass-through mode the native escapes unchanged. Wrapping any
    /// non-driver object pins the composition.
    pub(crate) fn adopt(
        &self,
        native: RawHandle,
        category: ObjectCategory,
        slot: &Arc<BackendSlot>,
        table: &DispatchTable,
        parents: &[RawHandle],
    ) -> RawHandle {
        if !self.snapshot().intercept {
            return native;
        }
        if category != ObjectCategory::Driver {
            slot.mark_in_use();
        }
        let group = table.group_key(category);
        let (handle, newly_wrapped) = self.registry.wrap(native, category, slot, group);
        if newly_wrapped {
            if let Some(validation) = &self.validation {
                validation.register_creation(handle, category, parents);
            }
        }
        handle
    }

    /// Drop a handle's wrap after the backend destroyed the object.
    ///
    /// The tracker re-runs the dependents check atomically with its
    /// eviction; a dependent registered since the prologue fails the
    /// call here.
    pub(crate) fn retire(&self, handle: RawHandle, category: ObjectCategory) -> Result<()> {
        if !self.snapshot().intercept {
            return Ok(());
        }
        if let Some(validation) = &self.validation {
            validation.finish_destroy(handle, category)?;
        }
        self.registry.release(handle);
        Ok(())
    }

    pub(crate) fn prologue(&self, op: &OpDescriptor, args: &[HandleArg<'_>]) -> Result<()> {
        match &self.validation {
            Some(validation) => validation.prologue(op, args),
            None => Ok(()),
        }
    }

    pub(crate) fn epilogue_close(&self, handle: RawHandle) -> Result<()> {
        match &self.validation {
            Some(validation) => validation.finish_close(handle),
            None => Ok(()),
        }
    }

    pub(crate) fn epilogue_reset(&self, handle: RawHandle) -> Result<()> {
        match &self.validation {
            Some(validation) => validation.finish_reset(handle),
            None => Ok(()),
        }
    }

    pub(crate) fn handle_registry(&self) -> &HandleRegistry {
        &self.registry
    }

    /// Versions of the loader, the validation layer when enabled, and
    /// every backend in the current composition.
    pub fn component_versions(&self) -> Vec<ComponentVersion> {
        let mut versions = vec![ComponentVersion {
            name: "halo-loader".to_string(),
            kind: ComponentKind::Loader,
            version: ApiVersion::CURRENT,
        }];
        if self.validation.is_some() {
            versions.push(ComponentVersion {
                name: "halo-validation".to_string(),
                kind: ComponentKind::Validation,
                version: ApiVersion::CURRENT,
            });
        }
        for slot in self.snapshot().active.iter() {
            versions.push(ComponentVersion {
                name: slot.name().to_string(),
                kind: ComponentKind::Backend,
                version: slot.library.version(),
            });
        }
        versions
    }

    /// Two-call variant of [`component_versions`](Self::component_versions):
    /// with no buffer the count is written; with a buffer up to
    /// `count.min(len)` entries are copied and the count updated to the
    /// number written.
    pub fn component_versions_into(
        &self,
        count: &mut u32,
        out: Option<&mut [ComponentVersion]>,
    ) -> Result<()> {
        let versions = self.component_versions();
        match out {
            None => {
                *count = versions.len() as u32;
                Ok(())
            }
            Some(buffer) => {
                let limit = versions.len().min(buffer.len()).min(*count as usize);
                for (dst, src) in buffer.iter_mut().zip(versions.iter().take(limit)) {
                    *dst = src.clone();
                }
                *count = limit as u32;
                Ok(())
            }
        }
    }

    /// Register a callback invoked exactly once when teardown begins.
    pub fn register_teardown_callback(&self, callback: impl FnOnce() + Send + 'static) -> u64 {
        self.teardown.register(callback)
    }

    /// Remove a teardown registration. Unknown indices are a no-op.
    pub fn unregister_teardown_callback(&self, index: u64) {
        self.teardown.unregister(index);
    }

    /// Whether teardown has begun.
    pub fn is_in_teardown(&self) -> bool {
        self.teardown.is_in_teardown()
    }

    /// Host-driven teardown notification; coalesces with the
    /// application path so callbacks still run exactly once.
    pub fn notify_host_teardown(&self) {
        self.teardown.notify_host_teardown();
    }

    /// Cheap round-trip into the first composed backend to decide
    /// whether late cross-boundary calls are still safe.
    ///
    /// A failing or panicking probe is treated as a teardown
    /// notification and latched; later probes report unstable without
    /// touching the backend again.
    pub fn check_backend_stability(&self) -> bool {
        match self.snapshot().active.first().cloned() {
            Some(slot) => self.teardown.check_stability(move || {
                let Some(table) = slot.snapshot_table() else {
                    return Ok(());
                };
                match slot.driver_handles().first().copied() {
                    Some(driver) => table.driver.api_version(driver).map(|_| ()),
                    None => Ok(()),
                }
            }),
            None => self.teardown.check_stability(|| Ok(())),
        }
    }

    /// Application-driven teardown. Safe to call more than once.
    pub fn close(&self) {
        self.teardown.teardown();
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        self.teardown.teardown();
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let composition = self.snapshot();
        f.debug_struct("Loader")
            .field("backends", &self.active_backend_names())
            .field("intercept", &composition.intercept)
            .field("epoch", &composition.epoch)
            .field("validation", &self.validation.is_some())
            .field("in_teardown", &self.is_in_teardown())
            .finish()
    }
}
