//! Backend slots and dispatch composition.
//!
//! A [`BackendSlot`] is the stable anchor for one discovered backend:
//! registry entries and translation linkage reference the slot, never a
//! particular composition, so swapping the active set does not orphan
//! handles that are already out. The [`Composition`] is an immutable
//! snapshot of the active slots plus the interception decision; the
//! loader replaces it wholesale behind an `RwLock<Arc<_>>`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tracing::debug;

use halo_backend::{BackendLibrary, DispatchTable};
use halo_core::{AcceleratorClass, ApiVersion, CapabilityMask, RawHandle, Result};

/// One discovered backend and its resolved dispatch state.
pub(crate) struct BackendSlot {
    pub(crate) library: Arc<dyn BackendLibrary>,
    /// Resolved table, present once `initialized` is set.
    table: RwLock<Option<DispatchTable>>,
    /// Native driver handles, enumerated once at initialization.
    drivers: RwLock<Vec<RawHandle>>,
    initialized: AtomicBool,
    /// Set once any non-driver object is created through this slot;
    /// pins the composition from then on.
    in_use: AtomicBool,
}

impl BackendSlot {
    pub(crate) fn new(library: Arc<dyn BackendLibrary>) -> Arc<Self> {
        Arc::new(Self {
            library,
            table: RwLock::new(None),
            drivers: RwLock::new(Vec::new()),
            initialized: AtomicBool::new(false),
            in_use: AtomicBool::new(false),
        })
    }

    pub(crate) fn name(&self) -> &str {
        self.library.name()
    }

    pub(crate) fn class(&self) -> AcceleratorClass {
        self.library.class()
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub(crate) fn is_in_use(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    pub(crate) fn mark_in_use(&self) {
        self.in_use.store(true, Ordering::Release);
    }

    /// Initialize the backend and resolve its table, once.
    ///
    /// Callers serialize through the loader's discovery lock; repeat
    /// calls on an initialized slot return without touching the
    /// backend. Driver handles are enumerated here so later fan-out
    /// reuses stable natives.
    pub(crate) fn ensure_initialized(
        &self,
        requested: CapabilityMask,
        version: ApiVersion,
    ) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }
        self.library.init(requested)?;
        let table = DispatchTable::resolve(self.library.as_ref(), version)?;
        let drivers = table.driver.driver_handles()?;
        debug!(
            backend = self.name(),
            class = %self.class(),
            drivers = drivers.len(),
            "initialized backend"
        );
        *self.drivers.write().unwrap() = drivers;
        *self.table.write().unwrap() = Some(table);
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Clone of the resolved table, if initialized.
    pub(crate) fn snapshot_table(&self) -> Option<DispatchTable> {
        self.table.read().unwrap().clone()
    }

    /// Native driver handles cached at initialization.
    pub(crate) fn driver_handles(&self) -> Vec<RawHandle> {
        self.drivers.read().unwrap().clone()
    }
}

impl std::fmt::Debug for BackendSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSlot")
            .field("name", &self.name())
            .field("class", &self.class())
            .field("initialized", &self.is_initialized())
            .field("in_use", &self.is_in_use())
            .finish()
    }
}

/// Immutable snapshot of the composed dispatch surface.
#[derive(Debug)]
pub(crate) struct Composition {
    /// Bumped on every successful recomposition.
    pub(crate) epoch: u64,
    /// Whether calls route through the loader indirection. False only
    /// in single-backend pass-through mode.
    pub(crate) intercept: bool,
    /// Initialized, capability-matching slots in rank order.
    pub(crate) active: Vec<Arc<BackendSlot>>,
}

impl Composition {
    pub(crate) fn empty() -> Self {
        Self {
            epoch: 0,
            intercept: false,
            active: Vec::new(),
        }
    }

    /// Whether `slot` is part of this composition.
    pub(crate) fn contains(&self, slot: &Arc<BackendSlot>) -> bool {
        self.active.iter().any(|active| Arc::ptr_eq(active, slot))
    }

    /// Whether the active set equals `slots`, element for element.
    pub(crate) fn same_active_set(&self, slots: &[Arc<BackendSlot>]) -> bool {
        self.active.len() == slots.len()
            && self
                .active
                .iter()
                .zip(slots)
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use halo_backend::{NullBackend, NullBackendConfig};

    #[test]
    fn test_ensure_initialized_is_idempotent() {
        let backend = NullBackend::new(NullBackendConfig::default());
        let slot = BackendSlot::new(Arc::new(backend.clone()));

        slot.ensure_initialized(CapabilityMask::ALL, ApiVersion::CURRENT)
            .unwrap();
        slot.ensure_initialized(CapabilityMask::ALL, ApiVersion::CURRENT)
            .unwrap();

        assert!(slot.is_initialized());
        assert_eq!(backend.init_calls(), 1);
        assert_eq!(slot.driver_handles().len(), 1);
    }

    #[test]
    fn test_failed_init_leaves_slot_uninitialized() {
        let backend = NullBackend::new(NullBackendConfig::default().with_failing_init());
        let slot = BackendSlot::new(Arc::new(backend));

        assert!(slot
            .ensure_initialized(CapabilityMask::ALL, ApiVersion::CURRENT)
            .is_err());
        assert!(!slot.is_initialized());
        assert!(slot.snapshot_table().is_none());
    }

    #[test]
    fn test_composition_membership() {
        let a = BackendSlot::new(Arc::new(NullBackend::new(NullBackendConfig::default())));
        let b = BackendSlot::new(Arc::new(NullBackend::new(NullBackendConfig::default())));
        let composition = Composition {
            epoch: 1,
            intercept: true,
            active: vec![a.clone()],
        };
        assert!(composition.contains(&a));
        assert!(!composition.contains(&b));
        assert!(composition.same_active_set(&[a.clone()]));
        assert!(!composition.same_active_set(&[a, b]));
    }
}
