//! Process teardown coordination.
//!
//! Long-lived components register callbacks to be told, exactly once,
//! that the loader is going away. Two notification paths exist: the
//! application closing the loader, and the host process signalling
//! unload asynchronously. Both funnel through one `destroyed` flag so
//! only the first caller ever drains the callback map.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use tracing::{debug, info, warn};

use halo_core::Result;

type TeardownCallback = Box<dyn FnOnce() + Send>;

/// Registry of teardown callbacks plus the backend stability latch.
pub struct TeardownCoordinator {
    callbacks: Mutex<HashMap<u64, TeardownCallback>>,
    next_index: AtomicU64,
    destroyed: AtomicBool,
    probe_unstable: AtomicBool,
}

impl TeardownCoordinator {
    pub(crate) fn new() -> Self {
        Self {
            callbacks: Mutex::new(HashMap::new()),
            next_index: AtomicU64::new(0),
            destroyed: AtomicBool::new(false),
            probe_unstable: AtomicBool::new(false),
        }
    }

    /// Register a callback and return its index.
    ///
    /// Indices strictly increase and are never reused in a process
    /// lifetime. After teardown has started the callback will never
    /// run, so it is dropped rather than parked in the map.
    pub fn register(&self, callback: impl FnOnce() + Send + 'static) -> u64 {
        let index = self.next_index.fetch_add(1, Ordering::AcqRel);
        if self.is_in_teardown() {
            debug!(index, "teardown already started; dropping late callback registration");
            return index;
        }
        self.callbacks
            .lock()
            .unwrap()
            .insert(index, Box::new(callback));
        index
    }

    /// Remove a registration. Unknown indices are a no-op.
    pub fn unregister(&self, index: u64) {
        self.callbacks.lock().unwrap().remove(&index);
    }

    /// Whether teardown has begun.
    pub fn is_in_teardown(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Number of callbacks currently registered.
    pub fn registered_count(&self) -> usize {
        self.callbacks.lock().unwrap().len()
    }

    /// Run teardown: the first caller drains and invokes every
    /// registered callback; later callers return immediately.
    ///
    /// Callbacks run outside the map lock, in unspecified order, and
    /// may safely call [`unregister`](Self::unregister).
    pub fn teardown(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let drained: Vec<(u64, TeardownCallback)> =
            self.callbacks.lock().unwrap().drain().collect();
        info!(callbacks = drained.len(), "loader teardown");
        for (index, callback) in drained {
            debug!(index, "invoking teardown callback");
            callback();
        }
    }

    /// Host-driven teardown notification, coalesced with the
    /// application path by the same flag.
    pub fn notify_host_teardown(&self) {
        info!("host signalled teardown");
        self.teardown();
    }

    /// Check whether the first backend is still safely callable.
    ///
    /// `probe` should be a cheap round-trip into the backend. An error
    /// or a panic is treated as a teardown notification: the outcome is
    /// latched and the full teardown sequence runs. Once unstable,
    /// always unstable; a passing probe is not cached and may be
    /// repeated.
    pub fn check_stability(&self, probe: impl FnOnce() -> Result<()>) -> bool {
        if self.is_in_teardown() || self.probe_unstable.load(Ordering::Acquire) {
            return false;
        }
        match catch_unwind(AssertUnwindSafe(probe)) {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "backend stability probe failed; assuming teardown");
                self.latch_unstable();
                false
            }
            Err(_) => {
                warn!("backend stability probe panicked; assuming teardown");
                self.latch_unstable();
                false
            }
        }
    }

    fn latch_unstable(&self) {
        self.probe_unstable.store(true, Ordering::Release);
        self.teardown();
    }
}

impl std::fmt::Debug for TeardownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeardownCoordinator")
            .field("registered", &self.registered_count())
            .field("destroyed", &self.is_in_teardown())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_indices_strictly_increase() {
        let coordinator = TeardownCoordinator::new();
        let a = coordinator.register(|| {});
        let b = coordinator.register(|| {});
        coordinator.unregister(a);
        let c = coordinator.register(|| {});
        assert!(a < b && b < c);
    }

    #[test]
    fn test_teardown_runs_callbacks_exactly_once() {
        let coordinator = TeardownCoordinator::new();
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            coordinator.register(move || {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        coordinator.teardown();
        coordinator.teardown();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(coordinator.is_in_teardown());
        assert_eq!(coordinator.registered_count(), 0);
    }

    #[test]
    fn test_unregistered_callback_never_runs() {
        let coordinator = TeardownCoordinator::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let index = coordinator.register(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        coordinator.unregister(index);
        coordinator.teardown();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_host_path_coalesces_with_app_path() {
        let coordinator = TeardownCoordinator::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        coordinator.register(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        coordinator.notify_host_teardown();
        coordinator.teardown();
        coordinator.notify_host_teardown();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registration_after_teardown_is_dropped() {
        let coordinator = TeardownCoordinator::new();
        coordinator.teardown();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let index = coordinator.register(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(coordinator.registered_count(), 0);
        coordinator.unregister(index);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_callback_may_unregister_another() {
        let coordinator = Arc::new(TeardownCoordinator::new());
        let other = coordinator.register(|| {});
        let coordinator_clone = Arc::clone(&coordinator);
        coordinator.register(move || {
            coordinator_clone.unregister(other);
        });
        // Must not deadlock; `other` may or may not have run first.
        coordinator.teardown();
    }

    #[test]
    fn test_probe_success_keeps_loader_stable() {
        let coordinator = TeardownCoordinator::new();
        assert!(coordinator.check_stability(|| Ok(())));
        assert!(coordinator.check_stability(|| Ok(())));
        assert!(!coordinator.is_in_teardown());
    }

    #[test]
    fn test_probe_error_escalates_to_teardown() {
        let coordinator = TeardownCoordinator::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        coordinator.register(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!coordinator.check_stability(|| Err(halo_core::LoaderError::Backend(-6))));
        assert!(coordinator.is_in_teardown());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Latched: even a would-be-healthy probe reports unstable.
        assert!(!coordinator.check_stability(|| Ok(())));
    }

    #[test]
    fn test_probe_panic_is_contained_and_latches() {
        let coordinator = TeardownCoordinator::new();
        assert!(!coordinator.check_stability(|| panic!("backend gone")));
        assert!(coordinator.is_in_teardown());
        assert!(!coordinator.check_stability(|| Ok(())));
    }
}
