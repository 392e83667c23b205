//! Handle lifetime tracking.
//!
//! The tracker owns validity state and the dependency graph over every
//! handle the loader has issued. All mutation happens under one mutex so
//! a check-then-evict sequence can never race another thread's create
//! or destroy.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tracing::trace;

use halo_core::{LoaderError, ObjectCategory, RawHandle, Result};

#[derive(Debug)]
struct HandleRecord {
    category: ObjectCategory,
    /// `Some` only for recordable categories. New recordable handles
    /// start open.
    open: Option<bool>,
    /// Handles created with this one as a parent.
    dependents: HashSet<RawHandle>,
    /// Parents this handle was created under, kept so destruction can
    /// unlink the reverse edges.
    parents: Vec<RawHandle>,
}

#[derive(Debug, Default)]
struct TrackerState {
    records: HashMap<RawHandle, HandleRecord>,
}

/// Validity and dependency state for every live handle.
#[derive(Debug, Default)]
pub struct HandleTracker {
    state: Mutex<TrackerState>,
}

impl HandleTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly created handle and link it under its parents.
    ///
    /// Parents that are not themselves tracked are skipped rather than
    /// resurrected; that happens when lifetime tracking was enabled
    /// after the parent was created.
    pub fn register(&self, handle: RawHandle, category: ObjectCategory, parents: &[RawHandle]) {
        let mut state = self.state.lock().unwrap();
        for parent in parents {
            if let Some(record) = state.records.get_mut(parent) {
                record.dependents.insert(handle);
            }
        }
        state.records.insert(
            handle,
            HandleRecord {
                category,
                open: category.is_recordable().then_some(true),
                dependents: HashSet::new(),
                parents: parents.to_vec(),
            },
        );
        trace!(%handle, %category, parents = parents.len(), "registered handle");
    }

    /// Whether `handle` is currently tracked.
    pub fn is_valid(&self, handle: RawHandle) -> bool {
        self.state.lock().unwrap().records.contains_key(&handle)
    }

    /// Whether `handle` is currently tracked under `category`.
    ///
    /// A live handle passed where a different category is expected is
    /// just as invalid as a stale one.
    pub fn is_valid_as(&self, handle: RawHandle, category: ObjectCategory) -> bool {
        self.state
            .lock()
            .unwrap()
            .records
            .get(&handle)
            .is_some_and(|record| record.category == category)
    }

    /// Whether any live handle was created with `handle` as a parent.
    pub fn has_dependents(&self, handle: RawHandle) -> bool {
        self.state
            .lock()
            .unwrap()
            .records
            .get(&handle)
            .is_some_and(|record| !record.dependents.is_empty())
    }

    /// Number of live dependents of `handle`.
    pub fn dependent_count(&self, handle: RawHandle) -> usize {
        self.state
            .lock()
            .unwrap()
            .records
            .get(&handle)
            .map_or(0, |record| record.dependents.len())
    }

    /// Read-only destruction precheck: valid under `category` and no
    /// live dependents. Used by prologues before the backend call.
    pub fn check_destroy(&self, handle: RawHandle, category: ObjectCategory) -> Result<()> {
        let state = self.state.lock().unwrap();
        match state.records.get(&handle) {
            Some(record) if record.category == category => {
                if record.dependents.is_empty() {
                    Ok(())
                } else {
                    Err(LoaderError::ObjectInUse)
                }
            }
            _ => Err(LoaderError::InvalidHandle),
        }
    }

    /// Evict `handle` and unlink it from its parents.
    ///
    /// The precheck is repeated under the same lock as the eviction, so
    /// a dependent registered between prologue and epilogue still fails
    /// the destroy. A rejected call leaves the graph untouched.
    pub fn destroy(&self, handle: RawHandle, category: ObjectCategory) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.records.get(&handle) {
            Some(record) if record.category == category => {
                if !record.dependents.is_empty() {
                    return Err(LoaderError::ObjectInUse);
                }
            }
            _ => return Err(LoaderError::InvalidHandle),
        }
        if let Some(record) = state.records.remove(&handle) {
            for parent in &record.parents {
                if let Some(parent_record) = state.records.get_mut(parent) {
                    parent_record.dependents.remove(&handle);
                }
            }
        }
        trace!(%handle, %category, "destroyed handle");
        Ok(())
    }

    /// Move a recordable handle to the closed state.
    ///
    /// Closing an already-closed handle is accepted here; whether a
    /// repeat close succeeds is the backend's concern.
    pub fn close(&self, handle: RawHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let record = state
            .records
            .get_mut(&handle)
            .ok_or(LoaderError::InvalidHandle)?;
        match record.open {
            Some(_) => {
                record.open = Some(false);
                Ok(())
            }
            None => Err(LoaderError::InvalidArgument(format!(
                "close on non-recordable {} handle",
                record.category
            ))),
        }
    }

    /// Return a recordable handle to the open state, from either state.
    pub fn reset(&self, handle: RawHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let record = state
            .records
            .get_mut(&handle)
            .ok_or(LoaderError::InvalidHandle)?;
        match record.open {
            Some(_) => {
                record.open = Some(true);
                Ok(())
            }
            None => Err(LoaderError::InvalidArgument(format!(
                "reset on non-recordable {} handle",
                record.category
            ))),
        }
    }

    /// Whether `handle` is a recordable handle currently open.
    pub fn is_open(&self, handle: RawHandle) -> bool {
        self.state
            .lock()
            .unwrap()
            .records
            .get(&handle)
            .is_some_and(|record| record.open == Some(true))
    }

    /// Reject unless `handle` is recordable and open.
    pub fn require_open(&self, handle: RawHandle) -> Result<()> {
        let state = self.state.lock().unwrap();
        let record = state
            .records
            .get(&handle)
            .ok_or(LoaderError::InvalidHandle)?;
        match record.open {
            Some(true) => Ok(()),
            Some(false) => Err(LoaderError::InvalidArgument(
                "recordable handle is closed".to_string(),
            )),
            None => Err(LoaderError::InvalidArgument(format!(
                "{} handle is not recordable",
                record.category
            ))),
        }
    }

    /// Reject unless `handle` is recordable and closed.
    pub fn require_closed(&self, handle: RawHandle) -> Result<()> {
        let state = self.state.lock().unwrap();
        let record = state
            .records
            .get(&handle)
            .ok_or(LoaderError::InvalidHandle)?;
        match record.open {
            Some(false) => Ok(()),
            Some(true) => Err(LoaderError::InvalidArgument(
                "recordable handle is still open".to_string(),
            )),
            None => Err(LoaderError::InvalidArgument(format!(
                "{} handle is not recordable",
                record.category
            ))),
        }
    }

    /// Number of live tracked handles.
    pub fn tracked_count(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(raw: u64) -> RawHandle {
        RawHandle::from_raw(raw)
    }

    #[test]
    fn test_registered_handle_is_valid_until_destroyed() {
        let tracker = HandleTracker::new();
        tracker.register(h(1), ObjectCategory::Context, &[]);
        assert!(tracker.is_valid(h(1)));
        assert!(tracker.is_valid_as(h(1), ObjectCategory::Context));
        assert!(!tracker.is_valid_as(h(1), ObjectCategory::Device));

        tracker.destroy(h(1), ObjectCategory::Context).unwrap();
        assert!(!tracker.is_valid(h(1)));
        assert_eq!(tracker.tracked_count(), 0);
    }

    #[test]
    fn test_destroy_with_dependents_is_rejected_without_mutation() {
        let tracker = HandleTracker::new();
        tracker.register(h(1), ObjectCategory::Context, &[]);
        tracker.register(h(2), ObjectCategory::CommandQueue, &[h(1)]);

        assert!(tracker.has_dependents(h(1)));
        let err = tracker.destroy(h(1), ObjectCategory::Context).unwrap_err();
        assert!(matches!(err, LoaderError::ObjectInUse));
        assert!(tracker.is_valid(h(1)));
        assert_eq!(tracker.dependent_count(h(1)), 1);

        tracker.destroy(h(2), ObjectCategory::CommandQueue).unwrap();
        assert!(!tracker.has_dependents(h(1)));
        tracker.destroy(h(1), ObjectCategory::Context).unwrap();
    }

    #[test]
    fn test_destroy_unknown_or_mismatched_category() {
        let tracker = HandleTracker::new();
        tracker.register(h(1), ObjectCategory::Fence, &[]);
        assert!(matches!(
            tracker.destroy(h(2), ObjectCategory::Fence),
            Err(LoaderError::InvalidHandle)
        ));
        assert!(matches!(
            tracker.destroy(h(1), ObjectCategory::Event),
            Err(LoaderError::InvalidHandle)
        ));
        assert!(tracker.is_valid(h(1)));
    }

    #[test]
    fn test_recordable_state_machine() {
        let tracker = HandleTracker::new();
        tracker.register(h(5), ObjectCategory::CommandBuffer, &[]);
        assert!(tracker.is_open(h(5)));
        tracker.require_open(h(5)).unwrap();

        tracker.close(h(5)).unwrap();
        assert!(!tracker.is_open(h(5)));
        tracker.require_closed(h(5)).unwrap();
        assert!(tracker.require_open(h(5)).is_err());

        // Repeat close is accepted at this layer.
        tracker.close(h(5)).unwrap();

        tracker.reset(h(5)).unwrap();
        assert!(tracker.is_open(h(5)));
        // Reset from open is also fine.
        tracker.reset(h(5)).unwrap();
        assert!(tracker.is_open(h(5)));
    }

    #[test]
    fn test_open_state_queries_on_non_recordable() {
        let tracker = HandleTracker::new();
        tracker.register(h(7), ObjectCategory::Context, &[]);
        assert!(!tracker.is_open(h(7)));
        assert!(matches!(
            tracker.close(h(7)),
            Err(LoaderError::InvalidArgument(_))
        ));
        assert!(matches!(
            tracker.require_closed(h(7)),
            Err(LoaderError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_destroy_unlinks_parent_edges() {
        let tracker = HandleTracker::new();
        tracker.register(h(1), ObjectCategory::Context, &[]);
        tracker.register(h(2), ObjectCategory::Device, &[]);
        tracker.register(h(3), ObjectCategory::CommandBuffer, &[h(1), h(2)]);
        assert_eq!(tracker.dependent_count(h(1)), 1);
        assert_eq!(tracker.dependent_count(h(2)), 1);

        tracker.destroy(h(3), ObjectCategory::CommandBuffer).unwrap();
        assert_eq!(tracker.dependent_count(h(1)), 0);
        assert_eq!(tracker.dependent_count(h(2)), 0);
    }

    #[test]
    fn test_untracked_parent_is_skipped() {
        let tracker = HandleTracker::new();
        tracker.register(h(9), ObjectCategory::Event, &[h(1000)]);
        assert!(tracker.is_valid(h(9)));
        assert!(!tracker.is_valid(h(1000)));
        tracker.destroy(h(9), ObjectCategory::Event).unwrap();
    }
}
