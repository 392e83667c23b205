//! Property-based tests for the handle tracker.

use proptest::prelude::*;

use halo_core::{ObjectCategory, RawHandle};
use halo_validation::HandleTracker;

fn h(raw: u64) -> RawHandle {
    RawHandle::from_raw(raw)
}

/// Register `seeds.len()` handles where handle `i` may pick any earlier
/// handle as its parent, so edges always point backwards.
fn build_graph(tracker: &HandleTracker, seeds: &[u64]) {
    for (i, seed) in seeds.iter().enumerate() {
        let handle = h(i as u64 + 1);
        let pick = (*seed as usize) % (i + 1);
        if pick < i {
            tracker.register(handle, ObjectCategory::Event, &[h(pick as u64 + 1)]);
        } else {
            tracker.register(handle, ObjectCategory::Event, &[]);
        }
    }
}

proptest! {
    /// Destroying in reverse creation order always drains the graph:
    /// children are destroyed before any handle they depend on.
    #[test]
    fn prop_reverse_order_teardown_drains_graph(
        seeds in prop::collection::vec(any::<u64>(), 1..48)
    ) {
        let tracker = HandleTracker::new();
        build_graph(&tracker, &seeds);
        for i in (0..seeds.len()).rev() {
            prop_assert!(tracker.destroy(h(i as u64 + 1), ObjectCategory::Event).is_ok());
        }
        prop_assert_eq!(tracker.tracked_count(), 0);
    }

    /// A handle with dependents can never be destroyed, and the failed
    /// attempt changes nothing.
    #[test]
    fn prop_dependents_block_destroy(chain_len in 2usize..32) {
        let tracker = HandleTracker::new();
        tracker.register(h(1), ObjectCategory::Context, &[]);
        for i in 2..=chain_len as u64 {
            tracker.register(h(i), ObjectCategory::Event, &[h(i - 1)]);
        }
        for i in 1..chain_len as u64 {
            let category = if i == 1 { ObjectCategory::Context } else { ObjectCategory::Event };
            prop_assert!(tracker.destroy(h(i), category).is_err());
            prop_assert!(tracker.is_valid(h(i)));
            prop_assert_eq!(tracker.dependent_count(h(i)), 1);
        }
        prop_assert!(tracker.destroy(h(chain_len as u64), ObjectCategory::Event).is_ok());
    }

    /// Validity over a random register/destroy interleaving matches a
    /// plain set model when no handle has parents.
    #[test]
    fn prop_validity_matches_set_model(
        ops in prop::collection::vec((1u64..16, any::<bool>()), 0..128)
    ) {
        let tracker = HandleTracker::new();
        let mut model = std::collections::HashSet::new();
        for (raw, is_register) in ops {
            if is_register {
                tracker.register(h(raw), ObjectCategory::Fence, &[]);
                model.insert(raw);
            } else {
                let destroyed = tracker.destroy(h(raw), ObjectCategory::Fence).is_ok();
                prop_assert_eq!(destroyed, model.remove(&raw));
            }
            prop_assert_eq!(tracker.is_valid(h(raw)), model.contains(&raw));
        }
        prop_assert_eq!(tracker.tracked_count(), model.len());
    }

    /// The open flag always reflects the last close/reset applied.
    #[test]
    fn prop_open_state_follows_last_transition(
        transitions in prop::collection::vec(any::<bool>(), 0..64)
    ) {
        let tracker = HandleTracker::new();
        tracker.register(h(1), ObjectCategory::CommandBuffer, &[]);
        let mut open = true;
        for do_reset in transitions {
            if do_reset {
                tracker.reset(h(1)).unwrap();
                open = true;
            } else {
                tracker.close(h(1)).unwrap();
                open = false;
            }
            prop_assert_eq!(tracker.is_open(h(1)), open);
        }
    }
}
