//! Opaque handle registry.
//!
//! Loader-issued handles are keys into a generational arena: the low
//! half is an arena index (offset by one so zero stays the null
//! handle), the high half is the slot generation at wrap time. A stale
//! key fails the generation check instead of aliasing whatever object
//! reused the slot. A concurrent reverse index keyed on the native
//! handle gives creation paths get-or-create semantics, so backends
//! that return the same native twice map to one stable loader handle.

use std::sync::{Mutex, Weak};

use dashmap::DashMap;

use halo_core::{ObjectCategory, RawHandle};

use crate::compose::BackendSlot;

/// What the loader knows about one issued handle.
#[derive(Clone)]
pub(crate) struct RegistryEntry {
    pub(crate) native: RawHandle,
    pub(crate) category: ObjectCategory,
    /// Owning backend. Weak: the registry must not keep a retired
    /// backend alive.
    pub(crate) slot: Weak<BackendSlot>,
    /// Dispatch-group identity at wrap time, compared during
    /// translation to decide whether the handle still carries loader
    /// indirection.
    pub(crate) group: usize,
}

struct ArenaSlot {
    generation: u32,
    entry: Option<RegistryEntry>,
}

#[derive(Default)]
struct Arena {
    slots: Vec<ArenaSlot>,
    free: Vec<u32>,
}

fn pack(index: u32, generation: u32) -> RawHandle {
    RawHandle::from_raw(((generation as u64) << 32) | (index as u64 + 1))
}

fn unpack(handle: RawHandle) -> Option<(u32, u32)> {
    let raw = handle.as_raw();
    let low = (raw & 0xffff_ffff) as u32;
    if low == 0 {
        return None;
    }
    Some((low - 1, (raw >> 32) as u32))
}

/// Maps loader handles to native handles and owning backends.
#[derive(Default)]
pub(crate) struct HandleRegistry {
    arena: Mutex<Arena>,
    by_native: DashMap<(ObjectCategory, u64), u64>,
}

impl HandleRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Issue a loader handle for `native`, reusing the existing wrap if
    /// this native was seen before under the same category.
    ///
    /// Returns the handle and whether it was newly created.
    pub(crate) fn wrap(
        &self,
        native: RawHandle,
        category: ObjectCategory,
        slot: &std::sync::Arc<BackendSlot>,
        group: usize,
    ) -> (RawHandle, bool) {
        let key = (category, native.as_raw());
        let mut arena = self.arena.lock().unwrap();
        if let Some(existing) = self.by_native.get(&key) {
            let handle = RawHandle::from_raw(*existing);
            if let Some((index, generation)) = unpack(handle) {
                let live = arena
                    .slots
                    .get(index as usize)
                    .is_some_and(|s| s.generation == generation && s.entry.is_some());
                if live {
                    return (handle, false);
                }
            }
            // Stale index entry left by an out-of-band release.
            drop(existing);
            self.by_native.remove(&key);
        }

        let entry = RegistryEntry {
            native,
            category,
            slot: std::sync::Arc::downgrade(slot),
            group,
        };
        let handle = match arena.free.pop() {
            Some(index) => {
                let slot = &mut arena.slots[index as usize];
                slot.entry = Some(entry);
                pack(index, slot.generation)
            }
            None => {
                let index = arena.slots.len() as u32;
                arena.slots.push(ArenaSlot {
                    generation: 0,
                    entry: Some(entry),
                });
                pack(index, 0)
            }
        };
        self.by_native.insert(key, handle.as_raw());
        (handle, true)
    }

    /// Look up a live entry, checking the generation.
    pub(crate) fn resolve(&self, handle: RawHandle) -> Option<RegistryEntry> {
        let (index, generation) = unpack(handle)?;
        let arena = self.arena.lock().unwrap();
        let slot = arena.slots.get(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        slot.entry.clone()
    }

    /// Look up a live entry expected under `category`.
    pub(crate) fn resolve_as(
        &self,
        handle: RawHandle,
        category: ObjectCategory,
    ) -> Option<RegistryEntry> {
        self.resolve(handle).filter(|entry| entry.category == category)
    }

    /// Drop a handle's wrap and bump the slot generation so the key can
    /// never resolve again.
    pub(crate) fn release(&self, handle: RawHandle) -> Option<RegistryEntry> {
        let (index, generation) = unpack(handle)?;
        let mut arena = self.arena.lock().unwrap();
        let slot = arena.slots.get_mut(index as usize)?;
        if slot.generation != generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        arena.free.push(index);
        self.by_native
            .remove(&(entry.category, entry.native.as_raw()));
        Some(entry)
    }

    /// Whether a wrap exists for this native under `category`.
    pub(crate) fn has_instance(&self, category: ObjectCategory, native: RawHandle) -> bool {
        self.by_native.contains_key(&(category, native.as_raw()))
    }

    /// Number of live wraps.
    pub(crate) fn len(&self) -> usize {
        self.by_native.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use halo_backend::{NullBackend, NullBackendConfig};

    fn slot() -> Arc<BackendSlot> {
        BackendSlot::new(Arc::new(NullBackend::new(NullBackendConfig::default())))
    }

    fn native(raw: u64) -> RawHandle {
        RawHandle::from_raw(raw)
    }

    #[test]
    fn test_wrap_resolve_release() {
        let registry = HandleRegistry::new();
        let slot = slot();
        let (handle, new) = registry.wrap(native(0xA), ObjectCategory::Context, &slot, 7);
        assert!(new);
        assert!(!handle.is_null());

        let entry = registry.resolve(handle).unwrap();
        assert_eq!(entry.native, native(0xA));
        assert_eq!(entry.category, ObjectCategory::Context);
        assert_eq!(entry.group, 7);
        assert!(registry.has_instance(ObjectCategory::Context, native(0xA)));

        let released = registry.release(handle).unwrap();
        assert_eq!(released.native, native(0xA));
        assert!(registry.resolve(handle).is_none());
        assert!(!registry.has_instance(ObjectCategory::Context, native(0xA)));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_wrap_is_get_or_create() {
        let registry = HandleRegistry::new();
        let slot = slot();
        let (first, new_first) = registry.wrap(native(0xB), ObjectCategory::Driver, &slot, 1);
        let (second, new_second) = registry.wrap(native(0xB), ObjectCategory::Driver, &slot, 1);
        assert!(new_first);
        assert!(!new_second);
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_same_native_differs_across_categories() {
        let registry = HandleRegistry::new();
        let slot = slot();
        let (as_fence, _) = registry.wrap(native(0xC), ObjectCategory::Fence, &slot, 1);
        let (as_event, _) = registry.wrap(native(0xC), ObjectCategory::Event, &slot, 1);
        assert_ne!(as_fence, as_event);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_stale_generation_does_not_resolve() {
        let registry = HandleRegistry::new();
        let slot = slot();
        let (stale, _) = registry.wrap(native(0xD), ObjectCategory::Event, &slot, 1);
        registry.release(stale).unwrap();

        // The freed index is reused; the old key must not alias the
        // new occupant.
        let (fresh, new) = registry.wrap(native(0xE), ObjectCategory::Event, &slot, 1);
        assert!(new);
        assert_ne!(stale, fresh);
        assert!(registry.resolve(stale).is_none());
        assert_eq!(registry.resolve(fresh).unwrap().native, native(0xE));
        assert!(registry.release(stale).is_none());
    }

    #[test]
    fn test_resolve_as_checks_category() {
        let registry = HandleRegistry::new();
        let slot = slot();
        let (handle, _) = registry.wrap(native(0xF), ObjectCategory::Image, &slot, 1);
        assert!(registry.resolve_as(handle, ObjectCategory::Image).is_some());
        assert!(registry.resolve_as(handle, ObjectCategory::Module).is_none());
    }

    #[test]
    fn test_null_and_garbage_handles_do_not_resolve() {
        let registry = HandleRegistry::new();
        assert!(registry.resolve(RawHandle::NULL).is_none());
        assert!(registry.resolve(native(u64::MAX)).is_none());
        assert!(registry.release(RawHandle::NULL).is_none());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Wrapped handles resolve to their native until released,
            /// and every released key is dead forever after, across an
            /// arbitrary interleaving that reuses arena slots.
            #[test]
            fn prop_generation_check_survives_reuse(
                ops in prop::collection::vec((1u64..64, any::<bool>()), 1..200)
            ) {
                let registry = HandleRegistry::new();
                let slot = slot();
                let mut live: std::collections::HashMap<u64, RawHandle> = Default::default();
                let mut dead: Vec<RawHandle> = Vec::new();

                for (raw, is_wrap) in ops {
                    if is_wrap {
                        let (handle, new) =
                            registry.wrap(native(raw), ObjectCategory::Event, &slot, 1);
                        prop_assert_eq!(new, !live.contains_key(&raw));
                        live.insert(raw, handle);
                    } else if let Some(handle) = live.remove(&raw) {
                        prop_assert!(registry.release(handle).is_some());
                        dead.push(handle);
                    }

                    for (raw, handle) in &live {
                        prop_assert_eq!(
                            registry.resolve(*handle).map(|e| e.native),
                            Some(native(*raw))
                        );
                    }
                    for handle in &dead {
                        prop_assert!(registry.resolve(*handle).is_none());
                    }
                }
                prop_assert_eq!(registry.len(), live.len());
            }
        }
    }
}
