//! Backend enumeration.
//!
//! Candidates come from four sources, in order: the built-in
//! well-known library names, explicitly configured paths, the backend
//! manifest, and the in-process null backends when enabled. A source
//! that fails to produce a backend is skipped with a log line; it never
//! aborts enumeration.

use std::sync::Arc;

use tracing::{debug, warn};

use halo_backend::{BackendLibrary, BackendManifest, DynamicBackend, NullBackend, NullBackendConfig};
use halo_core::{AcceleratorClass, LoaderOptions};

use crate::compose::BackendSlot;

/// Library names probed on the system search path.
pub(crate) const KNOWN_BACKEND_LIBRARIES: &[(&str, AcceleratorClass)] = &[
    ("libhalo_backend_dgpu.so", AcceleratorClass::DiscreteGpu),
    ("libhalo_backend_igpu.so", AcceleratorClass::IntegratedGpu),
    ("libhalo_backend_npu.so", AcceleratorClass::Npu),
];

/// Slots discovered so far plus whether enumeration has run.
///
/// Guarded by the loader's discovery mutex; enumeration happens once
/// per loader, initialization per capability request.
pub(crate) struct DiscoveryState {
    pub(crate) slots: Vec<Arc<BackendSlot>>,
    pub(crate) enumerated: bool,
}

impl DiscoveryState {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            enumerated: false,
        }
    }
}

/// Enumerate every configured backend candidate.
pub(crate) fn enumerate(options: &LoaderOptions) -> Vec<Arc<dyn BackendLibrary>> {
    let mut libraries: Vec<Arc<dyn BackendLibrary>> = Vec::new();

    for (name, expected_class) in KNOWN_BACKEND_LIBRARIES {
        match DynamicBackend::load(*name) {
            Ok(backend) => {
                if backend.class() != *expected_class {
                    warn!(
                        library = name,
                        expected = %expected_class,
                        reported = %backend.class(),
                        "well-known backend reports a different class; trusting the library"
                    );
                }
                libraries.push(Arc::new(backend));
            }
            Err(e) => debug!(library = name, error = %e, "well-known backend not present"),
        }
    }

    for path in &options.backend_paths {
        match DynamicBackend::load(path.clone()) {
            Ok(backend) => libraries.push(Arc::new(backend)),
            Err(e) => warn!(path = %path.display(), error = %e, "configured backend failed to load; skipping"),
        }
    }

    if let Some(manifest_path) = &options.manifest_path {
        match BackendManifest::load(manifest_path) {
            Ok(manifest) => {
                for entry in manifest.enabled() {
                    match DynamicBackend::load(&entry.path) {
                        Ok(backend) => {
                            if backend.class() != entry.class {
                                warn!(
                                    backend = entry.name.as_str(),
                                    declared = %entry.class,
                                    reported = %backend.class(),
                                    "manifest class disagrees with the library; trusting the library"
                                );
                            }
                            libraries.push(Arc::new(backend));
                        }
                        Err(e) => warn!(
                            backend = entry.name.as_str(),
                            error = %e,
                            "manifest backend failed to load; skipping"
                        ),
                    }
                }
            }
            Err(e) => warn!(error = %e, "backend manifest unusable; continuing without it"),
        }
    }

    if options.enable_null_backend {
        for class in &options.null_backend_classes {
            libraries.push(Arc::new(NullBackend::new(NullBackendConfig::for_class(*class))));
        }
    }

    libraries
}

/// Append a slot for `library` unless one with the same name exists.
pub(crate) fn append_unique(slots: &mut Vec<Arc<BackendSlot>>, library: Arc<dyn BackendLibrary>) {
    if slots.iter().any(|slot| slot.name() == library.name()) {
        warn!(backend = library.name(), "duplicate backend name; keeping the first");
        return;
    }
    slots.push(BackendSlot::new(library));
}

/// Order slots by accelerator class rank, keeping source order within a
/// class: discrete GPU, integrated GPU, NPU, other.
pub(crate) fn rank_slots(slots: &mut [Arc<BackendSlot>]) {
    slots.sort_by_key(|slot| slot.class());
}
