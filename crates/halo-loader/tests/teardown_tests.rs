//! Teardown coordination through the loader: exactly-once callback
//! delivery across application and host paths, and the stability probe
//! that latches instability as a teardown signal.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use halo_backend::{NullBackend, NullBackendConfig};
use halo_core::{AcceleratorClass, CapabilityMask, LoaderError, LoaderOptions};
use halo_loader::Loader;

fn counting_callback(counter: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
    let counter = counter.clone();
    move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

fn probed_loader() -> (Loader, NullBackend) {
    let loader = Loader::new(LoaderOptions::new());
    let backend = NullBackend::new(NullBackendConfig::for_class(AcceleratorClass::DiscreteGpu));
    loader.register_backend(Arc::new(backend.clone()));
    loader.init_backends(CapabilityMask::ALL).unwrap();
    (loader, backend)
}

// ===== Exactly-once delivery =====

#[test]
fn callbacks_run_exactly_once_across_paths() {
    let loader = Loader::new(LoaderOptions::new());
    let counter = Arc::new(AtomicUsize::new(0));
    loader.register_teardown_callback(counting_callback(&counter));
    loader.register_teardown_callback(counting_callback(&counter));
    assert!(!loader.is_in_teardown());

    loader.close();
    loader.close();
    loader.notify_host_teardown();

    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert!(loader.is_in_teardown());
}

#[test]
fn host_notification_coalesces_with_close() {
    let loader = Loader::new(LoaderOptions::new());
    let counter = Arc::new(AtomicUsize::new(0));
    loader.register_teardown_callback(counting_callback(&counter));

    loader.notify_host_teardown();
    loader.close();

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(loader.is_in_teardown());
}

#[test]
fn drop_runs_teardown() {
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let loader = Loader::new(LoaderOptions::new());
        loader.register_teardown_callback(counting_callback(&counter));
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

// ===== Registration bookkeeping =====

#[test]
fn unregister_prevents_invocation() {
    let loader = Loader::new(LoaderOptions::new());
    let kept = Arc::new(AtomicUsize::new(0));
    let removed = Arc::new(AtomicUsize::new(0));

    loader.register_teardown_callback(counting_callback(&kept));
    let index = loader.register_teardown_callback(counting_callback(&removed));
    loader.unregister_teardown_callback(index);
    // Unknown indices are a quiet no-op.
    loader.unregister_teardown_callback(index);
    loader.unregister_teardown_callback(9999);

    loader.close();
    assert_eq!(kept.load(Ordering::SeqCst), 1);
    assert_eq!(removed.load(Ordering::SeqCst), 0);
}

#[test]
fn late_registration_after_teardown_never_runs() {
    let loader = Loader::new(LoaderOptions::new());
    loader.close();

    let counter = Arc::new(AtomicUsize::new(0));
    loader.register_teardown_callback(counting_callback(&counter));
    loader.close();
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn init_after_teardown_reports_uninitialized() {
    let (loader, _backend) = probed_loader();
    loader.close();

    let err = loader.init_backends(CapabilityMask::ALL).unwrap_err();
    assert!(matches!(err, LoaderError::Uninitialized));
}

// ===== Stability probe =====

#[test]
fn healthy_probe_reports_stable() {
    let (loader, _backend) = probed_loader();
    assert!(loader.check_backend_stability());
    assert!(loader.check_backend_stability());
    assert!(!loader.is_in_teardown());
}

#[test]
fn probe_with_no_backends_is_stable() {
    let loader = Loader::new(LoaderOptions::new());
    assert!(loader.check_backend_stability());
    assert!(!loader.is_in_teardown());
}

#[test]
fn failing_probe_latches_teardown() {
    let (loader, backend) = probed_loader();
    let counter = Arc::new(AtomicUsize::new(0));
    loader.register_teardown_callback(counting_callback(&counter));

    backend.inject_failure();
    assert!(!loader.check_backend_stability());
    assert!(loader.is_in_teardown());
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    // The unstable outcome is cached; a recovered backend is not probed
    // again.
    backend.clear_failure();
    assert!(!loader.check_backend_stability());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn panicking_probe_is_contained() {
    let (loader, backend) = probed_loader();
    let counter = Arc::new(AtomicUsize::new(0));
    loader.register_teardown_callback(counting_callback(&counter));

    backend.poison_queries();
    assert!(!loader.check_backend_stability());
    assert!(loader.is_in_teardown());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(!loader.check_backend_stability());
}
