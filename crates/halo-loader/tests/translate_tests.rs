//! Handle translation: unwrapping loader-issued handles for
//! instrumentation layers, identity for everything else, and the raw
//! pointer-convention entry point.

use std::sync::Arc;

use halo_backend::{BackendLibrary, ContextDesc, NullBackend, NullBackendConfig};
use halo_core::{
    AcceleratorClass, ApiVersion, CapabilityMask, LoaderError, LoaderOptions, ObjectCategory,
    RawHandle,
};
use halo_loader::Loader;

fn intercepting_loader() -> (Loader, NullBackend, Vec<RawHandle>) {
    let loader = Loader::new(LoaderOptions::new().with_validation(true));
    let backend = NullBackend::new(NullBackendConfig::for_class(AcceleratorClass::DiscreteGpu));
    loader.register_backend(Arc::new(backend.clone()));
    let drivers = loader.init_backends(CapabilityMask::ALL).unwrap();
    (loader, backend, drivers)
}

// ===== Unwrapping =====

#[test]
fn intercepted_handle_translates_to_native() {
    let (loader, backend, drivers) = intercepting_loader();
    let context = loader
        .context_create(drivers[0], &ContextDesc::default())
        .unwrap();

    let native = loader
        .translate(ObjectCategory::Context, context)
        .unwrap();
    assert_ne!(native, context);
    assert!(loader.has_instance(ObjectCategory::Context, native));

    // The unwrapped handle is directly usable against the backend.
    let contexts = backend.context_ops(ApiVersion::CURRENT).unwrap();
    contexts.status(native).unwrap();
}

#[test]
fn driver_handles_translate_to_native() {
    let (loader, backend, drivers) = intercepting_loader();
    let native_driver = backend
        .driver_ops(ApiVersion::CURRENT)
        .unwrap()
        .driver_handles()
        .unwrap()[0];

    let translated = loader
        .translate(ObjectCategory::Driver, drivers[0])
        .unwrap();
    assert_eq!(translated, native_driver);
}

#[test]
fn released_wrap_translates_to_itself() {
    let (loader, _backend, drivers) = intercepting_loader();
    let context = loader
        .context_create(drivers[0], &ContextDesc::default())
        .unwrap();
    loader.context_destroy(context).unwrap();

    // The wrap is gone, so the stale handle is no loader handle at all.
    let out = loader.translate(ObjectCategory::Context, context).unwrap();
    assert_eq!(out, context);
}

// ===== Identity paths =====

#[test]
fn pass_through_handles_translate_to_themselves() {
    let loader = Loader::new(LoaderOptions::new());
    let backend = NullBackend::new(NullBackendConfig::for_class(AcceleratorClass::DiscreteGpu));
    loader.register_backend(Arc::new(backend));
    let drivers = loader.init_backends(CapabilityMask::ALL).unwrap();

    let context = loader
        .context_create(drivers[0], &ContextDesc::default())
        .unwrap();
    let out = loader.translate(ObjectCategory::Context, context).unwrap();
    assert_eq!(out, context);
    let out = loader.translate(ObjectCategory::Driver, drivers[0]).unwrap();
    assert_eq!(out, drivers[0]);
}

#[test]
fn unknown_handles_translate_to_themselves() {
    let (loader, _backend, _drivers) = intercepting_loader();

    let made_up = RawHandle::from_raw(0x7777_7777);
    let out = loader.translate(ObjectCategory::Context, made_up).unwrap();
    assert_eq!(out, made_up);

    let out = loader
        .translate(ObjectCategory::Context, RawHandle::NULL)
        .unwrap();
    assert!(out.is_null());
}

#[test]
fn category_mismatch_translates_to_itself() {
    let (loader, _backend, drivers) = intercepting_loader();
    let context = loader
        .context_create(drivers[0], &ContextDesc::default())
        .unwrap();

    // A context handle is not a fence handle; no unwrap happens.
    let out = loader.translate(ObjectCategory::Fence, context).unwrap();
    assert_eq!(out, context);
}

// ===== Raw pointer convention =====

#[test]
fn translate_raw_requires_both_pointers() {
    let (loader, _backend, drivers) = intercepting_loader();
    let mut out = RawHandle::NULL;

    let err = loader
        .translate_raw(ObjectCategory::Driver.tag(), None, Some(&mut out))
        .unwrap_err();
    assert!(matches!(err, LoaderError::InvalidNullPointer));

    let err = loader
        .translate_raw(ObjectCategory::Driver.tag(), Some(&drivers[0]), None)
        .unwrap_err();
    assert!(matches!(err, LoaderError::InvalidNullPointer));
}

#[test]
fn translate_raw_rejects_unknown_category_tags() {
    let (loader, _backend, drivers) = intercepting_loader();
    let mut out = RawHandle::NULL;

    for tag in [0, 12, u32::MAX] {
        let err = loader
            .translate_raw(tag, Some(&drivers[0]), Some(&mut out))
            .unwrap_err();
        assert!(matches!(err, LoaderError::InvalidEnumeration(_)));
    }
}

#[test]
fn translate_raw_writes_the_native_handle() {
    let (loader, backend, drivers) = intercepting_loader();
    let native_driver = backend
        .driver_ops(ApiVersion::CURRENT)
        .unwrap()
        .driver_handles()
        .unwrap()[0];

    let mut out = RawHandle::NULL;
    loader
        .translate_raw(ObjectCategory::Driver.tag(), Some(&drivers[0]), Some(&mut out))
        .unwrap();
    assert_eq!(out, native_driver);
}
