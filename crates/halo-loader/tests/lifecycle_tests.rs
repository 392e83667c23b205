//! End-to-end object lifecycle through the loader: creation chains,
//! dependency-ordered destruction, recordable state gating, and the
//! pass-through mode where no wrapping happens at all.

use std::sync::Arc;

use halo_backend::{
    BackendLibrary, CommandBufferDesc, ContextDesc, ImageDesc, NullBackend, NullBackendConfig,
    QueueDesc, INJECTED_FAILURE_CODE,
};
use halo_core::{
    AcceleratorClass, ApiVersion, CapabilityMask, ComponentKind, LoaderError, LoaderOptions,
    ObjectCategory, RawHandle,
};
use halo_loader::Loader;

fn validated_loader() -> (Loader, NullBackend, Vec<RawHandle>) {
    let loader = Loader::new(LoaderOptions::new().with_validation(true));
    let backend = NullBackend::new(NullBackendConfig::for_class(AcceleratorClass::DiscreteGpu));
    loader.register_backend(Arc::new(backend.clone()));
    let drivers = loader.init_backends(CapabilityMask::ALL).unwrap();
    (loader, backend, drivers)
}

// ===== Creation and destruction chains =====

#[test]
fn full_object_chain_lifecycle() {
    let (loader, backend, drivers) = validated_loader();
    assert!(loader.intercept_active());
    assert_eq!(drivers.len(), 1);

    let devices = loader.device_handles(drivers[0]).unwrap();
    let device = devices[0];

    let context = loader
        .context_create(drivers[0], &ContextDesc::default())
        .unwrap();
    let queue = loader
        .queue_create(context, device, &QueueDesc::default())
        .unwrap();
    let buffer = loader
        .command_buffer_create(context, device, &CommandBufferDesc::default())
        .unwrap();
    let pool = loader.event_pool_create(context, &[device], 4).unwrap();
    let event = loader.event_create(pool, 0).unwrap();
    let fence = loader.fence_create(queue).unwrap();
    let image = loader
        .image_create(context, device, &ImageDesc::default())
        .unwrap();
    let module = loader
        .module_create(context, device, b"\x7fHALO-IR")
        .unwrap();
    let kernel = loader.kernel_create(module, "gemm_tiled").unwrap();

    assert_eq!(backend.live_objects(), 9);

    loader
        .command_buffer_append_barrier(buffer, event, &[RawHandle::NULL, event])
        .unwrap();
    loader.command_buffer_close(buffer).unwrap();
    loader.queue_execute(queue, &[buffer], fence).unwrap();
    loader.queue_synchronize(queue, 1_000_000).unwrap();

    loader.kernel_destroy(kernel).unwrap();
    loader.module_destroy(module).unwrap();
    loader.image_destroy(image).unwrap();
    loader.fence_destroy(fence).unwrap();
    loader.event_destroy(event).unwrap();
    loader.event_pool_destroy(pool).unwrap();
    loader.command_buffer_destroy(buffer).unwrap();
    loader.queue_destroy(queue).unwrap();
    loader.context_destroy(context).unwrap();

    assert_eq!(backend.live_objects(), 0);
    // Driver and device wraps survive; they have no destroy operation.
    assert_eq!(loader.wrapped_handle_count(), 1 + devices.len());
}

#[test]
fn destroy_with_live_dependents_is_rejected() {
    let (loader, backend, drivers) = validated_loader();
    let device = loader.device_handles(drivers[0]).unwrap()[0];

    let context = loader
        .context_create(drivers[0], &ContextDesc::default())
        .unwrap();
    let queue = loader
        .queue_create(context, device, &QueueDesc::default())
        .unwrap();

    let err = loader.context_destroy(context).unwrap_err();
    assert!(matches!(err, LoaderError::ObjectInUse));
    // The rejection happens before the backend sees the call.
    assert_eq!(backend.live_objects(), 2);
    loader.context_status(context).unwrap();

    loader.queue_destroy(queue).unwrap();
    loader.context_destroy(context).unwrap();
    assert_eq!(backend.live_objects(), 0);
}

#[test]
fn stale_and_fabricated_handles_are_rejected() {
    let (loader, _backend, drivers) = validated_loader();

    let context = loader
        .context_create(drivers[0], &ContextDesc::default())
        .unwrap();
    loader.context_destroy(context).unwrap();

    let err = loader.context_status(context).unwrap_err();
    assert!(matches!(err, LoaderError::InvalidHandle));

    let err = loader
        .context_status(RawHandle::from_raw(0xdead_beef))
        .unwrap_err();
    assert!(matches!(err, LoaderError::InvalidHandle));

    let err = loader.context_status(RawHandle::NULL).unwrap_err();
    assert!(matches!(err, LoaderError::InvalidHandle));
}

// ===== Recordable state gating =====

#[test]
fn submission_requires_closed_buffer() {
    let (loader, _backend, drivers) = validated_loader();
    let device = loader.device_handles(drivers[0]).unwrap()[0];
    let context = loader
        .context_create(drivers[0], &ContextDesc::default())
        .unwrap();
    let queue = loader
        .queue_create(context, device, &QueueDesc::default())
        .unwrap();
    let buffer = loader
        .command_buffer_create(context, device, &CommandBufferDesc::default())
        .unwrap();

    // Open buffers record but do not submit.
    loader
        .command_buffer_append_barrier(buffer, RawHandle::NULL, &[])
        .unwrap();
    let err = loader
        .queue_execute(queue, &[buffer], RawHandle::NULL)
        .unwrap_err();
    assert!(matches!(err, LoaderError::InvalidArgument(_)));

    loader.command_buffer_close(buffer).unwrap();
    loader
        .queue_execute(queue, &[buffer], RawHandle::NULL)
        .unwrap();

    // Closed buffers submit but do not record.
    let err = loader
        .command_buffer_append_barrier(buffer, RawHandle::NULL, &[])
        .unwrap_err();
    assert!(matches!(err, LoaderError::InvalidArgument(_)));

    // Repeat close is accepted at this layer.
    loader.command_buffer_close(buffer).unwrap();

    // Reset reopens the cycle.
    loader.command_buffer_reset(buffer).unwrap();
    loader
        .command_buffer_append_barrier(buffer, RawHandle::NULL, &[])
        .unwrap();
    let err = loader
        .queue_execute(queue, &[buffer], RawHandle::NULL)
        .unwrap_err();
    assert!(matches!(err, LoaderError::InvalidArgument(_)));
}

// ===== Backend affinity =====

#[test]
fn cross_backend_handles_are_rejected() {
    let loader = Loader::new(LoaderOptions::new().with_validation(true));
    let gpu = NullBackend::new(NullBackendConfig::for_class(AcceleratorClass::DiscreteGpu));
    let npu = NullBackend::new(NullBackendConfig::for_class(AcceleratorClass::Npu));
    loader.register_backend(Arc::new(gpu.clone()));
    loader.register_backend(Arc::new(npu.clone()));
    let drivers = loader.init_backends(CapabilityMask::ALL).unwrap();
    assert_eq!(drivers.len(), 2);

    let gpu_device = loader.device_handles(drivers[0]).unwrap()[0];
    let npu_device = loader.device_handles(drivers[1]).unwrap()[0];
    let gpu_context = loader
        .context_create(drivers[0], &ContextDesc::default())
        .unwrap();
    let npu_context = loader
        .context_create(drivers[1], &ContextDesc::default())
        .unwrap();

    let err = loader
        .queue_create(gpu_context, npu_device, &QueueDesc::default())
        .unwrap_err();
    assert!(matches!(err, LoaderError::InvalidArgument(_)));

    // A closed buffer from the wrong backend fails at routing, not in
    // the recordable-state check.
    let gpu_queue = loader
        .queue_create(gpu_context, gpu_device, &QueueDesc::default())
        .unwrap();
    let npu_buffer = loader
        .command_buffer_create(npu_context, npu_device, &CommandBufferDesc::default())
        .unwrap();
    loader.command_buffer_close(npu_buffer).unwrap();
    let err = loader
        .queue_execute(gpu_queue, &[npu_buffer], RawHandle::NULL)
        .unwrap_err();
    assert!(matches!(err, LoaderError::InvalidArgument(_)));
}

// ===== Interception modes =====

#[test]
fn single_backend_without_validation_passes_through() {
    let loader = Loader::new(LoaderOptions::new());
    let backend = NullBackend::new(NullBackendConfig::for_class(AcceleratorClass::DiscreteGpu));
    loader.register_backend(Arc::new(backend.clone()));

    let drivers = loader.init_backends(CapabilityMask::ALL).unwrap();
    assert!(!loader.intercept_active());
    assert_eq!(loader.wrapped_handle_count(), 0);

    // The application sees the backend's own native driver handle.
    let native_driver = backend
        .driver_ops(ApiVersion::CURRENT)
        .unwrap()
        .driver_handles()
        .unwrap()[0];
    assert_eq!(drivers, vec![native_driver]);

    let context = loader
        .context_create(drivers[0], &ContextDesc::default())
        .unwrap();
    assert_eq!(loader.wrapped_handle_count(), 0);
    assert!(!loader.has_instance(ObjectCategory::Context, context));
    loader.context_status(context).unwrap();
    loader.context_destroy(context).unwrap();
    assert_eq!(backend.live_objects(), 0);
}

#[test]
fn force_intercept_wraps_with_a_single_backend() {
    let loader = Loader::new(LoaderOptions::new().with_force_intercept(true));
    let backend = NullBackend::new(NullBackendConfig::for_class(AcceleratorClass::DiscreteGpu));
    loader.register_backend(Arc::new(backend.clone()));

    let drivers = loader.init_backends(CapabilityMask::ALL).unwrap();
    assert!(loader.intercept_active());
    assert_eq!(loader.wrapped_handle_count(), 1);

    let native_driver = backend
        .driver_ops(ApiVersion::CURRENT)
        .unwrap()
        .driver_handles()
        .unwrap()[0];
    assert_ne!(drivers[0], native_driver);
    assert!(loader.has_instance(ObjectCategory::Driver, native_driver));
}

// ===== Error propagation =====

#[test]
fn backend_errors_pass_through_unchanged() {
    let (loader, backend, drivers) = validated_loader();
    let device = loader.device_handles(drivers[0]).unwrap()[0];
    let context = loader
        .context_create(drivers[0], &ContextDesc::default())
        .unwrap();
    let queue = loader
        .queue_create(context, device, &QueueDesc::default())
        .unwrap();

    backend.inject_failure();
    let err = loader.context_status(context).unwrap_err();
    assert!(matches!(err, LoaderError::Backend(INJECTED_FAILURE_CODE)));
    let err = loader.queue_synchronize(queue, 0).unwrap_err();
    assert!(matches!(err, LoaderError::Backend(INJECTED_FAILURE_CODE)));

    backend.clear_failure();
    loader.context_status(context).unwrap();
}

// ===== Component introspection =====

#[test]
fn component_versions_report_every_layer() {
    let (loader, _backend, _drivers) = validated_loader();

    let versions = loader.component_versions();
    assert_eq!(versions[0].kind, ComponentKind::Loader);
    assert!(versions
        .iter()
        .any(|component| component.kind == ComponentKind::Validation));
    assert_eq!(
        versions
            .iter()
            .filter(|component| component.kind == ComponentKind::Backend)
            .count(),
        1
    );

    let mut count = 0;
    loader.component_versions_into(&mut count, None).unwrap();
    assert_eq!(count as usize, versions.len());

    let mut buffer = vec![versions[0].clone(); versions.len()];
    loader
        .component_versions_into(&mut count, Some(&mut buffer))
        .unwrap();
    assert_eq!(count as usize, versions.len());
    assert_eq!(buffer[1].kind, ComponentKind::Validation);
}

#[test]
fn driver_and_device_queries_route_through_wraps() {
    let (loader, backend, drivers) = validated_loader();

    assert_eq!(
        loader.driver_api_version(drivers[0]).unwrap(),
        ApiVersion::CURRENT
    );
    let properties = loader.driver_properties(drivers[0]).unwrap();
    assert_eq!(properties.name, backend.name());
    assert_eq!(properties.version, ApiVersion::CURRENT);

    let devices = loader.device_handles(drivers[0]).unwrap();
    let device = loader.device_properties(devices[0]).unwrap();
    assert_eq!(device.class, AcceleratorClass::DiscreteGpu);
    assert_eq!(device.device_id, 0);
}

#[test]
fn driver_extension_probe_returns_plain_equality() {
    let loader = Loader::new(LoaderOptions::new().with_validation(true));
    let backend = NullBackend::new(
        NullBackendConfig::for_class(AcceleratorClass::DiscreteGpu)
            .with_extension("HALO_extension_timestamps", 1),
    );
    loader.register_backend(Arc::new(backend));
    let drivers = loader.init_backends(CapabilityMask::ALL).unwrap();

    assert!(loader
        .driver_supports_extension(drivers[0], "HALO_extension_timestamps")
        .unwrap());
    assert!(!loader
        .driver_supports_extension(drivers[0], "HALO_extension_sparse")
        .unwrap());
}
