//! In-process null backend.
//!
//! Backs every object with a plain table entry and succeeds without
//! touching hardware. Discovery can enable it through loader options,
//! and tests use its fault injection to exercise failure isolation and
//! the teardown stability probe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use halo_core::{
    category_table_symbol, AcceleratorClass, ApiVersion, CapabilityMask, LoaderError,
    ObjectCategory, RawHandle, Result,
};

use crate::library::BackendLibrary;
use crate::ops::{
    CommandBufferDesc, CommandOps, ContextDesc, ContextOps, DeviceOps, DeviceProperties,
    DriverOps, DriverProperties, ExtensionProperties, ImageDesc, ImageOps, KernelOps, ModuleOps,
    QueueDesc, QueueOps, SyncOps,
};

/// Error code surfaced while fault injection is armed.
pub const INJECTED_FAILURE_CODE: i32 = -86;
/// Error code returned by a backend configured to refuse `init`.
pub const INIT_FAILURE_CODE: i32 = -90;

// Native handles must stay unique across every null backend in the
// process, matching the pointer-valued handles a real driver returns.
static NEXT_NATIVE: AtomicU64 = AtomicU64::new(0x1000);

fn mint_native() -> u64 {
    NEXT_NATIVE.fetch_add(1, Ordering::Relaxed)
}

fn derive_uuid(name: &str) -> [u8; 16] {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in name.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    let mut uuid = [0u8; 16];
    uuid[..8].copy_from_slice(&hash.to_le_bytes());
    uuid[8..].copy_from_slice(&hash.rotate_left(17).to_le_bytes());
    uuid
}

/// Configuration for one null backend instance.
#[derive(Debug, Clone)]
pub struct NullBackendConfig {
    /// Backend name reported through properties.
    pub name: String,
    /// Accelerator class the backend claims.
    pub class: AcceleratorClass,
    /// Highest interface version the backend supports.
    pub version: ApiVersion,
    /// Number of devices exposed under the single driver.
    pub device_count: u32,
    /// Extension name and version pairs reported per driver.
    pub extensions: Vec<(String, u32)>,
    /// Refuse `init` with [`INIT_FAILURE_CODE`].
    pub fail_init: bool,
    /// Refuse to resolve the dispatch group owning this category.
    pub fail_resolve: Option<ObjectCategory>,
}

impl Default for NullBackendConfig {
    fn default() -> Self {
        Self {
            name: "halo-null".to_string(),
            class: AcceleratorClass::DiscreteGpu,
            version: ApiVersion::CURRENT,
            device_count: 1,
            extensions: Vec::new(),
            fail_init: false,
            fail_resolve: None,
        }
    }
}

impl NullBackendConfig {
    /// Configuration named after the accelerator class it claims.
    pub fn for_class(class: AcceleratorClass) -> Self {
        Self {
            name: format!("halo-null-{class}"),
            class,
            ..Self::default()
        }
    }

    /// Set the reported backend name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the supported interface version.
    pub fn with_version(mut self, version: ApiVersion) -> Self {
        self.version = version;
        self
    }

    /// Set the number of exposed devices.
    pub fn with_device_count(mut self, count: u32) -> Self {
        self.device_count = count;
        self
    }

    /// Add an extension to the reported list.
    pub fn with_extension(mut self, name: impl Into<String>, version: u32) -> Self {
        self.extensions.push((name.into(), version));
        self
    }

    /// Make `init` fail.
    pub fn with_failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Make resolution of `category`'s dispatch group fail.
    pub fn with_failing_resolve(mut self, category: ObjectCategory) -> Self {
        self.fail_resolve = Some(category);
        self
    }
}

#[derive(Debug)]
struct NullObject {
    category: ObjectCategory,
}

#[derive(Debug)]
struct NullState {
    driver: u64,
    devices: Vec<u64>,
    objects: Mutex<HashMap<u64, NullObject>>,
    initialized: AtomicBool,
    init_calls: AtomicU64,
    inject_failure: AtomicBool,
    panic_on_query: AtomicBool,
}

impl NullState {
    fn is_known(&self, handle: u64) -> bool {
        handle == self.driver
            || self.devices.contains(&handle)
            || self.objects.lock().unwrap().contains_key(&handle)
    }

    fn require_known(&self, handle: u64) -> Result<()> {
        if self.is_known(handle) {
            Ok(())
        } else {
            Err(LoaderError::InvalidHandle)
        }
    }

    fn check_injected(&self) -> Result<()> {
        if self.inject_failure.load(Ordering::Acquire) {
            Err(LoaderError::Backend(INJECTED_FAILURE_CODE))
        } else {
            Ok(())
        }
    }

    fn create(&self, category: ObjectCategory, parents: &[u64]) -> Result<u64> {
        for parent in parents {
            self.require_known(*parent)?;
        }
        let native = mint_native();
        self.objects
            .lock()
            .unwrap()
            .insert(native, NullObject { category });
        Ok(native)
    }

    fn destroy(&self, category: ObjectCategory, handle: u64) -> Result<()> {
        let mut objects = self.objects.lock().unwrap();
        match objects.get(&handle) {
            Some(object) if object.category == category => {
                objects.remove(&handle);
                Ok(())
            }
            _ => Err(LoaderError::InvalidHandle),
        }
    }
}

/// A backend that fulfils every operation in process.
#[derive(Debug, Clone)]
pub struct NullBackend {
    config: NullBackendConfig,
    state: Arc<NullState>,
}

impl NullBackend {
    /// Create a backend from `config` and mint its driver and devices.
    pub fn new(config: NullBackendConfig) -> Self {
        let driver = mint_native();
        let devices = (0..config.device_count).map(|_| mint_native()).collect();
        Self {
            config,
            state: Arc::new(NullState {
                driver,
                devices,
                objects: Mutex::new(HashMap::new()),
                initialized: AtomicBool::new(false),
                init_calls: AtomicU64::new(0),
                inject_failure: AtomicBool::new(false),
                panic_on_query: AtomicBool::new(false),
            }),
        }
    }

    /// Number of times `init` ran, for idempotence checks.
    pub fn init_calls(&self) -> u64 {
        self.state.init_calls.load(Ordering::Acquire)
    }

    /// Whether `init` has succeeded at least once.
    pub fn is_initialized(&self) -> bool {
        self.state.initialized.load(Ordering::Acquire)
    }

    /// Number of live objects created through this backend.
    pub fn live_objects(&self) -> usize {
        self.state.objects.lock().unwrap().len()
    }

    /// Arm fault injection: version and status queries start failing
    /// with [`INJECTED_FAILURE_CODE`].
    pub fn inject_failure(&self) {
        self.state.inject_failure.store(true, Ordering::Release);
    }

    /// Disarm fault injection.
    pub fn clear_failure(&self) {
        self.state.inject_failure.store(false, Ordering::Release);
    }

    /// Make version and status queries panic instead of returning.
    ///
    /// Models a driver whose entry points fault after device loss, which
    /// is what the teardown stability probe exists to contain.
    pub fn poison_queries(&self) {
        self.state.panic_on_query.store(true, Ordering::Release);
    }

    fn core(&self) -> Arc<NullCore> {
        Arc::new(NullCore {
            config: self.config.clone(),
            state: self.state.clone(),
        })
    }

    fn resolve_gate(&self, category: ObjectCategory, requested: ApiVersion) -> Result<()> {
        if !self.config.version.satisfies(requested) {
            return Err(LoaderError::UnsupportedVersion(format!(
                "backend `{}` supports {}, requested {}",
                self.config.name, self.config.version, requested
            )));
        }
        if let Some(failing) = self.config.fail_resolve {
            // Fence, event pool, and event share one dispatch group, so a
            // failure configured on any of the three hits the same getter.
            if category_table_symbol(failing) == category_table_symbol(category) {
                return Err(LoaderError::Backend(INJECTED_FAILURE_CODE));
            }
        }
        Ok(())
    }
}

impl BackendLibrary for NullBackend {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn class(&self) -> AcceleratorClass {
        self.config.class
    }

    fn version(&self) -> ApiVersion {
        self.config.version
    }

    fn init(&self, _requested: CapabilityMask) -> Result<()> {
        self.state.init_calls.fetch_add(1, Ordering::AcqRel);
        if self.config.fail_init {
            return Err(LoaderError::Backend(INIT_FAILURE_CODE));
        }
        self.state.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn driver_ops(&self, version: ApiVersion) -> Result<Arc<dyn DriverOps>> {
        self.resolve_gate(ObjectCategory::Driver, version)?;
        Ok(self.core())
    }

    fn device_ops(&self, version: ApiVersion) -> Result<Arc<dyn DeviceOps>> {
        self.resolve_gate(ObjectCategory::Device, version)?;
        Ok(self.core())
    }

    fn context_ops(&self, version: ApiVersion) -> Result<Arc<dyn ContextOps>> {
        self.resolve_gate(ObjectCategory::Context, version)?;
        Ok(self.core())
    }

    fn queue_ops(&self, version: ApiVersion) -> Result<Arc<dyn QueueOps>> {
        self.resolve_gate(ObjectCategory::CommandQueue, version)?;
        Ok(self.core())
    }

    fn command_ops(&self, version: ApiVersion) -> Result<Arc<dyn CommandOps>> {
        self.resolve_gate(ObjectCategory::CommandBuffer, version)?;
        Ok(self.core())
    }

    fn sync_ops(&self, version: ApiVersion) -> Result<Arc<dyn SyncOps>> {
        self.resolve_gate(ObjectCategory::Fence, version)?;
        Ok(self.core())
    }

    fn image_ops(&self, version: ApiVersion) -> Result<Arc<dyn ImageOps>> {
        self.resolve_gate(ObjectCategory::Image, version)?;
        Ok(self.core())
    }

    fn module_ops(&self, version: ApiVersion) -> Result<Arc<dyn ModuleOps>> {
        self.resolve_gate(ObjectCategory::Module, version)?;
        Ok(self.core())
    }

    fn kernel_ops(&self, version: ApiVersion) -> Result<Arc<dyn KernelOps>> {
        self.resolve_gate(ObjectCategory::Kernel, version)?;
        Ok(self.core())
    }
}

/// One allocation serving all nine dispatch groups of a null backend.
struct NullCore {
    config: NullBackendConfig,
    state: Arc<NullState>,
}

impl DriverOps for NullCore {
    fn driver_handles(&self) -> Result<Vec<RawHandle>> {
        Ok(vec![RawHandle::from_raw(self.state.driver)])
    }

    fn api_version(&self, driver: RawHandle) -> Result<ApiVersion> {
        if self.state.panic_on_query.load(Ordering::Acquire) {
            panic!("null backend version entry poisoned");
        }
        self.state.require_known(driver.as_raw())?;
        self.state.check_injected()?;
        Ok(self.config.version)
    }

    fn properties(&self, driver: RawHandle) -> Result<DriverProperties> {
        self.state.require_known(driver.as_raw())?;
        Ok(DriverProperties {
            name: self.config.name.clone(),
            version: self.config.version,
            uuid: derive_uuid(&self.config.name),
        })
    }

    fn extension_properties(&self, driver: RawHandle) -> Result<Vec<ExtensionProperties>> {
        self.state.require_known(driver.as_raw())?;
        Ok(self
            .config
            .extensions
            .iter()
            .map(|(name, version)| ExtensionProperties {
                name: name.clone(),
                version: *version,
            })
            .collect())
    }
}

impl DeviceOps for NullCore {
    fn device_handles(&self, driver: RawHandle) -> Result<Vec<RawHandle>> {
        self.state.require_known(driver.as_raw())?;
        Ok(self
            .state
            .devices
            .iter()
            .map(|native| RawHandle::from_raw(*native))
            .collect())
    }

    fn properties(&self, device: RawHandle) -> Result<DeviceProperties> {
        let index = self
            .state
            .devices
            .iter()
            .position(|native| *native == device.as_raw())
            .ok_or(LoaderError::InvalidHandle)?;
        Ok(DeviceProperties {
            name: format!("{}-dev{index}", self.config.name),
            class: self.config.class,
            device_id: index as u32,
        })
    }
}

impl ContextOps for NullCore {
    fn create(&self, driver: RawHandle, _desc: &ContextDesc) -> Result<RawHandle> {
        self.state
            .create(ObjectCategory::Context, &[driver.as_raw()])
            .map(RawHandle::from_raw)
    }

    fn status(&self, context: RawHandle) -> Result<()> {
        if self.state.panic_on_query.load(Ordering::Acquire) {
            panic!("null backend status entry poisoned");
        }
        self.state.require_known(context.as_raw())?;
        self.state.check_injected()
    }

    fn destroy(&self, context: RawHandle) -> Result<()> {
        self.state.destroy(ObjectCategory::Context, context.as_raw())
    }
}

impl QueueOps for NullCore {
    fn create(
        &self,
        context: RawHandle,
        device: RawHandle,
        _desc: &QueueDesc,
    ) -> Result<RawHandle> {
        self.state
            .create(
                ObjectCategory::CommandQueue,
                &[context.as_raw(), device.as_raw()],
            )
            .map(RawHandle::from_raw)
    }

    fn execute(&self, queue: RawHandle, buffers: &[RawHandle], fence: RawHandle) -> Result<()> {
        self.state.require_known(queue.as_raw())?;
        for buffer in buffers.iter().filter(|buffer| !buffer.is_null()) {
            self.state.require_known(buffer.as_raw())?;
        }
        if !fence.is_null() {
            self.state.require_known(fence.as_raw())?;
        }
        Ok(())
    }

    fn synchronize(&self, queue: RawHandle, _timeout_ns: u64) -> Result<()> {
        self.state.require_known(queue.as_raw())?;
        self.state.check_injected()
    }

    fn destroy(&self, queue: RawHandle) -> Result<()> {
        self.state
            .destroy(ObjectCategory::CommandQueue, queue.as_raw())
    }
}

impl CommandOps for NullCore {
    fn create(
        &self,
        context: RawHandle,
        device: RawHandle,
        _desc: &CommandBufferDesc,
    ) -> Result<RawHandle> {
        self.state
            .create(
                ObjectCategory::CommandBuffer,
                &[context.as_raw(), device.as_raw()],
            )
            .map(RawHandle::from_raw)
    }

    fn append_barrier(
        &self,
        buffer: RawHandle,
        signal: RawHandle,
        wait: &[RawHandle],
    ) -> Result<()> {
        self.state.require_known(buffer.as_raw())?;
        if !signal.is_null() {
            self.state.require_known(signal.as_raw())?;
        }
        for event in wait.iter().filter(|event| !event.is_null()) {
            self.state.require_known(event.as_raw())?;
        }
        Ok(())
    }

    fn close(&self, buffer: RawHandle) -> Result<()> {
        self.state.require_known(buffer.as_raw())
    }

    fn reset(&self, buffer: RawHandle) -> Result<()> {
        self.state.require_known(buffer.as_raw())
    }

    fn destroy(&self, buffer: RawHandle) -> Result<()> {
        self.state
            .destroy(ObjectCategory::CommandBuffer, buffer.as_raw())
    }
}

impl SyncOps for NullCore {
    fn fence_create(&self, queue: RawHandle) -> Result<RawHandle> {
        self.state
            .create(ObjectCategory::Fence, &[queue.as_raw()])
            .map(RawHandle::from_raw)
    }

    fn fence_destroy(&self, fence: RawHandle) -> Result<()> {
        self.state.destroy(ObjectCategory::Fence, fence.as_raw())
    }

    fn event_pool_create(
        &self,
        context: RawHandle,
        devices: &[RawHandle],
        _capacity: u32,
    ) -> Result<RawHandle> {
        let mut parents = vec![context.as_raw()];
        parents.extend(devices.iter().map(|device| device.as_raw()));
        self.state
            .create(ObjectCategory::EventPool, &parents)
            .map(RawHandle::from_raw)
    }

    fn event_create(&self, pool: RawHandle, _index: u32) -> Result<RawHandle> {
        self.state
            .create(ObjectCategory::Event, &[pool.as_raw()])
            .map(RawHandle::from_raw)
    }

    fn event_destroy(&self, event: RawHandle) -> Result<()> {
        self.state.destroy(ObjectCategory::Event, event.as_raw())
    }

    fn event_pool_destroy(&self, pool: RawHandle) -> Result<()> {
        self.state.destroy(ObjectCategory::EventPool, pool.as_raw())
    }
}

impl ImageOps for NullCore {
    fn create(&self, context: RawHandle, device: RawHandle, _desc: &ImageDesc) -> Result<RawHandle> {
        self.state
            .create(ObjectCategory::Image, &[context.as_raw(), device.as_raw()])
            .map(RawHandle::from_raw)
    }

    fn destroy(&self, image: RawHandle) -> Result<()> {
        self.state.destroy(ObjectCategory::Image, image.as_raw())
    }
}

impl ModuleOps for NullCore {
    fn create(&self, context: RawHandle, device: RawHandle, _code: &[u8]) -> Result<RawHandle> {
        self.state
            .create(ObjectCategory::Module, &[context.as_raw(), device.as_raw()])
            .map(RawHandle::from_raw)
    }

    fn destroy(&self, module: RawHandle) -> Result<()> {
        self.state.destroy(ObjectCategory::Module, module.as_raw())
    }
}

impl KernelOps for NullCore {
    fn create(&self, module: RawHandle, name: &str) -> Result<RawHandle> {
        if name.is_empty() {
            return Err(LoaderError::InvalidArgument(
                "kernel name is empty".to_string(),
            ));
        }
        self.state
            .create(ObjectCategory::Kernel, &[module.as_raw()])
            .map(RawHandle::from_raw)
    }

    fn destroy(&self, kernel: RawHandle) -> Result<()> {
        self.state.destroy(ObjectCategory::Kernel, kernel.as_raw())
    }
}
