//! Dynamically loaded backends.
//!
//! [`DynamicBackend`] owns one shared library and adapts its raw C
//! tables onto the ops traits. Every adapter keeps a clone of the
//! `Arc<Library>` so resolved function pointers can never outlive the
//! mapping that backs them.

use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::Arc;

use libloading::Library;
use tracing::debug;

use halo_core::{
    category_table_symbol, AcceleratorClass, ApiVersion, CapabilityMask, LoaderError,
    ObjectCategory, RawHandle, Result, BACKEND_INIT_SYMBOL, BACKEND_PROPERTIES_SYMBOL,
};

use crate::abi::{
    self, BackendInitFn, BackendPropertiesFn, RawBackendProperties, RawCommandBufferDesc,
    RawCommandTable, RawContextDesc, RawContextTable, RawDeviceProperties, RawDeviceTable,
    RawDriverProperties, RawDriverTable, RawExtensionProperties, RawImageDesc, RawImageTable,
    RawKernelTable, RawModuleTable, RawQueueDesc, RawQueueTable, RawSyncTable, TableGetterFn,
};
use crate::library::BackendLibrary;
use crate::ops::{
    CommandBufferDesc, CommandOps, ContextDesc, ContextOps, DeviceOps, DeviceProperties,
    DriverOps, DriverProperties, ExtensionProperties, ImageDesc, ImageOps, KernelOps, ModuleOps,
    QueueDesc, QueueOps, SyncOps,
};

/// A backend loaded from a shared library.
pub struct DynamicBackend {
    path: PathBuf,
    library: Arc<Library>,
    name: String,
    class: AcceleratorClass,
    version: ApiVersion,
}

impl DynamicBackend {
    /// Load a backend library and read its identity.
    ///
    /// The library stays mapped for the lifetime of the returned value
    /// and of every dispatch group resolved from it.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let library = match unsafe { Library::new(&path) } {
            Ok(library) => Arc::new(library),
            Err(e) => {
                return Err(LoaderError::LibraryLoad {
                    path,
                    reason: e.to_string(),
                })
            }
        };

        let properties: BackendPropertiesFn =
            resolve_symbol(&library, BACKEND_PROPERTIES_SYMBOL)?;
        let mut raw = RawBackendProperties::default();
        abi::check(unsafe { properties(&mut raw) })?;

        let backend = Self {
            name: abi::name_from_bytes(&raw.name),
            class: abi::class_from_tag(raw.class),
            version: ApiVersion::from_raw(raw.version),
            path,
            library,
        };
        debug!(
            name = backend.name.as_str(),
            class = %backend.class,
            version = %backend.version,
            path = %backend.path.display(),
            "loaded backend library"
        );
        Ok(backend)
    }

    /// Filesystem path the library was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fill_table<T: Default>(&self, category: ObjectCategory, version: ApiVersion) -> Result<T> {
        let symbol = category_table_symbol(category);
        let getter: TableGetterFn<T> = resolve_symbol(&self.library, symbol)?;
        let mut table = T::default();
        abi::check(unsafe { getter(version.as_raw(), &mut table) })?;
        Ok(table)
    }
}

impl BackendLibrary for DynamicBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn class(&self) -> AcceleratorClass {
        self.class
    }

    fn version(&self) -> ApiVersion {
        self.version
    }

    fn init(&self, requested: CapabilityMask) -> Result<()> {
        let init: BackendInitFn = resolve_symbol(&self.library, BACKEND_INIT_SYMBOL)?;
        abi::check(unsafe { init(requested.bits()) })
    }

    fn driver_ops(&self, version: ApiVersion) -> Result<Arc<dyn DriverOps>> {
        let table: RawDriverTable = self.fill_table(ObjectCategory::Driver, version)?;
        Ok(Arc::new(DynDriverOps {
            table,
            _library: self.library.clone(),
        }))
    }

    fn device_ops(&self, version: ApiVersion) -> Result<Arc<dyn DeviceOps>> {
        let table: RawDeviceTable = self.fill_table(ObjectCategory::Device, version)?;
        Ok(Arc::new(DynDeviceOps {
            table,
            _library: self.library.clone(),
        }))
    }

    fn context_ops(&self, version: ApiVersion) -> Result<Arc<dyn ContextOps>> {
        let table: RawContextTable = self.fill_table(ObjectCategory::Context, version)?;
        Ok(Arc::new(DynContextOps {
            table,
            _library: self.library.clone(),
        }))
    }

    fn queue_ops(&self, version: ApiVersion) -> Result<Arc<dyn QueueOps>> {
        let table: RawQueueTable = self.fill_table(ObjectCategory::CommandQueue, version)?;
        Ok(Arc::new(DynQueueOps {
            table,
            _library: self.library.clone(),
        }))
    }

    fn command_ops(&self, version: ApiVersion) -> Result<Arc<dyn CommandOps>> {
        let table: RawCommandTable = self.fill_table(ObjectCategory::CommandBuffer, version)?;
        Ok(Arc::new(DynCommandOps {
            table,
            _library: self.library.clone(),
        }))
    }

    fn sync_ops(&self, version: ApiVersion) -> Result<Arc<dyn SyncOps>> {
        let table: RawSyncTable = self.fill_table(ObjectCategory::Fence, version)?;
        Ok(Arc::new(DynSyncOps {
            table,
            _library: self.library.clone(),
        }))
    }

    fn image_ops(&self, version: ApiVersion) -> Result<Arc<dyn ImageOps>> {
        let table: RawImageTable = self.fill_table(ObjectCategory::Image, version)?;
        Ok(Arc::new(DynImageOps {
            table,
            _library: self.library.clone(),
        }))
    }

    fn module_ops(&self, version: ApiVersion) -> Result<Arc<dyn ModuleOps>> {
        let table: RawModuleTable = self.fill_table(ObjectCategory::Module, version)?;
        Ok(Arc::new(DynModuleOps {
            table,
            _library: self.library.clone(),
        }))
    }

    fn kernel_ops(&self, version: ApiVersion) -> Result<Arc<dyn KernelOps>> {
        let table: RawKernelTable = self.fill_table(ObjectCategory::Kernel, version)?;
        Ok(Arc::new(DynKernelOps {
            table,
            _library: self.library.clone(),
        }))
    }
}

impl std::fmt::Debug for DynamicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicBackend")
            .field("name", &self.name)
            .field("class", &self.class)
            .field("path", &self.path)
            .finish()
    }
}

/// Copy a typed symbol out of the library.
///
/// The returned pointer is only called while an `Arc<Library>` clone is
/// held by the owning adapter.
fn resolve_symbol<T: Copy>(library: &Library, symbol: &str) -> Result<T> {
    let found = unsafe { library.get::<T>(symbol.as_bytes()) }
        .map_err(|_| LoaderError::MissingSymbol(symbol.to_string()))?;
    Ok(*found)
}

/// A table slot, or unsupported-version if the backend left it null.
fn entry<T>(slot: Option<T>, name: &str) -> Result<T> {
    slot.ok_or_else(|| {
        LoaderError::UnsupportedVersion(format!("table entry `{name}` not provided by backend"))
    })
}

fn handles_from_raw(raw: Vec<u64>) -> Vec<RawHandle> {
    raw.into_iter().map(RawHandle::from_raw).collect()
}

struct DynDriverOps {
    table: RawDriverTable,
    _library: Arc<Library>,
}

impl DriverOps for DynDriverOps {
    fn driver_handles(&self) -> Result<Vec<RawHandle>> {
        let f = entry(self.table.driver_handles, "driver_handles")?;
        let mut count = 0u32;
        abi::check(unsafe { f(&mut count, ptr::null_mut()) })?;
        let mut handles = vec![0u64; count as usize];
        if count > 0 {
            abi::check(unsafe { f(&mut count, handles.as_mut_ptr()) })?;
            handles.truncate(count as usize);
        }
        Ok(handles_from_raw(handles))
    }

    fn api_version(&self, driver: RawHandle) -> Result<ApiVersion> {
        let f = entry(self.table.api_version, "api_version")?;
        let mut raw = 0u32;
        abi::check(unsafe { f(driver.as_raw(), &mut raw) })?;
        Ok(ApiVersion::from_raw(raw))
    }

    fn properties(&self, driver: RawHandle) -> Result<DriverProperties> {
        let f = entry(self.table.properties, "properties")?;
        let mut raw = RawDriverProperties::default();
        abi::check(unsafe { f(driver.as_raw(), &mut raw) })?;
        Ok(DriverProperties {
            name: abi::name_from_bytes(&raw.name),
            version: ApiVersion::from_raw(raw.version),
            uuid: raw.uuid,
        })
    }

    fn extension_properties(&self, driver: RawHandle) -> Result<Vec<ExtensionProperties>> {
        let f = entry(self.table.extension_properties, "extension_properties")?;
        let mut count = 0u32;
        abi::check(unsafe { f(driver.as_raw(), &mut count, ptr::null_mut()) })?;
        let mut raw = vec![RawExtensionProperties::default(); count as usize];
        if count > 0 {
            abi::check(unsafe { f(driver.as_raw(), &mut count, raw.as_mut_ptr()) })?;
            raw.truncate(count as usize);
        }
        Ok(raw
            .into_iter()
            .map(|e| ExtensionProperties {
                name: abi::name_from_bytes(&e.name),
                version: e.version,
            })
            .collect())
    }
}

struct DynDeviceOps {
    table: RawDeviceTable,
    _library: Arc<Library>,
}

impl DeviceOps for DynDeviceOps {
    fn device_handles(&self, driver: RawHandle) -> Result<Vec<RawHandle>> {
        let f = entry(self.table.device_handles, "device_handles")?;
        let mut count = 0u32;
        abi::check(unsafe { f(driver.as_raw(), &mut count, ptr::null_mut()) })?;
        let mut handles = vec![0u64; count as usize];
        if count > 0 {
            abi::check(unsafe { f(driver.as_raw(), &mut count, handles.as_mut_ptr()) })?;
            handles.truncate(count as usize);
        }
        Ok(handles_from_raw(handles))
    }

    fn properties(&self, device: RawHandle) -> Result<DeviceProperties> {
        let f = entry(self.table.properties, "properties")?;
        let mut raw = RawDeviceProperties::default();
        abi::check(unsafe { f(device.as_raw(), &mut raw) })?;
        Ok(DeviceProperties {
            name: abi::name_from_bytes(&raw.name),
            class: abi::class_from_tag(raw.class),
            device_id: raw.device_id,
        })
    }
}

struct DynContextOps {
    table: RawContextTable,
    _library: Arc<Library>,
}

impl ContextOps for DynContextOps {
    fn create(&self, driver: RawHandle, desc: &ContextDesc) -> Result<RawHandle> {
        let f = entry(self.table.create, "create")?;
        let raw_desc = RawContextDesc { flags: desc.flags };
        let mut out = 0u64;
        abi::check(unsafe { f(driver.as_raw(), &raw_desc, &mut out) })?;
        Ok(RawHandle::from_raw(out))
    }

    fn status(&self, context: RawHandle) -> Result<()> {
        let f = entry(self.table.status, "status")?;
        abi::check(unsafe { f(context.as_raw()) })
    }

    fn destroy(&self, context: RawHandle) -> Result<()> {
        let f = entry(self.table.destroy, "destroy")?;
        abi::check(unsafe { f(context.as_raw()) })
    }
}

struct DynQueueOps {
    table: RawQueueTable,
    _library: Arc<Library>,
}

impl QueueOps for DynQueueOps {
    fn create(
        &self,
        context: RawHandle,
        device: RawHandle,
        desc: &QueueDesc,
    ) -> Result<RawHandle> {
        let f = entry(self.table.create, "create")?;
        let raw_desc = RawQueueDesc {
            ordinal: desc.ordinal,
            flags: desc.flags,
        };
        let mut out = 0u64;
        abi::check(unsafe { f(context.as_raw(), device.as_raw(), &raw_desc, &mut out) })?;
        Ok(RawHandle::from_raw(out))
    }

    fn execute(&self, queue: RawHandle, buffers: &[RawHandle], fence: RawHandle) -> Result<()> {
        let f = entry(self.table.execute, "execute")?;
        // RawHandle is a transparent u64 wrapper, so the slice reinterprets
        // directly onto the wire layout.
        abi::check(unsafe {
            f(
                queue.as_raw(),
                buffers.len() as u32,
                buffers.as_ptr() as *const u64,
                fence.as_raw(),
            )
        })
    }

    fn synchronize(&self, queue: RawHandle, timeout_ns: u64) -> Result<()> {
        let f = entry(self.table.synchronize, "synchronize")?;
        abi::check(unsafe { f(queue.as_raw(), timeout_ns) })
    }

    fn destroy(&self, queue: RawHandle) -> Result<()> {
        let f = entry(self.table.destroy, "destroy")?;
        abi::check(unsafe { f(queue.as_raw()) })
    }
}

struct DynCommandOps {
    table: RawCommandTable,
    _library: Arc<Library>,
}

impl CommandOps for DynCommandOps {
    fn create(
        &self,
        context: RawHandle,
        device: RawHandle,
        desc: &CommandBufferDesc,
    ) -> Result<RawHandle> {
        let f = entry(self.table.create, "create")?;
        let raw_desc = RawCommandBufferDesc { flags: desc.flags };
        let mut out = 0u64;
        abi::check(unsafe { f(context.as_raw(), device.as_raw(), &raw_desc, &mut out) })?;
        Ok(RawHandle::from_raw(out))
    }

    fn append_barrier(
        &self,
        buffer: RawHandle,
        signal: RawHandle,
        wait: &[RawHandle],
    ) -> Result<()> {
        let f = entry(self.table.append_barrier, "append_barrier")?;
        abi::check(unsafe {
            f(
                buffer.as_raw(),
                signal.as_raw(),
                wait.len() as u32,
                wait.as_ptr() as *const u64,
            )
        })
    }

    fn close(&self, buffer: RawHandle) -> Result<()> {
        let f = entry(self.table.close, "close")?;
        abi::check(unsafe { f(buffer.as_raw()) })
    }

    fn reset(&self, buffer: RawHandle) -> Result<()> {
        let f = entry(self.table.reset, "reset")?;
        abi::check(unsafe { f(buffer.as_raw()) })
    }

    fn destroy(&self, buffer: RawHandle) -> Result<()> {
        let f = entry(self.table.destroy, "destroy")?;
        abi::check(unsafe { f(buffer.as_raw()) })
    }
}

struct DynSyncOps {
    table: RawSyncTable,
    _library: Arc<Library>,
}

impl SyncOps for DynSyncOps {
    fn fence_create(&self, queue: RawHandle) -> Result<RawHandle> {
        let f = entry(self.table.fence_create, "fence_create")?;
        let mut out = 0u64;
        abi::check(unsafe { f(queue.as_raw(), &mut out) })?;
        Ok(RawHandle::from_raw(out))
    }

    fn fence_destroy(&self, fence: RawHandle) -> Result<()> {
        let f = entry(self.table.fence_destroy, "fence_destroy")?;
        abi::check(unsafe { f(fence.as_raw()) })
    }

    fn event_pool_create(
        &self,
        context: RawHandle,
        devices: &[RawHandle],
        capacity: u32,
    ) -> Result<RawHandle> {
        let f = entry(self.table.event_pool_create, "event_pool_create")?;
        let mut out = 0u64;
        abi::check(unsafe {
            f(
                context.as_raw(),
                devices.len() as u32,
                devices.as_ptr() as *const u64,
                capacity,
                &mut out,
            )
        })?;
        Ok(RawHandle::from_raw(out))
    }

    fn event_create(&self, pool: RawHandle, index: u32) -> Result<RawHandle> {
        let f = entry(self.table.event_create, "event_create")?;
        let mut out = 0u64;
        abi::check(unsafe { f(pool.as_raw(), index, &mut out) })?;
        Ok(RawHandle::from_raw(out))
    }

    fn event_destroy(&self, event: RawHandle) -> Result<()> {
        let f = entry(self.table.event_destroy, "event_destroy")?;
        abi::check(unsafe { f(event.as_raw()) })
    }

    fn event_pool_destroy(&self, pool: RawHandle) -> Result<()> {
        let f = entry(self.table.event_pool_destroy, "event_pool_destroy")?;
        abi::check(unsafe { f(pool.as_raw()) })
    }
}

struct DynImageOps {
    table: RawImageTable,
    _library: Arc<Library>,
}

impl ImageOps for DynImageOps {
    fn create(&self, context: RawHandle, device: RawHandle, desc: &ImageDesc) -> Result<RawHandle> {
        let f = entry(self.table.create, "create")?;
        let raw_desc = RawImageDesc {
            width: desc.width,
            height: desc.height,
        };
        let mut out = 0u64;
        abi::check(unsafe { f(context.as_raw(), device.as_raw(), &raw_desc, &mut out) })?;
        Ok(RawHandle::from_raw(out))
    }

    fn destroy(&self, image: RawHandle) -> Result<()> {
        let f = entry(self.table.destroy, "destroy")?;
        abi::check(unsafe { f(image.as_raw()) })
    }
}

struct DynModuleOps {
    table: RawModuleTable,
    _library: Arc<Library>,
}

impl ModuleOps for DynModuleOps {
    fn create(&self, context: RawHandle, device: RawHandle, code: &[u8]) -> Result<RawHandle> {
        let f = entry(self.table.create, "create")?;
        let mut out = 0u64;
        abi::check(unsafe {
            f(
                context.as_raw(),
                device.as_raw(),
                code.as_ptr(),
                code.len(),
                &mut out,
            )
        })?;
        Ok(RawHandle::from_raw(out))
    }

    fn destroy(&self, module: RawHandle) -> Result<()> {
        let f = entry(self.table.destroy, "destroy")?;
        abi::check(unsafe { f(module.as_raw()) })
    }
}

struct DynKernelOps {
    table: RawKernelTable,
    _library: Arc<Library>,
}

impl KernelOps for DynKernelOps {
    fn create(&self, module: RawHandle, name: &str) -> Result<RawHandle> {
        let f = entry(self.table.create, "create")?;
        let c_name = std::ffi::CString::new(name).map_err(|_| {
            LoaderError::InvalidArgument("kernel name contains interior NUL".to_string())
        })?;
        let mut out = 0u64;
        abi::check(unsafe { f(module.as_raw(), c_name.as_ptr(), &mut out) })?;
        Ok(RawHandle::from_raw(out))
    }

    fn destroy(&self, kernel: RawHandle) -> Result<()> {
        let f = entry(self.table.destroy, "destroy")?;
        abi::check(unsafe { f(kernel.as_raw()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_library_reports_path() {
        let err = DynamicBackend::load("/nonexistent/libhalo_missing.so").unwrap_err();
        match err {
            LoaderError::LibraryLoad { path, reason } => {
                assert_eq!(path, PathBuf::from("/nonexistent/libhalo_missing.so"));
                assert!(!reason.is_empty());
            }
            other => panic!("expected LibraryLoad, got {other:?}"),
        }
    }

    #[test]
    fn test_null_table_entry_is_unsupported_version() {
        let table = RawDriverTable::default();
        let err = entry(table.driver_handles, "driver_handles").unwrap_err();
        assert!(matches!(err, LoaderError::UnsupportedVersion(_)));
    }
}
