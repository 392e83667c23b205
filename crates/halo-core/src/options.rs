//! Loader configuration.
//!
//! Options are normally assembled from the environment by the embedding
//! application; tests build them directly. Every knob has a safe default,
//! so `LoaderOptions::default()` yields a loader that discovers every
//! configured backend class with validation off.

use std::env;
use std::path::PathBuf;

use tracing::warn;

use crate::caps::{AcceleratorClass, CapabilityMask};

/// Environment variable enabling the validation layer.
pub const ENV_ENABLE_VALIDATION: &str = "HALO_ENABLE_VALIDATION";
/// Environment variable toggling parameter (null/enum) checks.
pub const ENV_PARAMETER_VALIDATION: &str = "HALO_PARAMETER_VALIDATION";
/// Environment variable toggling handle lifetime tracking.
pub const ENV_HANDLE_LIFETIME: &str = "HALO_HANDLE_LIFETIME";
/// Environment variable forcing loader interception even with one backend.
pub const ENV_FORCE_INTERCEPT: &str = "HALO_FORCE_INTERCEPT";
/// Environment variable listing extra backend library paths,
/// comma-separated.
pub const ENV_BACKEND_PATHS: &str = "HALO_BACKEND_PATHS";
/// Environment variable naming a TOML backend manifest.
pub const ENV_BACKEND_MANIFEST: &str = "HALO_BACKEND_MANIFEST";
/// Environment variable enabling the in-process reference backend.
pub const ENV_ENABLE_NULL_BACKEND: &str = "HALO_ENABLE_NULL_BACKEND";
/// Environment variable selecting the reference backend's class
/// (`discrete`, `integrated`, `npu`, or `all`).
pub const ENV_NULL_BACKEND_CLASS: &str = "HALO_NULL_BACKEND_CLASS";
/// Environment variable turning on verbose discovery tracing.
pub const ENV_DEBUG_TRACE: &str = "HALO_DEBUG_TRACE";

/// Configuration for one loader instance.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Default capability request used when discovery is driven without an
    /// explicit mask.
    pub capabilities: CapabilityMask,
    /// Enable the validation layer (implies loader interception).
    pub enable_validation: bool,
    /// Parameter checks (null handles, enumeration ranges). Only consulted
    /// while validation is enabled.
    pub parameter_validation: bool,
    /// Handle lifetime tracking. Only consulted while validation is
    /// enabled.
    pub handle_lifetime: bool,
    /// Keep loader indirection even when a single backend is active.
    pub force_intercept: bool,
    /// Extra backend library paths tried during discovery.
    pub backend_paths: Vec<PathBuf>,
    /// Optional TOML manifest listing backends.
    pub manifest_path: Option<PathBuf>,
    /// Add the in-process reference backend to discovery.
    pub enable_null_backend: bool,
    /// Classes the reference backend registers under, one instance each.
    pub null_backend_classes: Vec<AcceleratorClass>,
    /// Verbose discovery/composition tracing.
    pub debug_trace: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            capabilities: CapabilityMask::ALL,
            enable_validation: false,
            parameter_validation: true,
            handle_lifetime: true,
            force_intercept: false,
            backend_paths: Vec::new(),
            manifest_path: None,
            enable_null_backend: false,
            null_backend_classes: vec![AcceleratorClass::DiscreteGpu],
            debug_trace: false,
        }
    }
}

impl LoaderOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read options from the `HALO_*` environment, starting from defaults.
    ///
    /// Unparseable values are ignored with a warning rather than failing
    /// loader construction.
    pub fn from_env() -> Self {
        let mut options = Self::default();

        if let Some(v) = env_flag(ENV_ENABLE_VALIDATION) {
            options.enable_validation = v;
        }
        if let Some(v) = env_flag(ENV_PARAMETER_VALIDATION) {
            options.parameter_validation = v;
        }
        if let Some(v) = env_flag(ENV_HANDLE_LIFETIME) {
            options.handle_lifetime = v;
        }
        if let Some(v) = env_flag(ENV_FORCE_INTERCEPT) {
            options.force_intercept = v;
        }
        if let Some(v) = env_flag(ENV_ENABLE_NULL_BACKEND) {
            options.enable_null_backend = v;
        }
        if let Some(v) = env_flag(ENV_DEBUG_TRACE) {
            options.debug_trace = v;
        }
        if let Ok(paths) = env::var(ENV_BACKEND_PATHS) {
            options.backend_paths.extend(
                paths
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(PathBuf::from),
            );
        }
        if let Ok(path) = env::var(ENV_BACKEND_MANIFEST) {
            if !path.trim().is_empty() {
                options.manifest_path = Some(PathBuf::from(path.trim()));
            }
        }
        if let Ok(class) = env::var(ENV_NULL_BACKEND_CLASS) {
            match parse_null_backend_classes(&class) {
                Some(classes) => options.null_backend_classes = classes,
                None => warn!(
                    value = class.as_str(),
                    "ignoring unrecognized {ENV_NULL_BACKEND_CLASS}"
                ),
            }
        }

        options
    }

    /// Set the default capability request.
    pub fn with_capabilities(mut self, capabilities: CapabilityMask) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Enable or disable the validation layer.
    pub fn with_validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Force loader interception regardless of backend count.
    pub fn with_force_intercept(mut self, enable: bool) -> Self {
        self.force_intercept = enable;
        self
    }

    /// Append one backend library path.
    pub fn with_backend_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.backend_paths.push(path.into());
        self
    }

    /// Use a TOML backend manifest.
    pub fn with_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = Some(path.into());
        self
    }

    /// Enable the in-process reference backend for the given classes.
    pub fn with_null_backend(mut self, classes: Vec<AcceleratorClass>) -> Self {
        self.enable_null_backend = true;
        self.null_backend_classes = classes;
        self
    }
}

fn parse_null_backend_classes(value: &str) -> Option<Vec<AcceleratorClass>> {
    if value.trim().eq_ignore_ascii_case("all") {
        return Some(vec![
            AcceleratorClass::DiscreteGpu,
            AcceleratorClass::IntegratedGpu,
            AcceleratorClass::Npu,
        ]);
    }
    value.trim().parse().ok().map(|class| vec![class])
}

fn env_flag(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    Some(matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "y" | "yes" | "true" | "on"
    ))
}
