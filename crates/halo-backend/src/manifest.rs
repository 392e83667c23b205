//! Backend manifest files.
//!
//! A manifest lists backend libraries to load alongside the built-in
//! discovery sources. The format is TOML with one `[[backend]]` table
//! per library.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use halo_core::{AcceleratorClass, LoaderError, Result};

/// One backend entry in a manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    /// Display name, used in logs before the library reports its own.
    pub name: String,
    /// Path to the shared library.
    pub path: PathBuf,
    /// Declared accelerator class, checked against the library's own
    /// report after loading.
    pub class: AcceleratorClass,
    /// Entries can be parked without deleting them.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// A parsed backend manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendManifest {
    /// Listed backends, in file order.
    #[serde(rename = "backend", default)]
    pub backends: Vec<ManifestEntry>,
}

impl BackendManifest {
    /// Read and parse a manifest file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let manifest = Self::parse(&raw)
            .map_err(|e| LoaderError::Manifest(format!("{}: {e}", path.display())))?;
        debug!(
            path = %path.display(),
            backends = manifest.backends.len(),
            "loaded backend manifest"
        );
        Ok(manifest)
    }

    /// Parse manifest text.
    pub fn parse(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Entries that are not parked.
    pub fn enabled(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.backends.iter().filter(|entry| entry.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[[backend]]
name = "vendor-gpu"
path = "/opt/vendor/libvendor_gpu.so"
class = "discrete-gpu"

[[backend]]
name = "vendor-npu"
path = "/opt/vendor/libvendor_npu.so"
class = "npu"
enabled = false
"#;

    #[test]
    fn test_parse_entries() {
        let manifest = BackendManifest::parse(SAMPLE).unwrap();
        assert_eq!(manifest.backends.len(), 2);
        assert_eq!(manifest.backends[0].name, "vendor-gpu");
        assert_eq!(manifest.backends[0].class, AcceleratorClass::DiscreteGpu);
        assert!(manifest.backends[0].enabled);
        assert!(!manifest.backends[1].enabled);
    }

    #[test]
    fn test_enabled_filters_parked_entries() {
        let manifest = BackendManifest::parse(SAMPLE).unwrap();
        let enabled: Vec<_> = manifest.enabled().collect();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].name, "vendor-gpu");
    }

    #[test]
    fn test_parse_rejects_unknown_class() {
        let raw = r#"
[[backend]]
name = "x"
path = "/x.so"
class = "quantum"
"#;
        assert!(BackendManifest::parse(raw).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let manifest = BackendManifest::load(file.path()).unwrap();
        assert_eq!(manifest.backends.len(), 2);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = BackendManifest::load("/nonexistent/halo-backends.toml").unwrap_err();
        assert!(matches!(err, LoaderError::Io(_)));
    }

    #[test]
    fn test_load_bad_toml_names_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[[backend]\nname = ").unwrap();
        let err = BackendManifest::load(file.path()).unwrap_err();
        match err {
            LoaderError::Manifest(message) => {
                assert!(message.contains(&file.path().display().to_string()));
            }
            other => panic!("expected Manifest, got {other:?}"),
        }
    }
}
