//! Trust metadata loading.
//!
//! Metadata is a versioned JSON document naming each platform and the roots
//! it trusts, either inline as SHA-256 fingerprints or through a PEM keystore
//! file:
//!
//! ```json
//! {
//!   "version": 1,
//!   "platforms": [
//!     { "name": "Mozilla NSS", "keystore": "nss.pem" },
//!     { "name": "Android 14", "roots": ["3E:9F:...:A1"] }
//!   ]
//! }
//! ```
//!
//! Every entry is validated while loading; a malformed document never yields
//! a partially populated store.

use super::{TrustStore, TrustStoreBuilder};
use crate::parser::{decode_certificates, parse_certificate};
use crate::{BundleError, Fingerprint};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// The only metadata schema version this build understands.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MetadataDocument {
    version: u32,
    platforms: Vec<PlatformEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlatformEntry {
    name: String,
    #[serde(default)]
    roots: Vec<String>,
    #[serde(default)]
    keystore: Option<PathBuf>,
}

impl TrustStore {
    /// Build a store from JSON metadata.
    ///
    /// Relative keystore paths are resolved against `base_dir` (the current
    /// directory when `None`).
    pub fn from_metadata(json: &[u8], base_dir: Option<&Path>) -> Result<Self, BundleError> {
        let doc: MetadataDocument = serde_json::from_slice(json)
            .map_err(|e| BundleError::MetadataError(format!("malformed metadata: {}", e)))?;

        if doc.version != SCHEMA_VERSION {
            return Err(BundleError::MetadataError(format!(
                "unsupported metadata schema version {} (expected {})",
                doc.version, SCHEMA_VERSION
            )));
        }
        if doc.platforms.is_empty() {
            return Err(BundleError::MetadataError("no platforms defined".into()));
        }

        let mut builder = TrustStore::builder();
        for entry in &doc.platforms {
            builder = load_platform(builder, entry, base_dir)?;
        }
        let store = builder.build()?;
        tracing::debug!(platforms = store.platform_count(), "trust metadata loaded");
        Ok(store)
    }

    /// Read and parse a metadata file; keystores resolve next to it.
    pub fn from_metadata_file(path: &Path) -> Result<Self, BundleError> {
        let data = std::fs::read(path).map_err(|e| {
            BundleError::MetadataError(format!("{}: {}", path.display(), e))
        })?;
        Self::from_metadata(&data, path.parent())
    }
}

fn load_platform(
    mut builder: TrustStoreBuilder,
    entry: &PlatformEntry,
    base_dir: Option<&Path>,
) -> Result<TrustStoreBuilder, BundleError> {
    let name = entry.name.as_str();
    builder = builder.platform(name)?;

    for root in &entry.roots {
        let fp = Fingerprint::from_hex(root).ok_or_else(|| {
            BundleError::MetadataError(format!(
                "platform {:?}: {:?} is not a SHA-256 fingerprint",
                name, root
            ))
        })?;
        builder = builder.trust_fingerprint(name, fp)?;
    }

    if let Some(keystore) = &entry.keystore {
        let path = match base_dir {
            Some(dir) if keystore.is_relative() => dir.join(keystore),
            _ => keystore.clone(),
        };
        let data = std::fs::read(&path).map_err(|e| {
            BundleError::MetadataError(format!(
                "platform {:?}: keystore {}: {}",
                name,
                path.display(),
                e
            ))
        })?;
        let ders = decode_certificates(&data).map_err(|e| {
            BundleError::MetadataError(format!(
                "platform {:?}: keystore {}: {}",
                name,
                path.display(),
                e
            ))
        })?;
        for der in ders {
            match parse_certificate(&der) {
                Ok(cert) => builder = builder.trust_certificate(name, &cert)?,
                Err(e) => {
                    tracing::warn!(platform = name, error = %e, "skipping keystore entry")
                }
            }
        }
    }

    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FP_A: &str = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";
    const FP_B: &str = "FF:EE:DD:CC:BB:AA:99:88:77:66:55:44:33:22:11:00:FF:EE:DD:CC:BB:AA:99:88:77:66:55:44:33:22:11:00";

    #[test]
    fn loads_inline_fingerprints() -> Result<(), BundleError> {
        let json = format!(
            r#"{{"version":1,"platforms":[
                {{"name":"Mozilla","roots":["{FP_A}","{FP_B}"]}},
                {{"name":"Apple","roots":["{FP_A}"]}}
            ]}}"#
        );
        let store = TrustStore::from_metadata(json.as_bytes(), None)?;
        assert_eq!(store.platform_count(), 2);
        assert_eq!(store.root_count("Mozilla"), Some(2));
        assert_eq!(store.root_count("Apple"), Some(1));
        Ok(())
    }

    #[test]
    fn unknown_schema_version() {
        let json = format!(r#"{{"version":2,"platforms":[{{"name":"A","roots":["{FP_A}"]}}]}}"#);
        let err = TrustStore::from_metadata(json.as_bytes(), None).err();
        assert!(matches!(err, Some(BundleError::MetadataError(m)) if m.contains("version 2")));
    }

    #[test]
    fn malformed_json() {
        assert!(matches!(
            TrustStore::from_metadata(b"{not json", None),
            Err(BundleError::MetadataError(_))
        ));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let json = format!(
            r#"{{"version":1,"platforms":[{{"name":"A","roots":["{FP_A}"],"weight":3}}]}}"#
        );
        assert!(matches!(
            TrustStore::from_metadata(json.as_bytes(), None),
            Err(BundleError::MetadataError(_))
        ));
    }

    #[test]
    fn bad_fingerprint_is_rejected() {
        let json = r#"{"version":1,"platforms":[{"name":"A","roots":["abcd"]}]}"#;
        assert!(matches!(
            TrustStore::from_metadata(json.as_bytes(), None),
            Err(BundleError::MetadataError(m)) if m.contains("abcd")
        ));
    }

    #[test]
    fn missing_keystore_is_rejected() {
        let json = r#"{"version":1,"platforms":[{"name":"A","keystore":"/nonexistent/xbundle/roots.pem"}]}"#;
        assert!(matches!(
            TrustStore::from_metadata(json.as_bytes(), None),
            Err(BundleError::MetadataError(_))
        ));
    }

    #[test]
    fn platform_without_roots() {
        let json = r#"{"version":1,"platforms":[{"name":"A"}]}"#;
        assert!(matches!(
            TrustStore::from_metadata(json.as_bytes(), None),
            Err(BundleError::MetadataError(_))
        ));
    }

    #[test]
    fn empty_platform_list() {
        let json = r#"{"version":1,"platforms":[]}"#;
        assert!(matches!(
            TrustStore::from_metadata(json.as_bytes(), None),
            Err(BundleError::MetadataError(_))
        ));
    }
}
