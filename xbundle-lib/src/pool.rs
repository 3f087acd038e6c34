//! Request-scoped certificate pools.
//!
//! A [`CertificatePool`] holds the intermediates and roots supplied with one
//! bundling request. Nodes are addressed by fingerprint so the same
//! certificate supplied twice (in the leaf file and in an intermediate
//! bundle, say) is one node. Lookups go through the raw subject name and the
//! Subject Key Identifier.

use crate::fields::Certificate;
use crate::fingerprint::Fingerprint;
use crate::parser::{decode_certificates, parse_certificate};
use crate::BundleError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Well-known CA bundle file paths, in order of preference.
pub(crate) const KNOWN_CA_BUNDLE_PATHS: &[&str] = &[
    "/etc/ssl/certs/ca-certificates.crt", // Debian/Ubuntu
    "/etc/pki/tls/certs/ca-bundle.crt",   // RHEL/CentOS/Fedora
    "/etc/ssl/ca-bundle.pem",             // openSUSE
    "/etc/ssl/cert.pem",                  // macOS, Alpine
];

/// Certificates available as issuers during one bundling request.
#[derive(Default)]
pub struct CertificatePool {
    certs: HashMap<Fingerprint, Arc<Certificate>>,
    /// Insertion order, so lookups are reproducible.
    order: Vec<Fingerprint>,
    by_subject: HashMap<Vec<u8>, Vec<Fingerprint>>,
    by_key_id: HashMap<Vec<u8>, Vec<Fingerprint>>,
}

impl std::fmt::Debug for CertificatePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificatePool")
            .field("count", &self.len())
            .finish()
    }
}

impl CertificatePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parsed certificate. Returns `false` if it was already present.
    pub fn add(&mut self, cert: Arc<Certificate>) -> bool {
        let fp = cert.fingerprint();
        if self.certs.contains_key(&fp) {
            return false;
        }
        self.by_subject
            .entry(cert.raw_subject().to_vec())
            .or_default()
            .push(fp);
        if let Some(ski) = cert.subject_key_id() {
            self.by_key_id.entry(ski.to_vec()).or_default().push(fp);
        }
        self.order.push(fp);
        self.certs.insert(fp, cert);
        true
    }

    /// Decode and add every certificate in a PEM or DER blob.
    ///
    /// Individual certificates that fail to parse are skipped with a warning,
    /// since CA bundles routinely carry entries with exotic algorithms.
    /// Returns the number of certificates added.
    pub fn add_bundle(&mut self, data: &[u8]) -> Result<usize, BundleError> {
        let mut added = 0;
        for der in decode_certificates(data)? {
            match parse_certificate(&der) {
                Ok(cert) => {
                    if self.add(Arc::new(cert)) {
                        added += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unusable pool certificate");
                }
            }
        }
        Ok(added)
    }

    pub fn get(&self, fp: &Fingerprint) -> Option<&Arc<Certificate>> {
        self.certs.get(fp)
    }

    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.certs.contains_key(fp)
    }

    /// Certificates whose name and key identifier make them plausible issuers
    /// of `child`. Signatures are not checked here.
    ///
    /// When `child` carries an Authority Key Identifier, certificates indexed
    /// under that key id come first, followed by same-name certificates that
    /// have no Subject Key Identifier at all.
    pub fn issuer_candidates(&self, child: &Certificate) -> Vec<Arc<Certificate>> {
        let mut out: Vec<Arc<Certificate>> = Vec::new();
        if let Some(aki) = child.authority_key_id() {
            if let Some(fps) = self.by_key_id.get(aki) {
                out.extend(
                    fps.iter()
                        .filter_map(|fp| self.certs.get(fp))
                        .filter(|c| child.names_issuer(c))
                        .cloned(),
                );
            }
        }
        if let Some(fps) = self.by_subject.get(child.raw_issuer()) {
            for cert in fps.iter().filter_map(|fp| self.certs.get(fp)) {
                let seen = out.iter().any(|c| c.fingerprint() == cert.fingerprint());
                if !seen && child.names_issuer(cert) {
                    out.push(Arc::clone(cert));
                }
            }
        }
        out
    }

    /// Iterate over certificates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Certificate>> {
        self.order.iter().filter_map(|fp| self.certs.get(fp))
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }
}

/// Find the system CA bundle path (same location OpenSSL uses).
///
/// Checks, in order:
/// 1. `SSL_CERT_FILE` environment variable
/// 2. Path discovered by `openssl-probe`
/// 3. Well-known bundle file paths ([`KNOWN_CA_BUNDLE_PATHS`])
pub fn find_system_ca_bundle() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("SSL_CERT_FILE") {
        let p = PathBuf::from(&path);
        if p.exists() {
            return Some(p);
        }
    }

    let probe = openssl_probe::probe();
    if let Some(file) = probe.cert_file {
        let path = PathBuf::from(&file);
        if path.exists() {
            return Some(path);
        }
    }

    KNOWN_CA_BUNDLE_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}
