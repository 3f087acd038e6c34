//! Cross-platform trust ("ubiquity") of certificate chains.
//!
//! A [`TrustStore`] records which platforms (operating systems, browsers,
//! runtimes) trust which roots. It is built once, validated eagerly, and
//! never mutated; [`TrustRegistry`] shares it between concurrent requests and
//! swaps in replacements atomically.

mod metadata;
mod registry;

pub use metadata::SCHEMA_VERSION;
pub use registry::TrustRegistry;

use crate::bundle::ChainCandidate;
use crate::fields::Certificate;
use crate::fingerprint::Fingerprint;
use crate::BundleError;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Subject plus public key bits of a root, used to recognize re-encoded or
/// re-issued copies of a trusted root. The Subject Key Identifier is not
/// used: it is chosen by the issuer and proves nothing about the key.
type NameKey = (Vec<u8>, Vec<u8>);

fn name_key(cert: &Certificate) -> NameKey {
    (cert.raw_subject().to_vec(), cert.public_key().raw.clone())
}

/// Which roots each platform trusts.
#[derive(Default)]
pub struct TrustStore {
    platforms: BTreeMap<String, usize>,
    by_fingerprint: HashMap<Fingerprint, BTreeSet<String>>,
    by_name_key: HashMap<NameKey, BTreeSet<String>>,
}

impl std::fmt::Debug for TrustStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustStore")
            .field("platforms", &self.platforms)
            .finish()
    }
}

impl TrustStore {
    /// A store with no platforms. Every chain scores zero against it.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> TrustStoreBuilder {
        TrustStoreBuilder::default()
    }

    /// A single-platform store trusting every self-signed certificate among
    /// `certs`. Used when no metadata is configured and the CA bundle itself
    /// is the only notion of trust.
    pub fn from_roots<'a>(
        platform: &str,
        certs: impl IntoIterator<Item = &'a Certificate>,
    ) -> Result<Self, BundleError> {
        let mut builder = TrustStore::builder().platform(platform)?;
        for cert in certs.into_iter().filter(|c| c.is_self_signed()) {
            builder = builder.trust_certificate(platform, cert)?;
        }
        builder.build()
    }

    /// Platforms that trust `root`, in lexical order.
    ///
    /// Unknown roots yield the empty set.
    pub fn platforms_trusting(&self, root: &Certificate) -> BTreeSet<String> {
        let mut out = self
            .by_fingerprint
            .get(&root.fingerprint())
            .cloned()
            .unwrap_or_default();
        if let Some(platforms) = self.by_name_key.get(&name_key(root)) {
            out.extend(platforms.iter().cloned());
        }
        out
    }

    /// Platform identifiers in lexical order.
    pub fn platform_names(&self) -> impl Iterator<Item = &str> {
        self.platforms.keys().map(String::as_str)
    }

    /// Number of root identities registered for a platform.
    pub fn root_count(&self, platform: &str) -> Option<usize> {
        self.platforms.get(platform).copied()
    }

    pub fn platform_count(&self) -> usize {
        self.platforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }
}

/// Incremental construction of a [`TrustStore`].
#[derive(Default)]
pub struct TrustStoreBuilder {
    store: TrustStore,
}

impl TrustStoreBuilder {
    /// Declare a platform. Names must be non-empty and unique.
    pub fn platform(mut self, name: &str) -> Result<Self, BundleError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BundleError::MetadataError("empty platform name".into()));
        }
        if self.store.platforms.contains_key(name) {
            return Err(BundleError::MetadataError(format!(
                "duplicate platform {:?}",
                name
            )));
        }
        self.store.platforms.insert(name.to_string(), 0);
        Ok(self)
    }

    /// Record that `platform` trusts the root with this fingerprint.
    pub fn trust_fingerprint(mut self, platform: &str, fp: Fingerprint) -> Result<Self, BundleError> {
        let name = self.known(platform)?;
        let inserted = self
            .store
            .by_fingerprint
            .entry(fp)
            .or_default()
            .insert(name.clone());
        if inserted {
            if let Some(count) = self.store.platforms.get_mut(&name) {
                *count += 1;
            }
        }
        Ok(self)
    }

    /// Record that `platform` trusts this root certificate, by fingerprint and
    /// by subject plus public key.
    pub fn trust_certificate(self, platform: &str, root: &Certificate) -> Result<Self, BundleError> {
        let mut this = self.trust_fingerprint(platform, root.fingerprint())?;
        let name = this.known(platform)?;
        this.store
            .by_name_key
            .entry(name_key(root))
            .or_default()
            .insert(name);
        Ok(this)
    }

    fn known(&self, platform: &str) -> Result<String, BundleError> {
        let name = platform.trim();
        if self.store.platforms.contains_key(name) {
            Ok(name.to_string())
        } else {
            Err(BundleError::MetadataError(format!(
                "unknown platform {:?}",
                platform
            )))
        }
    }

    /// Finish the store, rejecting platforms that trust nothing.
    pub fn build(self) -> Result<TrustStore, BundleError> {
        if let Some((name, _)) = self.store.platforms.iter().find(|(_, n)| **n == 0) {
            return Err(BundleError::MetadataError(format!(
                "platform {:?} lists no trusted roots",
                name
            )));
        }
        Ok(self.store)
    }
}

/// How widely a chain's root is trusted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UbiquityScore {
    /// Number of platforms trusting the root.
    pub count: usize,
    /// Those platforms, in lexical order.
    pub platforms: Vec<String>,
}

/// Score a candidate chain by the platforms that trust its root.
pub fn score(candidate: &ChainCandidate, store: &TrustStore) -> UbiquityScore {
    let platforms: Vec<String> = store
        .platforms_trusting(candidate.root())
        .into_iter()
        .collect();
    UbiquityScore {
        count: platforms.len(),
        platforms,
    }
}
