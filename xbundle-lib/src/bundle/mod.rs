//! Bundling pipeline: parse, build, score, select, assemble.
//!
//! Every stage is synchronous and works only on data owned by the request
//! plus an immutable [`TrustStore`] snapshot. A failing stage ends the
//! request with its own error kind.

mod assemble;
mod chain;
mod checks;
mod select;

pub use assemble::{
    assemble, AssemblyContext, Bundle, ChainCertInfo, KeyStatus, LeafSummary, RootInfo,
};
pub use chain::{
    build_chains, build_chains_limited, ChainCandidate, DEFAULT_MAX_CANDIDATES, DEFAULT_MAX_DEPTH,
};
pub use checks::{diagnose, Diagnostic, Diagnostics};
pub use select::{select, ScoredChain};

use crate::check::unix_now;
use crate::fields::{Certificate, ExtKeyUsage};
use crate::fingerprint::Fingerprint;
use crate::key::PrivateKey;
use crate::parser::{decode_certificates, parse_certificate};
use crate::pool::CertificatePool;
use crate::ubiquity::{self, TrustRegistry, TrustStore};
use crate::BundleError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Default expiry warning window: 30 days.
pub const DEFAULT_EXPIRY_WINDOW_SECS: u64 = 30 * 86_400;

/// Chain selection policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    /// Prefer the chain trusted by the most platforms.
    #[default]
    Ubiquitous,
    /// Prefer the shortest trusted chain.
    Optimal,
    /// Prefer the shortest chain, trusted or not.
    Force,
}

impl Flavor {
    /// Whether the flavor refuses chains no platform trusts.
    pub fn requires_trust(&self) -> bool {
        matches!(self, Flavor::Ubiquitous | Flavor::Optimal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Flavor::Ubiquitous => "ubiquitous",
            Flavor::Optimal => "optimal",
            Flavor::Force => "force",
        }
    }
}

impl std::fmt::Display for Flavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Flavor {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ubiquitous" => Ok(Flavor::Ubiquitous),
            "optimal" => Ok(Flavor::Optimal),
            "force" => Ok(Flavor::Force),
            other => Err(BundleError::InvalidInput(format!(
                "unknown flavor {:?} (expected ubiquitous, optimal or force)",
                other
            ))),
        }
    }
}

/// What the leaf certificate will be used for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Purpose {
    #[default]
    ServerAuth,
    ClientAuth,
    Any,
}

impl Purpose {
    /// Whether an Extended Key Usage extension permits this purpose.
    pub fn allowed_by(&self, eku: &ExtKeyUsage) -> bool {
        match self {
            Purpose::Any => true,
            Purpose::ServerAuth => eku.any || eku.server_auth,
            Purpose::ClientAuth => eku.any || eku.client_auth,
        }
    }

    pub(crate) fn description(&self) -> &'static str {
        match self {
            Purpose::ServerAuth => "TLS server authentication",
            Purpose::ClientAuth => "TLS client authentication",
            Purpose::Any => "any purpose",
        }
    }
}

impl FromStr for Purpose {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server-auth" | "server" => Ok(Purpose::ServerAuth),
            "client-auth" | "client" => Ok(Purpose::ClientAuth),
            "any" => Ok(Purpose::Any),
            other => Err(BundleError::InvalidInput(format!(
                "unknown purpose {:?} (expected server-auth, client-auth or any)",
                other
            ))),
        }
    }
}

/// Tunables shared by every request of a [`Bundler`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BundleOptions {
    /// Maximum chain length, counting the leaf.
    pub max_depth: usize,
    /// Chains enumerated before the search falls back to one shortest chain
    /// per reachable root.
    pub max_candidates: usize,
    /// Certificates expiring within this many seconds are reported.
    pub expiry_window_secs: u64,
    pub purpose: Purpose,
    /// Evaluate validity at this Unix time instead of now.
    pub at_time: Option<i64>,
}

impl Default for BundleOptions {
    fn default() -> Self {
        BundleOptions {
            max_depth: DEFAULT_MAX_DEPTH,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            expiry_window_secs: DEFAULT_EXPIRY_WINDOW_SECS,
            purpose: Purpose::default(),
            at_time: None,
        }
    }
}

impl BundleOptions {
    /// Parse options from TOML. Missing keys take their defaults.
    pub fn from_toml(input: &str) -> Result<Self, BundleError> {
        let options: BundleOptions = toml::from_str(input)
            .map_err(|e| BundleError::InvalidInput(format!("invalid options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, BundleError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<(), BundleError> {
        if self.max_depth < 1 {
            return Err(BundleError::InvalidInput(
                "max_depth must be at least 1".into(),
            ));
        }
        if self.max_candidates < 1 {
            return Err(BundleError::InvalidInput(
                "max_candidates must be at least 1".into(),
            ));
        }
        Ok(())
    }

    fn now(&self) -> i64 {
        self.at_time.unwrap_or_else(unix_now)
    }
}

/// Where the leaf certificate comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertSource {
    /// One or more PEM `CERTIFICATE` blocks; the first is the leaf.
    Pem(Vec<u8>),
    /// DER certificate(s); the first is the leaf.
    Der(Vec<u8>),
    /// A chain harvested elsewhere (a TLS handshake, say), leaf first.
    Chain(Vec<Vec<u8>>),
}

impl CertSource {
    /// DER blobs, leaf first.
    fn decode(&self) -> Result<Vec<Vec<u8>>, BundleError> {
        let ders = match self {
            CertSource::Pem(data) | CertSource::Der(data) => {
                if data.iter().all(u8::is_ascii_whitespace) {
                    return Err(BundleError::InvalidInput("empty certificate input".into()));
                }
                decode_certificates(data)?
            }
            CertSource::Chain(list) => list.clone(),
        };
        if ders.is_empty() {
            return Err(BundleError::InvalidInput("empty certificate input".into()));
        }
        Ok(ders)
    }
}

/// One bundling request.
#[derive(Debug, Clone)]
pub struct BundleRequest {
    pub source: CertSource,
    pub key: Option<Vec<u8>>,
    pub intermediates: Vec<Vec<u8>>,
    pub roots: Vec<Vec<u8>>,
    pub flavor: Flavor,
    pub hostname: Option<String>,
}

impl BundleRequest {
    pub fn new(source: CertSource) -> Self {
        BundleRequest {
            source,
            key: None,
            intermediates: Vec::new(),
            roots: Vec::new(),
            flavor: Flavor::default(),
            hostname: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Add a PEM or DER blob of intermediate certificates.
    pub fn with_intermediates(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.intermediates.push(data.into());
        self
    }

    /// Add a PEM or DER blob of root certificates.
    pub fn with_roots(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.roots.push(data.into());
        self
    }

    pub fn with_flavor(mut self, flavor: Flavor) -> Self {
        self.flavor = flavor;
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }
}

/// Bundle one request against an explicit trust store.
pub fn build_bundle(
    request: &BundleRequest,
    store: &TrustStore,
    options: &BundleOptions,
) -> Result<Bundle, BundleError> {
    run(request, store, options, &CertificatePool::new())
}

/// Long-lived bundling service.
///
/// Holds the shared trust registry and certificate pools that every request
/// may draw on (typically the system CA bundle). Requests may run
/// concurrently; each works on its own pool and a registry snapshot.
#[derive(Debug)]
pub struct Bundler {
    registry: Arc<TrustRegistry>,
    options: BundleOptions,
    base: CertificatePool,
}

impl Bundler {
    pub fn new(registry: Arc<TrustRegistry>, options: BundleOptions) -> Result<Self, BundleError> {
        options.validate()?;
        Ok(Bundler {
            registry,
            options,
            base: CertificatePool::new(),
        })
    }

    /// Make the certificates in a PEM or DER blob available to every
    /// request. Returns how many were new.
    pub fn add_certificates(&mut self, data: &[u8]) -> Result<usize, BundleError> {
        self.base.add_bundle(data)
    }

    pub fn options(&self) -> &BundleOptions {
        &self.options
    }

    pub fn registry(&self) -> &Arc<TrustRegistry> {
        &self.registry
    }

    pub fn bundle(&self, request: &BundleRequest) -> Result<Bundle, BundleError> {
        let store = self.registry.snapshot();
        run(request, &store, &self.options, &self.base)
    }
}

fn run(
    request: &BundleRequest,
    store: &TrustStore,
    options: &BundleOptions,
    base: &CertificatePool,
) -> Result<Bundle, BundleError> {
    options.validate()?;
    let hostname = match request.hostname.as_deref().map(str::trim) {
        Some("") => return Err(BundleError::InvalidInput("empty hostname".into())),
        other => other,
    };

    // Parse
    let supplied: Vec<Arc<Certificate>> = request
        .source
        .decode()?
        .iter()
        .map(|der| parse_certificate(der).map(Arc::new))
        .collect::<Result<_, _>>()?;
    let Some((leaf, extra)) = supplied.split_first() else {
        return Err(BundleError::InvalidInput("empty certificate input".into()));
    };
    let key = request
        .key
        .as_deref()
        .map(PrivateKey::from_bytes)
        .transpose()?;

    let mut pool = CertificatePool::new();
    for cert in base.iter() {
        pool.add(Arc::clone(cert));
    }
    for cert in extra {
        pool.add(Arc::clone(cert));
    }
    for blob in request.intermediates.iter().chain(&request.roots) {
        pool.add_bundle(blob)?;
    }
    tracing::debug!(
        leaf = %leaf.fingerprint(),
        pool = pool.len(),
        "request parsed"
    );

    // Build
    let candidates = build_chains_limited(
        Arc::clone(leaf),
        &pool,
        options.max_depth,
        options.max_candidates,
    );
    if candidates.is_empty() {
        return Err(BundleError::NoChainFound);
    }

    // Score
    let scored: Vec<ScoredChain> = candidates
        .into_iter()
        .map(|chain| {
            let score = ubiquity::score(&chain, store);
            ScoredChain { chain, score }
        })
        .collect();

    // Select
    let selected = select(scored, request.flavor)?;
    tracing::debug!(
        flavor = %request.flavor,
        length = selected.chain.len(),
        ubiquity = selected.score.count,
        "chain selected"
    );

    // Assemble
    let diagnostics = diagnose(
        &selected.chain,
        &selected.score,
        options,
        hostname,
        options.now(),
    );
    let supplied_fps: Vec<Fingerprint> = supplied.iter().map(|c| c.fingerprint()).collect();
    let ctx = AssemblyContext {
        flavor: request.flavor,
        hostname,
        store,
        supplied: &supplied_fps,
    };
    assemble(selected, diagnostics, key.as_ref(), &ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flavor_parsing() {
        assert_eq!("Optimal".parse::<Flavor>().ok(), Some(Flavor::Optimal));
        assert_eq!(" force ".parse::<Flavor>().ok(), Some(Flavor::Force));
        assert!(matches!(
            "best".parse::<Flavor>(),
            Err(BundleError::InvalidInput(_))
        ));
        assert_eq!(Flavor::default(), Flavor::Ubiquitous);
        assert!(!Flavor::Force.requires_trust());
    }

    #[test]
    fn purpose_against_eku() {
        let eku = ExtKeyUsage {
            client_auth: true,
            ..Default::default()
        };
        assert!(!Purpose::ServerAuth.allowed_by(&eku));
        assert!(Purpose::ClientAuth.allowed_by(&eku));
        assert!(Purpose::Any.allowed_by(&eku));
        let any = ExtKeyUsage {
            any: true,
            ..Default::default()
        };
        assert!(Purpose::ServerAuth.allowed_by(&any));
    }

    #[test]
    fn options_from_toml() -> Result<(), BundleError> {
        let options = BundleOptions::from_toml(
            "max_depth = 4\npurpose = \"client-auth\"\nexpiry_window_secs = 3600\n",
        )?;
        assert_eq!(options.max_depth, 4);
        assert_eq!(options.purpose, Purpose::ClientAuth);
        assert_eq!(options.expiry_window_secs, 3600);
        assert_eq!(options.at_time, None);
        assert_eq!(options.max_candidates, DEFAULT_MAX_CANDIDATES);

        assert_eq!(BundleOptions::from_toml("")?, BundleOptions::default());
        Ok(())
    }

    #[test]
    fn options_reject_bad_values() {
        assert!(matches!(
            BundleOptions::from_toml("max_depth = 0"),
            Err(BundleError::InvalidInput(_))
        ));
        assert!(matches!(
            BundleOptions::from_toml("max_candidates = 0"),
            Err(BundleError::InvalidInput(_))
        ));
        assert!(matches!(
            BundleOptions::from_toml("depth = 3"),
            Err(BundleError::InvalidInput(_))
        ));
    }

    #[test]
    fn empty_sources_are_invalid_input() {
        let store = TrustStore::empty();
        let options = BundleOptions::default();
        for source in [
            CertSource::Pem(b"  \n".to_vec()),
            CertSource::Der(Vec::new()),
            CertSource::Chain(Vec::new()),
        ] {
            let result = build_bundle(&BundleRequest::new(source), &store, &options);
            assert!(matches!(result, Err(BundleError::InvalidInput(_))));
        }
    }

    #[test]
    fn garbage_source_is_parse_error() {
        let result = build_bundle(
            &BundleRequest::new(CertSource::Chain(vec![vec![0x30, 0x03, 0x02, 0x01]])),
            &TrustStore::empty(),
            &BundleOptions::default(),
        );
        assert!(matches!(result, Err(BundleError::ParseError(_))));
    }
}
