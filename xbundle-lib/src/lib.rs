//! xbundle-lib: Library for building deployable X.509 certificate bundles.
//!
//! Given a leaf certificate and pools of intermediates and roots, finds every
//! verified chain to a self-signed root, scores each chain by how many
//! platforms trust its root, picks one according to a bundling flavor, and
//! reports diagnostics about the result.

mod bundle;
mod check;
mod display;
mod fields;
mod fingerprint;
mod key;
mod oid;
mod parser;
mod pool;
pub mod ubiquity;
mod util;

pub use bundle::{
    assemble, build_bundle, build_chains, build_chains_limited, diagnose, select,
    AssemblyContext, Bundle, BundleOptions, BundleRequest, Bundler, CertSource, ChainCandidate,
    ChainCertInfo, Diagnostic, Diagnostics, Flavor, KeyStatus, LeafSummary, Purpose, RootInfo, ScoredChain,
    DEFAULT_EXPIRY_WINDOW_SECS, DEFAULT_MAX_CANDIDATES, DEFAULT_MAX_DEPTH,
};
pub use check::{check_expiry, check_host};
pub use display::{display_text, to_json};
pub use fields::{
    Certificate, DateTime, DistinguishedName, ExtKeyUsage, KeyAlgorithm, KeyUsage, PublicKeyInfo,
    SanEntry, SignatureAlgorithm,
};
pub use fingerprint::Fingerprint;
pub use key::PrivateKey;
pub use parser::{decode_certificates, parse_certificate, parse_pem_chain};
pub use pool::{find_system_ca_bundle, CertificatePool};
pub use ubiquity::{score, TrustRegistry, TrustStore, TrustStoreBuilder, UbiquityScore};

/// Errors returned by xbundle-lib.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("Failed to parse certificate: {0}")]
    ParseError(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid trust metadata: {0}")]
    MetadataError(String),

    #[error("No chain from the leaf to a self-signed root")]
    NoChainFound,

    #[error("No chain trusted by any platform satisfies flavor {0}")]
    NoTrustedChain(Flavor),

    #[error("Private key does not match the leaf certificate")]
    KeyMismatch,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BundleError {
    /// Taxonomy name of the error, stable for scripts and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            BundleError::ParseError(_) => "ParseError",
            BundleError::UnsupportedAlgorithm(_) => "UnsupportedAlgorithm",
            BundleError::MetadataError(_) => "MetadataError",
            BundleError::NoChainFound => "NoChainFound",
            BundleError::NoTrustedChain(_) => "NoTrustedChain",
            BundleError::KeyMismatch => "KeyMismatch",
            BundleError::InvalidInput(_) => "InvalidInput",
            BundleError::Io(_) => "Io",
            BundleError::Json(_) => "Json",
        }
    }
}
