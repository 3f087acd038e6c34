//! Composition of the final [`Bundle`].

use super::checks::{Diagnostic, Diagnostics};
use super::select::ScoredChain;
use super::Flavor;
use crate::fields::{Certificate, DateTime, SignatureAlgorithm};
use crate::fingerprint::Fingerprint;
use crate::key::PrivateKey;
use crate::ubiquity::{TrustStore, UbiquityScore};
use crate::BundleError;
use serde::Serialize;
use std::sync::Arc;

/// Whether a private key accompanied the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    NotSupplied,
    Matched,
}

/// One certificate of the selected chain, as reported.
#[derive(Debug, Clone, Serialize)]
pub struct ChainCertInfo {
    pub depth: usize,
    pub subject: String,
    pub issuer: String,
    pub short_name: String,
    pub serial: String,
    pub fingerprint: Fingerprint,
    pub not_after: DateTime,
    pub signature_algorithm: SignatureAlgorithm,
}

impl ChainCertInfo {
    fn new(depth: usize, cert: &Certificate) -> Self {
        ChainCertInfo {
            depth,
            subject: cert.subject().to_oneline(),
            issuer: cert.issuer().to_oneline(),
            short_name: cert.short_name(),
            serial: cert.serial().to_string(),
            fingerprint: cert.fingerprint(),
            not_after: cert.not_after().clone(),
            signature_algorithm: cert.signature_algorithm(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RootInfo {
    pub subject: String,
    pub fingerprint: Fingerprint,
}

/// Summary of the leaf certificate.
#[derive(Debug, Clone, Serialize)]
pub struct LeafSummary {
    pub subject: String,
    pub issuer: String,
    pub serial: String,
    pub key_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_size: Option<u32>,
    pub signature_algorithm: SignatureAlgorithm,
    pub expires: DateTime,
    pub hostnames: Vec<String>,
    pub ocsp_urls: Vec<String>,
}

/// A deployable certificate bundle.
#[derive(Debug, Clone, Serialize)]
pub struct Bundle {
    pub flavor: Flavor,
    pub leaf: LeafSummary,
    pub chain: Vec<ChainCertInfo>,
    /// Leaf plus intermediates; the root is not sent by servers.
    pub bundle_pem: String,
    pub root_pem: String,
    pub root: RootInfo,
    pub ubiquity: UbiquityScore,
    pub untrusted_platforms: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub key_status: KeyStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname_match: Option<bool>,
    /// Earliest expiry across the whole chain.
    pub expires: DateTime,
    /// Whether the deployable chain differs from what came with the leaf.
    pub rebundled: bool,
    #[serde(skip)]
    certs: Vec<Arc<Certificate>>,
}

impl Bundle {
    /// Certificates of the selected chain, leaf first.
    pub fn certificates(&self) -> &[Arc<Certificate>] {
        &self.certs
    }

    /// Fingerprints of the selected chain, leaf first.
    pub fn fingerprints(&self) -> Vec<Fingerprint> {
        self.chain.iter().map(|c| c.fingerprint).collect()
    }

    /// Whether the root is trusted by at least one platform.
    pub fn is_trusted(&self) -> bool {
        self.ubiquity.count > 0
    }
}

/// Request facts the assembler needs besides the chain itself.
pub struct AssemblyContext<'a> {
    pub flavor: Flavor,
    pub hostname: Option<&'a str>,
    pub store: &'a TrustStore,
    /// Fingerprints of the leaf and any certificates supplied alongside it.
    pub supplied: &'a [Fingerprint],
}

/// Build the output entity, checking the key against the leaf first.
pub fn assemble(
    selected: ScoredChain,
    diagnostics: Diagnostics,
    key: Option<&PrivateKey>,
    ctx: &AssemblyContext<'_>,
) -> Result<Bundle, BundleError> {
    let ScoredChain { chain, score } = selected;
    let leaf = chain.leaf();

    let key_status = match key {
        None => KeyStatus::NotSupplied,
        Some(k) if k.matches(leaf) => KeyStatus::Matched,
        Some(_) => return Err(BundleError::KeyMismatch),
    };

    let certs = chain.certificates().to_vec();
    let root = chain.root();

    // A self-signed leaf is its own deployable bundle.
    let deployable: &[Arc<Certificate>] = match certs.split_last() {
        Some((_, rest)) if !rest.is_empty() => rest,
        _ => &certs,
    };
    let bundle_pem: String = deployable.iter().map(|c| c.to_pem()).collect();
    let deployed: Vec<Fingerprint> = deployable.iter().map(|c| c.fingerprint()).collect();
    let rebundled = deployed.as_slice() != ctx.supplied;

    let untrusted_platforms = ctx
        .store
        .platform_names()
        .filter(|p| !score.platforms.iter().any(|t| t == p))
        .map(str::to_string)
        .collect();

    let expires = certs
        .iter()
        .map(|c| c.not_after())
        .min_by_key(|d| d.timestamp)
        .unwrap_or_else(|| leaf.not_after())
        .clone();

    let leaf_summary = LeafSummary {
        subject: leaf.subject().to_oneline(),
        issuer: leaf.issuer().to_oneline(),
        serial: leaf.serial().to_string(),
        key_type: leaf.public_key().algorithm.name(),
        key_size: leaf.public_key().key_size,
        signature_algorithm: leaf.signature_algorithm(),
        expires: leaf.not_after().clone(),
        hostnames: leaf.dns_names(),
        ocsp_urls: leaf.ocsp_urls().to_vec(),
    };

    tracing::debug!(
        length = certs.len(),
        ubiquity = score.count,
        diagnostics = diagnostics.items.len(),
        rebundled,
        "bundle assembled"
    );

    Ok(Bundle {
        flavor: ctx.flavor,
        leaf: leaf_summary,
        chain: certs
            .iter()
            .enumerate()
            .map(|(depth, c)| ChainCertInfo::new(depth, c))
            .collect(),
        bundle_pem,
        root_pem: root.to_pem(),
        root: RootInfo {
            subject: root.subject().to_oneline(),
            fingerprint: root.fingerprint(),
        },
        ubiquity: score,
        untrusted_platforms,
        diagnostics: diagnostics.items,
        key_status,
        hostname: ctx.hostname.map(str::to_string),
        hostname_match: diagnostics.hostname_match,
        expires,
        rebundled,
        certs,
    })
}
