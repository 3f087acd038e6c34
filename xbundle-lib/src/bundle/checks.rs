//! Advisory diagnostics for a selected chain.
//!
//! Nothing here fails a bundle. A chain that expires next week or carries a
//! SHA-1 intermediate is still deployable; the caller decides what to do
//! about the findings.

use super::{BundleOptions, Purpose};
use crate::check::{check_expiry, check_host};
use crate::fields::Certificate;
use crate::ubiquity::UbiquityScore;
use serde::Serialize;
use std::fmt;

use super::chain::ChainCandidate;

const SECONDS_PER_DAY: i64 = 86_400;

/// One advisory finding about the selected chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    Expired {
        depth: usize,
        subject: String,
        not_after: String,
    },
    NotYetValid {
        depth: usize,
        subject: String,
        not_before: String,
    },
    ExpiringSoon {
        depth: usize,
        subject: String,
        not_after: String,
        days_left: i64,
    },
    WeakSignature {
        depth: usize,
        subject: String,
        algorithm: String,
    },
    KeyUsage {
        depth: usize,
        subject: String,
        reason: String,
    },
    HostnameMismatch {
        hostname: String,
    },
    UntrustedRoot {
        subject: String,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Expired {
                depth,
                subject,
                not_after,
            } => write!(
                f,
                "certificate at depth {} ({}) expired at {}",
                depth, subject, not_after
            ),
            Diagnostic::NotYetValid {
                depth,
                subject,
                not_before,
            } => write!(
                f,
                "certificate at depth {} ({}) is not valid before {}",
                depth, subject, not_before
            ),
            Diagnostic::ExpiringSoon {
                depth,
                subject,
                not_after,
                days_left,
            } => write!(
                f,
                "certificate at depth {} ({}) expires at {} ({} days left)",
                depth, subject, not_after, days_left
            ),
            Diagnostic::WeakSignature {
                depth,
                subject,
                algorithm,
            } => write!(
                f,
                "certificate at depth {} ({}) is signed with weak algorithm {}",
                depth, subject, algorithm
            ),
            Diagnostic::KeyUsage {
                depth,
                subject,
                reason,
            } => write!(f, "certificate at depth {} ({}) {}", depth, subject, reason),
            Diagnostic::HostnameMismatch { hostname } => {
                write!(f, "leaf certificate does not match hostname {}", hostname)
            }
            Diagnostic::UntrustedRoot { subject } => {
                write!(f, "root {} is not trusted by any known platform", subject)
            }
        }
    }
}

/// Diagnostics plus the hostname verdict, when a hostname was requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub items: Vec<Diagnostic>,
    pub hostname_match: Option<bool>,
}

/// Inspect a selected chain.
pub fn diagnose(
    chain: &ChainCandidate,
    score: &UbiquityScore,
    options: &BundleOptions,
    hostname: Option<&str>,
    now: i64,
) -> Diagnostics {
    let mut items = Vec::new();

    check_chain_time_validity(chain, options, now, &mut items);
    check_chain_signatures(chain, &mut items);
    check_leaf_usage(chain.leaf(), options.purpose, &mut items);
    check_issuer_usage(chain, options.purpose, &mut items);

    let hostname_match = hostname.map(|host| {
        let matched = check_host(chain.leaf(), host);
        if !matched {
            items.push(Diagnostic::HostnameMismatch {
                hostname: host.to_string(),
            });
        }
        matched
    });

    if score.count == 0 {
        items.push(Diagnostic::UntrustedRoot {
            subject: chain.root().subject().to_oneline(),
        });
    }

    Diagnostics {
        items,
        hostname_match,
    }
}

fn check_chain_time_validity(
    chain: &ChainCandidate,
    options: &BundleOptions,
    now: i64,
    items: &mut Vec<Diagnostic>,
) {
    for (depth, cert) in chain.certificates().iter().enumerate() {
        let not_after = cert.not_after().timestamp;
        if now < cert.not_before().timestamp {
            items.push(Diagnostic::NotYetValid {
                depth,
                subject: cert.subject().to_oneline(),
                not_before: cert.not_before().iso8601.clone(),
            });
        }
        if now > not_after {
            items.push(Diagnostic::Expired {
                depth,
                subject: cert.subject().to_oneline(),
                not_after: cert.not_after().iso8601.clone(),
            });
        } else if !check_expiry(cert, now, options.expiry_window_secs) {
            items.push(Diagnostic::ExpiringSoon {
                depth,
                subject: cert.subject().to_oneline(),
                not_after: cert.not_after().iso8601.clone(),
                days_left: (not_after - now) / SECONDS_PER_DAY,
            });
        }
    }
}

/// The root's own signature is not relied on by relying parties, so a SHA-1
/// self-signature on a trust anchor is not reported.
fn check_chain_signatures(chain: &ChainCandidate, items: &mut Vec<Diagnostic>) {
    for (depth, cert) in chain.certificates().iter().enumerate() {
        if cert.is_self_signed() {
            continue;
        }
        let alg = cert.signature_algorithm();
        if alg.is_weak() {
            items.push(Diagnostic::WeakSignature {
                depth,
                subject: cert.subject().to_oneline(),
                algorithm: alg.name().to_string(),
            });
        }
    }
}

fn check_leaf_usage(leaf: &Certificate, purpose: Purpose, items: &mut Vec<Diagnostic>) {
    let mut finding = |reason: String| {
        items.push(Diagnostic::KeyUsage {
            depth: 0,
            subject: leaf.subject().to_oneline(),
            reason,
        })
    };
    if let Some(eku) = leaf.ext_key_usage() {
        if !purpose.allowed_by(eku) {
            finding(format!(
                "extended key usage does not permit {}",
                purpose.description()
            ));
        }
    }
    if let Some(ku) = leaf.key_usage() {
        if purpose != Purpose::Any
            && !ku.digital_signature
            && !ku.key_encipherment
            && !ku.key_agreement
        {
            finding("key usage permits neither signing nor key exchange".into());
        }
    }
}

fn check_issuer_usage(chain: &ChainCandidate, purpose: Purpose, items: &mut Vec<Diagnostic>) {
    for (depth, cert) in chain.certificates().iter().enumerate().skip(1) {
        let subject = || cert.subject().to_oneline();
        match cert.is_ca() {
            Some(false) => items.push(Diagnostic::KeyUsage {
                depth,
                subject: subject(),
                reason: "is used as an issuer but is not a CA".into(),
            }),
            None if !cert.is_self_signed() => items.push(Diagnostic::KeyUsage {
                depth,
                subject: subject(),
                reason: "is used as an issuer but has no basic constraints".into(),
            }),
            _ => {}
        }
        if cert.key_usage().is_some_and(|ku| !ku.key_cert_sign) {
            items.push(Diagnostic::KeyUsage {
                depth,
                subject: subject(),
                reason: "key usage lacks keyCertSign".into(),
            });
        }
        if let Some(eku) = cert.ext_key_usage() {
            if !purpose.allowed_by(eku) {
                items.push(Diagnostic::KeyUsage {
                    depth,
                    subject: subject(),
                    reason: format!(
                        "extended key usage constrains the chain away from {}",
                        purpose.description()
                    ),
                });
            }
        }
    }
}
