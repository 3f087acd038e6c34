//! Flavor-driven chain selection.

use super::chain::ChainCandidate;
use super::Flavor;
use crate::ubiquity::UbiquityScore;
use crate::BundleError;
use std::cmp::Ordering;

/// A candidate chain together with its ubiquity score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredChain {
    pub chain: ChainCandidate,
    pub score: UbiquityScore,
}

/// Pick one chain according to `flavor`.
///
/// - `Ubiquitous`: most trusting platforms, then shortest, then fingerprints.
/// - `Optimal`: trusted chains only; shortest, then most platforms, then
///   fingerprints.
/// - `Force`: any chain; shortest, then most platforms, then fingerprints.
///
/// The fingerprint comparison is lexical over the chain's hex fingerprints in
/// leaf-to-root order, which makes the order total: two distinct candidates
/// never compare equal.
pub fn select(candidates: Vec<ScoredChain>, flavor: Flavor) -> Result<ScoredChain, BundleError> {
    if candidates.is_empty() {
        return Err(BundleError::NoChainFound);
    }

    let eligible: Vec<ScoredChain> = if flavor.requires_trust() {
        candidates
            .into_iter()
            .filter(|c| c.score.count > 0)
            .collect()
    } else {
        candidates
    };

    let compare: fn(&ScoredChain, &ScoredChain) -> Ordering = match flavor {
        Flavor::Ubiquitous => |a, b| {
            b.score
                .count
                .cmp(&a.score.count)
                .then_with(|| a.chain.len().cmp(&b.chain.len()))
                .then_with(|| a.chain.fingerprints().cmp(&b.chain.fingerprints()))
        },
        Flavor::Optimal | Flavor::Force => |a, b| {
            a.chain
                .len()
                .cmp(&b.chain.len())
                .then_with(|| b.score.count.cmp(&a.score.count))
                .then_with(|| a.chain.fingerprints().cmp(&b.chain.fingerprints()))
        },
    };

    eligible
        .into_iter()
        .min_by(compare)
        .ok_or(BundleError::NoTrustedChain(flavor))
}
