//! Certificate chain building via DFS path enumeration.
//!
//! Given a leaf certificate and a pool of intermediates and roots, finds
//! every chain that climbs from the leaf to a self-signed certificate. Cross
//! signed CAs make the issuer graph a DAG with diamonds, so one leaf can have
//! several complete chains; all of them are returned for scoring.
//!
//! Densely cross-signed pools have exponentially many paths. The exhaustive
//! search stops after `max_candidates` chains (or a step budget derived from
//! it); a truncated search is topped up with the shortest chain to every
//! reachable root, found breadth-first over certificates rather than paths.

use crate::fields::Certificate;
use crate::fingerprint::Fingerprint;
use crate::pool::CertificatePool;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Default maximum chain length, counting the leaf.
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Default cap on chains kept by the exhaustive search.
pub const DEFAULT_MAX_CANDIDATES: usize = 256;

/// Search steps allowed per retained candidate.
const STEPS_PER_CANDIDATE: usize = 64;

/// A complete chain from a leaf to a self-signed root.
///
/// Every adjacent pair is a verified issuer link and no CA (subject and key)
/// appears twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainCandidate {
    certs: Vec<Arc<Certificate>>,
}

impl ChainCandidate {
    #[allow(clippy::indexing_slicing)] // never empty: chains start at the leaf and only grow
    pub fn leaf(&self) -> &Certificate {
        &self.certs[0]
    }

    /// The terminal self-signed certificate.
    #[allow(clippy::indexing_slicing)] // never empty, see `leaf`
    pub fn root(&self) -> &Certificate {
        &self.certs[self.certs.len() - 1]
    }

    /// Certificates in leaf-to-root order.
    pub fn certificates(&self) -> &[Arc<Certificate>] {
        &self.certs
    }

    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    /// Fingerprints in leaf-to-root order; the final tie-break key.
    pub fn fingerprints(&self) -> Vec<Fingerprint> {
        self.certs.iter().map(|c| c.fingerprint()).collect()
    }
}

/// Enumerate chains from `leaf` to a self-signed certificate in `pool`.
///
/// A self-signed leaf is returned as a chain of length one. Paths longer than
/// `max_depth` certificates are abandoned, as are dead ends. An empty result
/// means the pool holds no usable issuer path. Uses
/// [`DEFAULT_MAX_CANDIDATES`]; see [`build_chains_limited`].
pub fn build_chains(
    leaf: Arc<Certificate>,
    pool: &CertificatePool,
    max_depth: usize,
) -> Vec<ChainCandidate> {
    build_chains_limited(leaf, pool, max_depth, DEFAULT_MAX_CANDIDATES)
}

/// Like [`build_chains`] with an explicit cap on exhaustive enumeration.
///
/// Below the cap every chain is returned. Past it, the result holds the
/// chains enumerated so far plus, for each reachable root, a shortest chain
/// to it, so the result never exceeds `max_candidates` plus the number of
/// roots in the pool.
pub fn build_chains_limited(
    leaf: Arc<Certificate>,
    pool: &CertificatePool,
    max_depth: usize,
    max_candidates: usize,
) -> Vec<ChainCandidate> {
    let mut search = ChainSearch {
        pool,
        max_depth,
        max_candidates,
        steps_left: max_candidates.saturating_mul(STEPS_PER_CANDIDATE),
        truncated: false,
        links: HashMap::new(),
        found: Vec::new(),
    };
    let mut path = vec![Arc::clone(&leaf)];
    search.extend(&mut path);

    if search.truncated {
        let mut seen: HashSet<Vec<Fingerprint>> =
            search.found.iter().map(ChainCandidate::fingerprints).collect();
        let shortest = search.shortest_per_root(leaf);
        let before = search.found.len();
        for chain in shortest {
            if seen.insert(chain.fingerprints()) {
                search.found.push(chain);
            }
        }
        tracing::warn!(
            enumerated = before,
            added = search.found.len() - before,
            max_candidates,
            "chain search truncated; kept shortest chain per root"
        );
    }

    tracing::debug!(
        candidates = search.found.len(),
        link_checks = search.links.len(),
        "chain search finished"
    );
    search.found
}

struct ChainSearch<'a> {
    pool: &'a CertificatePool,
    max_depth: usize,
    max_candidates: usize,
    steps_left: usize,
    truncated: bool,
    /// Signature results keyed by (child, issuer); each link is verified once
    /// per request no matter how many paths cross it.
    links: HashMap<(Fingerprint, Fingerprint), bool>,
    found: Vec<ChainCandidate>,
}

impl ChainSearch<'_> {
    fn extend(&mut self, path: &mut Vec<Arc<Certificate>>) {
        if self.truncated {
            return;
        }
        if self.steps_left == 0 || self.found.len() >= self.max_candidates {
            self.truncated = true;
            return;
        }
        self.steps_left -= 1;

        let Some(current) = path.last().cloned() else {
            return;
        };

        if current.is_self_signed() {
            self.found.push(ChainCandidate {
                certs: path.clone(),
            });
            return;
        }

        if path.len() >= self.max_depth {
            tracing::trace!(depth = path.len(), "depth limit reached");
            return;
        }

        for issuer in self.pool.issuer_candidates(&current) {
            if path.iter().any(|c| c.same_entity(&issuer)) {
                continue;
            }
            if !self.link_verifies(&current, &issuer) {
                continue;
            }
            tracing::trace!(
                child = %current.fingerprint(),
                issuer = %issuer.fingerprint(),
                "following issuer link"
            );
            path.push(issuer);
            self.extend(path);
            path.pop();
        }
    }

    /// Breadth-first search over certificates: each certificate is expanded
    /// once, at its shortest distance from the leaf.
    fn shortest_per_root(&mut self, leaf: Arc<Certificate>) -> Vec<ChainCandidate> {
        let mut parent: HashMap<Fingerprint, Arc<Certificate>> = HashMap::new();
        let mut visited: HashSet<Fingerprint> = HashSet::from([leaf.fingerprint()]);
        let mut queue = VecDeque::from([(Arc::clone(&leaf), 1usize)]);
        let mut roots = Vec::new();

        while let Some((current, depth)) = queue.pop_front() {
            if current.is_self_signed() {
                roots.push(current);
                continue;
            }
            if depth >= self.max_depth {
                continue;
            }
            for issuer in self.pool.issuer_candidates(&current) {
                if visited.contains(&issuer.fingerprint())
                    || !self.link_verifies(&current, &issuer)
                {
                    continue;
                }
                visited.insert(issuer.fingerprint());
                parent.insert(issuer.fingerprint(), Arc::clone(&current));
                queue.push_back((issuer, depth + 1));
            }
        }

        roots
            .into_iter()
            .filter_map(|root| {
                let mut certs = vec![Arc::clone(&root)];
                while let Some(child) = certs.last().and_then(|c| parent.get(&c.fingerprint())) {
                    certs.push(Arc::clone(child));
                }
                certs.reverse();
                // A path through two copies of one CA is not a chain.
                let repeats = certs
                    .iter()
                    .enumerate()
                    .any(|(i, a)| certs.iter().skip(i + 1).any(|b| a.same_entity(b)));
                (!repeats).then_some(ChainCandidate { certs })
            })
            .collect()
    }

    fn link_verifies(&mut self, child: &Certificate, issuer: &Certificate) -> bool {
        *self
            .links
            .entry((child.fingerprint(), issuer.fingerprint()))
            .or_insert_with(|| child.is_signed_by(issuer))
    }
}
