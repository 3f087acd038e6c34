#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Chain building and selection properties.

mod common;

use common::*;
use std::collections::HashSet;
use xbundle_lib::*;

fn pool_of(certs: &[&TestCert]) -> CertificatePool {
    let mut pool = CertificatePool::new();
    for cert in certs {
        pool.add(cert.parsed());
    }
    pool
}

fn scored(chains: Vec<ChainCandidate>, store: &TrustStore) -> Vec<ScoredChain> {
    chains
        .into_iter()
        .map(|chain| {
            let score = score(&chain, store);
            ScoredChain { chain, score }
        })
        .collect()
}

/// Every link verifies, the chain starts at the leaf, ends self-signed and
/// never repeats a CA.
fn assert_well_formed(chain: &ChainCandidate, leaf: &TestCert) {
    let certs = chain.certificates();
    assert_eq!(certs[0].fingerprint(), leaf.fingerprint());
    assert!(chain.root().is_self_signed());
    for pair in certs.windows(2) {
        assert_eq!(pair[0].raw_issuer(), pair[1].raw_subject());
        assert!(pair[0].is_signed_by(&pair[1]));
    }
    for (i, a) in certs.iter().enumerate() {
        for b in certs.iter().skip(i + 1) {
            assert!(!a.same_entity(b), "{} repeats", a.subject());
        }
    }
}

/// Two roots, each cross-signing the other's intermediate: four paths.
struct Diamond {
    root_a: TestCert,
    root_b: TestCert,
    int_a: TestCert,
    int_a_by_b: TestCert,
    leaf: TestCert,
}

fn diamond() -> Diamond {
    let root_a = root("Diamond Root A");
    let root_b = root("Diamond Root B");
    let int_a = intermediate("Diamond CA", &root_a);
    let int_a_by_b = cross_sign(&int_a, &root_b);
    let leaf = leaf("diamond.example.com", &int_a);
    Diamond {
        root_a,
        root_b,
        int_a,
        int_a_by_b,
        leaf,
    }
}

#[test]
fn cross_signed_intermediate_yields_one_chain_per_root() {
    let d = diamond();
    let pool = pool_of(&[&d.root_a, &d.root_b, &d.int_a, &d.int_a_by_b]);

    let chains = build_chains(d.leaf.parsed(), &pool, DEFAULT_MAX_DEPTH);
    assert_eq!(chains.len(), 2);
    for chain in &chains {
        assert_eq!(chain.len(), 3);
        assert_well_formed(chain, &d.leaf);
    }
    let roots: HashSet<Fingerprint> = chains.iter().map(|c| c.root().fingerprint()).collect();
    assert!(roots.contains(&d.root_a.fingerprint()));
    assert!(roots.contains(&d.root_b.fingerprint()));
}

#[test]
fn duplicate_pool_entries_collapse() {
    let d = diamond();
    let mut pool = pool_of(&[&d.root_a, &d.int_a]);
    assert!(!pool.add(d.int_a.parsed()));
    assert_eq!(pool.add_bundle(d.root_a.pem.as_bytes()).unwrap(), 0);
    assert_eq!(pool.len(), 2);
    assert_eq!(build_chains(d.leaf.parsed(), &pool, DEFAULT_MAX_DEPTH).len(), 1);
}

#[test]
fn mutual_cross_signing_does_not_loop() {
    // A and B sign each other; only A also chains to a real root.
    let anchor = root("Loop Anchor");
    let a = intermediate("Loop CA A", &anchor);
    let b = intermediate("Loop CA B", &a);
    let a_by_b = cross_sign(&a, &b);
    let leaf = leaf("loop.example.com", &a);
    let pool = pool_of(&[&anchor, &a, &b, &a_by_b]);

    let chains = build_chains(leaf.parsed(), &pool, DEFAULT_MAX_DEPTH);
    assert_eq!(chains.len(), 1);
    assert_eq!(
        chains[0].fingerprints(),
        fingerprints(&[&leaf, &a, &anchor])
    );
    assert_well_formed(&chains[0], &leaf);
}

#[test]
fn depth_limit_counts_the_leaf() {
    let root = root("Deep Root");
    let i1 = intermediate("Deep CA 1", &root);
    let i2 = intermediate("Deep CA 2", &i1);
    let i3 = intermediate("Deep CA 3", &i2);
    let leaf = leaf("deep.example.com", &i3);
    let pool = pool_of(&[&root, &i1, &i2, &i3]);

    assert!(build_chains(leaf.parsed(), &pool, 4).is_empty());
    let chains = build_chains(leaf.parsed(), &pool, 5);
    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].len(), 5);

    let store = store(&[("Mozilla", vec![&root])]);
    let options = BundleOptions {
        max_depth: 4,
        ..BundleOptions::default()
    };
    let result = build_bundle(&request(&leaf, &[&root, &i1, &i2, &i3]), &store, &options);
    assert!(matches!(result, Err(BundleError::NoChainFound)));
}

#[test]
fn name_match_without_signature_is_not_a_link() {
    let real = root("Twin Root");
    let impostor = self_signed(ca_params("Twin Root"));
    // No AKI, so only the signature can tell the twins apart.
    let mut params = leaf_params("twin.example.com", &["twin.example.com"]);
    params.use_authority_key_identifier_extension = false;
    let leaf = issue(params, &real);
    assert!(leaf.parsed().authority_key_id().is_none());

    let pool = pool_of(&[&impostor]);
    assert!(build_chains(leaf.parsed(), &pool, DEFAULT_MAX_DEPTH).is_empty());

    let pool = pool_of(&[&impostor, &real]);
    let chains = build_chains(leaf.parsed(), &pool, DEFAULT_MAX_DEPTH);
    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].root().fingerprint(), real.fingerprint());
}

#[test]
fn selection_is_deterministic() {
    let d = diamond();
    let pool = pool_of(&[&d.root_a, &d.root_b, &d.int_a, &d.int_a_by_b]);
    let store = store(&[
        ("Android", vec![&d.root_a, &d.root_b]),
        ("Mozilla", vec![&d.root_a, &d.root_b]),
    ]);

    // Equal length and equal ubiquity: only the fingerprint order decides.
    for flavor in [Flavor::Ubiquitous, Flavor::Optimal, Flavor::Force] {
        let first = select(
            scored(build_chains(d.leaf.parsed(), &pool, DEFAULT_MAX_DEPTH), &store),
            flavor,
        )
        .unwrap();
        let mut reversed = scored(build_chains(d.leaf.parsed(), &pool, DEFAULT_MAX_DEPTH), &store);
        reversed.reverse();
        let second = select(reversed, flavor).unwrap();
        assert_eq!(first.chain.fingerprints(), second.chain.fingerprints());

        let expected = build_chains(d.leaf.parsed(), &pool, DEFAULT_MAX_DEPTH)
            .into_iter()
            .map(|c| c.fingerprints())
            .min()
            .unwrap();
        assert_eq!(first.chain.fingerprints(), expected);
    }
}

#[test]
fn flavor_contracts_hold() {
    // Short chain to a root trusted by one platform, long chain to a root
    // trusted by two, and a shortest chain to an untrusted root.
    let narrow = root("Narrow Root");
    let wide = root("Wide Root");
    let none = root("Nobody Root");
    let bridge = intermediate("Wide Bridge", &wide);
    let int = intermediate("Contract CA", &narrow);
    let int_wide = cross_sign(&int, &bridge);
    let int_none = cross_sign(&int, &none);
    let leaf = leaf("contract.example.com", &int);
    let pool = pool_of(&[&narrow, &wide, &none, &bridge, &int, &int_wide, &int_none]);
    let store = store(&[
        ("Android", vec![&wide]),
        ("Apple", vec![&wide, &narrow]),
    ]);

    let candidates = scored(build_chains(leaf.parsed(), &pool, DEFAULT_MAX_DEPTH), &store);
    assert_eq!(candidates.len(), 3);

    let ubiquitous = select(candidates.clone(), Flavor::Ubiquitous).unwrap();
    assert!(candidates
        .iter()
        .all(|c| ubiquitous.score.count >= c.score.count));
    assert_eq!(ubiquitous.chain.root().fingerprint(), wide.fingerprint());

    let optimal = select(candidates.clone(), Flavor::Optimal).unwrap();
    assert!(optimal.score.count > 0);
    assert!(candidates
        .iter()
        .filter(|c| c.score.count > 0)
        .all(|c| optimal.chain.len() <= c.chain.len()));
    assert_eq!(optimal.chain.root().fingerprint(), narrow.fingerprint());

    // narrow and none chains tie on length; narrow wins on ubiquity.
    let force = select(candidates.clone(), Flavor::Force).unwrap();
    assert_eq!(force.chain.root().fingerprint(), narrow.fingerprint());

    let untrusted_only: Vec<ScoredChain> = candidates
        .into_iter()
        .filter(|c| c.score.count == 0)
        .collect();
    let forced = select(untrusted_only.clone(), Flavor::Force).unwrap();
    assert_eq!(forced.chain.root().fingerprint(), none.fingerprint());
    assert!(matches!(
        select(untrusted_only, Flavor::Optimal),
        Err(BundleError::NoTrustedChain(Flavor::Optimal))
    ));
    assert!(matches!(
        select(Vec::new(), Flavor::Force),
        Err(BundleError::NoChainFound)
    ));
}

#[test]
fn ubiquity_grows_with_the_store() {
    let root = root("Monotone Root");
    let leaf = leaf("monotone.example.com", &root);
    let other = self_signed(ca_params("Filler Root"));
    let chain = build_chains(leaf.parsed(), &pool_of(&[&root]), DEFAULT_MAX_DEPTH)
        .pop()
        .unwrap();

    let small = store(&[("Apple", vec![&root]), ("Java", vec![&other])]);
    let large = store(&[
        ("Apple", vec![&root]),
        ("Java", vec![&other, &root]),
        ("Mozilla", vec![&root]),
    ]);

    let before = score(&chain, &small);
    let after = score(&chain, &large);
    assert_eq!(before.count, 1);
    assert_eq!(after.count, 3);
    assert!(after.count >= before.count);
    assert!(before.platforms.iter().all(|p| after.platforms.contains(p)));
    assert_eq!(score(&chain, &TrustStore::empty()).count, 0);
}

#[test]
fn reissued_root_is_trusted_by_name_and_key() {
    // Metadata knows one encoding of the root; the pool carries another with
    // the same subject and key.
    let original = root("Reissued Root");
    let reissued = issue_with_key(
        original.params.clone(),
        copy_key(&original.key),
        &original,
    );
    assert_ne!(original.fingerprint(), reissued.fingerprint());
    let leaf = leaf("reissued.example.com", &original);
    let store = store(&[("Mozilla", vec![&original])]);

    let chains = build_chains(leaf.parsed(), &pool_of(&[&reissued]), DEFAULT_MAX_DEPTH);
    assert_eq!(chains.len(), 1);
    assert_eq!(chains[0].root().fingerprint(), reissued.fingerprint());
    assert_eq!(score(&chains[0], &store).platforms, vec!["Mozilla"]);
}

#[test]
fn copied_key_identifier_does_not_inherit_trust() {
    let real = root("Impersonated Root");
    let real_ski = real.parsed().subject_key_id().unwrap().to_vec();
    let mut params = real.params.clone();
    params.key_identifier_method = rcgen::KeyIdMethod::PreSpecified(real_ski.clone());
    let forged = self_signed(params);
    assert_eq!(forged.parsed().subject_key_id(), Some(real_ski.as_slice()));
    assert_eq!(forged.parsed().raw_subject(), real.parsed().raw_subject());

    let leaf = leaf("forged.example.com", &forged);
    let store = store(&[("Apple", vec![&real]), ("Mozilla", vec![&real])]);

    let chains = build_chains(leaf.parsed(), &pool_of(&[&forged]), DEFAULT_MAX_DEPTH);
    assert_eq!(chains.len(), 1);
    assert_eq!(score(&chains[0], &store).count, 0);

    let req = BundleRequest::new(CertSource::Chain(vec![leaf.der.clone(), forged.der.clone()]));
    let result = build_bundle(&req, &store, &BundleOptions::default());
    assert!(matches!(
        result,
        Err(BundleError::NoTrustedChain(Flavor::Ubiquitous))
    ));

    let roots_only = TrustStore::from_roots("system", [&*real.parsed()]).unwrap();
    assert_eq!(score(&chains[0], &roots_only).count, 0);
}

/// `n` CAs sharing one subject, each self-signed and cross-signed by every
/// other, with a leaf under the first.
struct Mesh {
    roots: Vec<TestCert>,
    crosses: Vec<TestCert>,
    leaf: TestCert,
}

fn mesh(n: usize) -> Mesh {
    let roots: Vec<TestCert> = (0..n).map(|_| root("Mesh CA")).collect();
    let mut crosses = Vec::new();
    for (i, ca) in roots.iter().enumerate() {
        for (j, signer) in roots.iter().enumerate() {
            if i != j {
                crosses.push(cross_sign(ca, signer));
            }
        }
    }
    let leaf = leaf("mesh.example.com", &roots[0]);
    Mesh {
        roots,
        crosses,
        leaf,
    }
}

#[test]
fn dense_cross_signing_is_bounded() {
    let m = mesh(6);
    let all: Vec<&TestCert> = m.roots.iter().chain(m.crosses.iter()).collect();
    let pool = pool_of(&all);

    let limit = 32;
    let chains = build_chains_limited(m.leaf.parsed(), &pool, DEFAULT_MAX_DEPTH, limit);
    assert!(chains.len() <= limit + m.roots.len(), "{} chains", chains.len());
    for chain in &chains {
        assert_well_formed(chain, &m.leaf);
    }

    // Truncation keeps every reachable root, each at its shortest distance.
    let roots: HashSet<Fingerprint> = chains.iter().map(|c| c.root().fingerprint()).collect();
    for (i, root) in m.roots.iter().enumerate() {
        assert!(roots.contains(&root.fingerprint()), "root {} missing", i);
        let shortest = chains
            .iter()
            .filter(|c| c.root().fingerprint() == root.fingerprint())
            .map(ChainCandidate::len)
            .min()
            .unwrap();
        assert_eq!(shortest, if i == 0 { 2 } else { 3 });
    }

    let unbounded_default = build_chains(m.leaf.parsed(), &pool, DEFAULT_MAX_DEPTH);
    assert!(unbounded_default.len() <= DEFAULT_MAX_CANDIDATES + m.roots.len());
}

#[test]
fn truncated_search_still_selects_the_best_chain() {
    let m = mesh(5);
    let all: Vec<&TestCert> = m.roots.iter().chain(m.crosses.iter()).collect();
    let pool = pool_of(&all);
    // Only the last CA is trusted; reaching it takes one cross-certificate.
    let store = store(&[("Mozilla", vec![&m.roots[4]])]);

    let chains = build_chains_limited(m.leaf.parsed(), &pool, DEFAULT_MAX_DEPTH, 4);
    let best = select(scored(chains, &store), Flavor::Optimal).unwrap();
    assert_eq!(best.chain.len(), 3);
    assert_eq!(best.chain.root().fingerprint(), m.roots[4].fingerprint());
    assert_eq!(best.score.count, 1);

    let force = select(
        scored(
            build_chains_limited(m.leaf.parsed(), &pool, DEFAULT_MAX_DEPTH, 4),
            &store,
        ),
        Flavor::Force,
    )
    .unwrap();
    assert_eq!(force.chain.fingerprints(), fingerprints(&[&m.leaf, &m.roots[0]]));
}
