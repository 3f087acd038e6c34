//! Test PKI built on the fly with rcgen.

#![allow(dead_code)]

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    Issuer, KeyPair, KeyUsagePurpose,
};
use std::sync::Arc;
use xbundle_lib::{
    parse_certificate, BundleRequest, CertSource, Certificate, Fingerprint, TrustStore,
};

/// A generated certificate together with what is needed to sign with it.
pub struct TestCert {
    pub params: CertificateParams,
    pub key: KeyPair,
    pub der: Vec<u8>,
    pub pem: String,
}

impl TestCert {
    pub fn parsed(&self) -> Arc<Certificate> {
        Arc::new(parse_certificate(&self.der).unwrap())
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.der)
    }

    pub fn key_pem(&self) -> String {
        self.key.serialize_pem()
    }
}

/// KeyPair is not `Clone`; round-trip it through PKCS#8.
pub fn copy_key(key: &KeyPair) -> KeyPair {
    KeyPair::from_pem(&key.serialize_pem()).unwrap()
}

fn named(cn: &str, sans: &[&str]) -> CertificateParams {
    let sans: Vec<String> = sans.iter().map(|s| s.to_string()).collect();
    let mut params = CertificateParams::new(sans).unwrap();
    params.distinguished_name = DistinguishedName::new();
    params.distinguished_name.push(DnType::CommonName, cn);
    params.use_authority_key_identifier_extension = true;
    params
}

pub fn ca_params(cn: &str) -> CertificateParams {
    let mut params = named(cn, &[]);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    params
}

pub fn leaf_params(cn: &str, sans: &[&str]) -> CertificateParams {
    let mut params = named(cn, sans);
    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    params
}

pub fn self_signed(params: CertificateParams) -> TestCert {
    let key = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    TestCert {
        der: cert.der().to_vec(),
        pem: cert.pem(),
        params,
        key,
    }
}

pub fn root(cn: &str) -> TestCert {
    self_signed(ca_params(cn))
}

/// Issue `params` from `issuer` under a fresh key.
pub fn issue(params: CertificateParams, issuer: &TestCert) -> TestCert {
    issue_with_key(params, KeyPair::generate().unwrap(), issuer)
}

/// Issue `params` from `issuer` for an existing key; used for cross-signing.
pub fn issue_with_key(params: CertificateParams, key: KeyPair, issuer: &TestCert) -> TestCert {
    let signer = Issuer::new(issuer.params.clone(), copy_key(&issuer.key));
    let cert = params.signed_by(&key, &signer).unwrap();
    TestCert {
        der: cert.der().to_vec(),
        pem: cert.pem(),
        params,
        key,
    }
}

/// Cross-sign an existing CA: same subject and key, different issuer.
pub fn cross_sign(ca: &TestCert, issuer: &TestCert) -> TestCert {
    issue_with_key(ca.params.clone(), copy_key(&ca.key), issuer)
}

pub fn intermediate(cn: &str, issuer: &TestCert) -> TestCert {
    issue(ca_params(cn), issuer)
}

pub fn leaf(cn: &str, issuer: &TestCert) -> TestCert {
    issue(leaf_params(cn, &[cn]), issuer)
}

/// A store where each named platform trusts the listed roots.
pub fn store(platforms: &[(&str, Vec<&TestCert>)]) -> TrustStore {
    let mut builder = TrustStore::builder();
    for (name, roots) in platforms {
        builder = builder.platform(name).unwrap();
        for root in roots.iter() {
            builder = builder.trust_certificate(name, &root.parsed()).unwrap();
        }
    }
    builder.build().unwrap()
}

/// Request for `leaf` with every certificate in `pool` as an intermediate.
pub fn request(leaf: &TestCert, pool: &[&TestCert]) -> BundleRequest {
    pool.iter().fold(
        BundleRequest::new(CertSource::Pem(leaf.pem.clone().into_bytes())),
        |req, cert| req.with_intermediates(cert.pem.clone()),
    )
}

/// Fingerprints of the given certificates, in order.
pub fn fingerprints(certs: &[&TestCert]) -> Vec<Fingerprint> {
    certs.iter().map(|c| c.fingerprint()).collect()
}
