//! Certificate data model.
//!
//! [`Certificate`] is produced once by [`crate::parse_certificate`] and never
//! mutated afterwards: every derived field (fingerprint, key identifiers,
//! self-signed flag) is computed at parse time.

use crate::fingerprint::Fingerprint;
use crate::oid;
use serde::Serialize;
use x509_parser::prelude::*;

/// A parsed X.509 certificate with the fields the bundler reasons about.
#[derive(Debug, Clone)]
pub struct Certificate {
    pub(crate) raw_der: Vec<u8>,
    pub(crate) fingerprint: Fingerprint,
    pub(crate) raw_subject: Vec<u8>,
    pub(crate) raw_issuer: Vec<u8>,
    pub(crate) subject: DistinguishedName,
    pub(crate) issuer: DistinguishedName,
    pub(crate) serial: String,
    pub(crate) not_before: DateTime,
    pub(crate) not_after: DateTime,
    pub(crate) subject_key_id: Option<Vec<u8>>,
    pub(crate) authority_key_id: Option<Vec<u8>>,
    pub(crate) public_key: PublicKeyInfo,
    pub(crate) signature_algorithm: SignatureAlgorithm,
    pub(crate) key_usage: Option<KeyUsage>,
    pub(crate) ext_key_usage: Option<ExtKeyUsage>,
    pub(crate) is_ca: Option<bool>,
    pub(crate) san: Vec<SanEntry>,
    pub(crate) ocsp_urls: Vec<String>,
    pub(crate) self_signed: bool,
}

impl Certificate {
    /// Raw DER bytes of the certificate.
    pub fn der(&self) -> &[u8] {
        &self.raw_der
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// DER encoding of the subject name, used for byte-exact issuer matching.
    pub fn raw_subject(&self) -> &[u8] {
        &self.raw_subject
    }

    pub fn raw_issuer(&self) -> &[u8] {
        &self.raw_issuer
    }

    pub fn subject(&self) -> &DistinguishedName {
        &self.subject
    }

    pub fn issuer(&self) -> &DistinguishedName {
        &self.issuer
    }

    /// Serial number as colon-separated hex.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn not_before(&self) -> &DateTime {
        &self.not_before
    }

    pub fn not_after(&self) -> &DateTime {
        &self.not_after
    }

    pub fn subject_key_id(&self) -> Option<&[u8]> {
        self.subject_key_id.as_deref()
    }

    pub fn authority_key_id(&self) -> Option<&[u8]> {
        self.authority_key_id.as_deref()
    }

    pub fn public_key(&self) -> &PublicKeyInfo {
        &self.public_key
    }

    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        self.signature_algorithm
    }

    /// Key Usage flags, if the extension is present.
    pub fn key_usage(&self) -> Option<&KeyUsage> {
        self.key_usage.as_ref()
    }

    /// Extended Key Usage, if the extension is present.
    pub fn ext_key_usage(&self) -> Option<&ExtKeyUsage> {
        self.ext_key_usage.as_ref()
    }

    /// BasicConstraints `cA` flag, `None` when the extension is absent.
    pub fn is_ca(&self) -> Option<bool> {
        self.is_ca
    }

    pub fn san_entries(&self) -> &[SanEntry] {
        &self.san
    }

    pub fn ocsp_urls(&self) -> &[String] {
        &self.ocsp_urls
    }

    /// Issuer equals subject and the certificate's own key verifies its signature.
    pub fn is_self_signed(&self) -> bool {
        self.self_signed
    }

    /// DNS names from the Subject Alternative Name extension.
    pub fn dns_names(&self) -> Vec<String> {
        self.san
            .iter()
            .filter_map(|entry| match entry {
                SanEntry::Dns(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn common_name(&self) -> Option<&str> {
        self.subject.get("CN")
    }

    /// Short human-readable identifier: CN, then O, then OU.
    pub fn short_name(&self) -> String {
        ["CN", "O", "OU"]
            .iter()
            .find_map(|key| self.subject.get(key))
            .unwrap_or("Unknown")
            .to_string()
    }

    /// Whether `other` carries the same issuer identity as this certificate.
    ///
    /// Subject Key Identifiers decide when both are present; otherwise the
    /// raw subject names must match byte-for-byte.
    pub fn same_issuer_identity(&self, other: &Certificate) -> bool {
        match (self.subject_key_id(), other.subject_key_id()) {
            (Some(a), Some(b)) => a == b,
            _ => self.raw_subject == other.raw_subject,
        }
    }

    /// Same subject name and same public key: one logical CA even when it
    /// exists as several (cross-signed or re-issued) certificates.
    pub fn same_entity(&self, other: &Certificate) -> bool {
        self.raw_subject == other.raw_subject && self.public_key.raw == other.public_key.raw
    }

    /// Whether `issuer` could have issued this certificate by name and key id.
    ///
    /// Names must match exactly. When this certificate has an Authority Key
    /// Identifier and the candidate has a Subject Key Identifier they must
    /// agree; a missing identifier on either side falls back to the name.
    pub fn names_issuer(&self, issuer: &Certificate) -> bool {
        if self.raw_issuer != issuer.raw_subject {
            return false;
        }
        match (self.authority_key_id(), issuer.subject_key_id()) {
            (Some(aki), Some(ski)) => aki == ski,
            _ => true,
        }
    }

    /// Verify this certificate's signature with `issuer`'s public key.
    pub fn is_signed_by(&self, issuer: &Certificate) -> bool {
        let Ok((_, child)) = X509Certificate::from_der(&self.raw_der) else {
            return false;
        };
        let Ok((_, parent)) = X509Certificate::from_der(&issuer.raw_der) else {
            return false;
        };
        child.verify_signature(Some(parent.public_key())).is_ok()
    }

    /// PEM encoding of the certificate.
    pub fn to_pem(&self) -> String {
        crate::util::to_pem("CERTIFICATE", &self.raw_der)
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
    }
}

impl Eq for Certificate {}

/// Distinguished name with ordered components.
#[derive(Debug, Clone, Serialize)]
pub struct DistinguishedName {
    /// Ordered list of (attribute_type, value) pairs.
    /// Attribute types use short names where known (e.g., "CN", "O", "C").
    pub components: Vec<(String, String)>,
}

impl DistinguishedName {
    /// Format as a comma-separated one-line string matching OpenSSL's default format.
    /// Example: "C = US, O = Org, CN = example.com"
    ///
    /// Values containing commas, equals signs, or backslashes are escaped
    /// to prevent ambiguous output.
    pub fn to_oneline(&self) -> String {
        let mut result = String::new();
        for (i, (k, v)) in self.components.iter().enumerate() {
            if i > 0 {
                result.push_str(", ");
            }
            result.push_str(k);
            result.push_str(" = ");
            for ch in v.chars() {
                match ch {
                    '\\' => result.push_str("\\\\"),
                    ',' => result.push_str("\\,"),
                    '=' => result.push_str("\\="),
                    _ => result.push(ch),
                }
            }
        }
        result
    }

    /// First value of the attribute with the given short name.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.components
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl std::fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_oneline())
    }
}

/// Public key algorithm family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeyAlgorithm {
    #[serde(rename = "RSA")]
    Rsa,
    #[serde(rename = "EC")]
    Ec,
    Ed25519,
    Ed448,
    #[serde(rename = "DSA")]
    Dsa,
}

impl KeyAlgorithm {
    pub(crate) fn from_oid(oid_str: &str) -> Option<Self> {
        match oid_str {
            oid::RSA_ENCRYPTION => Some(KeyAlgorithm::Rsa),
            oid::EC_PUBLIC_KEY => Some(KeyAlgorithm::Ec),
            oid::ED25519 => Some(KeyAlgorithm::Ed25519),
            oid::ED448 => Some(KeyAlgorithm::Ed448),
            oid::DSA => Some(KeyAlgorithm::Dsa),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            KeyAlgorithm::Rsa => "RSA",
            KeyAlgorithm::Ec => "EC",
            KeyAlgorithm::Ed25519 => "Ed25519",
            KeyAlgorithm::Ed448 => "Ed448",
            KeyAlgorithm::Dsa => "DSA",
        }
    }
}

/// Public key information.
#[derive(Debug, Clone, Serialize)]
pub struct PublicKeyInfo {
    pub algorithm: KeyAlgorithm,
    /// Key size in bits (e.g., 2048 for RSA, 256 for P-256).
    pub key_size: Option<u32>,
    /// Named curve for EC keys (e.g., "P-256", "P-384").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub curve: Option<String>,
    /// Contents of the SubjectPublicKeyInfo BIT STRING.
    #[serde(skip)]
    pub raw: Vec<u8>,
}

/// Certificate signature algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Md2WithRsa,
    Md5WithRsa,
    Sha1WithRsa,
    Sha256WithRsa,
    Sha384WithRsa,
    Sha512WithRsa,
    RsaPss,
    EcdsaWithSha1,
    EcdsaWithSha256,
    EcdsaWithSha384,
    EcdsaWithSha512,
    DsaWithSha1,
    DsaWithSha256,
    Ed25519,
    Ed448,
}

impl SignatureAlgorithm {
    pub(crate) fn from_oid(oid_str: &str) -> Option<Self> {
        let alg = match oid_str {
            oid::MD2_WITH_RSA => SignatureAlgorithm::Md2WithRsa,
            oid::MD5_WITH_RSA => SignatureAlgorithm::Md5WithRsa,
            oid::SHA1_WITH_RSA => SignatureAlgorithm::Sha1WithRsa,
            oid::SHA256_WITH_RSA => SignatureAlgorithm::Sha256WithRsa,
            oid::SHA384_WITH_RSA => SignatureAlgorithm::Sha384WithRsa,
            oid::SHA512_WITH_RSA => SignatureAlgorithm::Sha512WithRsa,
            oid::RSASSA_PSS => SignatureAlgorithm::RsaPss,
            oid::ECDSA_WITH_SHA1 => SignatureAlgorithm::EcdsaWithSha1,
            oid::ECDSA_WITH_SHA256 => SignatureAlgorithm::EcdsaWithSha256,
            oid::ECDSA_WITH_SHA384 => SignatureAlgorithm::EcdsaWithSha384,
            oid::ECDSA_WITH_SHA512 => SignatureAlgorithm::EcdsaWithSha512,
            oid::DSA_WITH_SHA1 => SignatureAlgorithm::DsaWithSha1,
            oid::DSA_WITH_SHA256 => SignatureAlgorithm::DsaWithSha256,
            oid::ED25519 => SignatureAlgorithm::Ed25519,
            oid::ED448 => SignatureAlgorithm::Ed448,
            _ => return None,
        };
        Some(alg)
    }

    /// OpenSSL-style algorithm name.
    pub fn name(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Md2WithRsa => "md2WithRSAEncryption",
            SignatureAlgorithm::Md5WithRsa => "md5WithRSAEncryption",
            SignatureAlgorithm::Sha1WithRsa => "sha1WithRSAEncryption",
            SignatureAlgorithm::Sha256WithRsa => "sha256WithRSAEncryption",
            SignatureAlgorithm::Sha384WithRsa => "sha384WithRSAEncryption",
            SignatureAlgorithm::Sha512WithRsa => "sha512WithRSAEncryption",
            SignatureAlgorithm::RsaPss => "rsassaPss",
            SignatureAlgorithm::EcdsaWithSha1 => "ecdsa-with-SHA1",
            SignatureAlgorithm::EcdsaWithSha256 => "ecdsa-with-SHA256",
            SignatureAlgorithm::EcdsaWithSha384 => "ecdsa-with-SHA384",
            SignatureAlgorithm::EcdsaWithSha512 => "ecdsa-with-SHA512",
            SignatureAlgorithm::DsaWithSha1 => "dsa_with_SHA1",
            SignatureAlgorithm::DsaWithSha256 => "dsa_with_SHA256",
            SignatureAlgorithm::Ed25519 => "Ed25519",
            SignatureAlgorithm::Ed448 => "Ed448",
        }
    }

    /// Superseded digests (MD2, MD5, SHA-1) that clients no longer accept.
    pub fn is_weak(&self) -> bool {
        matches!(
            self,
            SignatureAlgorithm::Md2WithRsa
                | SignatureAlgorithm::Md5WithRsa
                | SignatureAlgorithm::Sha1WithRsa
                | SignatureAlgorithm::EcdsaWithSha1
                | SignatureAlgorithm::DsaWithSha1
        )
    }
}

impl std::fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for SignatureAlgorithm {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// Key Usage bits (RFC 5280 Section 4.2.1.3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KeyUsage {
    pub digital_signature: bool,
    pub key_encipherment: bool,
    pub key_agreement: bool,
    pub key_cert_sign: bool,
    pub crl_sign: bool,
}

/// Extended Key Usage purposes (RFC 5280 Section 4.2.1.12).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtKeyUsage {
    pub any: bool,
    pub server_auth: bool,
    pub client_auth: bool,
    /// Dotted OIDs of any other purposes.
    pub other: Vec<String>,
}

/// Subject Alternative Name entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum SanEntry {
    Dns(String),
    Email(String),
    Ip(String),
    Uri(String),
    DirName(String),
    Other(String),
}

/// Date-time representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateTime {
    /// ISO 8601 formatted string.
    pub iso8601: String,
    /// Unix timestamp.
    pub timestamp: i64,
}

impl DateTime {
    pub(crate) fn from_timestamp(ts: i64) -> Self {
        let iso = match ::time::OffsetDateTime::from_unix_timestamp(ts) {
            Ok(dt) => format!(
                "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
                dt.year(),
                u8::from(dt.month()),
                dt.day(),
                dt.hour(),
                dt.minute(),
                dt.second()
            ),
            Err(_) => format!("{}", ts),
        };
        DateTime {
            iso8601: iso,
            timestamp: ts,
        }
    }
}

impl std::fmt::Display for DateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.iso8601)
    }
}
