//! Human-readable and JSON formatting of bundles.

use crate::bundle::{Bundle, KeyStatus};
use crate::BundleError;

/// Format a bundle as human-readable text.
///
/// If `show_pem` is true, the deployable PEM bundle is appended.
pub fn display_text(bundle: &Bundle, show_pem: bool) -> String {
    let mut out = String::new();

    out.push_str("Bundle:\n");
    out.push_str(&format!("  Flavor: {}\n", bundle.flavor));
    out.push_str(&format!("  Subject: {}\n", bundle.leaf.subject));
    out.push_str(&format!("  Issuer: {}\n", bundle.leaf.issuer));
    out.push_str(&format!("  Serial: {}\n", bundle.leaf.serial));
    out.push_str(&format!("  Key: {}", bundle.leaf.key_type));
    if let Some(bits) = bundle.leaf.key_size {
        out.push_str(&format!(" ({} bit)", bits));
    }
    out.push('\n');
    out.push_str(&format!(
        "  Signature Algorithm: {}\n",
        bundle.leaf.signature_algorithm
    ));
    out.push_str(&format!("  Leaf Expires: {}\n", bundle.leaf.expires));
    out.push_str(&format!("  Chain Expires: {}\n", bundle.expires));
    if !bundle.leaf.hostnames.is_empty() {
        out.push_str(&format!("  Hostnames: {}\n", bundle.leaf.hostnames.join(", ")));
    }
    for url in &bundle.leaf.ocsp_urls {
        out.push_str(&format!("  OCSP: {}\n", url));
    }
    if let Some(host) = &bundle.hostname {
        let verdict = match bundle.hostname_match {
            Some(true) => "match",
            _ => "MISMATCH",
        };
        out.push_str(&format!("  Hostname: {} ({})\n", host, verdict));
    }
    let key = match bundle.key_status {
        KeyStatus::Matched => "matches leaf",
        KeyStatus::NotSupplied => "not supplied",
    };
    out.push_str(&format!("  Private Key: {}\n", key));
    out.push_str(&format!(
        "  Rebundled: {}\n",
        if bundle.rebundled { "yes" } else { "no" }
    ));

    out.push_str("  Chain:\n");
    for cert in &bundle.chain {
        out.push_str(&format!(
            "    {}: {} [{}] expires {}\n",
            cert.depth, cert.short_name, cert.signature_algorithm, cert.not_after
        ));
    }
    out.push_str(&format!("  Root Fingerprint (SHA-256): {}\n", bundle.root.fingerprint));

    out.push_str(&format!(
        "  Ubiquity: {} platform{}\n",
        bundle.ubiquity.count,
        if bundle.ubiquity.count == 1 { "" } else { "s" }
    ));
    for platform in &bundle.ubiquity.platforms {
        out.push_str(&format!("    trusted by {}\n", platform));
    }
    for platform in &bundle.untrusted_platforms {
        out.push_str(&format!("    not trusted by {}\n", platform));
    }

    if !bundle.diagnostics.is_empty() {
        out.push_str("  Diagnostics:\n");
        for diag in &bundle.diagnostics {
            out.push_str(&format!("    - {}\n", diag));
        }
    }

    if show_pem {
        out.push('\n');
        out.push_str(&bundle.bundle_pem);
    }

    out
}

/// Serialize a bundle to a pretty-printed JSON string.
pub fn to_json(bundle: &Bundle) -> Result<String, BundleError> {
    serde_json::to_string_pretty(bundle).map_err(BundleError::Json)
}
