//! Certificate validity checks: expiry and hostname matching.

use crate::fields::Certificate;
use crate::util;

/// Check if the certificate is still valid `seconds` after `now`.
///
/// Returns `false` if it will have expired by then (or is already expired).
pub fn check_expiry(cert: &Certificate, now: i64, seconds: u64) -> bool {
    let horizon = now.saturating_add(i64::try_from(seconds).unwrap_or(i64::MAX));
    cert.not_after().timestamp >= horizon
}

/// Check if the certificate matches the given hostname.
///
/// Checks SAN DNS entries first; falls back to CN only if no SAN DNS entries exist.
/// Supports wildcard matching (e.g., `*.example.com`).
pub fn check_host(cert: &Certificate, hostname: &str) -> bool {
    util::verify_hostname_match(&cert.dns_names(), cert.common_name(), hostname)
}

/// Current Unix time in seconds.
pub(crate) fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
