#![no_main]

use libfuzzer_sys::fuzz_target;
use xbundle_lib::{
    build_bundle, check_expiry, check_host, decode_certificates, parse_certificate, BundleOptions,
    BundleRequest, CertSource, Flavor, TrustStore,
};

fuzz_target!(|data: &[u8]| {
    // Decoding and parsing must never panic, regardless of input.
    let Ok(ders) = decode_certificates(data) else {
        return;
    };
    for der in &ders {
        if let Ok(cert) = parse_certificate(der) {
            let _ = cert.subject().to_oneline();
            let _ = cert.short_name();
            let _ = cert.dns_names();
            let _ = cert.to_pem();
            let _ = cert.is_signed_by(&cert);
            let _ = check_expiry(&cert, 0, 0);
            let _ = check_host(&cert, "example.com");
        }
    }

    // Run the whole pipeline with the input as its own pool.
    let request = BundleRequest::new(CertSource::Chain(ders)).with_flavor(Flavor::Force);
    if let Ok(bundle) = build_bundle(&request, &TrustStore::empty(), &BundleOptions::default()) {
        let _ = xbundle_lib::display_text(&bundle, true);
        let _ = xbundle_lib::to_json(&bundle);
    }
});
