#![no_main]

use libfuzzer_sys::fuzz_target;
use xbundle_lib::TrustStore;

fuzz_target!(|data: &[u8]| {
    if let Ok(store) = TrustStore::from_metadata(data, None) {
        assert!(store.platform_count() > 0);
        for name in store.platform_names() {
            assert!(store.root_count(name).unwrap_or(0) > 0);
        }
    }
});
