#![no_main]

use libfuzzer_sys::fuzz_target;
use qrlock_core::CipherBundle;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        // Try to parse - should not panic
        if let Ok(bundle) = CipherBundle::parse(text) {
            // Anything accepted must re-serialize to an equal bundle
            let json = bundle.to_json().unwrap();
            assert_eq!(CipherBundle::parse(&json).unwrap(), bundle);

            let value: serde_json::Value = serde_json::from_str(&json).unwrap();
            assert_eq!(CipherBundle::from_value(&value).unwrap(), bundle);
        }
    }
});
