#![no_main]

use libfuzzer_sys::fuzz_target;
use qrlock_qr::DecodeCascade;

fuzz_target!(|data: &[u8]| {
    // Untrusted uploads: the cascade reports, it does not panic
    let _ = DecodeCascade::standard().decode(data);
});
