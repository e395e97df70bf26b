#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use qrlock_core::{decrypt, CipherBundle};

#[derive(Debug, Arbitrary)]
struct Input {
    kdf_salt: Vec<u8>,
    ciphertext: Vec<u8>,
    nonce: Vec<u8>,
    auth_tag: Vec<u8>,
}

fuzz_target!(|input: Input| {
    // Arbitrary parts must be refused cleanly, never panic
    if let Ok(bundle) =
        CipherBundle::from_parts(input.kdf_salt, input.ciphertext, input.nonce, input.auth_tag)
    {
        let err = decrypt(&bundle, "fuzzing").unwrap_err();
        assert!(err.decrypt_failure().is_some());
    }
});
