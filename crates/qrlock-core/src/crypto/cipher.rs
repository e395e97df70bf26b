//! AES-256-GCM sealing of a single short message

use aes_gcm::{
    aead::{consts::U16, generic_array::GenericArray, AeadInPlace, KeyInit},
    aes::Aes256,
    Aes256Gcm, AesGcm,
};
use rand::{rngs::OsRng, RngCore};
use tracing::debug;
use zeroize::Zeroize;

use super::kdf::{derive_key, generate_salt, DerivedKey};
use crate::bundle::CipherBundle;
use crate::error::{DecryptFailure, Error, Result};
use crate::validation::check_request;

/// Size of the nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Nonce size produced by older encoders that used the GCM library default.
/// Accepted on decrypt only.
pub const LEGACY_NONCE_SIZE: usize = 16;

/// Size of the authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

type Aes256GcmLegacy = AesGcm<Aes256, U16>;

/// Seal a message under a password.
///
/// Every call draws a fresh salt and nonce, so sealing the same message
/// twice never yields the same bundle.
pub fn encrypt(message: &str, password: &str) -> Result<CipherBundle> {
    check_request(message, password)?;

    let kdf_salt = generate_salt().map_err(sealing_error)?;
    let key = derive_key(password, &kdf_salt).map_err(sealing_error)?;

    let mut nonce = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| Error::Encryption(format!("Nonce generation failed: {}", e)))?;

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let mut buffer = message.as_bytes().to_vec();
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(&nonce), b"", &mut buffer)
        .map_err(|e| Error::Encryption(e.to_string()))?;

    CipherBundle::from_parts(kdf_salt.to_vec(), buffer, nonce.to_vec(), tag.to_vec())
}

/// Open a bundle with a password.
///
/// The tag is verified before any plaintext is produced; on failure nothing
/// but the error is returned.
pub fn decrypt(bundle: &CipherBundle, password: &str) -> Result<String> {
    if bundle.auth_tag().len() != TAG_SIZE {
        debug!("Rejecting bundle: tag is {} bytes", bundle.auth_tag().len());
        return Err(Error::malformed());
    }

    let key = derive_key(password, bundle.kdf_salt())?;
    let mut buffer = bundle.ciphertext().to_vec();

    let verified = match bundle.nonce().len() {
        NONCE_SIZE => open_in_place::<Aes256Gcm>(&key, bundle, &mut buffer),
        LEGACY_NONCE_SIZE => open_in_place::<Aes256GcmLegacy>(&key, bundle, &mut buffer),
        other => {
            debug!("Rejecting bundle: nonce is {} bytes", other);
            return Err(Error::malformed());
        }
    };

    if !verified {
        buffer.zeroize();
        return Err(Error::Decryption(DecryptFailure::AuthenticationFailed));
    }

    String::from_utf8(buffer).map_err(|e| {
        e.into_bytes().zeroize();
        Error::malformed()
    })
}

/// Failures while sealing all surface as `Error::Encryption`
fn sealing_error(e: Error) -> Error {
    match e {
        Error::Encryption(_) => e,
        other => Error::Encryption(other.to_string()),
    }
}

fn open_in_place<C>(key: &DerivedKey, bundle: &CipherBundle, buffer: &mut Vec<u8>) -> bool
where
    C: KeyInit + AeadInPlace,
{
    let cipher = match C::new_from_slice(key.as_bytes()) {
        Ok(cipher) => cipher,
        Err(_) => return false,
    };
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(bundle.nonce()),
            b"",
            buffer,
            GenericArray::from_slice(bundle.auth_tag()),
        )
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    fn reseal(bundle: &CipherBundle, f: impl FnOnce(&mut Vec<u8>, &mut Vec<u8>)) -> CipherBundle {
        let mut ciphertext = bundle.ciphertext().to_vec();
        let mut tag = bundle.auth_tag().to_vec();
        f(&mut ciphertext, &mut tag);
        CipherBundle::from_parts(
            bundle.kdf_salt().to_vec(),
            ciphertext,
            bundle.nonce().to_vec(),
            tag,
        )
        .unwrap()
    }

    #[test]
    fn test_encryption_decryption() {
        let bundle = encrypt("hello world", "secret1").unwrap();
        assert_eq!(bundle.kdf_salt().len(), 16);
        assert_eq!(bundle.nonce().len(), NONCE_SIZE);
        assert_eq!(bundle.auth_tag().len(), TAG_SIZE);
        assert_eq!(bundle.ciphertext().len(), "hello world".len());

        assert_eq!(decrypt(&bundle, "secret1").unwrap(), "hello world");
    }

    #[test]
    fn test_decryption_with_wrong_password() {
        let bundle = encrypt("hello world", "secret1").unwrap();
        let err = decrypt(&bundle, "secret2").unwrap_err();
        assert_eq!(
            err.decrypt_failure(),
            Some(DecryptFailure::AuthenticationFailed)
        );
        assert_eq!(err.to_string(), "Incorrect password or corrupted data");
    }

    #[test]
    fn test_fresh_salt_and_nonce() {
        let a = encrypt("same message", "same password").unwrap();
        let b = encrypt("same message", "same password").unwrap();
        assert_ne!(a.kdf_salt(), b.kdf_salt());
        assert_ne!(a.nonce(), b.nonce());
        assert_ne!(a.ciphertext(), b.ciphertext());
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let bundle = encrypt("attack at dawn", "password").unwrap();
        let tampered = reseal(&bundle, |ct, _| ct[0] ^= 0x01);
        let err = decrypt(&tampered, "password").unwrap_err();
        assert_eq!(
            err.decrypt_failure(),
            Some(DecryptFailure::AuthenticationFailed)
        );
    }

    #[test]
    fn test_sealing_errors_are_encryption_errors() {
        match sealing_error(Error::KeyDerivation("bad params".into())) {
            Error::Encryption(msg) => assert!(msg.contains("bad params"), "{}", msg),
            other => panic!("expected Encryption, got {:?}", other),
        }

        match sealing_error(Error::Encryption("rng down".into())) {
            Error::Encryption(msg) => assert_eq!(msg, "rng down"),
            other => panic!("expected Encryption, got {:?}", other),
        }
    }

    #[test]
    fn test_tampered_tag_rejected() {
        let bundle = encrypt("attack at dawn", "password").unwrap();
        let tampered = reseal(&bundle, |_, tag| tag[15] ^= 0x80);
        assert!(decrypt(&tampered, "password").is_err());
    }

    #[test]
    fn test_wrong_sizes_are_malformed() {
        let bundle = encrypt("short", "password").unwrap();

        let bad_tag = reseal(&bundle, |_, tag| tag.truncate(8));
        assert_eq!(
            decrypt(&bad_tag, "password").unwrap_err().decrypt_failure(),
            Some(DecryptFailure::Malformed)
        );

        let bad_nonce = CipherBundle::from_parts(
            bundle.kdf_salt().to_vec(),
            bundle.ciphertext().to_vec(),
            vec![0u8; 8],
            bundle.auth_tag().to_vec(),
        )
        .unwrap();
        assert_eq!(
            decrypt(&bad_nonce, "password").unwrap_err().decrypt_failure(),
            Some(DecryptFailure::Malformed)
        );
    }

    #[test]
    fn test_legacy_nonce_accepted() {
        let salt = [7u8; 16];
        let nonce = [9u8; LEGACY_NONCE_SIZE];
        let key = derive_key("legacy-pass", &salt).unwrap();

        let cipher = Aes256GcmLegacy::new(key.as_bytes().into());
        let mut buffer = b"from the old encoder".to_vec();
        let tag = cipher
            .encrypt_in_place_detached(GenericArray::from_slice(&nonce), b"", &mut buffer)
            .unwrap();

        let bundle =
            CipherBundle::from_parts(salt.to_vec(), buffer, nonce.to_vec(), tag.to_vec())
                .unwrap();
        assert_eq!(
            decrypt(&bundle, "legacy-pass").unwrap(),
            "from the old encoder"
        );
    }

    #[test]
    fn test_non_utf8_plaintext_is_malformed() {
        let salt = [3u8; 16];
        let nonce = [4u8; NONCE_SIZE];
        let key = derive_key("password", &salt).unwrap();

        let cipher = Aes256Gcm::new(key.as_bytes().into());
        let mut buffer = vec![0xff, 0xfe, 0xfd];
        let tag = cipher
            .encrypt_in_place_detached(GenericArray::from_slice(&nonce), b"", &mut buffer)
            .unwrap();

        let bundle =
            CipherBundle::from_parts(salt.to_vec(), buffer, nonce.to_vec(), tag.to_vec())
                .unwrap();
        assert_eq!(
            decrypt(&bundle, "password").unwrap_err().decrypt_failure(),
            Some(DecryptFailure::Malformed)
        );
    }

    #[test]
    fn test_encrypt_validates_input() {
        assert!(matches!(
            encrypt("", "password"),
            Err(Error::Validation(ValidationError::EmptyMessage))
        ));
        assert!(matches!(
            encrypt("message", "short"),
            Err(Error::Validation(ValidationError::PasswordTooShort(6)))
        ));
        assert!(matches!(
            encrypt(&"x".repeat(501), "password"),
            Err(Error::Validation(ValidationError::MessageTooLong(500)))
        ));
    }

    #[test]
    fn test_unicode_round_trip() {
        let message = "Grüße, 世界 🔐";
        let bundle = encrypt(message, "pässwörd").unwrap();
        assert_eq!(decrypt(&bundle, "pässwörd").unwrap(), message);
    }
}
