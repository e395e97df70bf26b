//! scrypt key derivation for password-based sealing

use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Size of the derived key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of the KDF salt in bytes
pub const SALT_SIZE: usize = 16;

/// scrypt cost parameters. Changing any of these breaks every existing QR code.
const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

/// A 32-byte symmetric key, wiped from memory when dropped
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_SIZE]);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

/// Generate a fresh random salt from the OS RNG
pub fn generate_salt() -> Result<[u8; SALT_SIZE]> {
    let mut salt = [0u8; SALT_SIZE];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| Error::Encryption(format!("Salt generation failed: {}", e)))?;
    Ok(salt)
}

/// Derive a key from a password and salt
pub fn derive_key(password: &str, salt: &[u8]) -> Result<DerivedKey> {
    let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_SIZE)
        .map_err(|e| Error::KeyDerivation(e.to_string()))?;

    let mut output = [0u8; KEY_SIZE];
    scrypt::scrypt(password.as_bytes(), salt, &params, &mut output)
        .map_err(|e| Error::KeyDerivation(e.to_string()))?;

    let key = DerivedKey(output);
    output.zeroize();
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_key_deterministic() {
        let salt = [0x42u8; SALT_SIZE];
        let k1 = derive_key("my passphrase", &salt).unwrap();
        let k2 = derive_key("my passphrase", &salt).unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_derive_key_different_password() {
        let salt = [0x42u8; SALT_SIZE];
        let k1 = derive_key("passphrase1", &salt).unwrap();
        let k2 = derive_key("passphrase2", &salt).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_derive_key_different_salt() {
        let k1 = derive_key("passphrase", &[0x01; SALT_SIZE]).unwrap();
        let k2 = derive_key("passphrase", &[0x02; SALT_SIZE]).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_generate_salt_unique() {
        let s1 = generate_salt().unwrap();
        let s2 = generate_salt().unwrap();
        assert_ne!(s1, s2);
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = derive_key("passphrase", &[0u8; SALT_SIZE]).unwrap();
        assert_eq!(format!("{:?}", key), "DerivedKey([REDACTED])");
    }
}
