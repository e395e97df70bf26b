//! Cryptographic primitives for message sealing
//!
//! # Construction
//!
//! - Key: scrypt(password, 16-byte random salt, N = 2^14, r = 8, p = 1) -> 32 bytes
//! - Cipher: AES-256-GCM, fresh 96-bit random nonce, detached 128-bit tag
//!
//! The key never leaves this module: it is derived, used for one operation
//! and zeroized on drop.

mod cipher;
mod kdf;

pub use cipher::{decrypt, encrypt, LEGACY_NONCE_SIZE, NONCE_SIZE, TAG_SIZE};
pub use kdf::{derive_key, generate_salt, DerivedKey, KEY_SIZE, SALT_SIZE};
