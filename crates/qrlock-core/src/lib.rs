//! QR Locker Core - Message sealing and the cipher bundle wire format
//!
//! This crate turns a short message and a password into a self-describing
//! [`CipherBundle`] (scrypt key derivation + AES-256-GCM) and back, and owns
//! the JSON transport form that travels inside a QR symbol.

pub mod bundle;
pub mod crypto;
pub mod error;
pub mod validation;

pub use bundle::{CipherBundle, REQUIRED_FIELDS};
pub use crypto::{decrypt, derive_key, encrypt, DerivedKey};
pub use error::{DecryptFailure, Error, FormatError, Result, ValidationError};

/// Maximum message length, counted in UTF-8 bytes
pub const MAX_MESSAGE_BYTES: usize = 500;

/// Minimum password length, counted in characters
pub const MIN_PASSWORD_CHARS: usize = 6;

/// Ceiling on the serialized bundle handed to the QR encoder.
///
/// Bounded by symbol capacity at error-correction level H.
pub const MAX_TRANSPORT_CHARS: usize = 1500;
