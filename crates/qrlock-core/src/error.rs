//! Error types for message sealing

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// User input violates a stated constraint; the message is shown verbatim
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Format(FormatError),

    #[error("Data too large for QR code ({len} > {max} characters)")]
    PayloadTooLarge { len: usize, max: usize },

    /// Both failure reasons share one message so callers cannot tell a wrong
    /// password from a tampered bundle.
    #[error("Incorrect password or corrupted data")]
    Decryption(DecryptFailure),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// The internal decrypt failure reason, if this is a decryption error
    pub fn decrypt_failure(&self) -> Option<DecryptFailure> {
        match self {
            Error::Decryption(reason) => Some(*reason),
            _ => None,
        }
    }

    pub(crate) fn malformed() -> Self {
        Error::Decryption(DecryptFailure::Malformed)
    }
}

/// Input constraint violations
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error("Password is required")]
    MissingPassword,

    #[error("Message too long (max {0} characters)")]
    MessageTooLong(usize),

    #[error("Password must be at least {0} characters")]
    PasswordTooShort(usize),
}

/// Structural problems with a serialized bundle
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    #[error("Invalid encrypted data format")]
    InvalidJson,

    #[error("Invalid encrypted data structure")]
    InvalidStructure,
}

/// Why a decryption was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptFailure {
    /// Tag verification failed (wrong password or tampered data)
    AuthenticationFailed,
    /// Bad base64, wrong field sizes or non-UTF-8 plaintext
    Malformed,
}
