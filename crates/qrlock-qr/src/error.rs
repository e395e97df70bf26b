//! Error types for QR rendering and decoding

use thiserror::Error;

pub type Result<T> = std::result::Result<T, QrError>;

#[derive(Error, Debug)]
pub enum QrError {
    /// Payload does not fit in any symbol version at the chosen EC level
    #[error("Payload exceeds QR capacity: {0}")]
    Capacity(String),

    #[error("QR encode error: {0}")]
    Encode(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Symbol decode error: {0}")]
    Symbol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<image::ImageError> for QrError {
    fn from(e: image::ImageError) -> Self {
        QrError::Image(e.to_string())
    }
}

impl From<png::DecodingError> for QrError {
    fn from(e: png::DecodingError) -> Self {
        QrError::Image(e.to_string())
    }
}
