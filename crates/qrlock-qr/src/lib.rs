//! QR Locker QR - Symbol rendering and recovery
//!
//! [`QrEncoder`] renders a transport string as a high-redundancy PNG.
//! [`DecodeCascade`] recovers the string from an arbitrary image, trying a
//! fixed sequence of preprocessing strategies until one yields content.

pub mod decode;
pub mod encode;
pub mod error;

pub use decode::{DecodeCascade, DecodeOutcome, DecodeStrategy, Diagnosis, Stage};
pub use encode::QrEncoder;
pub use error::{QrError, Result};
