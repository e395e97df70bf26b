//! QR decode cascade
//!
//! Recovers a payload from an image of unknown provenance (a screenshot, a
//! phone photo, a re-saved JPEG) by running an ordered list of preprocessing
//! strategies until one of them yields content.
//!
//! # Order
//!
//! 1. `native` (darkest channel per pixel)
//! 2. `grayscale`
//! 3. thresholds, morphological close, gaussian blur
//! 4. cubic rescales at 0.5, 0.8, 1.2, 1.5 and 2.0
//! 5. photometric enhancements
//!
//! If the sniffing loader rejects the bytes, a lenient fallback loader reads
//! PNG with chunk checksums ignored (other containers with limits lifted)
//! and the list runs again without `native`. When
//! nothing decodes, a finder-pattern check decides between
//! [`Diagnosis::QrLikePattern`] and [`Diagnosis::NoSymbol`].

mod loader;
mod finder;
mod strategy;

use std::panic::{catch_unwind, AssertUnwindSafe};

use image::DynamicImage;
use tracing::{debug, info, warn};

use crate::error::Result;

pub use loader::{load_fallback, load_primary};
pub use finder::looks_like_qr;
pub use strategy::{
    read_symbol, Enhanced, Enhancement, Grayscale, Native, Rescale, Transform, Transformed,
    MAX_RESCALED_PIXELS, MIN_RESCALED_EDGE,
};

/// Rescale factors tried in order
pub const RESCALE_FACTORS: [f32; 5] = [0.5, 0.8, 1.2, 1.5, 2.0];

/// Which family a strategy belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Native,
    Grayscale,
    Transform,
    Rescale,
    Enhance,
}

/// One way of preparing an image for the symbol reader
pub trait DecodeStrategy: Send + Sync {
    /// Stable name used in logs and in [`DecodeOutcome::Decoded`]
    fn name(&self) -> &str;

    fn stage(&self) -> Stage;

    /// `Ok(None)` when no symbol was found; errors are treated the same way
    /// by the cascade but logged
    fn attempt(&self, image: &DynamicImage) -> Result<Option<String>>;
}

/// Why nothing was decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnosis {
    /// No bytes were supplied
    Empty,
    /// No loader could turn the bytes into an image
    Unreadable,
    /// The image looks like a QR bitmap but its content was unrecoverable
    QrLikePattern,
    /// No symbol found
    NoSymbol,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    Decoded { payload: String, strategy: String },
    NotFound(Diagnosis),
}

impl DecodeOutcome {
    pub fn payload(&self) -> Option<&str> {
        match self {
            DecodeOutcome::Decoded { payload, .. } => Some(payload),
            DecodeOutcome::NotFound(_) => None,
        }
    }

    pub fn into_payload(self) -> Option<String> {
        match self {
            DecodeOutcome::Decoded { payload, .. } => Some(payload),
            DecodeOutcome::NotFound(_) => None,
        }
    }
}

/// Ordered list of decode strategies
pub struct DecodeCascade {
    strategies: Vec<Box<dyn DecodeStrategy>>,
}

impl DecodeCascade {
    /// Build a cascade from an explicit strategy list
    pub fn new(strategies: Vec<Box<dyn DecodeStrategy>>) -> Self {
        Self { strategies }
    }

    /// The full cascade in its standard order
    pub fn standard() -> Self {
        let mut strategies: Vec<Box<dyn DecodeStrategy>> = vec![
            Box::new(Native),
            Box::new(Grayscale),
            Box::new(Transformed::new(
                "threshold-fixed",
                Transform::FixedThreshold(127),
            )),
            Box::new(Transformed::new(
                "threshold-adaptive",
                Transform::AdaptiveThreshold(5),
            )),
            Box::new(Transformed::new("threshold-otsu", Transform::OtsuThreshold)),
            Box::new(Transformed::new("morph-close", Transform::Close(1))),
            Box::new(Transformed::new(
                "gaussian-blur",
                Transform::GaussianBlur(0.8),
            )),
        ];

        for factor in RESCALE_FACTORS {
            strategies.push(Box::new(Rescale::new(factor)));
        }

        let enhancements = [
            ("enhance-contrast", Enhancement::Contrast(100.0)),
            ("enhance-sharpen", Enhancement::Sharpen(1.0, 2)),
            ("enhance-brightness", Enhancement::Brightness(1.2)),
            ("enhance-invert", Enhancement::Invert),
            ("enhance-autocontrast", Enhancement::Autocontrast),
        ];
        for (name, enhancement) in enhancements {
            strategies.push(Box::new(Enhanced::new(name, enhancement)));
        }

        Self::new(strategies)
    }

    /// Names of the strategies in order
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Decode a payload from encoded image bytes
    pub fn decode(&self, bytes: &[u8]) -> DecodeOutcome {
        if bytes.is_empty() {
            return DecodeOutcome::NotFound(Diagnosis::Empty);
        }

        let (image, via_fallback) = match load_primary(bytes) {
            Ok(image) => (image, false),
            Err(primary) => {
                debug!("Primary loader rejected {} bytes: {}", bytes.len(), primary);
                match catch_unwind(|| load_fallback(bytes)) {
                    Ok(Ok(image)) => (image, true),
                    Ok(Err(fallback)) => {
                        info!("Could not load image ({} bytes): {}", bytes.len(), fallback);
                        return DecodeOutcome::NotFound(Diagnosis::Unreadable);
                    }
                    Err(_) => {
                        warn!("Fallback loader panicked on {} bytes", bytes.len());
                        return DecodeOutcome::NotFound(Diagnosis::Unreadable);
                    }
                }
            }
        };

        debug!(
            "Decoding {}x{} image{}",
            image.width(),
            image.height(),
            if via_fallback { " via fallback loader" } else { "" }
        );

        if let Some(outcome) = self.run(&image, via_fallback) {
            return outcome;
        }

        if looks_like_qr(&image) {
            info!("Finder patterns present: QR-like pattern, content unrecoverable");
            DecodeOutcome::NotFound(Diagnosis::QrLikePattern)
        } else {
            info!("All decode strategies failed");
            DecodeOutcome::NotFound(Diagnosis::NoSymbol)
        }
    }

    /// Decode a payload from an already loaded image
    pub fn decode_image(&self, image: &DynamicImage) -> DecodeOutcome {
        self.run(image, false).unwrap_or_else(|| {
            if looks_like_qr(image) {
                DecodeOutcome::NotFound(Diagnosis::QrLikePattern)
            } else {
                DecodeOutcome::NotFound(Diagnosis::NoSymbol)
            }
        })
    }

    fn run(&self, image: &DynamicImage, skip_native: bool) -> Option<DecodeOutcome> {
        for strategy in &self.strategies {
            if skip_native && strategy.stage() == Stage::Native {
                continue;
            }

            match catch_unwind(AssertUnwindSafe(|| strategy.attempt(image))) {
                Ok(Ok(Some(payload))) if !payload.is_empty() => {
                    info!(
                        "Decoded {} chars with strategy {}",
                        payload.chars().count(),
                        strategy.name()
                    );
                    return Some(DecodeOutcome::Decoded {
                        payload,
                        strategy: strategy.name().to_string(),
                    });
                }
                Ok(Ok(_)) => debug!("Strategy {} found nothing", strategy.name()),
                Ok(Err(e)) => debug!("Strategy {} failed: {}", strategy.name(), e),
                Err(_) => warn!("Strategy {} panicked", strategy.name()),
            }
        }
        None
    }
}

impl Default for DecodeCascade {
    fn default() -> Self {
        Self::standard()
    }
}
