//! Source configuration model.
//!
//! A source is one configured video origin, uniquely keyed by name. The
//! struct mirrors the durable state file: time-of-day fields are true
//! `NaiveTime` values that serialize as ISO-8601 text, and encoder settings
//! are only consulted through the closed [`EncoderParams`] union.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Malformed or partially-specified source configuration.
///
/// Rejected at the boundary; never partially applied.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigInvalid {
    #[error("source name must not be empty")]
    EmptyName,

    #[error("source name {0:?} must not contain path separators or \"..\"")]
    UnsafeName(String),

    #[error("source url must not be empty")]
    EmptyUrl,

    #[error("interval_minutes must be at least 1")]
    ZeroInterval,

    #[error("resize is set but width/height are missing or zero")]
    IncompleteResize,

    #[error("use_save_time_interval is set but save_time_start/save_time_end are missing")]
    IncompleteWindow,

    #[error("{field} value {value} is out of range {min}..={max}")]
    QualityOutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("source name is immutable: expected {expected:?}, got {got:?}")]
    NameMismatch { expected: String, got: String },
}

/// Image file format for captured frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpg,
    Jp2,
    Webp,
    Png,
}

impl Default for ImageFormat {
    fn default() -> Self {
        Self::Jpg
    }
}

impl ImageFormat {
    /// Filename extension including the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpg => ".jpg",
            ImageFormat::Jp2 => ".jp2",
            ImageFormat::Webp => ".webp",
            ImageFormat::Png => ".png",
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageFormat::Jpg => write!(f, "jpg"),
            ImageFormat::Jp2 => write!(f, "jp2"),
            ImageFormat::Webp => write!(f, "webp"),
            ImageFormat::Png => write!(f, "png"),
        }
    }
}

/// Encoder parameters keyed by format.
///
/// Each variant carries only the settings its encoder accepts; a field is
/// populated only when `use_flags` is set and the value is non-zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderParams {
    Jpeg { quality: Option<u8>, optimize: bool },
    Jpeg2000 { compression: Option<u16> },
    WebP { quality: Option<u8> },
    Png { compression: Option<u8> },
}

impl EncoderParams {
    /// The format this parameter set encodes to.
    pub fn format(&self) -> ImageFormat {
        match self {
            EncoderParams::Jpeg { .. } => ImageFormat::Jpg,
            EncoderParams::Jpeg2000 { .. } => ImageFormat::Jp2,
            EncoderParams::WebP { .. } => ImageFormat::Webp,
            EncoderParams::Png { .. } => ImageFormat::Png,
        }
    }
}

fn default_save_images() -> bool {
    true
}

/// One configured video source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    /// Unique identifier; doubles as the image folder name. Immutable.
    pub name: String,
    /// Connection address for the capture backend. Unique across sources.
    pub url: String,
    /// Period of the recurring capture job, in minutes.
    pub interval_minutes: u32,
    /// When false the source is configured but no capture job runs.
    #[serde(default = "default_save_images")]
    pub save_images: bool,
    #[serde(default)]
    pub resize: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default)]
    pub extension: ImageFormat,
    /// Gates all per-format quality fields.
    #[serde(default)]
    pub use_flags: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jpg_quality: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jpg_optimize: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jp2_compression: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webp_quality: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub png_compression: Option<u8>,
    /// When set, captures run only inside [save_time_start, save_time_end].
    #[serde(default)]
    pub use_save_time_interval: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_time_start: Option<NaiveTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_time_end: Option<NaiveTime>,
}

impl SourceConfig {
    /// Minimal config with defaults for everything optional.
    pub fn new(name: impl Into<String>, url: impl Into<String>, interval_minutes: u32) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            interval_minutes,
            save_images: true,
            resize: false,
            width: None,
            height: None,
            extension: ImageFormat::default(),
            use_flags: false,
            jpg_quality: None,
            jpg_optimize: None,
            jp2_compression: None,
            webp_quality: None,
            png_compression: None,
            use_save_time_interval: false,
            save_time_start: None,
            save_time_end: None,
        }
    }

    /// Validates invariants that hold for every stored config.
    pub fn validate(&self) -> Result<(), ConfigInvalid> {
        if self.name.trim().is_empty() {
            return Err(ConfigInvalid::EmptyName);
        }
        // The name doubles as a folder name under image_root; keep it there.
        if self.name.contains(['/', '\\']) || self.name.contains("..") {
            return Err(ConfigInvalid::UnsafeName(self.name.clone()));
        }
        if self.url.trim().is_empty() {
            return Err(ConfigInvalid::EmptyUrl);
        }
        if self.interval_minutes == 0 {
            return Err(ConfigInvalid::ZeroInterval);
        }
        if self.resize && !matches!((self.width, self.height), (Some(w), Some(h)) if w > 0 && h > 0)
        {
            return Err(ConfigInvalid::IncompleteResize);
        }
        if self.use_save_time_interval
            && (self.save_time_start.is_none() || self.save_time_end.is_none())
        {
            return Err(ConfigInvalid::IncompleteWindow);
        }

        if let Some(q) = self.jpg_quality {
            check_range("jpg_quality", q as u32, 0, 100)?;
        }
        if let Some(o) = self.jpg_optimize {
            check_range("jpg_optimize", o as u32, 0, 1)?;
        }
        if let Some(c) = self.jp2_compression {
            check_range("jp2_compression", c as u32, 0, 1000)?;
        }
        if let Some(q) = self.webp_quality {
            check_range("webp_quality", q as u32, 1, 100)?;
        }
        if let Some(c) = self.png_compression {
            check_range("png_compression", c as u32, 0, 9)?;
        }

        Ok(())
    }

    /// Resize target, when configured with valid dimensions.
    pub fn resize_dimensions(&self) -> Option<(u32, u32)> {
        if !self.resize {
            return None;
        }
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }

    /// Builds the encoder parameter set for this source's format.
    ///
    /// Only the quality fields matching `extension` are consulted, and only
    /// when `use_flags` is set and the value is non-zero.
    pub fn encoder_params(&self) -> EncoderParams {
        let gated = self.use_flags;
        match self.extension {
            ImageFormat::Jpg => EncoderParams::Jpeg {
                quality: self.jpg_quality.filter(|&q| gated && q > 0),
                optimize: gated && self.jpg_optimize.map(|o| o > 0).unwrap_or(false),
            },
            ImageFormat::Jp2 => EncoderParams::Jpeg2000 {
                compression: self.jp2_compression.filter(|&c| gated && c > 0),
            },
            ImageFormat::Webp => EncoderParams::WebP {
                quality: self.webp_quality.filter(|&q| gated && q > 0),
            },
            ImageFormat::Png => EncoderParams::Png {
                compression: self.png_compression.filter(|&c| gated && c > 0),
            },
        }
    }
}

fn check_range(
    field: &'static str,
    value: u32,
    min: u32,
    max: u32,
) -> Result<(), ConfigInvalid> {
    if value < min || value > max {
        return Err(ConfigInvalid::QualityOutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}
