//! Frame encode capability.
//!
//! [`ImageCodec`] is the seam between the capture pipeline and pixel work.
//! [`ImageRsCodec`] backs it with the `image` crate: jpeg honors the quality
//! parameter, png maps its 0-9 compression level onto the backend's
//! compression types, webp is lossless (the quality flag is accepted but not
//! consulted), and jp2 has no encoder in this backend.

use crate::source::{EncoderParams, ImageFormat};
use crate::video::Frame;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use std::io::Cursor;
use thiserror::Error;

/// Error type for encode operations
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Frame buffer does not match its declared dimensions
    #[error("Frame buffer does not match {width}x{height} RGB dimensions")]
    BadFrame { width: u32, height: u32 },

    /// The requested format has no encoder in this backend
    #[error("No encoder available for {0} in this backend")]
    UnsupportedFormat(ImageFormat),

    /// The underlying encoder reported a failure
    #[error("Encoder failure: {0}")]
    Backend(#[from] image::ImageError),
}

/// Capability for resizing and encoding captured frames.
pub trait ImageCodec: Send + Sync {
    /// Resizes a frame to exactly `width` x `height`.
    fn resize(&self, frame: &Frame, width: u32, height: u32) -> Result<Frame, EncodeError>;

    /// Encodes a frame with the given format-specific parameters.
    fn encode(&self, frame: &Frame, params: &EncoderParams) -> Result<Vec<u8>, EncodeError>;
}

/// `image`-crate backed codec.
#[derive(Debug, Default)]
pub struct ImageRsCodec;

fn to_rgb_image(frame: &Frame) -> Result<RgbImage, EncodeError> {
    RgbImage::from_raw(frame.width, frame.height, frame.data.clone()).ok_or(
        EncodeError::BadFrame {
            width: frame.width,
            height: frame.height,
        },
    )
}

fn png_compression(level: Option<u8>) -> CompressionType {
    match level {
        Some(0..=3) => CompressionType::Fast,
        Some(7..=9) => CompressionType::Best,
        _ => CompressionType::Default,
    }
}

impl ImageCodec for ImageRsCodec {
    fn resize(&self, frame: &Frame, width: u32, height: u32) -> Result<Frame, EncodeError> {
        let img = to_rgb_image(frame)?;
        let resized = image::imageops::resize(&img, width, height, FilterType::Triangle);
        Ok(Frame {
            width,
            height,
            data: resized.into_raw(),
        })
    }

    fn encode(&self, frame: &Frame, params: &EncoderParams) -> Result<Vec<u8>, EncodeError> {
        let img = to_rgb_image(frame)?;
        let mut out = Cursor::new(Vec::new());

        match params {
            EncoderParams::Jpeg { quality, .. } => {
                let encoder = match quality {
                    Some(q) => JpegEncoder::new_with_quality(&mut out, *q),
                    None => JpegEncoder::new(&mut out),
                };
                encoder.write_image(
                    img.as_raw(),
                    frame.width,
                    frame.height,
                    ExtendedColorType::Rgb8,
                )?;
            }
            EncoderParams::Jpeg2000 { .. } => {
                return Err(EncodeError::UnsupportedFormat(ImageFormat::Jp2));
            }
            EncoderParams::WebP { .. } => {
                WebPEncoder::new_lossless(&mut out).write_image(
                    img.as_raw(),
                    frame.width,
                    frame.height,
                    ExtendedColorType::Rgb8,
                )?;
            }
            EncoderParams::Png { compression } => {
                PngEncoder::new_with_quality(
                    &mut out,
                    png_compression(*compression),
                    PngFilterType::Adaptive,
                )
                .write_image(
                    img.as_raw(),
                    frame.width,
                    frame.height,
                    ExtendedColorType::Rgb8,
                )?;
            }
        }

        Ok(out.into_inner())
    }
}
