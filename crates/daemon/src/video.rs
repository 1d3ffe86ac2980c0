//! Video source capability.
//!
//! The daemon never talks to a camera protocol directly; it consumes this
//! trait and reads exactly one frame per firing. Real RTSP/HTTP backends are
//! external collaborators. [`StubVideoSource`] generates synthetic frames so
//! the daemon and its tests run without hardware.

use serde::Serialize;
use thiserror::Error;

/// Error type for video source operations
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source could not be opened at all
    #[error("Video source unavailable: {url}")]
    Unavailable { url: String },
}

/// One decoded frame, tightly packed RGB8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes, row-major.
    pub data: Vec<u8>,
}

impl Frame {
    /// Solid-color frame, mostly useful for tests and the stub backend.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            data,
        }
    }
}

/// Runtime reachability info for a configured source.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StreamInfo {
    pub reachable: bool,
    pub width: u32,
    pub height: u32,
    pub fps: f32,
}

impl StreamInfo {
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            width: 0,
            height: 0,
            fps: 0.0,
        }
    }
}

/// An open connection to one video source.
///
/// Dropping the handle releases the underlying source; release happens even
/// when encoding later fails because the handle never outlives the firing.
pub trait SourceHandle: Send {
    /// Reads the next frame, or `None` when the source yields nothing.
    fn read_frame(&mut self) -> Option<Frame>;

    /// Static stream properties as reported by the source.
    fn info(&self) -> StreamInfo;
}

/// Capability for opening video sources by URL.
pub trait VideoSource: Send + Sync {
    fn open(&self, url: &str) -> Result<Box<dyn SourceHandle>, SourceError>;

    /// Synchronous reachability probe for dashboard use.
    fn probe(&self, url: &str) -> StreamInfo {
        match self.open(url) {
            Ok(handle) => handle.info(),
            Err(_) => StreamInfo::unreachable(),
        }
    }
}

/// Synthetic-frame backend for running without a camera.
///
/// Produces a fixed-size gray frame for any URL; URLs containing
/// `"unreachable"` fail to open, which makes fault paths scriptable.
pub struct StubVideoSource {
    width: u32,
    height: u32,
}

impl StubVideoSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for StubVideoSource {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

struct StubHandle {
    width: u32,
    height: u32,
}

impl SourceHandle for StubHandle {
    fn read_frame(&mut self) -> Option<Frame> {
        Some(Frame::solid(self.width, self.height, [96, 96, 96]))
    }

    fn info(&self) -> StreamInfo {
        StreamInfo {
            reachable: true,
            width: self.width,
            height: self.height,
            fps: 25.0,
        }
    }
}

impl VideoSource for StubVideoSource {
    fn open(&self, url: &str) -> Result<Box<dyn SourceHandle>, SourceError> {
        if url.contains("unreachable") {
            return Err(SourceError::Unavailable {
                url: url.to_string(),
            });
        }
        Ok(Box::new(StubHandle {
            width: self.width,
            height: self.height,
        }))
    }
}
