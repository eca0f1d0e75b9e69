//! Encoding of the current camera frame for the wire payload.
//!
//! A failed encode never fails the tick: the payload carries `null` for
//! the frame and the next tick tries again with whatever frame is current.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use signalcast_types::FrameRef;

/// Errors from encoding a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The frame held no bytes.
    #[error("frame is empty")]
    Empty,

    /// The frame exceeded the configured size limit.
    #[error("frame of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge {
        /// Size of the rejected frame.
        size: usize,
        /// Configured limit.
        limit: usize,
    },
}

/// Turns a producer frame into the string carried in `videoFrame`.
pub trait FrameEncoder: Send + Sync {
    /// Encode one frame.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError`] when the frame cannot be sent this tick.
    fn encode(&self, frame: &FrameRef) -> Result<String, FrameError>;
}

/// Base64-encodes frames that the producer has already compressed
/// (typically JPEG), rejecting empty and oversized ones.
#[derive(Debug, Clone, Copy)]
pub struct Base64FrameEncoder {
    max_bytes: usize,
}

impl Base64FrameEncoder {
    /// Create an encoder that rejects frames larger than `max_bytes`.
    pub const fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl FrameEncoder for Base64FrameEncoder {
    fn encode(&self, frame: &FrameRef) -> Result<String, FrameError> {
        if frame.is_empty() {
            return Err(FrameError::Empty);
        }
        if frame.len() > self.max_bytes {
            return Err(FrameError::TooLarge {
                size: frame.len(),
                limit: self.max_bytes,
            });
        }
        Ok(BASE64_STANDARD.encode(frame.as_bytes()))
    }
}
