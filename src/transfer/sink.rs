//! Outbound frame transport interface

use super::repack::PixelFormat;
use super::staging::FrameBuffer;

/// Errors raised by frame transports.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport not initialized")]
    NotInitialized,
    #[error("transport library not found: {0}")]
    LibraryNotFound(String),
    #[error("failed to create sender: {0}")]
    CreateFailed(String),
    #[error("invalid source name")]
    InvalidName,
    #[error("frame data size mismatch: expected {expected} bytes, got {actual}")]
    DataSize { expected: usize, actual: usize },
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// A consumer of CPU-side frames (the readback path).
///
/// Each sink runs on its own worker thread and receives frames one at a
/// time in submission order.
pub trait FrameSink: Send + 'static {
    /// Name shown in logs and statistics.
    fn name(&self) -> &str;

    /// Channel order the transport wants. Frames are repacked to it before
    /// [`FrameSink::send`].
    fn preferred_format(&self) -> PixelFormat {
        PixelFormat::Rgba8
    }

    /// Whether the transport can accept frames. Frames offered while not
    /// ready are dropped.
    fn is_ready(&self) -> bool {
        true
    }

    /// Deliver one frame. The buffer returns to its pool afterwards.
    fn send(&mut self, frame: &FrameBuffer) -> Result<(), TransportError>;

    /// Release transport resources. Called once when the worker exits.
    fn stop(&mut self) {}
}
