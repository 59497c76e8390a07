use std::future::Future;
use std::io::Cursor;

use image::imageops::FilterType;
use image::ImageReader;
use motion_diff_common::frame::{FrameBuffer, FrameError};
use tracing::debug;

/// Supplies frames to the engine on demand.
///
/// A failure is an explicit error; the engine skips the cycle and keeps its
/// previous frame.
pub trait FrameSource: Send {
    fn acquire_frame(&mut self) -> impl Future<Output = Result<FrameBuffer, SourceError>> + Send;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("frame source unavailable: {0}")]
    Unavailable(String),
    #[error("frame source returned HTTP status {0}")]
    Status(u16),
    #[error("failed to decode frame: {0}")]
    Decode(String),
    #[error("decoded frame rejected: {0}")]
    Frame(#[from] FrameError),
}

/// Decode an encoded still image (JPEG, PNG, ...) into an RGBA frame.
///
/// With `resize` the image is scaled to `width` x `height`. Without it the
/// frame keeps its native size and the engine rejects it on mismatch.
pub fn decode_frame(
    bytes: &[u8],
    width: u32,
    height: u32,
    resize: bool,
) -> Result<FrameBuffer, SourceError> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| SourceError::Decode(e.to_string()))?
        .decode()
        .map_err(|e| SourceError::Decode(e.to_string()))?;

    let img = if resize && (img.width() != width || img.height() != height) {
        debug!(
            from_width = img.width(),
            from_height = img.height(),
            width,
            height,
            "resizing decoded frame"
        );
        img.resize_exact(width, height, FilterType::Triangle)
    } else {
        img
    };

    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    Ok(FrameBuffer::from_rgba(w, h, rgba.into_raw())?)
}
