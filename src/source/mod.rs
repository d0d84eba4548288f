//! Frame acquisition
//!
//! A [`FrameSource`] is an ordered, single-pass sequence of decoded frames.
//! Once a frame has been pulled it cannot be replayed; anything needing a
//! second pass opens a new source.

use thiserror::Error;

use crate::formats::frame::Frame;

mod still;
mod video;

pub use still::{decode_image_bytes, encode_jpeg, ImageSource};
pub use video::{probe_media, FfmpegStream, MediaInfo};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error("Could not decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("ffprobe failed on {path:?}: {reason}")]
    Probe { path: String, reason: String },
    #[error("Invalid media: {0}")]
    InvalidMedia(String),
}

/// Pull-based frame producer.
pub trait FrameSource: Send {
    /// Decodes and returns the next frame, or `None` once the sequence has
    /// ended. A source that returned `None` stays ended.
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;

    /// Number of frames the source expects to produce, when known up front.
    fn frame_count(&self) -> Option<u32>;

    /// Native frame rate, when meaningful for the source.
    fn frame_rate(&self) -> Option<f64>;

    /// Width and height of the frames as decoded.
    fn dimensions(&self) -> (usize, usize);
}

pub(crate) fn frame_from_rgb_bytes(bytes: &[u8], width: usize, height: usize) -> Frame {
    let data = bytes.iter().map(|v| *v as f32 / 255.0).collect();
    Frame::new(width, height, data)
}
