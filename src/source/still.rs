use std::path::Path;

use super::{frame_from_rgb_bytes, FrameSource, SourceError};
use crate::formats::frame::Frame;

/// A one-frame source backed by a still image, decoded eagerly on open so
/// that unreadable inputs fail before any output exists. The format comes
/// from the file content, not the extension.
pub struct ImageSource {
    frame: Option<Frame>,
    width: usize,
    height: usize,
}

impl ImageSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<ImageSource, SourceError> {
        let img = image::io::Reader::open(path)?
            .with_guessed_format()?
            .decode()?
            .to_rgb8();
        let (width, height) = (img.width() as usize, img.height() as usize);
        let frame = frame_from_rgb_bytes(img.as_raw(), width, height);
        Ok(ImageSource {
            frame: Some(frame),
            width,
            height,
        })
    }
}

impl FrameSource for ImageSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        Ok(self.frame.take())
    }

    fn frame_count(&self) -> Option<u32> {
        Some(1)
    }

    fn frame_rate(&self) -> Option<f64> {
        None
    }

    fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

/// Decodes an in-memory encoded image (jpg, png, ..) into a frame, as
/// received in compute request payloads.
pub fn decode_image_bytes(bytes: &[u8]) -> Result<Frame, SourceError> {
    let img = image::load_from_memory(bytes)?.to_rgb8();
    let (width, height) = (img.width() as usize, img.height() as usize);
    Ok(frame_from_rgb_bytes(img.as_raw(), width, height))
}

/// Encodes a frame as JPEG for shipping over the wire.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, SourceError> {
    let pixels: Vec<u8> = frame.data().iter().map(|v| (v * 255.0) as u8).collect();
    let img = image::RgbImage::from_raw(frame.width() as u32, frame.height() as u32, pixels)
        .ok_or_else(|| SourceError::InvalidMedia("frame buffer size mismatch".to_string()))?;
    let mut out = Vec::new();
    img.write_to(
        &mut std::io::Cursor::new(&mut out),
        image::ImageOutputFormat::Jpeg(quality),
    )?;
    Ok(out)
}
