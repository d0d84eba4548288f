use std::time::Duration;

use log::warn;

use super::{DecodeEvent, PlaybackError, StreamDecoder, StreamOpener};
use crate::source::{FfmpegStream, FrameSource};

/// Plays a media file through the rawvideo pipe. Every frame carries the
/// stream's constant per-frame duration.
pub struct FfmpegDecoder {
    stream: FfmpegStream,
    frame_duration: Duration,
}

impl FfmpegDecoder {
    pub fn open(media: &str) -> Result<FfmpegDecoder, PlaybackError> {
        let stream = FfmpegStream::open(media)?;
        // probe_media rejects non-positive rates
        let frame_duration = Duration::from_secs_f64(1.0 / stream.info().frame_rate);
        Ok(FfmpegDecoder {
            stream,
            frame_duration,
        })
    }
}

impl StreamDecoder for FfmpegDecoder {
    fn poll(&mut self) -> DecodeEvent {
        match self.stream.next_frame() {
            Ok(Some(frame)) => DecodeEvent::Frame(frame, self.frame_duration),
            Ok(None) => DecodeEvent::Eof,
            Err(e) => {
                warn!("Decode failed, ending stream: {e}");
                DecodeEvent::Eof
            }
        }
    }
}

/// The default opener used by the playback server.
pub struct FfmpegOpener;

impl StreamOpener for FfmpegOpener {
    fn open(&self, media: &str) -> Result<Box<dyn StreamDecoder>, PlaybackError> {
        Ok(Box::new(FfmpegDecoder::open(media)?))
    }
}
