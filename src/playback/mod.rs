//! Playback state machine
//!
//! A [`PlaybackEngine`] wraps one pollable decoder and throttles frame
//! delivery to the stream's native pace. Callers poll [`PlaybackEngine::get_frame`]
//! in a loop; there is no blocking wait inside the engine.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::formats::frame::Frame;
use crate::source::SourceError;

mod ffmpeg;

pub use ffmpeg::{FfmpegDecoder, FfmpegOpener};

/// Poll-again delay when the decoder has nothing ready yet.
const RETRY_DELAY: Duration = Duration::from_millis(10);

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("Could not open media: {0}")]
    Open(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// One poll of a decoder.
pub enum DecodeEvent {
    /// A decoded frame and how long it should stay up.
    Frame(Frame, Duration),
    /// Nothing decodable yet; poll again shortly.
    Pending,
    /// The stream has ended.
    Eof,
}

/// A pollable media decoder driving one playback session.
pub trait StreamDecoder: Send {
    fn poll(&mut self) -> DecodeEvent;
}

/// Opens decoders for media paths, keeping the engine independent of any
/// concrete decoder.
pub trait StreamOpener: Send {
    fn open(&self, media: &str) -> Result<Box<dyn StreamDecoder>, PlaybackError>;
}

/// Play/pause/stop around one decoder, with real-time frame throttling.
/// Transitions are serialized; the engine is owned by a single controller.
pub struct PlaybackEngine {
    state: PlaybackState,
    decoder: Option<Box<dyn StreamDecoder>>,
    next_emission: Instant,
    /// Time left on the throttle when the stream was paused.
    remaining: Duration,
    max_pixels: i64,
}

impl PlaybackEngine {
    /// `max_pixels` caps the pixel count of emitted frames; a non-positive
    /// value disables the cap.
    pub fn new(max_pixels: i64) -> Self {
        Self {
            state: PlaybackState::Stopped,
            decoder: None,
            next_emission: Instant::now(),
            remaining: Duration::ZERO,
            max_pixels,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Starts playing a freshly opened stream. An engine already playing or
    /// paused tears its current stream down first, with no intermediate
    /// state.
    pub fn play(&mut self, decoder: Box<dyn StreamDecoder>) {
        self.decoder = Some(decoder);
        self.state = PlaybackState::Playing;
        self.next_emission = Instant::now();
    }

    /// Suspends the frame clock. Idempotent; a stopped engine stays stopped.
    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.remaining = self.next_emission.saturating_duration_since(Instant::now());
            self.state = PlaybackState::Paused;
        }
    }

    /// Restores the frame clock where [`PlaybackEngine::pause`] left it.
    pub fn resume(&mut self) {
        if self.state == PlaybackState::Paused {
            self.next_emission = Instant::now() + self.remaining;
            self.state = PlaybackState::Playing;
        }
    }

    /// Tears down the current stream. Idempotent.
    pub fn stop(&mut self) {
        self.decoder = None;
        self.state = PlaybackState::Stopped;
    }

    /// Polls for the next displayable frame. `None` while stopped or
    /// paused, while the current frame's time slot has not elapsed, and
    /// permanently once the stream has ended. After a returned frame the
    /// throttle is reset to now plus that frame's duration.
    pub fn get_frame(&mut self) -> Option<Frame> {
        if self.state != PlaybackState::Playing {
            return None;
        }
        let now = Instant::now();
        if now < self.next_emission {
            return None;
        }
        let decoder = self.decoder.as_mut()?;
        match decoder.poll() {
            DecodeEvent::Frame(frame, duration) => {
                self.next_emission = Instant::now() + duration;
                Some(self.apply_pixel_cap(frame))
            }
            DecodeEvent::Pending => {
                self.next_emission = now + RETRY_DELAY;
                None
            }
            DecodeEvent::Eof => {
                self.decoder = None;
                None
            }
        }
    }

    fn apply_pixel_cap(&self, frame: Frame) -> Frame {
        if self.max_pixels <= 0 {
            return frame;
        }
        frame.fit_to_pixels(self.max_pixels as usize)
    }
}
