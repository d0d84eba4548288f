use super::Stage;
use crate::pipeline::channel::Channel;
use crate::pipeline::PipelineMessage;
use crate::source::FrameSource;

/// Source stage: pulls every frame out of a [`FrameSource`] and feeds it
/// downstream with its position in the stream. A frame that exceeds the
/// pixel budget is downscaled before it leaves the stage, so every later
/// stage only ever sees the stored resolution.
pub struct ReadStage {
    source: Box<dyn FrameSource>,
    max_pixels: i64,
}

impl ReadStage {
    /// `max_pixels` caps the per-frame pixel count, zero or negative
    /// disables the cap.
    pub fn new(source: Box<dyn FrameSource>, max_pixels: i64) -> Self {
        Self { source, max_pixels }
    }

    fn drain_source(&mut self, out: &Channel) {
        let mut index = 0u32;
        loop {
            match self.source.next_frame() {
                Ok(Some(frame)) => {
                    let frame = if self.max_pixels > 0 {
                        frame.fit_to_pixels(self.max_pixels as usize)
                    } else {
                        frame
                    };
                    out.send(PipelineMessage::IndexedFrame(frame, index));
                    index += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    out.send(PipelineMessage::Failure(format!(
                        "Could not decode frame {index}: {e}"
                    )));
                    break;
                }
            }
        }
    }
}

impl Stage for ReadStage {
    fn handle(&mut self, messages: Vec<PipelineMessage>, out: &Channel) {
        for message in messages {
            if let PipelineMessage::End = message {
                self.drain_source(out);
            }
            out.send(message);
        }
    }
}
