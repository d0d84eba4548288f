use std::collections::HashSet;

use log::debug;

use super::Stage;
use crate::estimate::batch::BatchScheduler;
use crate::estimate::Estimator;
use crate::formats::frame::Frame;
use crate::formats::provenance::ProvenanceRecord;
use crate::pipeline::channel::Channel;
use crate::pipeline::PipelineMessage;
use crate::raster::write_pgm;

/// Transform stage: buffers incoming frames into estimator batches and
/// emits one encoded archive entry per frame. Frames whose index is
/// already archived are skipped without invoking the estimator; progress
/// still advances for them.
///
/// The provenance record rides along and is emitted once, right before the
/// first computed entry, so a run that computes nothing also writes
/// nothing.
pub struct EstimateStage {
    estimator: Box<dyn Estimator>,
    scheduler: BatchScheduler,
    existing: HashSet<u32>,
    pending: Vec<(Frame, u32)>,
    provenance: Option<ProvenanceRecord>,
}

impl EstimateStage {
    pub fn new(
        estimator: Box<dyn Estimator>,
        scheduler: BatchScheduler,
        existing: HashSet<u32>,
        provenance: ProvenanceRecord,
    ) -> Self {
        Self {
            estimator,
            scheduler,
            existing,
            pending: Vec::new(),
            provenance: Some(provenance),
        }
    }

    fn flush_batch(&mut self, out: &Channel) {
        if self.pending.is_empty() {
            return;
        }
        let (frames, indices): (Vec<Frame>, Vec<u32>) = self.pending.drain(..).unzip();
        let (valid, mut maps) = match self.scheduler.run_batch(self.estimator.as_mut(), &frames) {
            Ok(result) => result,
            Err(e) => {
                out.send(PipelineMessage::Failure(format!(
                    "Depth estimation failed: {e}"
                )));
                return;
            }
        };
        maps.truncate(valid);

        for (map, index) in maps.into_iter().zip(indices) {
            let mut bytes = Vec::new();
            if let Err(e) = write_pgm(&map, &mut bytes) {
                out.send(PipelineMessage::Failure(format!(
                    "Could not encode entry {index}: {e}"
                )));
                return;
            }
            if let Some(record) = self.provenance.take() {
                out.send(PipelineMessage::Provenance(record));
            }
            out.send(PipelineMessage::IndexedEntry(bytes, index));
        }
    }
}

impl Stage for EstimateStage {
    fn handle(&mut self, messages: Vec<PipelineMessage>, out: &Channel) {
        for message in messages {
            match message {
                PipelineMessage::IndexedFrame(frame, index) => {
                    if self.existing.contains(&index) {
                        debug!("Entry {index} already archived, skipping");
                        out.send(PipelineMessage::DummyForIncrement);
                        continue;
                    }
                    self.pending.push((frame, index));
                    if self.pending.len() >= self.scheduler.batch_size() {
                        self.flush_batch(out);
                    }
                }
                PipelineMessage::End => {
                    self.flush_batch(out);
                    out.send(message);
                }
                other => out.send(other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::unbounded;

    use super::*;
    use crate::estimate::luma::LumaEstimator;

    fn record() -> ProvenanceRecord {
        ProvenanceRecord {
            hashval: "00ff".to_string(),
            framecount: 4,
            startframe: 0,
            width: 2,
            height: 2,
            model_type: "luma".to_string(),
            model_type_val: 0,
            depth_map_type: 0,
            original_name: "in.png".to_string(),
            original_width: 2,
            original_height: 2,
            original_framerate: 0.0,
            timestamp: 0,
            program: "depthtk".to_string(),
            version: "0.0.0".to_string(),
        }
    }

    fn stage(batch_size: usize, existing: &[u32]) -> EstimateStage {
        EstimateStage::new(
            Box::new(LumaEstimator::new()),
            BatchScheduler::new(batch_size),
            existing.iter().copied().collect(),
            record(),
        )
    }

    fn frame(shade: f32) -> Frame {
        let mut data = vec![shade; 12];
        data[0] = 1.0;
        Frame::new(2, 2, data)
    }

    fn run(stage: &mut EstimateStage, messages: Vec<PipelineMessage>) -> Vec<PipelineMessage> {
        let (progress_tx, _progress_rx) = unbounded();
        let mut channel = Channel::new(progress_tx);
        let output = channel.subscribe();
        stage.handle(messages, &channel);
        output.try_iter().collect()
    }

    #[test]
    fn provenance_precedes_the_first_entry() {
        let mut stage = stage(2, &[]);
        let messages = run(
            &mut stage,
            vec![
                PipelineMessage::IndexedFrame(frame(0.2), 0),
                PipelineMessage::IndexedFrame(frame(0.4), 1),
            ],
        );
        assert!(matches!(messages[0], PipelineMessage::Provenance(_)));
        assert!(matches!(messages[1], PipelineMessage::IndexedEntry(_, 0)));
        assert!(matches!(messages[2], PipelineMessage::IndexedEntry(_, 1)));
    }

    #[test]
    fn partial_batch_is_flushed_at_end() {
        let mut stage = stage(4, &[]);
        let first = run(
            &mut stage,
            vec![PipelineMessage::IndexedFrame(frame(0.2), 0)],
        );
        // below the batch size, nothing leaves the stage yet
        assert!(first.is_empty());

        let closing = run(&mut stage, vec![PipelineMessage::End]);
        assert!(matches!(closing[0], PipelineMessage::Provenance(_)));
        assert!(matches!(closing[1], PipelineMessage::IndexedEntry(_, 0)));
        assert!(matches!(closing[2], PipelineMessage::End));
    }

    #[test]
    fn archived_indices_are_skipped_without_estimating() {
        let mut stage = stage(2, &[0, 1]);
        let messages = run(
            &mut stage,
            vec![
                PipelineMessage::IndexedFrame(frame(0.2), 0),
                PipelineMessage::IndexedFrame(frame(0.4), 1),
                PipelineMessage::End,
            ],
        );
        assert!(matches!(messages[0], PipelineMessage::DummyForIncrement));
        assert!(matches!(messages[1], PipelineMessage::DummyForIncrement));
        // nothing was computed, so the provenance was never emitted
        assert!(matches!(messages[2], PipelineMessage::End));
        assert_eq!(messages.len(), 3);
    }

    #[test]
    fn entries_are_pgm_encoded() {
        let mut stage = stage(1, &[]);
        let messages = run(
            &mut stage,
            vec![PipelineMessage::IndexedFrame(frame(0.5), 0)],
        );
        match &messages[1] {
            PipelineMessage::IndexedEntry(bytes, 0) => {
                assert!(bytes.starts_with(b"P5\n2 2 255\n"));
                assert_eq!(bytes.len(), 11 + 4);
            }
            other => panic!("expected an entry, got {other:?}"),
        }
    }

    #[test]
    fn failures_pass_through() {
        let mut stage = stage(2, &[]);
        let messages = run(
            &mut stage,
            vec![PipelineMessage::Failure("upstream broke".to_string())],
        );
        assert!(matches!(messages[0], PipelineMessage::Failure(_)));
    }
}
