use log::error;

use super::Stage;
use crate::archive::{persist_or_prompt, ArchiveWriter};
use crate::pipeline::channel::Channel;
use crate::pipeline::PipelineMessage;

/// Sink stage: lands entries and provenance in the archive and finalizes
/// it on `End`. The first write error poisons the stage; everything after
/// it is forwarded untouched so the driver still sees a terminated stream.
pub struct ArchiveStage {
    writer: Option<ArchiveWriter>,
    interactive: bool,
}

impl ArchiveStage {
    /// `interactive` enables the retry prompt when the finished archive
    /// cannot be moved into place.
    pub fn new(writer: ArchiveWriter, interactive: bool) -> Self {
        Self {
            writer: Some(writer),
            interactive,
        }
    }

    fn finalize(&mut self, out: &Channel) {
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => return,
        };
        match writer.close() {
            Ok(Some(finished)) => {
                if let Err(e) = persist_or_prompt(&finished, self.interactive) {
                    error!("Could not persist {}: {e}", finished.dest().display());
                    out.send(PipelineMessage::Failure(format!(
                        "Could not persist {}: {e}",
                        finished.dest().display()
                    )));
                }
            }
            Ok(None) => {}
            Err(e) => {
                out.send(PipelineMessage::Failure(format!(
                    "Could not finish the archive: {e}"
                )));
            }
        }
    }
}

impl Stage for ArchiveStage {
    fn handle(&mut self, messages: Vec<PipelineMessage>, out: &Channel) {
        for message in messages {
            match &message {
                PipelineMessage::IndexedEntry(bytes, index) => {
                    if let Some(writer) = self.writer.as_mut() {
                        if let Err(e) = writer.write_entry(*index, bytes) {
                            error!("Dropping archive after write failure: {e}");
                            self.writer = None;
                            out.send(PipelineMessage::Failure(format!(
                                "Could not write entry {index}: {e}"
                            )));
                        }
                    }
                }
                PipelineMessage::Provenance(record) => {
                    if let Some(writer) = self.writer.as_mut() {
                        if let Err(e) = writer.write_provenance(record) {
                            self.writer = None;
                            out.send(PipelineMessage::Failure(format!(
                                "Could not write provenance: {e}"
                            )));
                        }
                    }
                }
                PipelineMessage::End => self.finalize(out),
                _ => {}
            }
            out.send(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::unbounded;
    use tempfile::tempdir;

    use super::*;
    use crate::archive::{ArchiveReader, OpenMode};
    use crate::formats::provenance::ProvenanceRecord;

    fn record() -> ProvenanceRecord {
        ProvenanceRecord {
            hashval: "beef".to_string(),
            framecount: 2,
            startframe: 0,
            width: 2,
            height: 2,
            model_type: "luma".to_string(),
            model_type_val: 0,
            depth_map_type: 0,
            original_name: "in.mp4".to_string(),
            original_width: 2,
            original_height: 2,
            original_framerate: 24.0,
            timestamp: 5,
            program: "depthtk".to_string(),
            version: "0.0.0".to_string(),
        }
    }

    fn run(stage: &mut ArchiveStage, messages: Vec<PipelineMessage>) -> Vec<PipelineMessage> {
        let (progress_tx, _progress_rx) = unbounded();
        let mut channel = Channel::new(progress_tx);
        let output = channel.subscribe();
        stage.handle(messages, &channel);
        output.try_iter().collect()
    }

    #[test]
    fn entries_and_provenance_land_in_the_archive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.dtz");
        let writer = ArchiveWriter::open(&path, OpenMode::Create, false).unwrap();
        let mut stage = ArchiveStage::new(writer, false);

        let messages = run(
            &mut stage,
            vec![
                PipelineMessage::Provenance(record()),
                PipelineMessage::IndexedEntry(b"alpha".to_vec(), 0),
                PipelineMessage::IndexedEntry(b"beta".to_vec(), 1),
                PipelineMessage::End,
            ],
        );
        // every message is forwarded, no failures injected
        assert_eq!(messages.len(), 4);
        assert!(matches!(messages[3], PipelineMessage::End));

        let mut reader = ArchiveReader::open(&path).unwrap();
        assert!(reader.is_full(2));
        assert_eq!(reader.read_entry(1).unwrap(), b"beta");
        assert_eq!(reader.read_provenance().unwrap(), record());
    }

    #[test]
    fn duplicate_entry_poisons_the_stage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.dtz");
        // buffered, so a poisoned run leaves no file behind
        let writer = ArchiveWriter::open(&path, OpenMode::Create, true).unwrap();
        let mut stage = ArchiveStage::new(writer, false);

        let messages = run(
            &mut stage,
            vec![
                PipelineMessage::IndexedEntry(b"alpha".to_vec(), 0),
                PipelineMessage::IndexedEntry(b"again".to_vec(), 0),
                PipelineMessage::End,
            ],
        );
        let failures = messages
            .iter()
            .filter(|m| matches!(m, PipelineMessage::Failure(_)))
            .count();
        assert_eq!(failures, 1);
        // the poisoned stage no longer persists anything
        assert!(!path.exists());
    }
}
