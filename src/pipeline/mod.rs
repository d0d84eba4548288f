//! Threaded generation pipeline
//!
//! Archive generation runs as a chain of stages, one thread each, joined by
//! bounded channels: a reader decodes frames, an estimator turns them into
//! depth maps and an archiver persists the result. Stages communicate only
//! through [`PipelineMessage`] values, so each one can be exercised on its
//! own in tests.

mod channel;
mod executor;
pub mod stages;

pub use channel::Channel;
pub use executor::Executor;

use crate::formats::frame::Frame;
use crate::formats::provenance::ProvenanceRecord;

#[derive(Debug, Clone)]
pub enum PipelineMessage {
    /// A decoded frame and its position in the stream.
    IndexedFrame(Frame, u32),
    /// An encoded archive entry and the index it is stored under.
    IndexedEntry(Vec<u8>, u32),
    /// The provenance record of the run, sent once before the first entry.
    Provenance(ProvenanceRecord),
    /// A stage failed. Later stages pass this through untouched so the
    /// driver sees it on the final output.
    Failure(String),
    /// Progress should advance even though nothing was produced, e.g. for
    /// an entry that already existed.
    DummyForIncrement,
    End,
}

#[derive(Debug)]
pub enum Progress {
    Incr,
    Completed,
}
