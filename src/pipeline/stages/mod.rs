mod archive;
mod estimate;
mod read;

pub use archive::ArchiveStage;
pub use estimate::EstimateStage;
pub use read::ReadStage;

use super::{Channel, PipelineMessage};

/// One stage of a generation pipeline. The executor thread calls `handle`
/// with whatever batch of messages was waiting on the input; a stage with
/// no upstream gets a single closing batch of `[End]`.
pub trait Stage: Send {
    fn handle(&mut self, messages: Vec<PipelineMessage>, out: &Channel);
}
