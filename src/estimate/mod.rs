use clap::ValueEnum;
use thiserror::Error;

use crate::formats::depth_map::{DepthMap, DepthMapKind};
use crate::formats::frame::Frame;

pub mod batch;
pub mod luma;

#[derive(Error, Debug)]
pub enum EstimateError {
    #[error("Estimation failed: {0}")]
    Failed(String),
}

/// A monocular depth estimation backend. One frame in, one raw (not yet
/// normalized) depth map out.
pub trait Estimator: Send {
    /// Short model identifier, recorded in provenance entries and reported
    /// in protocol handshakes.
    fn model_type(&self) -> &str;

    /// Stable parameter code for the provenance record.
    fn model_type_val(&self) -> i32;

    /// How this backend's output values are to be read.
    fn output_kind(&self) -> DepthMapKind;

    /// Computes the depth map for a single frame.
    fn estimate(&mut self, frame: &Frame) -> Result<DepthMap, EstimateError>;

    /// Computes depth maps for a uniform batch of frames, one result per
    /// input in the same order. Backends without a native batch mode fall
    /// back to estimating frame by frame.
    fn estimate_batch(&mut self, frames: &[Frame]) -> Result<Vec<DepthMap>, EstimateError> {
        frames.iter().map(|frame| self.estimate(frame)).collect()
    }
}

/// Estimation backends selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EstimatorKind {
    /// Perceptual-brightness stand-in, no external model required.
    Luma,
}

impl EstimatorKind {
    pub fn build(self) -> Box<dyn Estimator> {
        match self {
            EstimatorKind::Luma => Box::new(luma::LumaEstimator::new()),
        }
    }
}
