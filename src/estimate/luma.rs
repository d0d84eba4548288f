use super::{EstimateError, Estimator};
use crate::formats::depth_map::{DepthMap, DepthMapKind};
use crate::formats::frame::Frame;

/// Treats perceptual brightness as inverse depth. Needs no model weights,
/// so it exercises the full pipeline on any machine and serves as the
/// fallback backend.
#[derive(Debug, Default)]
pub struct LumaEstimator;

impl LumaEstimator {
    pub fn new() -> Self {
        Self
    }
}

impl Estimator for LumaEstimator {
    fn model_type(&self) -> &str {
        "luma"
    }

    fn model_type_val(&self) -> i32 {
        0
    }

    fn output_kind(&self) -> DepthMapKind {
        DepthMapKind::Inverse
    }

    fn estimate(&mut self, frame: &Frame) -> Result<DepthMap, EstimateError> {
        // Rec. 709 luma coefficients
        let values = frame
            .data()
            .chunks_exact(3)
            .map(|px| 0.2126 * px[0] + 0.7152 * px[1] + 0.0722 * px[2])
            .collect();
        Ok(DepthMap::new(frame.width(), frame.height(), values))
    }
}
