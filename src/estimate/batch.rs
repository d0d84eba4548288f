use rayon::prelude::*;

use super::{EstimateError, Estimator};
use crate::formats::depth_map::DepthMap;
use crate::formats::frame::Frame;

/// Groups per-frame estimation calls into uniform fixed-size batches
/// without changing any observable per-frame output.
pub struct BatchScheduler {
    batch_size: usize,
}

impl BatchScheduler {
    pub fn new(batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch size must be positive");
        Self { batch_size }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Runs one batch. Takes up to `batch_size` frames, padding with zero
    /// frames when fewer are available so the backend always sees a uniform
    /// batch shape. Returns how many results are real and `batch_size`
    /// normalized maps aligned with input order; the maps past the real
    /// count correspond to padding and carry no meaning.
    ///
    /// Each map is min-max normalized on its own. Normalization is never
    /// computed jointly across the batch.
    pub fn run_batch(
        &self,
        estimator: &mut dyn Estimator,
        frames: &[Frame],
    ) -> Result<(usize, Vec<DepthMap>), EstimateError> {
        if frames.is_empty() {
            return Ok((0, Vec::new()));
        }
        let valid = frames.len().min(self.batch_size);
        let mut batch: Vec<Frame> = frames[..valid].to_vec();
        let (width, height) = (batch[0].width(), batch[0].height());
        while batch.len() < self.batch_size {
            batch.push(Frame::zeros(width, height));
        }

        let mut maps = estimator.estimate_batch(&batch)?;
        maps.par_iter_mut().for_each(|map| map.normalize());
        Ok((valid, maps))
    }
}
