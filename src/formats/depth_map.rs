use std::fmt::Debug;
use std::str::FromStr;

/// How the values of a depth map are to be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthMapKind {
    /// Larger values are closer to the camera. Relative and unitless.
    Inverse,
    /// Larger values are further from the camera. Relative and unitless.
    Linear,
    /// Distance from the camera in meters.
    Metric,
}

impl DepthMapKind {
    /// Stable integer code recorded in provenance entries.
    pub fn code(self) -> i32 {
        match self {
            DepthMapKind::Inverse => 0,
            DepthMapKind::Linear => 1,
            DepthMapKind::Metric => 2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(DepthMapKind::Inverse),
            1 => Some(DepthMapKind::Linear),
            2 => Some(DepthMapKind::Metric),
            _ => None,
        }
    }
}

impl std::fmt::Display for DepthMapKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DepthMapKind::Inverse => "inverse",
            DepthMapKind::Linear => "linear",
            DepthMapKind::Metric => "metric",
        };
        write!(f, "{name}")
    }
}

impl FromStr for DepthMapKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inverse" => Ok(DepthMapKind::Inverse),
            "linear" => Ok(DepthMapKind::Linear),
            "metric" => Ok(DepthMapKind::Metric),
            _ => Err(format!("unknown depth map kind {s:?}")),
        }
    }
}

/// A single-channel depth map. Values are row-major floats, top row first.
#[derive(Clone, PartialEq)]
pub struct DepthMap {
    width: usize,
    height: usize,
    values: Vec<f32>,
}

impl DepthMap {
    pub fn new(width: usize, height: usize, values: Vec<f32>) -> Self {
        assert_eq!(
            values.len(),
            width * height,
            "depth buffer does not match {width}x{height}"
        );
        Self {
            width,
            height,
            values,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Min-max rescales the map in place to `[0, 1]`. A map whose value
    /// range is not meaningfully above zero is cleared to all zeros rather
    /// than divided by it.
    pub fn normalize(&mut self) {
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for v in &self.values {
            min = min.min(*v);
            max = max.max(*v);
        }
        let range = max - min;
        if range <= f32::EPSILON {
            self.values.iter_mut().for_each(|v| *v = 0.0);
        } else {
            self.values.iter_mut().for_each(|v| *v = (*v - min) / range);
        }
    }
}

impl Debug for DepthMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepthMap")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}
