//! Toolkit for generating, storing and serving per-frame monocular depth
//! maps. Inputs are still images or videos; outputs are `.dtz` archives of
//! greyscale depth maps with provenance, or depth maps computed on demand
//! and served over a small request-reply TCP protocol.

pub mod archive;
pub mod estimate;
pub mod formats;
pub mod generate;
pub mod pipeline;
pub mod playback;
pub mod protocol;
pub mod raster;
pub mod source;
pub mod utils;
pub mod wire;
