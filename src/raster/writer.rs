use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::formats::depth_map::DepthMap;

type IOResult = Result<(), std::io::Error>;

/// Quantization ceiling for PGM samples.
const PGM_MAXVAL: u8 = 255;

/// PFM scale line. The negative sign declares little-endian samples.
const PFM_SCALE: f32 = -1.0;

/// Writes the depth map into the provided writer as binary grayscale PGM,
/// quantizing each value to a single byte.
pub fn write_pgm<W: Write>(map: &DepthMap, writer: &mut W) -> IOResult {
    let header = format!("P5\n{} {} {PGM_MAXVAL}\n", map.width(), map.height());
    writer.write_all(header.as_bytes())?;
    for value in map.values() {
        writer.write_u8((value * PGM_MAXVAL as f32) as u8)?;
    }
    Ok(())
}

/// Writes the depth map into the provided writer as a little-endian PFM.
/// Rows are emitted bottom first, as the format requires.
pub fn write_pfm<W: Write>(map: &DepthMap, writer: &mut W) -> IOResult {
    let header = format!("Pf\n{} {}\n{PFM_SCALE:.6}\n", map.width(), map.height());
    writer.write_all(header.as_bytes())?;
    for row in map.values().chunks(map.width()).rev() {
        for value in row {
            writer.write_f32::<LittleEndian>(*value)?;
        }
    }
    Ok(())
}
