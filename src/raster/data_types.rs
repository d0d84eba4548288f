use std::fmt::{Debug, Formatter};

use crate::formats::depth_map::DepthMap;

/// This struct represents a single binary grayscale `.pgm` file
pub struct PgmImage {
    pub(crate) header: PgmHeader,
    pub(crate) data: Vec<u8>,
}

impl PgmImage {
    pub fn new(header: PgmHeader, data: Vec<u8>) -> Result<Self, String> {
        if header.raster_size() != data.len() {
            Err(format!(
                "Expected {} raster bytes from header, got {} instead",
                header.raster_size(),
                data.len()
            ))
        } else {
            Ok(Self { header, data })
        }
    }

    pub fn header(&self) -> &PgmHeader {
        &self.header
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Expands the quantized samples back into a float map in `[0, 1]`.
    pub fn to_depth_map(&self) -> DepthMap {
        let maxval = self.header.maxval() as f32;
        let values = self.data.iter().map(|v| *v as f32 / maxval).collect();
        DepthMap::new(self.header.width(), self.header.height(), values)
    }
}

impl Clone for PgmImage {
    fn clone(&self) -> Self {
        Self {
            header: self.header.clone(),
            data: self.data.clone(),
        }
    }
}

impl Debug for PgmImage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PgmImage: {:?}", self.header)
    }
}

/// Header information for a binary grayscale PGM file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgmHeader {
    width: usize,
    height: usize,
    maxval: u16,
}

impl PgmHeader {
    pub fn new(width: usize, height: usize, maxval: u16) -> Result<Self, String> {
        if width == 0 || height == 0 {
            return Err(format!(
                "Width and height must be positive. Width: {width} Height: {height}"
            ));
        }
        if maxval == 0 || maxval > 255 {
            return Err(format!(
                "Only single-byte samples are supported, maxval must be in 1..=255. Got: {maxval}"
            ));
        }

        Ok(Self {
            width,
            height,
            maxval,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn maxval(&self) -> u16 {
        self.maxval
    }

    /// Number of bytes that should follow the header.
    pub fn raster_size(&self) -> usize {
        self.width * self.height
    }
}
