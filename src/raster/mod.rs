//! Raster depth-map formats
//!
//! Depth maps are stored inside archives as [binary grayscale PGM](https://netpbm.sourceforge.net/doc/pgm.html)
//! (`P5`) and served to remote clients as [PFM](https://netpbm.sourceforge.net/doc/pfm.html)
//! (`Pf`) 32-bit float maps. Both formats are a short ASCII header followed
//! directly by raw pixel bytes.
//!
//! # Examples
//!
//! ## Reading from a file
//! ```no_run
//! use depthtk::raster::{RasterReadError, read_pgm_file};
//!
//! fn main() -> Result<(), RasterReadError> {
//!     let pgm = read_pgm_file("example.pgm")?;
//!     println!("{}", pgm.data().len());
//!     Ok(())
//! }
//! ```

mod data_types;
mod reader;
mod writer;

pub use data_types::*;
pub use reader::{read_pgm, read_pgm_file, RasterReadError};
pub use writer::{write_pfm, write_pgm};
