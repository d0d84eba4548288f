use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::raster::{PgmHeader, PgmImage};

#[derive(Error, Debug)]
pub enum RasterReadError {
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error("Invalid header while parsing {section:?}. {error_msg:?}\n\t{actual_token:?}")]
    InvalidHeader {
        section: String,
        error_msg: String,
        actual_token: String,
    },
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

type Result<T> = std::result::Result<T, RasterReadError>;

/// Reads a binary grayscale PGM from the file at the provided path
pub fn read_pgm_file<P: AsRef<Path>>(p: P) -> Result<PgmImage> {
    let file = File::open(p)?;
    read_pgm(BufReader::new(file))
}

/// Reads a binary grayscale PGM from the provided reader
pub fn read_pgm<R: Read>(reader: R) -> Result<PgmImage> {
    Parser::new(reader).parse()
}

struct Parser<R: Read> {
    reader: R,
}

impl<R: Read> Parser<R> {
    fn new(reader: R) -> Self {
        Self { reader }
    }

    fn parse(mut self) -> Result<PgmImage> {
        let header = self.parse_header()?;
        let mut data = vec![0; header.raster_size()];
        self.reader.read_exact(&mut data)?;
        PgmImage::new(header, data).map_err(RasterReadError::InvalidData)
    }

    fn parse_header(&mut self) -> Result<PgmHeader> {
        let magic = self.next_token("magic number")?;
        if magic != "P5" {
            return header_err(
                "magic number",
                "Only binary grayscale (P5) maps are supported",
                magic,
            );
        }
        let width = self.parse_token("width")?;
        let height = self.parse_token("height")?;
        let maxval = self.parse_token("maxval")?;
        PgmHeader::new(width, height, maxval).map_err(|e| RasterReadError::InvalidHeader {
            section: "dimensions".to_string(),
            error_msg: e,
            actual_token: format!("{width} {height} {maxval}"),
        })
    }

    fn parse_token<T: FromStr>(&mut self, section: &str) -> Result<T> {
        let token = self.next_token(section)?;
        match token.parse::<T>() {
            Ok(value) => Ok(value),
            Err(_) => header_err(section, "Expected an unsigned integer", token),
        }
    }

    /// Returns the next whitespace-delimited header token, skipping `#`
    /// comments. The single whitespace byte after the token is consumed, so
    /// after the maxval token the reader is positioned on the first raster
    /// byte.
    fn next_token(&mut self, section: &str) -> Result<String> {
        let mut token = Vec::new();
        loop {
            let byte = match self.read_byte()? {
                Some(b) => b,
                None => {
                    return header_err(
                        section,
                        "Unexpected end of file in header",
                        String::from_utf8_lossy(&token).to_string(),
                    )
                }
            };
            if byte.is_ascii_whitespace() {
                if token.is_empty() {
                    continue;
                }
                break;
            }
            if byte == b'#' && token.is_empty() {
                self.skip_comment()?;
                continue;
            }
            token.push(byte);
        }
        String::from_utf8(token.clone()).map_err(|_| RasterReadError::InvalidHeader {
            section: section.to_string(),
            error_msg: "Header tokens must be ASCII".to_string(),
            actual_token: String::from_utf8_lossy(&token).to_string(),
        })
    }

    fn skip_comment(&mut self) -> Result<()> {
        while let Some(byte) = self.read_byte()? {
            if byte == b'\n' {
                break;
            }
        }
        Ok(())
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.reader.read(&mut buf)? {
            0 => Ok(None),
            _ => Ok(Some(buf[0])),
        }
    }
}

fn header_err<T>(section: &str, error_msg: &str, actual_token: String) -> Result<T> {
    Err(RasterReadError::InvalidHeader {
        section: section.to_string(),
        error_msg: error_msg.to_string(),
        actual_token,
    })
}
