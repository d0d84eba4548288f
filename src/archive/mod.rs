//! Depth archive container
//!
//! An archive is a single zip file holding one `{index}.pgm` entry per
//! frame plus one `METADATA.txt` provenance entry. Entries for frames
//! already present are never recomputed or rewritten, which is what makes
//! an interrupted generation run resumable.

use std::collections::HashSet;
use std::io::{Read, Seek};

use thiserror::Error;
use zip::ZipArchive;

use crate::formats::provenance::ProvenanceError;

mod reader;
mod writer;

pub use reader::ArchiveReader;
pub use writer::{persist_or_prompt, ArchiveWriter, FinishedArchive, OpenMode};

/// Name of the provenance entry inside the container.
pub const PROVENANCE_ENTRY: &str = "METADATA.txt";

/// Conventional extension for depth archives.
pub const ARCHIVE_EXTENSION: &str = "dtz";

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Provenance(#[from] ProvenanceError),
    #[error("Entry {0} is already present in the archive")]
    DuplicateEntry(u32),
    #[error("Archive has no {0:?} entry")]
    MissingEntry(String),
}

pub(crate) type Result<T> = std::result::Result<T, ArchiveError>;

/// Zip entry name for a frame index.
pub fn entry_name(index: u32) -> String {
    format!("{index}.pgm")
}

pub(crate) fn parse_entry_name(name: &str) -> Option<u32> {
    name.strip_suffix(".pgm")?.parse().ok()
}

/// Collects the frame indices and provenance presence of a container.
pub(crate) fn scan_names<R: Read + Seek>(archive: &ZipArchive<R>) -> (HashSet<u32>, bool) {
    let mut entries = HashSet::new();
    let mut has_provenance = false;
    for name in archive.file_names() {
        if name == PROVENANCE_ENTRY {
            has_provenance = true;
        } else if let Some(index) = parse_entry_name(name) {
            entries.insert(index);
        }
    }
    (entries, has_provenance)
}
