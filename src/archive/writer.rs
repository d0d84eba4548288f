use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tempfile::NamedTempFile;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{entry_name, scan_names, ArchiveError, Result, PROVENANCE_ENTRY};
use crate::formats::provenance::ProvenanceRecord;

/// Deflate level for frame entries. Depth rasters are smooth, so a middling
/// level buys most of the ratio at a fraction of the cost of 9.
const ENTRY_COMPRESSION_LEVEL: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Start from an empty container, truncating any existing file.
    Create,
    /// Keep the entries of an existing container and only append new ones.
    /// Behaves like `Create` when the file does not exist yet.
    Update,
}

enum Backing {
    /// The whole container is assembled in memory and persisted on close.
    Buffered {
        writer: ZipWriter<Cursor<Vec<u8>>>,
        dest: PathBuf,
    },
    /// Entries stream straight to the destination file.
    Streamed { writer: ZipWriter<File> },
}

/// Writes a numbered sequence of encoded depth maps plus one provenance
/// entry into a zip container. Exactly one writer session may be open per
/// archive path at a time.
pub struct ArchiveWriter {
    backing: Backing,
    existing: HashSet<u32>,
    written: HashSet<u32>,
    has_provenance: bool,
}

impl ArchiveWriter {
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode, buffered: bool) -> Result<ArchiveWriter> {
        let path = path.as_ref();
        let update = mode == OpenMode::Update && path.exists();
        let (backing, existing, has_provenance) = match (buffered, update) {
            (true, false) => (
                Backing::Buffered {
                    writer: ZipWriter::new(Cursor::new(Vec::new())),
                    dest: path.to_path_buf(),
                },
                HashSet::new(),
                false,
            ),
            (true, true) => {
                let bytes = std::fs::read(path)?;
                let (existing, has_provenance) =
                    scan_names(&zip::ZipArchive::new(Cursor::new(bytes.as_slice()))?);
                (
                    Backing::Buffered {
                        writer: ZipWriter::new_append(Cursor::new(bytes))?,
                        dest: path.to_path_buf(),
                    },
                    existing,
                    has_provenance,
                )
            }
            (false, false) => (
                Backing::Streamed {
                    writer: ZipWriter::new(File::create(path)?),
                },
                HashSet::new(),
                false,
            ),
            (false, true) => {
                let (existing, has_provenance) =
                    scan_names(&zip::ZipArchive::new(File::open(path)?)?);
                let file = OpenOptions::new().read(true).write(true).open(path)?;
                (
                    Backing::Streamed {
                        writer: ZipWriter::new_append(file)?,
                    },
                    existing,
                    has_provenance,
                )
            }
        };
        if !existing.is_empty() {
            info!(
                "Opened archive {} with {} existing entries",
                path.display(),
                existing.len()
            );
        }
        Ok(ArchiveWriter {
            backing,
            existing,
            written: HashSet::new(),
            has_provenance,
        })
    }

    /// True if the entry was present when the archive was opened or has
    /// been written in this session.
    pub fn has_entry(&self, index: u32) -> bool {
        self.existing.contains(&index) || self.written.contains(&index)
    }

    pub fn entry_count(&self) -> usize {
        self.existing.len() + self.written.len()
    }

    /// Indices that were already present when the archive was opened.
    pub fn existing_entries(&self) -> &HashSet<u32> {
        &self.existing
    }

    pub fn has_provenance(&self) -> bool {
        self.has_provenance
    }

    /// Adds one encoded depth map. Writing an index twice is a contract
    /// violation and fails with [`ArchiveError::DuplicateEntry`].
    pub fn write_entry(&mut self, index: u32, bytes: &[u8]) -> Result<()> {
        if self.has_entry(index) {
            return Err(ArchiveError::DuplicateEntry(index));
        }
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(ENTRY_COMPRESSION_LEVEL));
        self.add_file(entry_name(index), options, bytes)?;
        self.written.insert(index);
        Ok(())
    }

    /// Adds the provenance entry. Skipped silently if the archive already
    /// carries one, so update runs keep the record of the original run.
    pub fn write_provenance(&mut self, record: &ProvenanceRecord) -> Result<()> {
        if self.has_provenance {
            debug!("Provenance entry already present, keeping the existing one");
            return Ok(());
        }
        let options = FileOptions::default().compression_method(CompressionMethod::Stored);
        self.add_file(
            PROVENANCE_ENTRY.to_string(),
            options,
            record.to_entry().as_bytes(),
        )?;
        self.has_provenance = true;
        Ok(())
    }

    fn add_file(&mut self, name: String, options: FileOptions, bytes: &[u8]) -> Result<()> {
        match &mut self.backing {
            Backing::Buffered { writer, .. } => add_file(writer, name, options, bytes),
            Backing::Streamed { writer } => add_file(writer, name, options, bytes),
        }
    }

    /// Finalizes the container. A buffered archive hands its finished bytes
    /// back for persisting; a streamed archive is already at its
    /// destination and returns `None`.
    pub fn close(self) -> Result<Option<FinishedArchive>> {
        match self.backing {
            Backing::Buffered { mut writer, dest } => {
                let cursor = writer.finish()?;
                Ok(Some(FinishedArchive {
                    bytes: cursor.into_inner(),
                    dest,
                }))
            }
            Backing::Streamed { mut writer } => {
                writer.finish()?;
                Ok(None)
            }
        }
    }
}

fn add_file<W: Write + std::io::Seek>(
    writer: &mut ZipWriter<W>,
    name: String,
    options: FileOptions,
    bytes: &[u8],
) -> Result<()> {
    writer.start_file(name, options)?;
    writer.write_all(bytes)?;
    Ok(())
}

/// A fully assembled in-memory container waiting to land on disk.
pub struct FinishedArchive {
    bytes: Vec<u8>,
    dest: PathBuf,
}

impl FinishedArchive {
    /// Atomically replaces the destination: the bytes go to a temporary
    /// file in the same directory first, then rename over the target.
    /// Safe to call again after a failure.
    pub fn persist(&self) -> std::io::Result<()> {
        let parent = match self.dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = NamedTempFile::new_in(parent)?;
        temp.write_all(&self.bytes)?;
        temp.persist(&self.dest).map_err(|e| e.error)?;
        Ok(())
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Persists a finished archive. On failure in interactive mode the
/// operator may retry indefinitely (the bytes stay in memory); declining,
/// or any failure in non-interactive mode, propagates the error.
pub fn persist_or_prompt(finished: &FinishedArchive, interactive: bool) -> std::io::Result<()> {
    loop {
        match finished.persist() {
            Ok(()) => return Ok(()),
            Err(e) if interactive => {
                warn!("Failed to persist {}: {e}", finished.dest().display());
                eprintln!(
                    "Could not write {} ({e}). Press 'r' then Enter to retry, anything else to abort.",
                    finished.dest().display()
                );
                let mut answer = String::new();
                std::io::stdin().read_line(&mut answer)?;
                if answer.trim() != "r" {
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }
    }
}
