use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::warn;
use zip::ZipArchive;

use super::{entry_name, scan_names, ArchiveError, Result, ARCHIVE_EXTENSION, PROVENANCE_ENTRY};
use crate::formats::provenance::ProvenanceRecord;

/// Read-only view of an existing depth archive.
pub struct ArchiveReader {
    archive: ZipArchive<File>,
    entries: HashSet<u32>,
    has_provenance: bool,
}

impl ArchiveReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<ArchiveReader> {
        let path = path.as_ref();
        if path.extension().and_then(|e| e.to_str()) != Some(ARCHIVE_EXTENSION) {
            warn!(
                "{} does not have the .{ARCHIVE_EXTENSION} extension, reading it anyway",
                path.display()
            );
        }
        let archive = ZipArchive::new(File::open(path)?)?;
        let (entries, has_provenance) = scan_names(&archive);
        Ok(ArchiveReader {
            archive,
            entries,
            has_provenance,
        })
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn has_entry(&self, index: u32) -> bool {
        self.entries.contains(&index)
    }

    pub fn has_provenance(&self) -> bool {
        self.has_provenance
    }

    /// Frame indices present in the archive, in ascending order.
    pub fn entry_indices(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = self.entries.iter().copied().collect();
        indices.sort_unstable();
        indices
    }

    /// True when every index in `0..framecount` has an entry.
    pub fn is_full(&self, framecount: u32) -> bool {
        (0..framecount).all(|i| self.entries.contains(&i))
    }

    /// Raw bytes of one frame entry.
    pub fn read_entry(&mut self, index: u32) -> Result<Vec<u8>> {
        let name = entry_name(index);
        if !self.has_entry(index) {
            return Err(ArchiveError::MissingEntry(name));
        }
        let mut file = self.archive.by_name(&name)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    pub fn read_provenance(&mut self) -> Result<ProvenanceRecord> {
        if !self.has_provenance {
            return Err(ArchiveError::MissingEntry(PROVENANCE_ENTRY.to_string()));
        }
        let mut file = self.archive.by_name(PROVENANCE_ENTRY)?;
        let mut text = String::new();
        file.read_to_string(&mut text)?;
        Ok(ProvenanceRecord::parse(&text)?)
    }
}
