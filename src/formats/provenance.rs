use std::str::FromStr;

use log::warn;
use thiserror::Error;

/// First line of every provenance entry.
pub const SENTINEL: &str = "DEPTHTK";

#[derive(Debug, Error, PartialEq)]
pub enum ProvenanceError {
    #[error("Provenance entry does not start with {SENTINEL:?}")]
    MissingSentinel,
    #[error("Provenance entry is missing {0:?}")]
    MissingField(&'static str),
    #[error("Invalid value {value:?} for provenance field {field:?}")]
    InvalidValue { field: &'static str, value: String },
}

type Result<T> = std::result::Result<T, ProvenanceError>;

/// Everything recorded about how an archive was produced, stored as a
/// plain-text `key=value` entry next to the depth maps.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvenanceRecord {
    /// SHA-256 of the source media, lowercase hex.
    pub hashval: String,
    /// Total number of frames the archive is expected to hold.
    pub framecount: u32,
    /// Index of the first frame of the run, or `-1` when the decoder could
    /// not report one.
    pub startframe: i64,
    /// Width of the stored depth maps.
    pub width: usize,
    /// Height of the stored depth maps.
    pub height: usize,
    pub model_type: String,
    pub model_type_val: i32,
    /// Output kind of the stored maps, as a `DepthMapKind` code.
    pub depth_map_type: i32,
    pub original_name: String,
    pub original_width: usize,
    pub original_height: usize,
    pub original_framerate: f64,
    /// Unix timestamp of the run, in seconds.
    pub timestamp: u64,
    pub program: String,
    pub version: String,
}

impl ProvenanceRecord {
    /// Serializes the record as the sentinel line followed by one
    /// `key=value` line per field.
    pub fn to_entry(&self) -> String {
        let pairs = [
            ("hashval", self.hashval.clone()),
            ("framecount", self.framecount.to_string()),
            ("startframe", self.startframe.to_string()),
            ("width", self.width.to_string()),
            ("height", self.height.to_string()),
            ("model_type", self.model_type.clone()),
            ("model_type_val", self.model_type_val.to_string()),
            ("depth_map_type", self.depth_map_type.to_string()),
            ("original_name", self.original_name.clone()),
            ("original_width", self.original_width.to_string()),
            ("original_height", self.original_height.to_string()),
            ("original_framerate", self.original_framerate.to_string()),
            ("timestamp", self.timestamp.to_string()),
            ("program", self.program.clone()),
            ("version", self.version.clone()),
        ];
        let mut out = String::from(SENTINEL);
        out.push('\n');
        for (key, value) in pairs {
            out.push_str(&format!("{key}={value}\n"));
        }
        out
    }

    /// Parses an entry produced by [`ProvenanceRecord::to_entry`]. Unknown
    /// keys and malformed lines are skipped with a warning so that entries
    /// written by newer versions still load.
    pub fn parse(text: &str) -> Result<ProvenanceRecord> {
        let mut lines = text.lines().map(|l| l.trim());
        match lines.find(|l| !l.is_empty()) {
            Some(first) if first == SENTINEL => {}
            _ => return Err(ProvenanceError::MissingSentinel),
        }

        let mut hashval = None;
        let mut framecount = None;
        let mut startframe = None;
        let mut width = None;
        let mut height = None;
        let mut model_type = None;
        let mut model_type_val = None;
        let mut depth_map_type = None;
        let mut original_name = None;
        let mut original_width = None;
        let mut original_height = None;
        let mut original_framerate = None;
        let mut timestamp = None;
        let mut program = None;
        let mut version = None;

        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (key, value) = match line.split_once('=') {
                Some(pair) => pair,
                None => {
                    warn!("Skipping malformed provenance line {line:?}");
                    continue;
                }
            };
            match key {
                "hashval" => hashval = Some(value.to_string()),
                "framecount" => framecount = Some(parse_field("framecount", value)?),
                "startframe" => startframe = Some(parse_field("startframe", value)?),
                "width" => width = Some(parse_field("width", value)?),
                "height" => height = Some(parse_field("height", value)?),
                "model_type" => model_type = Some(value.to_string()),
                "model_type_val" => model_type_val = Some(parse_field("model_type_val", value)?),
                "depth_map_type" => depth_map_type = Some(parse_field("depth_map_type", value)?),
                "original_name" => original_name = Some(value.to_string()),
                "original_width" => original_width = Some(parse_field("original_width", value)?),
                "original_height" => original_height = Some(parse_field("original_height", value)?),
                "original_framerate" => {
                    original_framerate = Some(parse_field("original_framerate", value)?)
                }
                "timestamp" => timestamp = Some(parse_field("timestamp", value)?),
                "program" => program = Some(value.to_string()),
                "version" => version = Some(value.to_string()),
                _ => warn!("Skipping unknown provenance key {key:?}"),
            }
        }

        Ok(ProvenanceRecord {
            hashval: hashval.ok_or(ProvenanceError::MissingField("hashval"))?,
            framecount: framecount.ok_or(ProvenanceError::MissingField("framecount"))?,
            startframe: startframe.ok_or(ProvenanceError::MissingField("startframe"))?,
            width: width.ok_or(ProvenanceError::MissingField("width"))?,
            height: height.ok_or(ProvenanceError::MissingField("height"))?,
            model_type: model_type.ok_or(ProvenanceError::MissingField("model_type"))?,
            model_type_val: model_type_val.ok_or(ProvenanceError::MissingField("model_type_val"))?,
            depth_map_type: depth_map_type.ok_or(ProvenanceError::MissingField("depth_map_type"))?,
            original_name: original_name.ok_or(ProvenanceError::MissingField("original_name"))?,
            original_width: original_width
                .ok_or(ProvenanceError::MissingField("original_width"))?,
            original_height: original_height
                .ok_or(ProvenanceError::MissingField("original_height"))?,
            original_framerate: original_framerate
                .ok_or(ProvenanceError::MissingField("original_framerate"))?,
            timestamp: timestamp.ok_or(ProvenanceError::MissingField("timestamp"))?,
            program: program.ok_or(ProvenanceError::MissingField("program"))?,
            version: version.ok_or(ProvenanceError::MissingField("version"))?,
        })
    }
}

fn parse_field<T: FromStr>(field: &'static str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| ProvenanceError::InvalidValue {
        field,
        value: value.to_string(),
    })
}
