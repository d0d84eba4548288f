//! Archive generation driver
//!
//! [`run_generate`] turns one input, an image or a video, into a depth
//! archive by wiring up the three pipeline stages and reporting their
//! progress. Update runs keep whatever the archive already holds and only
//! compute the missing entries.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use kdam::{tqdm, BarExt};
use log::{info, warn};

use crate::archive::{ArchiveReader, ArchiveWriter, OpenMode, ARCHIVE_EXTENSION};
use crate::estimate::batch::BatchScheduler;
use crate::estimate::Estimator;
use crate::formats::frame::fit_dimensions;
use crate::formats::provenance::ProvenanceRecord;
use crate::pipeline::stages::{ArchiveStage, EstimateStage, ReadStage};
use crate::pipeline::{Executor, PipelineMessage};
use crate::source::{FfmpegStream, FrameSource, ImageSource, SourceError};
use crate::utils::{hash_file_sha256, unix_timestamp};

/// Extensions decoded as still images; everything else goes through ffmpeg.
const IMAGE_EXTENSIONS: &[&str] = &["bmp", "jpeg", "jpg", "png", "webp"];

pub struct GenerateConfig {
    /// Source image or video.
    pub input: PathBuf,
    /// Destination archive. Defaults to the input path with `.dtz`.
    pub output: Option<PathBuf>,
    /// Decode the input as a still image even when its extension says
    /// otherwise.
    pub force_image: bool,
    pub batch_size: usize,
    /// Per-frame pixel cap, zero or negative disables it.
    pub max_pixels: i64,
    /// Keep existing entries and only compute the missing ones.
    pub update: bool,
    /// Assemble the archive in memory and move it into place at the end.
    pub buffered: bool,
    /// Offer a retry prompt when the finished archive cannot be written.
    pub interactive: bool,
    pub show_progress: bool,
}

#[derive(Debug)]
pub struct GenerateReport {
    pub archive: PathBuf,
    pub frames_total: Option<u32>,
    pub entries_written: u32,
    pub entries_skipped: u32,
}

pub fn run_generate(
    config: &GenerateConfig,
    estimator: Box<dyn Estimator>,
) -> anyhow::Result<GenerateReport> {
    if config.batch_size == 0 {
        bail!("Batch size must be at least 1");
    }
    let archive_path = config
        .output
        .clone()
        .unwrap_or_else(|| config.input.with_extension(ARCHIVE_EXTENSION));
    let is_image = config.force_image || is_image_path(&config.input);

    let existing_reader = if config.update && archive_path.exists() {
        let reader = ArchiveReader::open(&archive_path)
            .with_context(|| format!("Could not open {} for update", archive_path.display()))?;
        Some(reader)
    } else {
        None
    };

    // a still image never has more than entry 0, so skip the decode outright
    if is_image {
        if let Some(reader) = &existing_reader {
            if reader.has_entry(0) {
                info!(
                    "{} already holds this image, nothing to do",
                    archive_path.display()
                );
                return Ok(GenerateReport {
                    archive: archive_path,
                    frames_total: Some(1),
                    entries_written: 0,
                    entries_skipped: 1,
                });
            }
        }
    }

    let source = open_source(&config.input, is_image)
        .with_context(|| format!("Could not open {}", config.input.display()))?;
    let frames_total = source.frame_count();
    let (src_width, src_height) = source.dimensions();
    let frame_rate = source.frame_rate();

    if let (Some(reader), Some(total)) = (&existing_reader, frames_total) {
        if reader.is_full(total) {
            info!("{} is already complete, nothing to do", archive_path.display());
            return Ok(GenerateReport {
                archive: archive_path,
                frames_total,
                entries_written: 0,
                entries_skipped: total,
            });
        }
    }
    drop(existing_reader);

    let hashval = hash_file_sha256(&config.input)
        .with_context(|| format!("Could not hash {}", config.input.display()))?;

    let mode = if config.update {
        OpenMode::Update
    } else {
        OpenMode::Create
    };
    let writer = ArchiveWriter::open(&archive_path, mode, config.buffered)?;
    let existing = writer.existing_entries().clone();

    let framecount = match frames_total {
        Some(total) => total,
        None => {
            warn!(
                "Frame count of {} is not known up front, recording 0",
                config.input.display()
            );
            0
        }
    };
    let (width, height) = if config.max_pixels > 0 {
        fit_dimensions(src_width, src_height, config.max_pixels as usize)
    } else {
        (src_width, src_height)
    };
    let record = ProvenanceRecord {
        hashval,
        framecount,
        startframe: if is_image { 0 } else { -1 },
        width,
        height,
        model_type: estimator.model_type().to_string(),
        model_type_val: estimator.model_type_val(),
        depth_map_type: estimator.output_kind().code(),
        original_name: config
            .input
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        original_width: src_width,
        original_height: src_height,
        original_framerate: frame_rate.unwrap_or(0.0),
        timestamp: unix_timestamp(),
        program: "depthtk".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    info!(
        "Generating {} from {}",
        archive_path.display(),
        config.input.display()
    );

    let (mut read, _read_progress) = Executor::new(
        "read",
        Box::new(ReadStage::new(source, config.max_pixels)),
    );
    let (mut estimate, _estimate_progress) = Executor::new(
        "estimate",
        Box::new(EstimateStage::new(
            estimator,
            BatchScheduler::new(config.batch_size),
            existing,
            record,
        )),
    );
    let (mut archive, _archive_progress) = Executor::new(
        "archive",
        Box::new(ArchiveStage::new(writer, config.interactive)),
    );
    estimate.attach_to(&mut read);
    archive.attach_to(&mut estimate);
    let output = archive.subscribe();

    let handles = vec![read.run(), estimate.run(), archive.run()];

    let mut bar = config.show_progress.then(|| {
        let total = frames_total.map(|total| total as usize).unwrap_or(0);
        tqdm!(total = total, desc = "Computing depth maps")
    });

    let mut written = 0u32;
    let mut skipped = 0u32;
    let mut failures: Vec<String> = Vec::new();
    loop {
        match output.recv() {
            Ok(PipelineMessage::IndexedEntry(_, _)) => {
                written += 1;
                if let Some(bar) = bar.as_mut() {
                    bar.update(1)?;
                }
            }
            Ok(PipelineMessage::DummyForIncrement) => {
                skipped += 1;
                if let Some(bar) = bar.as_mut() {
                    bar.update(1)?;
                }
            }
            Ok(PipelineMessage::Failure(cause)) => failures.push(cause),
            Ok(PipelineMessage::End) => break,
            Ok(_) => {}
            Err(_) => {
                failures.push("A pipeline stage stopped without finishing".to_string());
                break;
            }
        }
    }

    for handle in handles {
        handle
            .join()
            .map_err(|_| anyhow!("A pipeline stage panicked"))?;
    }

    if !failures.is_empty() {
        bail!("Generation failed: {}", failures.join("; "));
    }

    info!(
        "Wrote {written} entries to {} ({skipped} already present)",
        archive_path.display()
    );
    Ok(GenerateReport {
        archive: archive_path,
        frames_total,
        entries_written: written,
        entries_skipped: skipped,
    })
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn open_source(path: &Path, is_image: bool) -> Result<Box<dyn FrameSource>, SourceError> {
    if is_image {
        Ok(Box::new(ImageSource::open(path)?))
    } else {
        Ok(Box::new(FfmpegStream::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use image::{ImageOutputFormat, RgbImage};
    use tempfile::tempdir;

    use super::*;
    use crate::estimate::luma::LumaEstimator;
    use crate::estimate::EstimateError;
    use crate::formats::depth_map::{DepthMap, DepthMapKind};
    use crate::formats::frame::Frame;

    struct CountingEstimator {
        calls: Arc<AtomicUsize>,
        inner: LumaEstimator,
    }

    impl CountingEstimator {
        fn boxed(calls: &Arc<AtomicUsize>) -> Box<dyn Estimator> {
            Box::new(CountingEstimator {
                calls: calls.clone(),
                inner: LumaEstimator::new(),
            })
        }
    }

    impl Estimator for CountingEstimator {
        fn model_type(&self) -> &str {
            "luma"
        }

        fn model_type_val(&self) -> i32 {
            0
        }

        fn output_kind(&self) -> DepthMapKind {
            DepthMapKind::Inverse
        }

        fn estimate(&mut self, frame: &Frame) -> Result<DepthMap, EstimateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.estimate(frame)
        }
    }

    fn write_png(path: &Path, width: u32, height: u32) {
        let mut img = RgbImage::new(width, height);
        img.put_pixel(0, 0, image::Rgb([255, 255, 255]));
        img.put_pixel(width - 1, height - 1, image::Rgb([64, 64, 64]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    fn config(input: &Path, output: &Path, update: bool) -> GenerateConfig {
        GenerateConfig {
            input: input.to_path_buf(),
            output: Some(output.to_path_buf()),
            force_image: false,
            batch_size: 2,
            max_pixels: 0,
            update,
            buffered: false,
            interactive: false,
            show_progress: false,
        }
    }

    #[test]
    fn image_run_fills_the_archive_and_records_provenance() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("photo.png");
        let output = dir.path().join("photo.dtz");
        write_png(&input, 3, 2);

        let calls = Arc::new(AtomicUsize::new(0));
        let report = run_generate(
            &config(&input, &output, false),
            CountingEstimator::boxed(&calls),
        )
        .unwrap();
        assert_eq!(report.entries_written, 1);
        assert_eq!(report.entries_skipped, 0);
        assert_eq!(report.frames_total, Some(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let mut reader = ArchiveReader::open(&output).unwrap();
        assert!(reader.is_full(1));
        assert!(reader.read_entry(0).unwrap().starts_with(b"P5\n3 2 255\n"));

        let record = reader.read_provenance().unwrap();
        assert_eq!(record.framecount, 1);
        assert_eq!(record.startframe, 0);
        assert_eq!(record.width, 3);
        assert_eq!(record.height, 2);
        assert_eq!(record.original_width, 3);
        assert_eq!(record.model_type, "luma");
        assert_eq!(record.depth_map_type, DepthMapKind::Inverse.code());
        assert_eq!(record.original_name, "photo.png");
        assert_eq!(record.original_framerate, 0.0);
        assert_eq!(record.hashval, hash_file_sha256(&input).unwrap());
        assert_eq!(record.program, "depthtk");
    }

    #[test]
    fn update_rerun_computes_nothing() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("photo.png");
        let output = dir.path().join("photo.dtz");
        write_png(&input, 3, 2);

        let calls = Arc::new(AtomicUsize::new(0));
        run_generate(
            &config(&input, &output, true),
            CountingEstimator::boxed(&calls),
        )
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let rerun_calls = Arc::new(AtomicUsize::new(0));
        let report = run_generate(
            &config(&input, &output, true),
            CountingEstimator::boxed(&rerun_calls),
        )
        .unwrap();
        assert_eq!(report.entries_written, 0);
        assert_eq!(report.entries_skipped, 1);
        assert_eq!(rerun_calls.load(Ordering::SeqCst), 0);

        let reader = ArchiveReader::open(&output).unwrap();
        assert_eq!(reader.entry_count(), 1);
        assert!(reader.has_provenance());
    }

    #[test]
    fn overwrite_rerun_recomputes() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("photo.png");
        let output = dir.path().join("photo.dtz");
        write_png(&input, 3, 2);

        let calls = Arc::new(AtomicUsize::new(0));
        run_generate(
            &config(&input, &output, false),
            CountingEstimator::boxed(&calls),
        )
        .unwrap();
        run_generate(
            &config(&input, &output, false),
            CountingEstimator::boxed(&calls),
        )
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let reader = ArchiveReader::open(&output).unwrap();
        assert_eq!(reader.entry_indices(), vec![0]);
    }

    #[test]
    fn forced_image_mode_overrides_the_extension() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("screenshot.mp4");
        let output = dir.path().join("out.dtz");
        write_png(&input, 2, 2);

        let calls = Arc::new(AtomicUsize::new(0));
        let mut config = config(&input, &output, false);
        config.force_image = true;
        let report = run_generate(&config, CountingEstimator::boxed(&calls)).unwrap();

        assert_eq!(report.frames_total, Some(1));
        assert_eq!(report.entries_written, 1);
        let reader = ArchiveReader::open(&output).unwrap();
        assert!(reader.is_full(1));
    }

    #[test]
    fn default_output_lands_next_to_the_input() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("photo.png");
        write_png(&input, 2, 2);

        let calls = Arc::new(AtomicUsize::new(0));
        let mut config = config(&input, Path::new("unused"), false);
        config.output = None;
        let report = run_generate(&config, CountingEstimator::boxed(&calls)).unwrap();

        assert_eq!(report.archive, dir.path().join("photo.dtz"));
        assert!(report.archive.exists());
    }

    #[test]
    fn pixel_cap_shrinks_stored_maps() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("photo.png");
        let output = dir.path().join("photo.dtz");
        write_png(&input, 8, 4);

        let calls = Arc::new(AtomicUsize::new(0));
        let mut config = config(&input, &output, false);
        config.max_pixels = 8;
        run_generate(&config, CountingEstimator::boxed(&calls)).unwrap();

        let mut reader = ArchiveReader::open(&output).unwrap();
        assert!(reader.read_entry(0).unwrap().starts_with(b"P5\n4 2 255\n"));
        let record = reader.read_provenance().unwrap();
        assert_eq!((record.width, record.height), (4, 2));
        assert_eq!((record.original_width, record.original_height), (8, 4));
    }

    #[test]
    fn missing_input_fails() {
        let dir = tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let result = run_generate(
            &config(&dir.path().join("nope.png"), &dir.path().join("out.dtz"), false),
            CountingEstimator::boxed(&calls),
        );
        assert!(result.is_err());
    }
}
