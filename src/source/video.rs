use std::io::Read;
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

use log::warn;

use super::{frame_from_rgb_bytes, FrameSource, SourceError};
use crate::formats::frame::Frame;

/// Stream properties reported by ffprobe.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub width: usize,
    pub height: usize,
    pub frame_rate: f64,
    /// Absent for containers that do not declare a frame count.
    pub frame_count: Option<u32>,
}

/// Queries the first video stream of a media file.
pub fn probe_media<P: AsRef<Path>>(path: P) -> Result<MediaInfo, SourceError> {
    let path = path.as_ref();
    let output = Command::new("ffprobe")
        .arg("-v")
        .arg("error")
        .arg("-select_streams")
        .arg("v:0")
        .arg("-show_entries")
        .arg("stream=width,height,r_frame_rate,nb_frames")
        .arg("-of")
        .arg("csv=p=0")
        .arg(path)
        .output()?;
    if !output.status.success() {
        return Err(SourceError::Probe {
            path: path.display().to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    parse_probe_output(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
        SourceError::Probe {
            path: path.display().to_string(),
            reason: format!(
                "unexpected ffprobe output {:?}",
                String::from_utf8_lossy(&output.stdout)
            ),
        }
    })
}

fn parse_probe_output(text: &str) -> Option<MediaInfo> {
    let line = text.lines().find(|l| !l.trim().is_empty())?.trim();
    let mut parts = line.split(',');
    let width = parts.next()?.trim().parse().ok()?;
    let height = parts.next()?.trim().parse().ok()?;
    let frame_rate = parse_rational(parts.next()?)?;
    if frame_rate <= 0.0 {
        return None;
    }
    let frame_count = parts.next().and_then(|p| p.trim().parse().ok());
    Some(MediaInfo {
        width,
        height,
        frame_rate,
        frame_count,
    })
}

fn parse_rational(s: &str) -> Option<f64> {
    match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => s.trim().parse().ok(),
    }
}

/// Streams decoded RGB frames out of anything ffmpeg can read, one
/// `width * height * 3` byte chunk at a time over a rawvideo pipe.
pub struct FfmpegStream {
    child: Child,
    stdout: ChildStdout,
    info: MediaInfo,
    finished: bool,
}

impl FfmpegStream {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<FfmpegStream, SourceError> {
        let path = path.as_ref();
        let info = probe_media(path)?;
        let mut child = Command::new("ffmpeg")
            .arg("-v")
            .arg("error")
            .arg("-i")
            .arg(path)
            .arg("-f")
            .arg("rawvideo")
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SourceError::InvalidMedia("ffmpeg stdout unavailable".to_string()))?;
        Ok(FfmpegStream {
            child,
            stdout,
            info,
            finished: false,
        })
    }

    pub fn info(&self) -> &MediaInfo {
        &self.info
    }
}

impl FrameSource for FfmpegStream {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        if self.finished {
            return Ok(None);
        }
        match read_frame_rgb24(&mut self.stdout, self.info.width, self.info.height)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                self.finished = true;
                self.child.wait()?;
                Ok(None)
            }
        }
    }

    fn frame_count(&self) -> Option<u32> {
        self.info.frame_count
    }

    fn frame_rate(&self) -> Option<f64> {
        Some(self.info.frame_rate)
    }

    fn dimensions(&self) -> (usize, usize) {
        (self.info.width, self.info.height)
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

/// Reads one raw rgb24 frame. A clean end between frames returns `None`; a
/// partial trailing frame is discarded with a warning rather than handed on.
fn read_frame_rgb24<R: Read>(
    reader: &mut R,
    width: usize,
    height: usize,
) -> std::io::Result<Option<Frame>> {
    let mut buf = vec![0u8; width * height * 3];
    let mut total = 0;
    while total < buf.len() {
        let n = reader.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    if total == 0 {
        return Ok(None);
    }
    if total < buf.len() {
        warn!("Discarding partial trailing frame ({total} of {} bytes)", buf.len());
        return Ok(None);
    }
    Ok(Some(frame_from_rgb_bytes(&buf, width, height)))
}
