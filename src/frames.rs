//! Keyframe sampling
//!
//! Decodes a video with ffmpeg and keeps a fixed number of evenly spaced
//! frames for the reconstruction prompt. Sampling is purely index based:
//! every `stride`-th decoded frame is kept until the budget is spent or the
//! stream ends.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use image::RgbImage;
use log::{debug, info, warn};
use serde::Deserialize;

use crate::config::FfmpegTools;
use crate::constants::{FALLBACK_FRAME_COUNT, FALLBACK_FRAME_RATE};
use crate::error::ResourceError;
use crate::models::round_tenths;

/// Largest decoded frame accepted (8K UHD). Bigger probe results are treated as corrupt.
const MAX_FRAME_PIXELS: u64 = 7680 * 4320;

/// One sampled frame. Not a codec-level keyframe.
#[derive(Debug, Clone)]
pub struct Keyframe {
    pub image: RgbImage,
    /// Seconds from the start of the stream, rounded to one decimal
    pub timestamp_sec: f64,
}

/// A decodable video stream.
///
/// Metadata is reported as the container describes it and may be zero or
/// garbage; [`sample_source`] applies the fallbacks.
pub trait FrameSource {
    fn frame_count(&self) -> u64;
    fn frame_rate(&self) -> f64;

    /// Decode the next frame. `None` at end of stream or on a decode failure.
    fn next_frame(&mut self) -> Option<RgbImage>;

    /// Advance past one frame without materializing it.
    fn skip_frame(&mut self) -> bool {
        self.next_frame().is_some()
    }
}

/// Frame count and rate to sample with. If either reported value is unusable
/// both fall back together.
pub fn effective_metadata(frame_count: u64, frame_rate: f64) -> (u64, f64) {
    if frame_count == 0 || !frame_rate.is_finite() || frame_rate <= 0.0 {
        (FALLBACK_FRAME_COUNT, FALLBACK_FRAME_RATE)
    } else {
        (frame_count, frame_rate)
    }
}

/// Sample up to `max_frames` evenly spaced frames from `source`.
/// Returns the keyframes and the frame rate their timestamps were computed with.
///
/// Timestamps are strictly increasing. Clips shorter than
/// `(max_frames - 1) / 10` seconds yield fewer than `max_frames` frames.
pub fn sample_source<S: FrameSource + ?Sized>(source: &mut S, max_frames: usize) -> (Vec<Keyframe>, f64) {
    let (total_frames, fps) = effective_metadata(source.frame_count(), source.frame_rate());
    let mut keyframes = Vec::with_capacity(max_frames);
    if max_frames == 0 {
        return (keyframes, fps);
    }

    let stride = (total_frames / max_frames as u64)
        .max(min_stride(fps))
        .max(1);
    let mut index: u64 = 0;

    while keyframes.len() < max_frames {
        if index % stride == 0 {
            let Some(image) = source.next_frame() else {
                break;
            };
            keyframes.push(Keyframe {
                image,
                timestamp_sec: round_tenths(index as f64 / fps),
            });
        } else if !source.skip_frame() {
            break;
        }
        index += 1;
    }

    debug!(
        "[frames] stride {} over {} frames, kept {} after {} decoded",
        stride,
        total_frames,
        keyframes.len(),
        index
    );

    (keyframes, fps)
}

/// Smallest stride whose frames lie at least 0.1 s apart, so timestamps
/// rounded to one decimal never repeat.
fn min_stride(fps: f64) -> u64 {
    (fps / 10.0).ceil() as u64
}

/// Open `video_path` with the default ffmpeg tooling and sample it.
pub fn sample(video_path: &Path, max_frames: usize) -> Result<(Vec<Keyframe>, f64), ResourceError> {
    sample_with(video_path, max_frames, &FfmpegTools::default())
}

/// Open `video_path` and sample it. Only opening can fail; a stream that ends
/// early just yields fewer frames. The decoder is released before returning.
pub fn sample_with(
    video_path: &Path,
    max_frames: usize,
    tools: &FfmpegTools,
) -> Result<(Vec<Keyframe>, f64), ResourceError> {
    let mut video = FfmpegVideo::open(video_path, tools)?;
    let (keyframes, fps) = sample_source(&mut video, max_frames);
    drop(video);

    info!(
        "[frames] Sampled {} keyframes from {:?} at {:.2} fps",
        keyframes.len(),
        video_path,
        fps
    );
    Ok((keyframes, fps))
}

/// Stream properties read from ffprobe
#[derive(Debug, Clone, PartialEq)]
pub struct VideoProbe {
    pub width: u32,
    pub height: u32,
    pub frame_count: u64,
    pub frame_rate: f64,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    width: Option<u32>,
    height: Option<u32>,
    nb_frames: Option<String>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

/// Parse `ffprobe -of json` output for the first video stream.
/// Returns `None` when no stream is listed.
pub fn parse_probe(json: &[u8]) -> Result<Option<VideoProbe>, serde_json::Error> {
    let output: FfprobeOutput = serde_json::from_slice(json)?;
    let Some(stream) = output.streams.into_iter().next() else {
        return Ok(None);
    };

    let frame_rate = [&stream.avg_frame_rate, &stream.r_frame_rate]
        .into_iter()
        .flatten()
        .map(|rate| parse_frame_rate(rate))
        .find(|rate| *rate > 0.0)
        .unwrap_or(0.0);

    // Some containers (mkv, webm) omit nb_frames; estimate from duration.
    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.trim().parse::<u64>().ok())
        .filter(|n| *n > 0)
        .or_else(|| {
            let duration = stream.duration.as_deref()?.trim().parse::<f64>().ok()?;
            let estimate = (duration * frame_rate).round();
            (estimate.is_finite() && estimate > 0.0).then_some(estimate as u64)
        })
        .unwrap_or(0);

    Ok(Some(VideoProbe {
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
        frame_count,
        frame_rate,
    }))
}

/// Parse an ffprobe rate such as `30000/1001` or `25`. Invalid input is 0.
pub fn parse_frame_rate(rate: &str) -> f64 {
    let rate = rate.trim();
    let value = match rate.split_once('/') {
        Some((num, den)) => match (num.trim().parse::<f64>(), den.trim().parse::<f64>()) {
            (Ok(num), Ok(den)) if den != 0.0 => num / den,
            _ => 0.0,
        },
        None => rate.parse::<f64>().unwrap_or(0.0),
    };
    if value.is_finite() { value } else { 0.0 }
}

/// A video decoded by an ffmpeg child process emitting raw rgb24 frames.
/// The process is killed and reaped on drop.
pub struct FfmpegVideo {
    path: PathBuf,
    probe: VideoProbe,
    child: Child,
    stdout: ChildStdout,
    scratch: Vec<u8>,
}

impl FfmpegVideo {
    pub fn open(path: &Path, tools: &FfmpegTools) -> Result<Self, ResourceError> {
        if !path.is_file() {
            return Err(ResourceError::Open {
                path: path.to_path_buf(),
                reason: "file not found".to_string(),
            });
        }

        let probe = probe_video(path, tools)?;
        let frame_bytes = rgb_frame_len(path, &probe)?;

        // -noautorotate keeps decoded dimensions equal to the probed ones
        let mut child = Command::new(&tools.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin"])
            .args(["-threads", &tools.threads.to_string()])
            .arg("-noautorotate")
            .arg("-i")
            .arg(path)
            .args(["-map", "0:v:0", "-an", "-sn"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ResourceError::Spawn {
                program: tools.ffmpeg.clone(),
                source,
            })?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ResourceError::Open {
                path: path.to_path_buf(),
                reason: "failed to capture ffmpeg stdout".to_string(),
            });
        };

        debug!(
            "[frames] Opened {:?}: {}x{}, {} frames @ {:.3} fps",
            path, probe.width, probe.height, probe.frame_count, probe.frame_rate
        );

        Ok(Self {
            path: path.to_path_buf(),
            probe,
            child,
            stdout,
            scratch: vec![0u8; frame_bytes],
        })
    }

    fn read_into_scratch(&mut self) -> bool {
        match self.stdout.read_exact(&mut self.scratch) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => false,
            Err(e) => {
                warn!("[frames] Decode stream error for {:?}: {}", self.path, e);
                false
            }
        }
    }
}

impl std::fmt::Debug for FfmpegVideo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegVideo")
            .field("path", &self.path)
            .field("probe", &self.probe)
            .field("pid", &self.child.id())
            .finish_non_exhaustive()
    }
}

impl FrameSource for FfmpegVideo {
    fn frame_count(&self) -> u64 {
        self.probe.frame_count
    }

    fn frame_rate(&self) -> f64 {
        self.probe.frame_rate
    }

    fn next_frame(&mut self) -> Option<RgbImage> {
        if !self.read_into_scratch() {
            return None;
        }
        RgbImage::from_raw(self.probe.width, self.probe.height, self.scratch.clone())
    }

    fn skip_frame(&mut self) -> bool {
        self.read_into_scratch()
    }
}

impl Drop for FfmpegVideo {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Bytes in one rgb24 frame. Zero or implausibly large dimensions are rejected.
fn rgb_frame_len(path: &Path, probe: &VideoProbe) -> Result<usize, ResourceError> {
    let pixels = probe.width as u64 * probe.height as u64;
    if pixels == 0 || pixels > MAX_FRAME_PIXELS {
        return Err(ResourceError::Open {
            path: path.to_path_buf(),
            reason: format!("invalid frame size {}x{}", probe.width, probe.height),
        });
    }
    Ok(pixels as usize * 3)
}

fn probe_video(path: &Path, tools: &FfmpegTools) -> Result<VideoProbe, ResourceError> {
    let output = Command::new(&tools.ffprobe)
        .args(["-v", "error"])
        .args(["-select_streams", "v:0"])
        .args([
            "-show_entries",
            "stream=width,height,nb_frames,avg_frame_rate,r_frame_rate,duration",
        ])
        .args(["-of", "json"])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| ResourceError::Spawn {
            program: tools.ffprobe.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(ResourceError::Open {
            path: path.to_path_buf(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    parse_probe(&output.stdout)
        .map_err(|e| ResourceError::Open {
            path: path.to_path_buf(),
            reason: format!("unreadable ffprobe output: {}", e),
        })?
        .ok_or_else(|| ResourceError::NoVideoStream {
            path: path.to_path_buf(),
        })
}
