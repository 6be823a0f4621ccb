//! End-to-end analysis: load evidence, submit it, normalize the answer.

use std::path::Path;

use image::{ImageReader, RgbImage};
use log::{info, warn};

use crate::config::{AnalysisConfig, FfmpegTools};
use crate::error::{PipelineError, ResourceError};
use crate::frames::{self, FrameSource, Keyframe};
use crate::gemini::InferenceClient;
use crate::models::{ForensicRecord, MediaKind, VideoMeta, round_tenths};
use crate::normalize::normalize;
use crate::submitter::{Evidence, EvidenceSubmitter};

/// Runs analyses against an injected [`InferenceClient`]. Holds no mutable
/// state, so one pipeline may serve concurrent callers when `C` allows it.
pub struct ForensicPipeline<C> {
    submitter: EvidenceSubmitter<C>,
    max_frames: usize,
    tools: FfmpegTools,
}

impl<C: InferenceClient> ForensicPipeline<C> {
    pub fn new(client: C, model_id: impl Into<String>, max_frames: usize, tools: FfmpegTools) -> Self {
        Self {
            submitter: EvidenceSubmitter::new(client, model_id),
            max_frames,
            tools,
        }
    }

    pub fn from_config(client: C, config: &AnalysisConfig) -> Self {
        Self::new(
            client,
            config.model_id.clone(),
            config.max_frames,
            config.tools.clone(),
        )
    }

    /// Classify `path` by extension and run the matching analysis.
    pub fn analyze_path(&self, path: &Path) -> Result<(MediaKind, ForensicRecord), PipelineError> {
        let kind = MediaKind::from_path(path)
            .ok_or_else(|| PipelineError::UnsupportedMedia(path.to_path_buf()))?;
        info!("[pipeline] Treating {:?} as {} evidence", path, kind.as_str());

        let record = match kind {
            MediaKind::Image => self.analyze_image(path)?,
            MediaKind::Video => self.analyze_video(path)?,
        };
        Ok((kind, record))
    }

    /// Reconstruct a scene from a single photograph.
    pub fn analyze_image(&self, path: &Path) -> Result<ForensicRecord, PipelineError> {
        let image = load_image(path)?;
        info!(
            "[pipeline] Analyzing image {:?} ({}x{})",
            path,
            image.width(),
            image.height()
        );

        let response = self.submitter.submit(Evidence::Image(&image))?;
        Ok(normalize(&response)?)
    }

    /// Reconstruct a scene from video footage. The decoder is closed before
    /// the inference call is made.
    pub fn analyze_video(&self, path: &Path) -> Result<ForensicRecord, PipelineError> {
        let (keyframes, fps) = frames::sample_with(path, self.max_frames, &self.tools)?;
        self.analyze_keyframes(&keyframes, fps)
    }

    /// Sample an already open frame source and analyze the result.
    pub fn analyze_source<S: FrameSource + ?Sized>(
        &self,
        source: &mut S,
    ) -> Result<ForensicRecord, PipelineError> {
        let (keyframes, fps) = frames::sample_source(source, self.max_frames);
        self.analyze_keyframes(&keyframes, fps)
    }

    /// Submit sampled keyframes and attach video metadata to the record,
    /// including a safety-blocked one.
    pub fn analyze_keyframes(&self, keyframes: &[Keyframe], fps: f64) -> Result<ForensicRecord, PipelineError> {
        if keyframes.is_empty() {
            warn!("[pipeline] No frames could be decoded, submitting prompt without images");
        }

        let response = self.submitter.submit(Evidence::Keyframes(keyframes))?;
        let mut record = normalize(&response)?;
        record.video_meta = Some(VideoMeta {
            fps: round_tenths(fps),
            frames_analyzed: keyframes.len(),
        });
        Ok(record)
    }
}

fn load_image(path: &Path) -> Result<RgbImage, ResourceError> {
    let open_error = |e: std::io::Error| ResourceError::Open {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let image = ImageReader::open(path)
        .map_err(open_error)?
        .with_guessed_format()
        .map_err(open_error)?
        .decode()
        .map_err(|source| ResourceError::Image {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(image.to_rgb8())
}
