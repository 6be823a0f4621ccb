//! Environment-driven configuration.
//!
//! Numeric settings that are missing, unparsable, or zero fall back to their
//! defaults. Only the API key is mandatory.

use std::env;

use crate::constants::{DEFAULT_GEMINI_BASE_URL, DEFAULT_MAX_FRAMES, DEFAULT_MODEL_ID};
use crate::error::ConfigError;

const DEFAULT_FFMPEG_THREADS: usize = 1;

/// External ffmpeg/ffprobe binaries used for decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegTools {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub threads: usize,
}

impl Default for FfmpegTools {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            threads: DEFAULT_FFMPEG_THREADS,
        }
    }
}

/// Everything needed to build a [`crate::gemini::GeminiClient`] and run analyses.
#[derive(Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    pub api_key: String,
    pub model_id: String,
    pub base_url: String,
    pub max_frames: usize,
    pub tools: FfmpegTools,
}

impl std::fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("api_key", &"<redacted>")
            .field("model_id", &self.model_id)
            .field("base_url", &self.base_url)
            .field("max_frames", &self.max_frames)
            .field("tools", &self.tools)
            .finish()
    }
}

impl AnalysisConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read configuration through `lookup`, which returns a variable's value if set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = non_empty("GEMINI_API_KEY")
            .or_else(|| non_empty("GOOGLE_GEMINI_API_KEY"))
            .ok_or(ConfigError::Missing("GEMINI_API_KEY"))?;

        let positive = |key: &str, default: usize| {
            non_empty(key)
                .and_then(|s| s.parse::<usize>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default)
        };

        let defaults = FfmpegTools::default();
        Ok(Self {
            api_key,
            model_id: non_empty("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()),
            base_url: non_empty("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            max_frames: positive("FORENSIC_MAX_FRAMES", DEFAULT_MAX_FRAMES),
            tools: FfmpegTools {
                ffmpeg: non_empty("FFMPEG_PATH").unwrap_or(defaults.ffmpeg),
                ffprobe: non_empty("FFPROBE_PATH").unwrap_or(defaults.ffprobe),
                threads: positive("FFMPEG_THREADS", defaults.threads),
            },
        })
    }
}
