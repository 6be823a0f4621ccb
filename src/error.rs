//! Error taxonomy for the analysis pipeline.
//!
//! Safety blocks and short videos are deliberately absent: both resolve to
//! successful results.

use std::path::PathBuf;

use thiserror::Error;

/// Video or image evidence could not be opened or decoded at all.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("failed to open media {path:?}: {reason}")]
    Open { path: PathBuf, reason: String },
    #[error("no video stream in {path:?}")]
    NoVideoStream { path: PathBuf },
    #[error("failed to decode image {path:?}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// The inference service call did not complete.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("undecodable response envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("failed to encode evidence image: {0}")]
    Encode(#[from] image::ImageError),
}

/// The model's output was not valid structured data even after unwrapping.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("response is not valid JSON ({source}); cleaned text began: {preview:?}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
        preview: String,
    },
    #[error("expected a JSON object, got {kind}")]
    NotAnObject { kind: &'static str },
}

/// Missing or invalid configuration, detected at construction time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("invalid http client configuration: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Any fatal condition surfaced by [`crate::pipeline::ForensicPipeline`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unsupported media type for {0:?}")]
    UnsupportedMedia(PathBuf),
}
