//! Accident scene reconstruction from photos and video.
//!
//! Evidence is sampled ([`frames`]), sent to a multimodal model with a
//! forensic prompt ([`submitter`], [`gemini`]) and the answer is coerced into a
//! [`models::ForensicRecord`] ([`normalize`]). [`pipeline::ForensicPipeline`]
//! runs the whole flow; [`cases`] wraps results for storage.

pub mod cases;
pub mod config;
pub mod constants;
pub mod error;
pub mod frames;
pub mod gemini;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod prompts;
pub mod submitter;

pub use error::PipelineError;
pub use models::{CollisionType, ForensicRecord, MediaKind};
pub use pipeline::ForensicPipeline;
