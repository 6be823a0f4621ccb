//! Case records
//!
//! A case pairs one normalized [`ForensicRecord`] with identifying metadata.
//! Ids and stored filenames are minted by whoever owns persistence; the
//! helpers here only exist so every collaborator mints them the same way.

use std::path::Path;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::CASE_ID_LEN;
use crate::models::{ForensicRecord, MediaKind};

/// Identifying metadata supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseMeta {
    pub case_id: String,
    pub user: String,
    pub media_type: MediaKind,
    pub filename: String,
}

/// A stored case document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub case_id: String,
    pub user: String,
    #[serde(rename = "type")]
    pub media_type: MediaKind,
    pub filename: String,
    #[serde(rename = "analysis")]
    pub record: ForensicRecord,
    pub created_at: DateTime<Utc>,
}

impl CaseRecord {
    /// Wrap `record` with `meta`, stamped with the current time.
    pub fn assemble(record: ForensicRecord, meta: CaseMeta) -> Self {
        Self::assemble_at(record, meta, Utc::now())
    }

    pub fn assemble_at(record: ForensicRecord, meta: CaseMeta, created_at: DateTime<Utc>) -> Self {
        Self {
            case_id: meta.case_id,
            user: meta.user,
            media_type: meta.media_type,
            filename: meta.filename,
            record,
            created_at,
        }
    }
}

/// Random id of [`CASE_ID_LEN`] lowercase hex chars.
pub fn new_case_id() -> String {
    let id: u32 = rand::rng().random();
    format!("{:0width$x}", id, width = CASE_ID_LEN)
}

/// Storage name for an upload: a fresh id prefix plus the sanitized basename.
pub fn stored_filename(original: &str) -> String {
    format!("{}_{}", new_case_id(), sanitize_filename(original))
}

/// Reduce `original` to a safe basename. Anything but ASCII alphanumerics,
/// `.`, `-` and `_` becomes `_`; leading dots are dropped.
pub fn sanitize_filename(original: &str) -> String {
    let basename = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(original);

    let cleaned: String = basename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CollisionType;
    use chrono::TimeZone;

    #[test]
    fn test_case_id_format() {
        for _ in 0..32 {
            let id = new_case_id();
            assert_eq!(id.len(), CASE_ID_LEN);
            assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("dashcam clip (1).mp4"), "dashcam_clip__1_.mp4");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename(".hidden.jpg"), "hidden.jpg");
        assert_eq!(sanitize_filename("crash-scene_02.JPG"), "crash-scene_02.JPG");
        assert_eq!(sanitize_filename("привет.png"), "______.png");
        assert_eq!(sanitize_filename("..."), "upload");
    }

    #[test]
    fn test_stored_filename_prefix() {
        let stored = stored_filename("scene.png");
        let (prefix, rest) = stored.split_at(CASE_ID_LEN);
        assert!(prefix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(rest, "_scene.png");
    }

    #[test]
    fn test_case_record_layout() {
        let created_at = Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap();
        let record = ForensicRecord {
            scene_summary: "x".to_string(),
            collision_type: CollisionType::HeadOn,
            severity_score: 90,
            ..Default::default()
        };
        let case = CaseRecord::assemble_at(
            record.clone(),
            CaseMeta {
                case_id: "0a1b2c3d".to_string(),
                user: "officer".to_string(),
                media_type: MediaKind::Image,
                filename: "0a1b2c3d_scene.png".to_string(),
            },
            created_at,
        );

        let value = serde_json::to_value(&case).unwrap();
        assert_eq!(value["case_id"], "0a1b2c3d");
        assert_eq!(value["type"], "image");
        assert_eq!(value["analysis"]["collision_type"], "Head-on");
        assert_eq!(value["analysis"]["severity_score"], 90);
        assert_eq!(value["created_at"], "2025-03-14T09:30:00Z");

        let back: CaseRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back.record, record);
    }
}
