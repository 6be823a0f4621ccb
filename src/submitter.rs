//! Evidence submission
//!
//! Packages a photo or a keyframe sequence with the matching reconstruction
//! prompt and sends it through an [`InferenceClient`]. The raw response is
//! handed back untouched; interpretation belongs to the normalizer.

use std::io::Cursor;

use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use log::info;

use crate::constants::{GENERATION_TEMPERATURE, INLINE_JPEG_QUALITY};
use crate::error::SubmissionError;
use crate::frames::Keyframe;
use crate::gemini::{
    BlockThreshold, ContentPart, GenerateRequest, GenerationConfig, HarmCategory,
    InferenceClient, InferenceResponse, SafetySetting,
};
use crate::prompts::{IMAGE_PROMPT, VIDEO_PROMPT};

const JSON_MIME_TYPE: &str = "application/json";
const JPEG_MIME_TYPE: &str = "image/jpeg";

/// What is being submitted for reconstruction.
#[derive(Debug, Clone, Copy)]
pub enum Evidence<'a> {
    Image(&'a RgbImage),
    /// Chronological frames sampled from a video
    Keyframes(&'a [Keyframe]),
}

impl Evidence<'_> {
    pub fn prompt(&self) -> &'static str {
        match self {
            Evidence::Image(_) => IMAGE_PROMPT,
            Evidence::Keyframes(_) => VIDEO_PROMPT,
        }
    }
}

/// Accident imagery routinely trips default moderation, so only the highest
/// severity is blocked and only for these categories.
pub fn forensic_safety_settings() -> Vec<SafetySetting> {
    [HarmCategory::DangerousContent, HarmCategory::Harassment]
        .into_iter()
        .map(|category| SafetySetting {
            category,
            threshold: BlockThreshold::BlockOnlyHigh,
        })
        .collect()
}

pub struct EvidenceSubmitter<C> {
    client: C,
    model_id: String,
}

impl<C: InferenceClient> EvidenceSubmitter<C> {
    pub fn new(client: C, model_id: impl Into<String>) -> Self {
        Self {
            client,
            model_id: model_id.into(),
        }
    }

    /// Images first in chronological order, prompt last.
    pub fn build_request(&self, evidence: Evidence<'_>) -> Result<GenerateRequest, SubmissionError> {
        let mut parts = match evidence {
            Evidence::Image(image) => vec![jpeg_part(image)?],
            Evidence::Keyframes(frames) => frames
                .iter()
                .map(|frame| jpeg_part(&frame.image))
                .collect::<Result<Vec<_>, _>>()?,
        };
        parts.push(ContentPart::Text(evidence.prompt().to_string()));

        Ok(GenerateRequest {
            model: self.model_id.clone(),
            parts,
            config: GenerationConfig {
                response_mime_type: JSON_MIME_TYPE.to_string(),
                temperature: GENERATION_TEMPERATURE,
            },
            safety_settings: forensic_safety_settings(),
        })
    }

    /// One attempt, no retry. Blocked responses come back as `Ok`.
    pub fn submit(&self, evidence: Evidence<'_>) -> Result<InferenceResponse, SubmissionError> {
        let request = self.build_request(evidence)?;
        let images = request.parts.len() - 1;
        info!("[submit] Sending {} image(s) to {}", images, self.model_id);
        self.client.generate(&request)
    }
}

/// Encode an RGB bitmap as JPEG for inline transport.
pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, INLINE_JPEG_QUALITY).encode_image(image)?;
    Ok(buf.into_inner())
}

fn jpeg_part(image: &RgbImage) -> Result<ContentPart, SubmissionError> {
    Ok(ContentPart::Image {
        mime_type: JPEG_MIME_TYPE.to_string(),
        data: encode_jpeg(image)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct RecordingClient {
        requests: RefCell<Vec<GenerateRequest>>,
    }

    impl InferenceClient for RecordingClient {
        fn generate(&self, request: &GenerateRequest) -> Result<InferenceResponse, SubmissionError> {
            self.requests.borrow_mut().push(request.clone());
            Ok(InferenceResponse::from_text("{}"))
        }
    }

    fn frame(shade: u8, timestamp_sec: f64) -> Keyframe {
        Keyframe {
            image: RgbImage::from_pixel(8, 8, image::Rgb([shade, shade, shade])),
            timestamp_sec,
        }
    }

    #[test]
    fn test_image_request_uses_image_prompt() {
        let client = RecordingClient {
            requests: RefCell::new(Vec::new()),
        };
        let submitter = EvidenceSubmitter::new(&client, "gemini-2.5-flash");
        let image = RgbImage::from_pixel(8, 8, image::Rgb([10, 20, 30]));
        let request = submitter.build_request(Evidence::Image(&image)).unwrap();

        assert_eq!(request.model, "gemini-2.5-flash");
        assert_eq!(request.parts.len(), 2);
        assert!(matches!(&request.parts[0], ContentPart::Image { mime_type, .. } if mime_type == "image/jpeg"));
        assert_eq!(request.parts[1], ContentPart::Text(IMAGE_PROMPT.to_string()));
        assert_eq!(request.config.response_mime_type, "application/json");
        assert_eq!(request.config.temperature, 0.2);
    }

    #[test]
    fn test_keyframes_precede_video_prompt_in_order() {
        let client = RecordingClient {
            requests: RefCell::new(Vec::new()),
        };
        let submitter = EvidenceSubmitter::new(&client, "m");
        let frames = vec![frame(0, 0.0), frame(128, 1.0), frame(255, 2.0)];

        let response = submitter.submit(Evidence::Keyframes(&frames)).unwrap();
        assert_eq!(response.text().unwrap(), "{}");

        let requests = client.requests.borrow();
        let parts = &requests[0].parts;
        assert_eq!(parts.len(), 4);
        for (part, frame) in parts.iter().zip(&frames) {
            let ContentPart::Image { data, .. } = part else {
                panic!("expected image part");
            };
            let decoded = image::load_from_memory(data).unwrap().to_rgb8();
            let shade = decoded.get_pixel(4, 4)[0] as i16;
            assert!((shade - frame.image.get_pixel(4, 4)[0] as i16).abs() <= 4);
        }
        assert_eq!(parts[3], ContentPart::Text(VIDEO_PROMPT.to_string()));
    }

    #[test]
    fn test_safety_settings_only_relax_two_categories() {
        let settings = forensic_safety_settings();
        assert_eq!(settings.len(), 2);
        assert!(settings
            .iter()
            .all(|s| s.threshold == BlockThreshold::BlockOnlyHigh));
        assert_eq!(settings[0].category, HarmCategory::DangerousContent);
        assert_eq!(settings[1].category, HarmCategory::Harassment);
    }
}
