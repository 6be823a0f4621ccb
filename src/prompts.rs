//! Reconstruction prompts. Each embeds the JSON schema the model must answer with.

/// Single photograph of an accident scene. No timeline.
pub const IMAGE_PROMPT: &str = r#"You are an expert digital forensic investigator analyzing a traffic accident scene.
Carefully analyze this image and output a strict JSON object with exactly the following schema:
{
    "scene_summary": "A detailed 1-2 sentence caption of the accident scene.",
    "collision_type": "Head-on, Rear-end, Side-impact, Rollover, or N/A",
    "severity_score": <integer from 0 to 100>,
    "pedestrians_detected": <boolean>,
    "license_plates_detected": ["plates", "that", "are", "legible", "otherwise an empty list"],
    "vehicles_involved": [
        {
            "type": "car/truck/motorcycle/bus/etc",
            "fault_percentage": <integer from 0 to 100>,
            "reasoning": "Investigative reasoning for this fault assignment based on position and damage."
        }
    ],
    "investigative_narrative": "A professional, 2-paragraph forensic reconstruction of the event."
}
"#;

/// Chronological keyframes from dashcam or CCTV footage. Adds a timeline.
pub const VIDEO_PROMPT: &str = r#"You are an expert digital forensic investigator analyzing accident dashcam or CCTV footage.
The images provided are chronological frames sampled at even intervals from the video.
Analyze the sequence to reconstruct the event and output a strict JSON object with exactly this schema:
{
    "scene_summary": "A detailed 2-sentence caption of the entire video sequence.",
    "collision_type": "Head-on, Rear-end, Side-impact, Rollover, or N/A",
    "severity_score": <integer from 0 to 100>,
    "pedestrians_detected": <boolean>,
    "license_plates_detected": ["plates", "that", "are", "legible", "otherwise an empty list"],
    "vehicles_involved": [
        {
            "type": "car/truck/motorcycle/bus/etc",
            "fault_percentage": <integer from 0 to 100>,
            "reasoning": "Investigative reasoning for this fault assignment based on motion and impact."
        }
    ],
    "investigative_narrative": "A professional, 2-paragraph forensic reconstruction of the event.",
    "timeline": [
        {
            "timestamp_sec": "<approximate second, e.g. '0.0', '1.5'>",
            "event": "What happens at this moment (e.g. 'Impact occurs')"
        }
    ]
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_video_prompt_requests_timeline() {
        assert!(VIDEO_PROMPT.contains("\"timeline\""));
        assert!(!IMAGE_PROMPT.contains("\"timeline\""));
        for prompt in [IMAGE_PROMPT, VIDEO_PROMPT] {
            assert!(prompt.contains("\"scene_summary\""));
            assert!(prompt.contains("\"vehicles_involved\""));
        }
    }
}
