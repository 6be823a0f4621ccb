//! Application constants

/// Default Gemini model used for scene reconstruction
pub const DEFAULT_MODEL_ID: &str = "gemini-2.5-flash";

/// Default Gemini REST endpoint
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Keyframes sampled from a video per analysis
pub const DEFAULT_MAX_FRAMES: usize = 15;

/// Frame rate assumed when the container reports none. Policy choice, not derived.
pub const FALLBACK_FRAME_RATE: f64 = 30.0;

/// Frame count assumed when the container reports none. Policy choice, not derived.
pub const FALLBACK_FRAME_COUNT: u64 = 300;

/// Low temperature keeps the reconstruction close to deterministic
pub const GENERATION_TEMPERATURE: f64 = 0.2;

/// JPEG quality for frames sent inline to the model
pub const INLINE_JPEG_QUALITY: u8 = 85;

/// Extensions accepted as video evidence
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv"];

/// Extensions accepted as image evidence
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "gif"];

/// Length of generated case ids and stored filename prefixes (hex chars)
pub const CASE_ID_LEN: usize = 8;
