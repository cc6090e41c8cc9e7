//! Festival lineup scanning: OCR transcript → candidate artist names → streaming profiles.

pub mod config;
pub mod db;
pub mod errors;
pub mod matcher;
pub mod ocr;
pub mod segment;

pub use config::Settings;
pub use errors::{AuthError, InputError, MatcherError, OcrError, ProviderError};
pub use matcher::normalize::{is_exact_match, normalize, token_similarity, NormalizedKey};
pub use matcher::{
    ArtistDetails, ArtistMatcher, MatchResult, MatchType, MatcherConfig, SchedulePolicy, TopTrack,
};
pub use ocr::{validate_image, TextDetector, VisionClient};
pub use segment::{segment, Candidate, Confidence, Segmenter, SegmenterConfig};
