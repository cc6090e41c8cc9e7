use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::errors::{AuthError, InputError, OcrError, ProviderError};

pub const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
        };
        f.write_str(s)
    }
}

/// Identify an image by its leading magic bytes.
pub fn sniff_format(bytes: &[u8]) -> Option<ImageFormat> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some(ImageFormat::Jpeg),
        [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(ImageFormat::Png),
        [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some(ImageFormat::Gif),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(ImageFormat::Webp),
        _ => None,
    }
}

/// Reject empty, oversized or unrecognised images before they leave the process.
pub fn validate_image(bytes: &[u8]) -> Result<ImageFormat, InputError> {
    if bytes.is_empty() {
        return Err(InputError::EmptyImage);
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(InputError::ImageTooLarge {
            size: bytes.len(),
            max: MAX_IMAGE_BYTES,
        });
    }
    sniff_format(bytes).ok_or(InputError::UnsupportedImageFormat)
}

#[async_trait]
pub trait TextDetector: Send + Sync {
    /// Full transcript of the text in `image`, or an empty string if there is none.
    async fn detect_text(&self, image: &[u8]) -> Result<String, OcrError>;
}

/// Google Cloud Vision `images:annotate` with `TEXT_DETECTION`.
pub struct VisionClient {
    http: Client,
    api_key: Option<String>,
    endpoint: String,
}

#[derive(Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageAnnotation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageAnnotation {
    #[serde(default)]
    text_annotations: Vec<TextAnnotation>,
    error: Option<StatusMessage>,
}

#[derive(Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct StatusMessage {
    #[serde(default)]
    message: String,
}

impl VisionClient {
    pub fn new(api_key: Option<String>, endpoint: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(VisionClient {
            http,
            api_key: api_key.filter(|k| !k.is_empty()),
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl TextDetector for VisionClient {
    async fn detect_text(&self, image: &[u8]) -> Result<String, OcrError> {
        let format = validate_image(image)?;
        let key = self
            .api_key
            .as_deref()
            .ok_or(AuthError::MissingCredentials("Google Vision"))?;

        info!(bytes = image.len(), %format, "submitting image for text detection");
        let body = json!({
            "requests": [{
                "image": { "content": STANDARD.encode(image) },
                "features": [{ "type": "TEXT_DETECTION" }]
            }]
        });

        let resp = self
            .http
            .post(&self.endpoint)
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::from)?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AuthError::Rejected { status }.into());
        }
        if !status.is_success() {
            return Err(ProviderError::Status(status).into());
        }

        let text = resp.text().await.map_err(ProviderError::from)?;
        let transcript = transcript_from_response(&text)?;
        debug!(chars = transcript.len(), "text detection finished");
        Ok(transcript)
    }
}

/// The first annotation holds the whole transcript; later ones are per-word.
pub fn transcript_from_response(body: &str) -> Result<String, ProviderError> {
    let parsed: AnnotateResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Decode(e.to_string()))?;

    let Some(first) = parsed.responses.into_iter().next() else {
        return Ok(String::new());
    };
    if let Some(err) = first.error {
        return Err(ProviderError::Api(err.message));
    }
    Ok(first
        .text_annotations
        .into_iter()
        .next()
        .map(|a| a.description)
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

    #[test]
    fn sniffs_allowed_formats() {
        assert_eq!(sniff_format(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00]), Some(ImageFormat::Jpeg));
        assert_eq!(sniff_format(PNG_HEADER), Some(ImageFormat::Png));
        assert_eq!(sniff_format(b"GIF89a\x01\x00"), Some(ImageFormat::Gif));
        assert_eq!(sniff_format(b"RIFF\x24\x00\x00\x00WEBPVP8 "), Some(ImageFormat::Webp));
        assert_eq!(sniff_format(b"RIFF\x24\x00\x00\x00WAVEfmt "), None);
        assert_eq!(sniff_format(b"%PDF-1.7"), None);
    }

    #[test]
    fn rejects_empty_and_unknown() {
        assert!(matches!(validate_image(&[]), Err(InputError::EmptyImage)));
        assert!(matches!(
            validate_image(b"not an image"),
            Err(InputError::UnsupportedImageFormat)
        ));
    }

    #[test]
    fn rejects_oversized() {
        let mut big = vec![0u8; MAX_IMAGE_BYTES + 1];
        big[..PNG_HEADER.len()].copy_from_slice(PNG_HEADER);
        assert!(matches!(
            validate_image(&big),
            Err(InputError::ImageTooLarge { size, .. }) if size == MAX_IMAGE_BYTES + 1
        ));
        big.truncate(MAX_IMAGE_BYTES);
        assert_eq!(validate_image(&big).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn transcript_is_first_annotation() {
        let body = r#"{"responses":[{"textAnnotations":[
            {"locale":"en","description":"ELEMENTS FESTIVAL\nSoul Clap\n"},
            {"description":"ELEMENTS"}
        ]}]}"#;
        assert_eq!(transcript_from_response(body).unwrap(), "ELEMENTS FESTIVAL\nSoul Clap\n");
    }

    #[test]
    fn no_text_is_empty_transcript() {
        assert_eq!(transcript_from_response(r#"{"responses":[{}]}"#).unwrap(), "");
        assert_eq!(transcript_from_response("{}").unwrap(), "");
    }

    #[test]
    fn per_image_error_surfaces() {
        let body = r#"{"responses":[{"error":{"code":3,"message":"Bad image data."}}]}"#;
        assert!(matches!(
            transcript_from_response(body),
            Err(ProviderError::Api(m)) if m == "Bad image data."
        ));
    }

    #[tokio::test]
    async fn validation_runs_before_credentials() {
        let client = VisionClient::new(None, "http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        assert!(matches!(
            client.detect_text(&[]).await,
            Err(OcrError::Input(InputError::EmptyImage))
        ));
        assert!(matches!(
            client.detect_text(PNG_HEADER).await,
            Err(OcrError::Auth(AuthError::MissingCredentials(_)))
        ));
    }
}
