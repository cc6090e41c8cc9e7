use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Bad input rejected before any provider is contacted. Never retried.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Invalid image: empty buffer")]
    EmptyImage,
    #[error("File size ({size} bytes) exceeds maximum allowed size ({max} bytes)")]
    ImageTooLarge { size: usize, max: usize },
    #[error("Invalid image format: expected JPEG, PNG, GIF or WEBP")]
    UnsupportedImageFormat,
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid deny-list pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Missing or rejected provider credentials. Fatal for the current batch.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{0} credentials are not set")]
    MissingCredentials(&'static str),
    #[error("Credential exchange rejected with status {status}")]
    Rejected { status: StatusCode },
    #[error("Credential exchange failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Credential exchange returned a malformed response: {0}")]
    MalformedResponse(String),
    /// Failure of an exchange another caller started while this one was waiting.
    #[error(transparent)]
    Shared(Arc<AuthError>),
}

/// Network or provider failures. Downgraded per artist during matching.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Provider returned status {0}")]
    Status(StatusCode),
    #[error("Provider did not respond within {0:?}")]
    Timeout(Duration),
    #[error("Could not decode provider response: {0}")]
    Decode(String),
    #[error("Provider rejected the access token")]
    Unauthorized,
    #[error("Provider reported an error: {0}")]
    Api(String),
}

/// The only error `ArtistMatcher::resolve` surfaces; provider errors become `none` results.
#[derive(Error, Debug)]
pub enum MatcherError {
    #[error("Search provider unavailable: {0}")]
    Auth(#[from] AuthError),
}

#[derive(Error, Debug)]
pub enum OcrError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("OCR provider failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("OCR provider credentials: {0}")]
    Auth(#[from] AuthError),
}

impl AuthError {
    /// The underlying failure, looking through `Shared`.
    pub fn root(&self) -> &AuthError {
        match self {
            AuthError::Shared(inner) => inner.root(),
            other => other,
        }
    }
}

impl MatcherError {
    /// Whether the UI should show "service unavailable" rather than a generic failure.
    pub fn is_service_unavailable(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_messages() {
        assert_eq!(InputError::EmptyImage.to_string(), "Invalid image: empty buffer");
        let e = InputError::ImageTooLarge { size: 30, max: 20 };
        assert!(e.to_string().contains("30 bytes"));
    }

    #[test]
    fn auth_is_service_unavailable() {
        let e = MatcherError::from(AuthError::MissingCredentials("Spotify"));
        assert!(e.is_service_unavailable());
        assert_eq!(e.to_string(), "Search provider unavailable: Spotify credentials are not set");
    }

    #[test]
    fn shared_failure_displays_the_inner_error() {
        let e = AuthError::Shared(Arc::new(AuthError::MissingCredentials("Spotify")));
        assert_eq!(e.to_string(), "Spotify credentials are not set");
        assert!(matches!(e.root(), AuthError::MissingCredentials("Spotify")));
    }

    #[test]
    fn ocr_wraps_input_transparently() {
        let e = OcrError::from(InputError::UnsupportedImageFormat);
        assert_eq!(e.to_string(), InputError::UnsupportedImageFormat.to_string());
    }
}
