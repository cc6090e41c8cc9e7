use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::errors::AuthError;

/// Refresh this long before the provider's stated expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

/// Result of a client-credentials exchange.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub token: String,
    pub expires_in: Duration,
}

#[async_trait]
pub trait CredentialExchange: Send + Sync {
    async fn exchange_credentials(&self) -> Result<TokenGrant, AuthError>;
}

#[derive(Clone)]
pub struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn from_grant(grant: TokenGrant, now: Instant) -> Self {
        let lifetime = if grant.expires_in > EXPIRY_MARGIN {
            grant.expires_in - EXPIRY_MARGIN
        } else {
            grant.expires_in
        };
        AccessToken {
            value: grant.token,
            expires_at: now + lifetime,
        }
    }

    fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Owns the provider token: absent until first use, valid until expiry, then absent again.
///
/// The mutex is held across the credential exchange, so concurrent callers that
/// find no token wait for the one in-flight exchange instead of starting their own.
/// Callers that queued behind a failed exchange get that failure, not a retry.
pub struct AuthState {
    exchange: Arc<dyn CredentialExchange>,
    current: Mutex<Slot>,
    // Completed exchanges, successful or not.
    attempts: AtomicU64,
}

#[derive(Default)]
struct Slot {
    token: Option<AccessToken>,
    failure: Option<Arc<AuthError>>,
}

impl AuthState {
    pub fn new(exchange: Arc<dyn CredentialExchange>) -> Self {
        AuthState {
            exchange,
            current: Mutex::new(Slot::default()),
            attempts: AtomicU64::new(0),
        }
    }

    /// Return a valid token, exchanging credentials if none is cached or it has expired.
    pub async fn token(&self) -> Result<String, AuthError> {
        let seen = self.attempts.load(Ordering::Acquire);
        let mut slot = self.current.lock().await;
        let now = Instant::now();

        if let Some(token) = slot.token.as_ref() {
            if token.is_valid_at(now) {
                return Ok(token.value.clone());
            }
            debug!("access token expired");
            slot.token = None;
        }

        // An exchange finished while we were queued on the lock and left no token.
        if self.attempts.load(Ordering::Acquire) != seen {
            if let Some(failure) = slot.failure.as_ref() {
                return Err(AuthError::Shared(Arc::clone(failure)));
            }
        }

        let outcome = self.exchange.exchange_credentials().await;
        self.attempts.fetch_add(1, Ordering::AcqRel);

        match outcome {
            Ok(grant) => {
                let token = AccessToken::from_grant(grant, Instant::now());
                info!(
                    valid_for_secs = token.expires_at.saturating_duration_since(now).as_secs(),
                    "obtained access token"
                );
                let value = token.value.clone();
                slot.token = Some(token);
                slot.failure = None;
                Ok(value)
            }
            Err(e) => {
                let failure = Arc::new(e);
                slot.failure = Some(Arc::clone(&failure));
                Err(AuthError::Shared(failure))
            }
        }
    }

    /// Drop the cached token if it is still `stale`; a newer token is left alone.
    pub async fn invalidate(&self, stale: &str) {
        let mut slot = self.current.lock().await;
        if slot.token.as_ref().is_some_and(|t| t.value == stale) {
            debug!("invalidating rejected access token");
            slot.token = None;
        }
    }

    pub async fn has_valid_token(&self) -> bool {
        let slot = self.current.lock().await;
        slot.token.as_ref().is_some_and(|t| t.is_valid_at(Instant::now()))
    }
}
