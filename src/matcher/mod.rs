pub mod auth;
pub mod normalize;
pub mod spotify;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::errors::{MatcherError, ProviderError};
use auth::{AuthState, CredentialExchange};
use normalize::{is_exact_match, normalize, token_similarity, NormalizedKey};

pub const DEFAULT_SEARCH_LIMIT: usize = 20;
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.4;
pub const TOP_TRACK_LIMIT: usize = 5;

/// One artist returned by the search provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtistHit {
    pub name: String,
    pub profile_url: String,
    /// Provider id, needed for the top-tracks lookup.
    pub id: Option<String>,
    pub details: ArtistDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistImage {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopTrack {
    pub name: String,
    pub spotify_url: Option<String>,
    pub preview_url: Option<String>,
}

/// Profile extras shown next to a matched artist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistDetails {
    #[serde(default)]
    pub images: Vec<ArtistImage>,
    #[serde(default)]
    pub genres: Vec<String>,
    pub popularity: Option<u32>,
    pub followers: Option<u64>,
    #[serde(default)]
    pub top_tracks: Vec<TopTrack>,
}

#[async_trait]
pub trait ArtistSearch: Send + Sync {
    async fn search_artists(
        &self,
        token: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<ArtistHit>, ProviderError>;

    /// At most `TOP_TRACK_LIMIT` tracks, most popular first.
    async fn top_tracks(&self, _token: &str, _artist_id: &str) -> Result<Vec<TopTrack>, ProviderError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone)]
pub struct MatcherConfig {
    pub search_limit: usize,
    /// A fuzzy score must be strictly above this to count.
    pub fuzzy_threshold: f64,
    pub request_timeout: Duration,
    /// Raw names are percent-encoded and appended to this.
    pub fallback_search_url: String,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        MatcherConfig {
            search_limit: DEFAULT_SEARCH_LIMIT,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            request_timeout: Duration::from_secs(10),
            fallback_search_url: "https://open.spotify.com/search/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Fuzzy,
    None,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Fuzzy => "fuzzy",
            MatchType::None => "none",
        }
    }
}

impl FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(MatchType::Exact),
            "fuzzy" => Ok(MatchType::Fuzzy),
            "none" => Ok(MatchType::None),
            other => Err(format!("unknown match type {other:?}")),
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub searched_name: String,
    pub matched_name: Option<String>,
    pub profile_url: String,
    pub match_type: MatchType,
    pub confidence: f64,
    /// Present for exact and fuzzy matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ArtistDetails>,
}

/// How `resolve_all` schedules lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulePolicy {
    /// One lookup at a time, in input order.
    Serial,
    /// Up to `n` lookups in flight.
    Concurrent(usize),
}

/// Resolves confirmed names to provider profiles, sharing one token and one cache.
pub struct ArtistMatcher {
    auth: AuthState,
    search: Arc<dyn ArtistSearch>,
    cache: RwLock<HashMap<NormalizedKey, MatchResult>>,
    config: MatcherConfig,
}

impl ArtistMatcher {
    pub fn new(
        exchange: Arc<dyn CredentialExchange>,
        search: Arc<dyn ArtistSearch>,
        config: MatcherConfig,
    ) -> Self {
        ArtistMatcher {
            auth: AuthState::new(exchange),
            search,
            cache: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub async fn cached_len(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Resolve one name. Only a failed credential exchange is an error; provider
    /// failures are logged and come back as `none` with the fallback URL.
    pub async fn resolve(&self, name: &str) -> Result<MatchResult, MatcherError> {
        let key = normalize(name);
        if key.is_empty() {
            debug!(artist = %name, "name has no letters or digits, skipping search");
            return Ok(self.no_match(name));
        }

        if let Some(hit) = self.cache.read().await.get(&key) {
            debug!(artist = %name, %key, "cache hit");
            return Ok(MatchResult {
                searched_name: name.to_string(),
                ..hit.clone()
            });
        }

        let token = self.auth.token().await?;
        let limit = self.config.search_limit;
        let hits = match tokio::time::timeout(
            self.config.request_timeout,
            self.search.search_artists(&token, name, limit),
        )
        .await
        {
            Ok(Ok(hits)) => hits,
            Ok(Err(ProviderError::Unauthorized)) => {
                warn!(artist = %name, "search rejected the access token, will re-authenticate");
                self.auth.invalidate(&token).await;
                return Ok(self.no_match(name));
            }
            Ok(Err(e)) => {
                warn!(artist = %name, error = %e, "artist search failed");
                return Ok(self.no_match(name));
            }
            Err(_) => {
                let e = ProviderError::Timeout(self.config.request_timeout);
                warn!(artist = %name, error = %e, "artist search failed");
                return Ok(self.no_match(name));
            }
        };

        let mut result = self.select(name, &hits);
        if let Some(details) = result.details.as_mut() {
            if let Some(id) = matched_id(&result.profile_url, &hits) {
                details.top_tracks = self.top_tracks(&token, name, id).await;
            }
        }
        debug!(
            artist = %name,
            candidates = hits.len(),
            match_type = %result.match_type,
            "resolved"
        );
        self.cache.write().await.insert(key, result.clone());
        Ok(result)
    }

    /// Pick the first exact hit, else the best fuzzy hit above the threshold, else none.
    pub fn select(&self, name: &str, hits: &[ArtistHit]) -> MatchResult {
        if let Some(hit) = hits.iter().find(|h| is_exact_match(name, &h.name)) {
            return MatchResult {
                searched_name: name.to_string(),
                matched_name: Some(hit.name.clone()),
                profile_url: hit.profile_url.clone(),
                match_type: MatchType::Exact,
                confidence: 1.0,
                details: Some(hit.details.clone()),
            };
        }

        let mut best: Option<(&ArtistHit, f64)> = None;
        for hit in hits {
            let score = token_similarity(name, &hit.name);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((hit, score));
            }
        }

        match best {
            Some((hit, score)) if score > self.config.fuzzy_threshold => MatchResult {
                searched_name: name.to_string(),
                matched_name: Some(hit.name.clone()),
                profile_url: hit.profile_url.clone(),
                match_type: MatchType::Fuzzy,
                confidence: score,
                details: Some(hit.details.clone()),
            },
            _ => self.no_match(name),
        }
    }

    pub fn fallback_url(&self, name: &str) -> String {
        format!(
            "{}{}",
            self.config.fallback_search_url,
            urlencoding::encode(name.trim())
        )
    }

    fn no_match(&self, name: &str) -> MatchResult {
        MatchResult {
            searched_name: name.to_string(),
            matched_name: None,
            profile_url: self.fallback_url(name),
            match_type: MatchType::None,
            confidence: 0.0,
            details: None,
        }
    }

    /// Failures leave the match intact with no tracks.
    async fn top_tracks(&self, token: &str, name: &str, artist_id: &str) -> Vec<TopTrack> {
        match tokio::time::timeout(
            self.config.request_timeout,
            self.search.top_tracks(token, artist_id),
        )
        .await
        {
            Ok(Ok(mut tracks)) => {
                tracks.truncate(TOP_TRACK_LIMIT);
                tracks
            }
            Ok(Err(e)) => {
                warn!(artist = %name, error = %e, "top tracks lookup failed");
                Vec::new()
            }
            Err(_) => {
                let e = ProviderError::Timeout(self.config.request_timeout);
                warn!(artist = %name, error = %e, "top tracks lookup failed");
                Vec::new()
            }
        }
    }

    /// Resolve a batch of confirmed names.
    ///
    /// Names sharing a NormalizedKey are looked up once; blank names are skipped.
    /// The returned map has an entry for every other input name. The first
    /// credential failure aborts the batch: queued lookups never start and
    /// in-flight ones are cancelled.
    pub async fn resolve_all(
        self: &Arc<Self>,
        names: &[String],
        policy: SchedulePolicy,
        pb: &ProgressBar,
    ) -> Result<HashMap<String, MatchResult>, MatcherError> {
        let unique = dedup_by_key(names);
        pb.set_length(unique.len() as u64);
        info!(names = names.len(), unique = unique.len(), ?policy, "resolving batch");

        let mut by_key: HashMap<NormalizedKey, MatchResult> = HashMap::with_capacity(unique.len());
        match policy {
            SchedulePolicy::Serial => {
                for (key, name) in unique {
                    let result = self.resolve(&name).await?;
                    by_key.insert(key, result);
                    pb.inc(1);
                }
            }
            SchedulePolicy::Concurrent(n) => {
                let n = n.max(1);
                let semaphore = Arc::new(Semaphore::new(n));
                let (tx, mut rx) = tokio::sync::mpsc::channel(n * 2);
                let mut tasks = JoinSet::new();

                for (key, name) in unique {
                    let matcher = Arc::clone(self);
                    let sem = Arc::clone(&semaphore);
                    let tx = tx.clone();

                    tasks.spawn(async move {
                        let Ok(_permit) = sem.acquire().await else {
                            return;
                        };
                        let result = matcher.resolve(&name).await;
                        if result.is_err() {
                            // Tasks still waiting for a permit bail out.
                            sem.close();
                        }
                        let _ = tx.send((key, result)).await;
                    });
                }

                // rx closes once every task has sent or bailed
                drop(tx);

                while let Some((key, result)) = rx.recv().await {
                    match result {
                        Ok(result) => {
                            by_key.insert(key, result);
                            pb.inc(1);
                        }
                        Err(e) => {
                            semaphore.close();
                            tasks.abort_all();
                            pb.abandon();
                            return Err(e);
                        }
                    }
                }
            }
        }
        pb.finish_and_clear();

        let mut out = HashMap::with_capacity(names.len());
        for name in names {
            if name.trim().is_empty() {
                continue;
            }
            if let Some(result) = by_key.get(&normalize(name)) {
                out.insert(
                    name.clone(),
                    MatchResult {
                        searched_name: name.clone(),
                        ..result.clone()
                    },
                );
            }
        }
        Ok(out)
    }
}

/// Provider id of the hit `select` picked.
fn matched_id<'a>(profile_url: &str, hits: &'a [ArtistHit]) -> Option<&'a str> {
    hits.iter()
        .find(|h| h.profile_url == profile_url)
        .and_then(|h| h.id.as_deref())
}

/// First spelling of each key, in input order; blank names dropped.
fn dedup_by_key(names: &[String]) -> Vec<(NormalizedKey, String)> {
    let mut seen = std::collections::HashSet::new();
    names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .filter_map(|n| {
            let key = normalize(n);
            seen.insert(key.clone()).then(|| (key, n.to_string()))
        })
        .collect()
}
