use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::matcher::MatcherConfig;
use crate::matcher::spotify::SpotifyCredentials;
use crate::segment::SegmenterConfig;

const ENV_PREFIX: &str = "LINEUP";
const CONFIG_FILE: &str = "lineup";

/// Runtime settings: optional `lineup.toml`, then `LINEUP_*` environment variables.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub spotify_accounts_url: String,
    pub spotify_api_url: String,
    pub fallback_search_url: String,
    pub vision_api_key: Option<String>,
    pub vision_url: String,
    /// Minimum token-overlap score for a fuzzy match. A tuning knob, not a law.
    pub fuzzy_threshold: f64,
    pub search_limit: usize,
    pub request_timeout_secs: u64,
    pub concurrency: usize,
    pub split_threshold: usize,
    pub deny_list: Vec<String>,
    pub deny_patterns: Vec<String>,
    pub db_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            spotify_client_id: None,
            spotify_client_secret: None,
            spotify_accounts_url: "https://accounts.spotify.com".to_string(),
            spotify_api_url: "https://api.spotify.com".to_string(),
            fallback_search_url: "https://open.spotify.com/search/".to_string(),
            vision_api_key: None,
            vision_url: "https://vision.googleapis.com/v1/images:annotate".to_string(),
            fuzzy_threshold: 0.4,
            search_limit: 20,
            request_timeout_secs: 10,
            concurrency: 4,
            split_threshold: 25,
            deny_list: Vec::new(),
            deny_patterns: Vec::new(),
            db_path: PathBuf::from("data/lineup.sqlite"),
        }
    }
}

// Hand-written so secrets never reach the logs.
impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Settings")
            .field("spotify_client_id", &redact(&self.spotify_client_id))
            .field("spotify_client_secret", &redact(&self.spotify_client_secret))
            .field("vision_api_key", &redact(&self.vision_api_key))
            .field("fuzzy_threshold", &self.fuzzy_threshold)
            .field("search_limit", &self.search_limit)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("split_threshold", &self.split_threshold)
            .field("deny_list", &self.deny_list.len())
            .field("deny_patterns", &self.deny_patterns.len())
            .field("db_path", &self.db_path)
            .finish()
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("deny_list")
                    .with_list_parse_key("deny_patterns"),
            );
        let mut settings: Settings = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        // Unprefixed names are what most Spotify tooling exports.
        if settings.spotify_client_id.is_none() {
            settings.spotify_client_id = std::env::var("SPOTIFY_CLIENT_ID").ok();
        }
        if settings.spotify_client_secret.is_none() {
            settings.spotify_client_secret = std::env::var("SPOTIFY_CLIENT_SECRET").ok();
        }
        Ok(settings)
    }

    /// Parse settings from a TOML document, ignoring the environment.
    pub fn from_toml(doc: &str) -> Result<Self> {
        Config::builder()
            .add_source(File::from_str(doc, FileFormat::Toml))
            .build()
            .context("Failed to parse configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn spotify_credentials(&self) -> Option<SpotifyCredentials> {
        match (&self.spotify_client_id, &self.spotify_client_secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                Some(SpotifyCredentials {
                    client_id: id.clone(),
                    client_secret: secret.clone(),
                })
            }
            _ => None,
        }
    }

    pub fn matcher_config(&self) -> MatcherConfig {
        MatcherConfig {
            search_limit: self.search_limit,
            fuzzy_threshold: self.fuzzy_threshold,
            request_timeout: self.request_timeout(),
            fallback_search_url: self.fallback_search_url.clone(),
        }
    }

    pub fn segmenter_config(&self) -> SegmenterConfig {
        SegmenterConfig {
            split_threshold: self.split_threshold,
            deny_list: self.deny_list.clone(),
            deny_patterns: self.deny_patterns.clone(),
        }
    }
}
