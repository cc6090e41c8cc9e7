pub mod noise;
pub mod split;

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::InputError;
use crate::matcher::normalize::{normalize, NormalizedKey};
use noise::{DenyList, NoiseClassifier, PosterNoise};

pub const DEFAULT_SPLIT_THRESHOLD: usize = 25;

/// UI hint only; nothing downstream depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Low,
    Unknown,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Confidence::High => "high",
            Confidence::Low => "low",
            Confidence::Unknown => "unknown",
        };
        f.pad(s)
    }
}

/// An extracted, unreviewed artist name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub text: String,
    pub confidence: Confidence,
}

#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    pub split_threshold: usize,
    pub deny_list: Vec<String>,
    pub deny_patterns: Vec<String>,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        SegmenterConfig {
            split_threshold: DEFAULT_SPLIT_THRESHOLD,
            deny_list: Vec::new(),
            deny_patterns: Vec::new(),
        }
    }
}

/// Turns one OCR transcript into an ordered, deduplicated list of candidates.
pub struct Segmenter {
    classifier: Box<dyn NoiseClassifier>,
    known_artists: HashSet<NormalizedKey>,
    split_threshold: usize,
}

impl Default for Segmenter {
    fn default() -> Self {
        Segmenter::with_classifier(Box::new(PosterNoise::default()), DEFAULT_SPLIT_THRESHOLD)
    }
}

impl Segmenter {
    pub fn new(config: &SegmenterConfig) -> Result<Self, InputError> {
        let deny = DenyList::new(&config.deny_list, &config.deny_patterns)?;
        debug!(entries = deny.len(), "compiled deny-list");
        Ok(Segmenter::with_classifier(
            Box::new(PosterNoise::new(deny)),
            config.split_threshold,
        ))
    }

    pub fn with_classifier(classifier: Box<dyn NoiseClassifier>, split_threshold: usize) -> Self {
        Segmenter {
            classifier,
            known_artists: HashSet::new(),
            split_threshold,
        }
    }

    /// Names confirmed as artists; they bypass noise rules and are tagged high confidence.
    pub fn with_known_artists<I>(mut self, names: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.known_artists.extend(
            names
                .into_iter()
                .map(|n| normalize(n.as_ref()))
                .filter(|k| !k.is_empty()),
        );
        self
    }

    pub fn segment(&self, raw: &str) -> Vec<Candidate> {
        let mut seen: HashSet<NormalizedKey> = HashSet::new();
        let mut candidates = Vec::new();

        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if !self.is_known(line) && self.classifier.is_noise_line(line) {
                debug!(line, "dropping noise line");
                continue;
            }

            for part in split::split_explicit(line) {
                for piece in split::split_long(&part, self.split_threshold) {
                    let Some(text) = split::clean_segment(&piece.text) else {
                        continue;
                    };
                    let key = normalize(&text);
                    if key.is_empty() {
                        continue;
                    }
                    let known = self.known_artists.contains(&key);
                    if !known && self.classifier.is_noise_line(&text) {
                        debug!(segment = %text, "dropping noise segment");
                        continue;
                    }
                    if !seen.insert(key) {
                        continue;
                    }
                    let confidence = if known {
                        Confidence::High
                    } else if piece.heuristic {
                        Confidence::Low
                    } else {
                        Confidence::Unknown
                    };
                    candidates.push(Candidate { text, confidence });
                }
            }
        }

        debug!(count = candidates.len(), "segmented OCR text");
        candidates
    }

    fn is_known(&self, text: &str) -> bool {
        !self.known_artists.is_empty() && self.known_artists.contains(&normalize(text))
    }
}

/// Convenience for one-off use with the default poster rules.
pub fn segment(raw: &str) -> Vec<Candidate> {
    Segmenter::default().segment(raw)
}
