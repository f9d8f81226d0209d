//! Scoring policy: weights and thresholds of the matching engine.
//!
//! Kept apart from the scoring math so the numbers can be tuned per
//! deployment without touching the ranking code.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};

/// Allowed deviation of the weight sum from 1.0.
const WEIGHT_SUM_EPSILON: f32 = 0.001;

/// Read and parse an environment variable, falling back to `default` when it
/// is unset or unparseable.
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Weights of the three signals in the combined score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub embedding: f32,
    pub color: f32,
    pub feature: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            embedding: defaults::WEIGHT_EMBEDDING,
            color: defaults::WEIGHT_COLOR,
            feature: defaults::WEIGHT_FEATURE,
        }
    }
}

impl ScoreWeights {
    pub fn new(embedding: f32, color: f32, feature: f32) -> Result<Self> {
        let weights = Self {
            embedding,
            color,
            feature,
        };
        weights.validate()?;
        Ok(weights)
    }

    /// Weighted sum of the sub-scores, clamped to [0, 1].
    pub fn combine(&self, embedding: f32, color: f32, feature: f32) -> f32 {
        (self.embedding * embedding + self.color * color + self.feature * feature).clamp(0.0, 1.0)
    }

    pub fn validate(&self) -> Result<()> {
        let parts = [self.embedding, self.color, self.feature];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::Config(format!(
                "score weights must be non-negative: {:?}",
                self
            )));
        }
        let sum: f32 = parts.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(Error::Config(format!(
                "score weights must sum to 1.0, got {:.4}",
                sum
            )));
        }
        Ok(())
    }
}

/// Thresholds, caps and weights of the matching engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchPolicy {
    pub weights: ScoreWeights,
    /// Similarity floor for the index query and the post-rank re-check.
    pub search_floor: f32,
    /// Minimum combined score of a returned match.
    pub accept_floor: f32,
    /// Raw similarity needed to notify the owner of a lost pet.
    pub notify_threshold: f32,
    /// Candidates fetched from the index per search.
    pub candidate_limit: i64,
    /// Ranked results returned per search.
    pub result_limit: usize,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            search_floor: defaults::SEARCH_SIMILARITY_FLOOR,
            accept_floor: defaults::ACCEPT_FLOOR,
            notify_threshold: defaults::NOTIFY_THRESHOLD,
            candidate_limit: defaults::CANDIDATE_LIMIT,
            result_limit: defaults::RESULT_LIMIT,
        }
    }
}

impl MatchPolicy {
    /// Load the policy from `MATCH_*` environment variables and validate it.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `MATCH_WEIGHT_EMBEDDING` | 0.4 |
    /// | `MATCH_WEIGHT_COLOR` | 0.3 |
    /// | `MATCH_WEIGHT_FEATURE` | 0.3 |
    /// | `MATCH_SEARCH_FLOOR` | 0.4 |
    /// | `MATCH_ACCEPT_FLOOR` | 0.5 |
    /// | `MATCH_NOTIFY_THRESHOLD` | 0.85 |
    /// | `MATCH_CANDIDATE_LIMIT` | 50 |
    /// | `MATCH_RESULT_LIMIT` | 20 |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the policy from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn read<T: FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
            default: T,
        ) -> Result<T> {
            match lookup(key) {
                None => Ok(default),
                Some(raw) => raw
                    .trim()
                    .parse::<T>()
                    .map_err(|_| Error::Config(format!("{} has an invalid value: {}", key, raw))),
            }
        }

        let d = Self::default();
        let policy = Self {
            weights: ScoreWeights {
                embedding: read(&lookup, "MATCH_WEIGHT_EMBEDDING", d.weights.embedding)?,
                color: read(&lookup, "MATCH_WEIGHT_COLOR", d.weights.color)?,
                feature: read(&lookup, "MATCH_WEIGHT_FEATURE", d.weights.feature)?,
            },
            search_floor: read(&lookup, "MATCH_SEARCH_FLOOR", d.search_floor)?,
            accept_floor: read(&lookup, "MATCH_ACCEPT_FLOOR", d.accept_floor)?,
            notify_threshold: read(&lookup, "MATCH_NOTIFY_THRESHOLD", d.notify_threshold)?,
            candidate_limit: read(&lookup, "MATCH_CANDIDATE_LIMIT", d.candidate_limit)?,
            result_limit: read(&lookup, "MATCH_RESULT_LIMIT", d.result_limit)?,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_search_floor(mut self, floor: f32) -> Self {
        self.search_floor = floor;
        self
    }

    pub fn with_accept_floor(mut self, floor: f32) -> Self {
        self.accept_floor = floor;
        self
    }

    pub fn with_notify_threshold(mut self, threshold: f32) -> Self {
        self.notify_threshold = threshold;
        self
    }

    pub fn with_result_limit(mut self, limit: usize) -> Self {
        self.result_limit = limit;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.weights.validate()?;
        for (name, value) in [
            ("search_floor", self.search_floor),
            ("accept_floor", self.accept_floor),
            ("notify_threshold", self.notify_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.candidate_limit < 1 || self.result_limit < 1 {
            return Err(Error::Config(
                "candidate and result limits must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
