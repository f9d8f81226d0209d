//! Query-time matching: embed, retrieve, re-rank.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument};

use petmatch_core::{
    defaults, env_or, Candidate, CandidateIndex, EmbeddingBackend, Error, ImageBlob, MatchPolicy,
    PetAttributes, Result, ScoredCandidate, SearchMode,
};

use crate::scoring::{rank, QuerySignals};

/// Configuration of the matching engine.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub policy: MatchPolicy,
    /// Deadline of the query embedding call.
    pub embed_timeout: Duration,
    /// Deadline of the candidate index query.
    pub index_timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            policy: MatchPolicy::default(),
            embed_timeout: Duration::from_secs(defaults::EMBED_TIMEOUT_SECS),
            index_timeout: Duration::from_secs(defaults::INDEX_QUERY_TIMEOUT_SECS),
        }
    }
}

impl SearchConfig {
    /// Load the policy (`MATCH_*`) and the call deadlines
    /// (`EMBED_TIMEOUT_SECS`, `INDEX_QUERY_TIMEOUT_SECS`).
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            policy: MatchPolicy::from_env()?,
            embed_timeout: Duration::from_secs(env_or(
                "EMBED_TIMEOUT_SECS",
                defaults::EMBED_TIMEOUT_SECS,
            )),
            index_timeout: Duration::from_secs(env_or(
                "INDEX_QUERY_TIMEOUT_SECS",
                defaults::INDEX_QUERY_TIMEOUT_SECS,
            )),
        })
    }

    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    pub fn with_index_timeout(mut self, timeout: Duration) -> Self {
        self.index_timeout = timeout;
        self
    }
}

/// Photo search over the opposite population (lost vs found).
#[derive(Clone)]
pub struct MatchEngine {
    embedder: Arc<dyn EmbeddingBackend>,
    index: Arc<dyn CandidateIndex>,
    config: SearchConfig,
}

impl MatchEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingBackend>,
        index: Arc<dyn CandidateIndex>,
        config: SearchConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn policy(&self) -> &MatchPolicy {
        &self.config.policy
    }

    /// Ranked matches for a query photo.
    ///
    /// Embedding or index failures are fatal and typed. An empty index
    /// result is an empty list, not an error.
    #[instrument(skip(self, query_image, attributes), fields(subsystem = "search", component = "match_engine", op = "search", mode = ?mode))]
    pub async fn search(
        &self,
        query_image: &ImageBlob,
        mode: SearchMode,
        attributes: Option<&PetAttributes>,
    ) -> Result<Vec<ScoredCandidate>> {
        let start = Instant::now();
        let policy = &self.config.policy;

        let query = tokio::time::timeout(
            self.config.embed_timeout,
            self.embedder.embed_image(query_image),
        )
        .await
        .map_err(|_| {
            Error::EmbeddingFailed(format!(
                "query embedding timed out after {}ms",
                self.config.embed_timeout.as_millis()
            ))
        })?
        .map_err(|e| {
            error!(error = %e, "Query embedding failed");
            match e {
                Error::EmbeddingFailed(_) => e,
                other => Error::EmbeddingFailed(other.to_string()),
            }
        })?;

        let candidates = self
            .retrieve(&query.vector, mode, policy.search_floor)
            .await?;
        let candidate_count = candidates.len();
        if candidates.is_empty() {
            info!(
                result_count = 0,
                duration_ms = start.elapsed().as_millis() as u64,
                "No candidates above similarity floor"
            );
            return Ok(Vec::new());
        }

        let colors = (!query.colors.is_empty()).then_some(&query.colors);
        let attributes = attributes.filter(|a| !a.is_empty());
        let ranked = self.rank(candidates, QuerySignals { colors, attributes });

        info!(
            candidate_count,
            result_count = ranked.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Search complete"
        );
        Ok(ranked)
    }

    /// Pure re-ranking of already retrieved candidates.
    pub fn rank(&self, candidates: Vec<Candidate>, query: QuerySignals<'_>) -> Vec<ScoredCandidate> {
        rank(candidates, query, &self.config.policy)
    }

    async fn retrieve(
        &self,
        vector: &[f32],
        mode: SearchMode,
        floor: f32,
    ) -> Result<Vec<Candidate>> {
        let status = mode.target_status();
        let limit = self.config.policy.candidate_limit;
        debug!(status = %status, floor, limit, "Querying candidate index");

        tokio::time::timeout(
            self.config.index_timeout,
            self.index.query(vector, status, floor, limit),
        )
        .await
        .map_err(|_| {
            Error::IndexQueryFailed(format!(
                "index query timed out after {}ms",
                self.config.index_timeout.as_millis()
            ))
        })?
        .map_err(|e| {
            error!(error = %e, "Candidate index query failed");
            match e {
                Error::IndexQueryFailed(_) => e,
                other => Error::IndexQueryFailed(other.to_string()),
            }
        })
    }
}
