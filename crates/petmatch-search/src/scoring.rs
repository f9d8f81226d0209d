//! Signal fusion and ranking of retrieved candidates.

use tracing::trace;

use petmatch_core::{
    Candidate, ColorSignature, MatchPolicy, MatchScores, PetAttributes, ScoredCandidate,
};

use crate::color::color_score;
use crate::features::feature_score;

/// What a candidate is compared against.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuerySignals<'a> {
    pub colors: Option<&'a ColorSignature>,
    pub attributes: Option<&'a PetAttributes>,
}

/// Score one candidate. Every component and the combined score are in [0, 1].
pub fn score_candidate(
    candidate: &Candidate,
    query: QuerySignals<'_>,
    policy: &MatchPolicy,
) -> MatchScores {
    let embedding = candidate.similarity.clamp(0.0, 1.0);
    let color = color_score(query.colors, candidate.record.colors.as_ref());
    let feature = feature_score(query.attributes, &candidate.record.attributes);
    let combined = policy.weights.combine(embedding, color, feature);

    trace!(
        record_id = %candidate.record.id,
        embedding,
        color,
        feature,
        combined,
        "Scored candidate"
    );

    MatchScores {
        embedding,
        color,
        feature,
        combined,
    }
}

/// Re-rank retrieved candidates.
///
/// Drops candidates below the acceptance floor on the combined score or
/// below the retrieval floor on raw similarity, sorts by combined score
/// descending (ties keep retrieval order) and truncates to the result cap.
pub fn rank(
    candidates: Vec<Candidate>,
    query: QuerySignals<'_>,
    policy: &MatchPolicy,
) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .into_iter()
        .filter(|c| c.similarity >= policy.search_floor)
        .map(|c| {
            let scores = score_candidate(&c, query, policy);
            ScoredCandidate {
                record: c.record,
                scores,
            }
        })
        .filter(|s| s.scores.combined >= policy.accept_floor)
        .collect();

    // Vec::sort_by is stable.
    scored.sort_by(|a, b| b.scores.combined.total_cmp(&a.scores.combined));
    scored.truncate(policy.result_limit);
    scored
}
