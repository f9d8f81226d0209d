//! Dominant-colour similarity.

use petmatch_core::defaults::{MAX_RGB_DISTANCE, NEUTRAL_SCORE};
use petmatch_core::ColorSignature;

/// Similarity of two colour signatures in [0, 1].
///
/// For every query colour, the closest candidate colour (Euclidean RGB
/// distance) contributes `max(0, 1 - d / MAX_RGB_DISTANCE)` weighted by the
/// query colour's area fraction. Missing or empty signatures on either side
/// score [`NEUTRAL_SCORE`].
pub fn color_score(query: Option<&ColorSignature>, candidate: Option<&ColorSignature>) -> f32 {
    let (query, candidate) = match (query, candidate) {
        (Some(q), Some(c)) if !q.is_empty() && !c.is_empty() => (q, c),
        _ => return NEUTRAL_SCORE,
    };

    let total: f32 = query
        .iter()
        .map(|(color, weight)| {
            let closest = candidate
                .colors()
                .iter()
                .map(|other| color.distance(other))
                .fold(f32::INFINITY, f32::min);
            (1.0 - closest / MAX_RGB_DISTANCE).max(0.0) * weight
        })
        .sum();

    total.clamp(0.0, 1.0)
}
