//! Categorical feature agreement.

use petmatch_core::defaults::NEUTRAL_SCORE;
use petmatch_core::PetAttributes;

/// Case-insensitive substring containment in either direction.
///
/// "Orange tabby" matches "orange"; "short" matches "Short hair".
pub fn attribute_matches(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}

/// Fraction of comparable attributes that agree, in [0, 1].
///
/// An attribute is comparable when the query supplies it and the candidate
/// has a value for it. A species conflict zeroes the score outright. With
/// nothing comparable the score is [`NEUTRAL_SCORE`].
pub fn feature_score(query: Option<&PetAttributes>, candidate: &PetAttributes) -> f32 {
    let Some(query) = query else {
        return NEUTRAL_SCORE;
    };

    if let (Some(q), Some(c)) = (query.get("species"), candidate.get("species")) {
        if !attribute_matches(q, c) {
            return 0.0;
        }
    }

    let typed = PetAttributes::KNOWN
        .iter()
        .filter_map(|name| Some((query.get(name)?, candidate.get(name)?)));
    let extra = query
        .extra
        .keys()
        .filter_map(|key| Some((query.get_extra(key)?, candidate.get_extra(key)?)));

    let (compared, matched) = typed
        .chain(extra)
        .fold((0u32, 0u32), |(compared, matched), (q, c)| {
            (compared + 1, matched + attribute_matches(q, c) as u32)
        });

    if compared == 0 {
        NEUTRAL_SCORE
    } else {
        matched as f32 / compared as f32
    }
}
