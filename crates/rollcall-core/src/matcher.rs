//! Identity matching against the encoding store.
//!
//! Two strategies are supported. Majority vote replicates the classic
//! compare-all-then-vote approach: every stored encoding within the
//! distance tolerance casts a vote for its name, and the plurality wins.
//! Nearest picks the single arg-min distance instead. The two disagree
//! when a person has several dissimilar reference images, so the choice
//! is explicit configuration, not an accident.

use crate::encodings::EncodingData;
use crate::types::Embedding;
use std::collections::HashMap;

/// How a probe embedding is resolved to a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchStrategy {
    /// Plurality vote among all stored encodings within tolerance.
    #[default]
    MajorityVote,
    /// Single nearest stored encoding, if within tolerance.
    Nearest,
}

impl MatchStrategy {
    /// Parse from a config string; unknown values fall back to majority vote.
    pub fn parse(s: &str) -> MatchStrategy {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest" => MatchStrategy::Nearest,
            _ => MatchStrategy::MajorityVote,
        }
    }
}

/// Result of matching a probe against the encoding store.
#[derive(Debug, Clone)]
pub struct Identification {
    /// Matched person name, or `None` for an unknown face.
    pub name: Option<String>,
    /// Best (smallest) distance to any encoding of the matched person,
    /// or to any encoding at all when nothing matched.
    pub distance: f32,
    /// Number of stored encodings that voted for the winner (1 for
    /// the nearest strategy).
    pub votes: usize,
}

impl Identification {
    fn unknown(distance: f32) -> Identification {
        Identification { name: None, distance, votes: 0 }
    }
}

/// Match a probe embedding against the full store.
///
/// Every stored encoding is consulted regardless of strategy; an empty
/// store always yields an unknown identification.
pub fn identify(
    probe: &Embedding,
    data: &EncodingData,
    tolerance: f32,
    strategy: MatchStrategy,
) -> Identification {
    let mut best_overall = f32::INFINITY;
    // name -> (vote count, best distance for that name)
    let mut candidates: HashMap<&str, (usize, f32)> = HashMap::new();

    for (encoding, name) in data.encodings.iter().zip(data.names.iter()) {
        let dist = probe.euclidean_distance(encoding);
        if dist < best_overall {
            best_overall = dist;
        }
        if dist <= tolerance {
            let entry = candidates.entry(name.as_str()).or_insert((0, f32::INFINITY));
            entry.0 += 1;
            if dist < entry.1 {
                entry.1 = dist;
            }
        }
    }

    if candidates.is_empty() {
        let dist = if best_overall.is_finite() { best_overall } else { 0.0 };
        return Identification::unknown(dist);
    }

    let winner = match strategy {
        MatchStrategy::MajorityVote => {
            // Plurality of votes; ties break toward the smaller best distance.
            candidates
                .iter()
                .max_by(|(_, (va, da)), (_, (vb, db))| {
                    va.cmp(vb).then_with(|| {
                        db.partial_cmp(da).unwrap_or(std::cmp::Ordering::Equal)
                    })
                })
                .map(|(name, (votes, dist))| (name.to_string(), *votes, *dist))
        }
        MatchStrategy::Nearest => candidates
            .iter()
            .min_by(|(_, (_, da)), (_, (_, db))| {
                da.partial_cmp(db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(name, (_, dist))| (name.to_string(), 1, *dist)),
    };

    match winner {
        Some((name, votes, distance)) => Identification {
            name: Some(name),
            distance,
            votes,
        },
        None => Identification::unknown(best_overall),
    }
}
