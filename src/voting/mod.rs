pub mod quadratic;
pub mod ranked;
pub mod single_choice;

use crate::codec::BallotCodec;
use crate::models::{percentage, BallotPayload, Election, Scheme, StoredBallot, TallyResult};
use log::warn;
use serde::Serialize;
use std::collections::HashMap;

// Per-candidate scores for one election, keyed by candidate id
pub type Scores = HashMap<String, u64>;

/// Why a stored ballot was left out of the count.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IntegrityIssue {
    DecodeFailure(String),
    SchemeMismatch { found: Scheme },
    UnknownCandidate(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityWarning {
    pub ballot_id: String,
    pub issue: IntegrityIssue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TallyOutcome {
    pub results: Vec<TallyResult>,
    pub counted_ballots: usize,
    pub integrity_warnings: Vec<IntegrityWarning>,
}

/// Decoded ballot ready for counting.
pub struct Counted<'a> {
    pub ballot_id: &'a str,
    pub payload: BallotPayload,
}

/// Tallies every ballot for one election.
///
/// Undecodable ballots, and ballots for another scheme, are skipped and
/// reported as integrity warnings; they never abort the tally.
pub fn tally(election: &Election, ballots: &[StoredBallot], codec: &dyn BallotCodec) -> TallyOutcome {
    let mut warnings = Vec::new();
    let mut decoded = Vec::with_capacity(ballots.len());

    for ballot in ballots {
        match codec.decode(&ballot.encoded_payload) {
            Ok(payload) if payload.scheme() == election.scheme => decoded.push(Counted {
                ballot_id: &ballot.id,
                payload,
            }),
            Ok(payload) => {
                warn!("Ballot {} in election {} has scheme {}", ballot.id, election.id, payload.scheme());
                warnings.push(IntegrityWarning {
                    ballot_id: ballot.id.clone(),
                    issue: IntegrityIssue::SchemeMismatch {
                        found: payload.scheme(),
                    },
                });
            }
            Err(e) => {
                warn!("Skipping undecodable ballot {} in election {}: {}", ballot.id, election.id, e);
                warnings.push(IntegrityWarning {
                    ballot_id: ballot.id.clone(),
                    issue: IntegrityIssue::DecodeFailure(e.to_string()),
                });
            }
        }
    }

    let mut scores: Scores = election.candidates.iter().map(|c| (c.id.clone(), 0)).collect();

    // The one place that branches on scheme
    let counted_ballots = match election.scheme {
        Scheme::SingleChoice => single_choice::count(&decoded, &mut scores, &mut warnings),
        Scheme::RankedChoice => ranked::count(&decoded, &mut scores, &mut warnings),
        Scheme::Quadratic => quadratic::count(&decoded, &mut scores, &mut warnings),
    };

    TallyOutcome {
        results: rank_results(election, &scores),
        counted_ballots,
        integrity_warnings: warnings,
    }
}

/// Adds `amount` to a configured candidate, or records a warning for a
/// candidate the election doesn't know. Returns whether the candidate was credited.
pub(crate) fn credit(
    scores: &mut Scores,
    warnings: &mut Vec<IntegrityWarning>,
    ballot_id: &str,
    candidate_id: &str,
    amount: u64,
) -> bool {
    match scores.get_mut(candidate_id) {
        Some(score) => {
            *score += amount;
            true
        }
        None => {
            warnings.push(IntegrityWarning {
                ballot_id: ballot_id.to_string(),
                issue: IntegrityIssue::UnknownCandidate(candidate_id.to_string()),
            });
            false
        }
    }
}

/// Every configured candidate, highest score first. Ties keep the election's
/// candidate order.
fn rank_results(election: &Election, scores: &Scores) -> Vec<TallyResult> {
    let total: u64 = scores.values().sum();

    let mut results: Vec<TallyResult> = election
        .candidates
        .iter()
        .map(|c| {
            let raw_score = scores.get(&c.id).copied().unwrap_or(0);
            TallyResult {
                candidate_id: c.id.clone(),
                raw_score,
                percentage: percentage(raw_score, total),
            }
        })
        .collect();

    // sort_by is stable
    results.sort_by(|a, b| b.raw_score.cmp(&a.raw_score));
    results
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::codec::HexJsonCodec;
    use crate::models::VoterCohort;
    use chrono::Utc;

    pub fn stored(election: &Election, payload: &BallotPayload) -> StoredBallot {
        StoredBallot {
            id: uuid::Uuid::new_v4().to_string(),
            election_id: election.id.clone(),
            nullifier: uuid::Uuid::new_v4().to_string(),
            encoded_payload: HexJsonCodec.encode(payload).unwrap(),
            vote_hash: String::new(),
            cohort: VoterCohort::default(),
            accepted_at: Utc::now(),
        }
    }

    pub fn single(election: &Election, candidate_id: &str) -> StoredBallot {
        stored(
            election,
            &BallotPayload::SingleChoice {
                candidate_id: candidate_id.to_string(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::codec::HexJsonCodec;
    use crate::models::fixtures::election;

    #[test]
    fn every_candidate_appears_even_without_votes() {
        let e = election(Scheme::SingleChoice, &["A", "B", "C"]);
        let outcome = tally(&e, &[], &HexJsonCodec);
        assert_eq!(outcome.results.len(), 3);
        assert!(outcome.results.iter().all(|r| r.raw_score == 0 && r.percentage == 0.0));
        // Ties keep configured order
        let ids: Vec<_> = outcome.results.iter().map(|r| r.candidate_id.clone()).collect();
        let expected: Vec<_> = e.candidates.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn undecodable_ballots_are_skipped_with_warning() {
        let e = election(Scheme::SingleChoice, &["A", "B"]);
        let a = e.candidates[0].id.clone();
        let mut broken = single(&e, &a);
        broken.encoded_payload = "legacy:not-hex".to_string();

        let outcome = tally(&e, &[single(&e, &a), broken.clone()], &HexJsonCodec);
        assert_eq!(outcome.counted_ballots, 1);
        assert_eq!(outcome.results[0].raw_score, 1);
        assert_eq!(outcome.integrity_warnings.len(), 1);
        assert_eq!(outcome.integrity_warnings[0].ballot_id, broken.id);
        assert!(matches!(
            outcome.integrity_warnings[0].issue,
            IntegrityIssue::DecodeFailure(_)
        ));
    }

    #[test]
    fn ballots_for_other_schemes_are_skipped() {
        let e = election(Scheme::SingleChoice, &["A"]);
        let ranked = stored(
            &e,
            &BallotPayload::RankedChoice {
                rankings: Vec::new(),
            },
        );
        let outcome = tally(&e, &[ranked], &HexJsonCodec);
        assert_eq!(outcome.counted_ballots, 0);
        assert_eq!(
            outcome.integrity_warnings[0].issue,
            IntegrityIssue::SchemeMismatch {
                found: Scheme::RankedChoice
            }
        );
    }

    #[test]
    fn tally_is_idempotent() {
        let e = election(Scheme::SingleChoice, &["A", "B"]);
        let ballots = vec![single(&e, &e.candidates[1].id), single(&e, &e.candidates[0].id)];
        assert_eq!(tally(&e, &ballots, &HexJsonCodec), tally(&e, &ballots, &HexJsonCodec));
    }

    #[test]
    fn counted_and_flagged_ballots_never_overlap() {
        let e = election(Scheme::SingleChoice, &["A", "B"]);
        let mut broken = single(&e, &e.candidates[0].id);
        broken.encoded_payload = "zz".to_string();
        let ballots = vec![
            single(&e, &e.candidates[0].id),
            single(&e, "withdrawn"),
            broken,
            single(&e, &e.candidates[1].id),
        ];

        let outcome = tally(&e, &ballots, &HexJsonCodec);
        assert_eq!(outcome.counted_ballots, 2);
        assert_eq!(outcome.counted_ballots + outcome.integrity_warnings.len(), ballots.len());
        let total: u64 = outcome.results.iter().map(|r| r.raw_score).sum();
        assert_eq!(total as usize, outcome.counted_ballots);
    }

    #[test]
    fn percentages_sum_to_one_hundred() {
        let e = election(Scheme::SingleChoice, &["A", "B", "C"]);
        let ballots: Vec<_> = [0, 1, 2, 2, 1, 2, 0]
            .iter()
            .map(|&i| single(&e, &e.candidates[i].id))
            .collect();
        let outcome = tally(&e, &ballots, &HexJsonCodec);
        let sum: f64 = outcome.results.iter().map(|r| r.percentage).sum();
        assert!((sum - 100.0).abs() <= 0.01 * 3.0);
    }
}
