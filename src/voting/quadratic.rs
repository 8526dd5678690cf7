use crate::models::BallotPayload;
use crate::validation::quadratic_weight;
use crate::voting::{credit, Counted, IntegrityWarning, Scores};

/// Adds `floor(sqrt(credits))` per allocation. Percentages are later taken
/// against the summed weights, not the ballot count.
///
/// A ballot is left out of the count only when every spending entry on it
/// named an unknown candidate.
pub fn count(ballots: &[Counted<'_>], scores: &mut Scores, warnings: &mut Vec<IntegrityWarning>) -> usize {
    let mut counted = 0;
    for ballot in ballots {
        if let BallotPayload::Quadratic { allocations } = &ballot.payload {
            let mut credited = false;
            let mut flagged = false;
            for allocation in allocations.iter().filter(|a| a.credits > 0) {
                let weight = quadratic_weight(allocation.credits);
                if credit(scores, warnings, ballot.ballot_id, &allocation.candidate_id, weight) {
                    credited = true;
                } else {
                    flagged = true;
                }
            }
            if credited || !flagged {
                counted += 1;
            }
        }
    }
    counted
}
