use crate::models::BallotPayload;
use crate::voting::{credit, Counted, IntegrityWarning, Scores};

/// One point per ballot for the chosen candidate. Returns the number of
/// ballots that scored.
pub fn count(ballots: &[Counted<'_>], scores: &mut Scores, warnings: &mut Vec<IntegrityWarning>) -> usize {
    let mut counted = 0;
    for ballot in ballots {
        if let BallotPayload::SingleChoice { candidate_id } = &ballot.payload {
            if credit(scores, warnings, ballot.ballot_id, candidate_id, 1) {
                counted += 1;
            }
        }
    }
    counted
}
