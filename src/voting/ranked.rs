use crate::models::BallotPayload;
use crate::voting::{credit, Counted, IntegrityWarning, Scores};

/// First-preference count: each ballot's rank-1 candidate scores one point.
/// Later preferences are kept on the ballot but not used; there are no
/// elimination rounds.
///
/// A ballot whose first preference names an unknown candidate is flagged and
/// not counted; one without a first preference counts but scores nothing.
pub fn count(ballots: &[Counted<'_>], scores: &mut Scores, warnings: &mut Vec<IntegrityWarning>) -> usize {
    let mut counted = 0;
    for ballot in ballots {
        if let BallotPayload::RankedChoice { rankings } = &ballot.payload {
            let scored = match rankings.iter().find(|r| r.rank == 1) {
                Some(first) => credit(scores, warnings, ballot.ballot_id, &first.candidate_id, 1),
                None => true,
            };
            if scored {
                counted += 1;
            }
        }
    }
    counted
}

#[cfg(test)]
mod tests {
    use crate::codec::HexJsonCodec;
    use crate::models::fixtures::election;
    use crate::models::{BallotPayload, Ranking, Scheme};
    use crate::voting::tally;
    use crate::voting::test_support::stored;

    fn ranking(pairs: &[(&str, i32)]) -> BallotPayload {
        BallotPayload::RankedChoice {
            rankings: pairs
                .iter()
                .map(|(id, rank)| Ranking {
                    candidate_id: id.to_string(),
                    rank: *rank,
                })
                .collect(),
        }
    }

    #[test]
    fn only_first_preferences_count() {
        let e = election(Scheme::RankedChoice, &["A", "B", "C"]);
        let (a, b, c) = (
            e.candidates[0].id.clone(),
            e.candidates[1].id.clone(),
            e.candidates[2].id.clone(),
        );
        let ballots = vec![
            stored(&e, &ranking(&[(&b, 2), (&a, 1)])),
            stored(&e, &ranking(&[(&b, 1), (&c, 2), (&a, 3)])),
            stored(&e, &ranking(&[(&a, 1), (&c, 2)])),
        ];

        let outcome = tally(&e, &ballots, &HexJsonCodec);
        assert_eq!(outcome.results[0].candidate_id, a);
        assert_eq!(outcome.results[0].raw_score, 2);
        assert_eq!(outcome.results[1].candidate_id, b);
        assert_eq!(outcome.results[1].raw_score, 1);
        // C has second preferences only
        assert_eq!(outcome.results[2].candidate_id, c);
        assert_eq!(outcome.results[2].raw_score, 0);
    }

    #[test]
    fn ballots_without_rank_one_add_nothing() {
        let e = election(Scheme::RankedChoice, &["A", "B"]);
        let a = e.candidates[0].id.clone();
        let ballots = vec![
            stored(&e, &ranking(&[(&a, 1)])),
            stored(&e, &ranking(&[(&a, 2)])),
        ];
        let outcome = tally(&e, &ballots, &HexJsonCodec);
        let total: u64 = outcome.results.iter().map(|r| r.raw_score).sum();
        assert_eq!(total, 1);
        assert_eq!(outcome.counted_ballots, 2);
    }

    #[test]
    fn unknown_first_preference_is_flagged_not_counted() {
        let e = election(Scheme::RankedChoice, &["A", "B"]);
        let a = e.candidates[0].id.clone();
        let ballots = vec![
            stored(&e, &ranking(&[("gone", 1), (&a, 2)])),
            stored(&e, &ranking(&[(&a, 1)])),
        ];
        let outcome = tally(&e, &ballots, &HexJsonCodec);
        assert_eq!(outcome.counted_ballots, 1);
        assert_eq!(outcome.integrity_warnings.len(), 1);
        assert_eq!(outcome.results[0].raw_score, 1);
    }
}
