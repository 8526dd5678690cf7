use crate::error::Violation;
use crate::models::{BallotPayload, CreditAllocation, Election, Ranking, Scheme};
use std::collections::HashSet;

/// Checks a submitted ballot against the election's rules.
///
/// Every problem found is returned; an empty list means the ballot is valid.
/// `scheme` is the scheme name the submitter claims, which must parse and
/// agree with both the election and the payload.
pub fn validate(scheme: &str, payload: &BallotPayload, election: &Election) -> Vec<Violation> {
    let scheme = match scheme.parse::<Scheme>() {
        Ok(s) => s,
        Err(_) => return vec![Violation::InvalidScheme],
    };

    let mut violations = Vec::new();

    // One violation per field that disagrees with the election
    for submitted in [scheme, payload.scheme()] {
        if submitted != election.scheme && !violations.contains(&mismatch(submitted, election)) {
            violations.push(mismatch(submitted, election));
        }
    }
    if !violations.is_empty() {
        // Rules for a different scheme say nothing useful about this one
        return violations;
    }

    match payload {
        BallotPayload::SingleChoice { candidate_id } => {
            check_single_choice(candidate_id, election, &mut violations)
        }
        BallotPayload::RankedChoice { rankings } => {
            check_ranked_choice(rankings, election, &mut violations)
        }
        BallotPayload::Quadratic { allocations } => {
            check_quadratic(allocations, election, &mut violations)
        }
    }

    violations
}

fn mismatch(submitted: Scheme, election: &Election) -> Violation {
    Violation::SchemeMismatch {
        submitted: submitted.to_string(),
        expected: election.scheme.to_string(),
    }
}

/// Vote weight for a quadratic allocation: `floor(sqrt(credits))`.
pub fn quadratic_weight(credits: i64) -> u64 {
    if credits <= 0 {
        0
    } else {
        (credits as u64).isqrt()
    }
}

fn check_single_choice(candidate_id: &str, election: &Election, violations: &mut Vec<Violation>) {
    if candidate_id.is_empty() {
        violations.push(Violation::NoCandidate);
    } else if !election.has_candidate(candidate_id) {
        violations.push(Violation::UnknownCandidate(candidate_id.to_string()));
    }
}

fn check_ranked_choice(rankings: &[Ranking], election: &Election, violations: &mut Vec<Violation>) {
    if rankings.is_empty() {
        violations.push(Violation::EmptyBallot);
        return;
    }

    let max = election.ranking_limit();
    if rankings.len() > max {
        violations.push(Violation::TooManyRankings {
            given: rankings.len(),
            max,
        });
    }

    let mut seen_ranks = HashSet::new();
    let mut seen_candidates = HashSet::new();
    let mut has_duplicate_rank = false;

    for ranking in rankings {
        if !seen_ranks.insert(ranking.rank) {
            has_duplicate_rank = true;
            violations.push(Violation::DuplicateRank(ranking.rank));
        }
        if !seen_candidates.insert(ranking.candidate_id.as_str()) {
            violations.push(Violation::DuplicateCandidate(ranking.candidate_id.clone()));
        }
        if !election.has_candidate(&ranking.candidate_id) {
            violations.push(Violation::UnknownCandidate(ranking.candidate_id.clone()));
        }
    }

    // n distinct ranks all inside 1..=n is exactly the sequence 1..=n.
    // With duplicates the ranks can't be contiguous anyway, and the
    // duplicate is the more useful report.
    let expected = rankings.len();
    let in_range = rankings
        .iter()
        .all(|r| r.rank >= 1 && (r.rank as i64) <= expected as i64);
    if !has_duplicate_rank && !in_range {
        violations.push(Violation::NonSequentialRanks { expected });
    }
}

fn check_quadratic(
    allocations: &[CreditAllocation],
    election: &Election,
    violations: &mut Vec<Violation>,
) {
    if allocations.is_empty() {
        violations.push(Violation::EmptyBallot);
        return;
    }

    let mut seen_candidates = HashSet::new();
    let mut spent: i64 = 0;

    for allocation in allocations {
        if allocation.credits < 0 {
            violations.push(Violation::NegativeCredits {
                candidate_id: allocation.candidate_id.clone(),
                credits: allocation.credits,
            });
        } else {
            spent = spent.saturating_add(allocation.credits);
        }
        if !seen_candidates.insert(allocation.candidate_id.as_str()) {
            violations.push(Violation::DuplicateCandidate(allocation.candidate_id.clone()));
        }
        if !election.has_candidate(&allocation.candidate_id) {
            violations.push(Violation::UnknownCandidate(allocation.candidate_id.clone()));
        }
    }

    let budget = election.credit_budget.unwrap_or(0);
    if spent as u64 > budget {
        violations.push(Violation::CreditBudgetExceeded { spent, budget });
    }
}
