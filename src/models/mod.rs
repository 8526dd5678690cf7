use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Election {
    pub id: String,
    pub title: String,
    pub scheme: Scheme,
    pub candidates: Vec<Candidate>,
    pub max_rankings: Option<u32>,
    pub credit_budget: Option<u64>,
    pub estimated_eligible_voters: u64,
    pub registration_start: DateTime<Utc>,
    pub registration_end: DateTime<Utc>,
    pub voting_start: DateTime<Utc>,
    pub voting_end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    SingleChoice,
    RankedChoice,
    Quadratic,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::SingleChoice => "single_choice",
            Scheme::RankedChoice => "ranked_choice",
            Scheme::Quadratic => "quadratic",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_choice" => Ok(Scheme::SingleChoice),
            "ranked_choice" => Ok(Scheme::RankedChoice),
            "quadratic" => Ok(Scheme::Quadratic),
            other => Err(format!("Unknown scheme: {}", other)),
        }
    }
}

/// Voting window boundaries, kept together so constructors stay readable.
#[derive(Debug, Clone, Copy)]
pub struct Lifecycle {
    pub registration_start: DateTime<Utc>,
    pub registration_end: DateTime<Utc>,
    pub voting_start: DateTime<Utc>,
    pub voting_end: DateTime<Utc>,
}

impl Election {
    pub fn new(
        title: String,
        scheme: Scheme,
        candidate_names: Vec<String>,
        estimated_eligible_voters: u64,
        lifecycle: Lifecycle,
    ) -> Self {
        let candidates = candidate_names
            .into_iter()
            .map(|name| Candidate {
                id: Uuid::new_v4().to_string(),
                name,
            })
            .collect();

        Self {
            id: Uuid::new_v4().to_string(),
            title,
            scheme,
            candidates,
            max_rankings: None,
            credit_budget: None,
            estimated_eligible_voters,
            registration_start: lifecycle.registration_start,
            registration_end: lifecycle.registration_end,
            voting_start: lifecycle.voting_start,
            voting_end: lifecycle.voting_end,
        }
    }

    pub fn with_max_rankings(mut self, max_rankings: u32) -> Self {
        self.max_rankings = Some(max_rankings);
        self
    }

    pub fn with_credit_budget(mut self, credit_budget: u64) -> Self {
        self.credit_budget = Some(credit_budget);
        self
    }

    pub fn candidate(&self, candidate_id: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == candidate_id)
    }

    pub fn has_candidate(&self, candidate_id: &str) -> bool {
        self.candidate(candidate_id).is_some()
    }

    pub fn is_voting_open(&self, now: DateTime<Utc>) -> bool {
        now >= self.voting_start && now < self.voting_end
    }

    /// Ranked ballots may list at most this many candidates.
    pub fn ranking_limit(&self) -> usize {
        self.max_rankings
            .map(|m| m as usize)
            .unwrap_or(self.candidates.len())
    }

    /// Checks lifecycle ordering and per-scheme settings.
    pub fn check_config(&self) -> Result<(), EngineError> {
        if self.registration_end < self.registration_start {
            return Err(EngineError::InvalidElection(
                "registration must end after it starts".to_string(),
            ));
        }
        if self.voting_start <= self.registration_end {
            return Err(EngineError::InvalidElection(
                "voting must start after registration ends".to_string(),
            ));
        }
        if self.voting_end <= self.voting_start {
            return Err(EngineError::InvalidElection(
                "voting must end after it starts".to_string(),
            ));
        }
        if self.candidates.is_empty() {
            return Err(EngineError::InvalidElection(
                "at least one candidate is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for candidate in &self.candidates {
            if !seen.insert(candidate.id.as_str()) {
                return Err(EngineError::InvalidElection(format!(
                    "duplicate candidate id {}",
                    candidate.id
                )));
            }
        }

        match self.scheme {
            Scheme::RankedChoice if self.max_rankings == Some(0) => Err(
                EngineError::InvalidElection("max_rankings must be at least 1".to_string()),
            ),
            Scheme::Quadratic if self.credit_budget.is_none() => Err(
                EngineError::InvalidElection("quadratic elections need a credit budget".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

/// Scheme-specific ballot contents. The tag doubles as the scheme name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum BallotPayload {
    SingleChoice { candidate_id: String },
    RankedChoice { rankings: Vec<Ranking> },
    Quadratic { allocations: Vec<CreditAllocation> },
}

impl BallotPayload {
    pub fn scheme(&self) -> Scheme {
        match self {
            BallotPayload::SingleChoice { .. } => Scheme::SingleChoice,
            BallotPayload::RankedChoice { .. } => Scheme::RankedChoice,
            BallotPayload::Quadratic { .. } => Scheme::Quadratic,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ranking {
    pub candidate_id: String,
    pub rank: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreditAllocation {
    pub candidate_id: String,
    pub credits: i64,
}

/// Voter attributes captured when the ballot is accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VoterCohort {
    pub department: Option<String>,
    pub cohort_year: Option<i32>,
}

/// An accepted ballot as persisted. The payload stays encoded until tally time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredBallot {
    pub id: String,
    pub election_id: String,
    pub nullifier: String,
    pub encoded_payload: String,
    pub vote_hash: String,
    pub cohort: VoterCohort,
    pub accepted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TallyResult {
    pub candidate_id: String,
    pub raw_score: u64,
    pub percentage: f64,
}

/// Rounds to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `part / whole * 100` rounded to two places, `0` when `whole` is zero.
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round2(part as f64 / whole as f64 * 100.0)
    }
}
