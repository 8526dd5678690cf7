use thiserror::Error;

use crate::codec::CodecError;

/// System-level failures. Expected rejections (duplicate votes, malformed
/// ballots) are reported through `CastOutcome` instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("election {election_id} is unavailable: {reason}")]
    ConfigUnavailable { election_id: String, reason: String },

    #[error("invalid election configuration: {0}")]
    InvalidElection(String),

    #[error("election {0} can no longer be modified, voting has started")]
    ElectionLocked(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("ballot encoding error: {0}")]
    Codec(#[from] CodecError),

    #[error("configuration error in {var}: {reason}")]
    Config { var: String, reason: String },
}

impl EngineError {
    pub fn config(var: &str, reason: impl Into<String>) -> Self {
        EngineError::Config {
            var: var.to_string(),
            reason: reason.into(),
        }
    }
}

/// A single reason a submitted ballot fails its scheme's rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("invalid scheme")]
    InvalidScheme,

    #[error("ballot scheme {submitted} does not match election scheme {expected}")]
    SchemeMismatch { submitted: String, expected: String },

    #[error("no candidate selected")]
    NoCandidate,

    #[error("unknown candidate {0}")]
    UnknownCandidate(String),

    #[error("ballot is empty")]
    EmptyBallot,

    #[error("{given} rankings exceed the maximum of {max}")]
    TooManyRankings { given: usize, max: usize },

    #[error("rank {0} is used more than once")]
    DuplicateRank(i32),

    #[error("candidate {0} appears more than once")]
    DuplicateCandidate(String),

    #[error("ranks must run from 1 to {expected} without gaps")]
    NonSequentialRanks { expected: usize },

    #[error("negative credits ({credits}) for candidate {candidate_id}")]
    NegativeCredits { candidate_id: String, credits: i64 },

    #[error("{spent} credits exceed the budget of {budget}")]
    CreditBudgetExceeded { spent: i64, budget: u64 },
}

impl Violation {
    /// Violations caused by a mismatch with the election's configuration
    /// rather than by the ballot's own structure.
    pub fn is_configuration_mismatch(&self) -> bool {
        matches!(
            self,
            Violation::InvalidScheme
                | Violation::SchemeMismatch { .. }
                | Violation::UnknownCandidate(_)
        )
    }
}
