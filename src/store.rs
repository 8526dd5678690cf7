use async_trait::async_trait;

use crate::error::EngineError;
use crate::models::{Election, StoredBallot};

/// Result of an atomic insert keyed on `(election_id, nullifier)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// Durable ballot collection: insert-once, iterate-many.
#[async_trait]
pub trait BallotStore: Send + Sync {
    /// Inserts the ballot unless one with the same election and nullifier
    /// already exists. The check and the write must be one atomic step.
    async fn insert_if_absent(&self, ballot: &StoredBallot) -> Result<InsertOutcome, EngineError>;

    async fn list_by_election(&self, election_id: &str) -> Result<Vec<StoredBallot>, EngineError>;

    async fn contains_nullifier(
        &self,
        election_id: &str,
        nullifier: &str,
    ) -> Result<bool, EngineError>;
}

/// Read-only source of election configuration.
#[async_trait]
pub trait ElectionSource: Send + Sync {
    /// Fails with `EngineError::ConfigUnavailable` if the election can't be supplied.
    async fn get_election(&self, election_id: &str) -> Result<Election, EngineError>;
}
