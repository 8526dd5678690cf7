use sha2::{Digest, Sha256};

use crate::error::EngineError;
use crate::models::StoredBallot;
use crate::store::{BallotStore, InsertOutcome};

/// Outcome of registering a nullifier together with its ballot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Accepted,
    AlreadyVoted,
}

/// Derives per-voter, per-election fingerprints and enforces one ballot each.
#[derive(Clone)]
pub struct NullifierGuard {
    secret: String,
}

impl NullifierGuard {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Deterministic for a given secret, voter and election.
    pub fn nullifier(&self, voter_id: &str, election_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"trusty-tally/nullifier/v1");
        // Length prefixes keep ("ab","c") and ("a","bc") apart
        for part in [self.secret.as_bytes(), election_id.as_bytes(), voter_id.as_bytes()] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part);
        }
        hex::encode(hasher.finalize())
    }

    /// Records the ballot if its nullifier is new. Uniqueness is enforced by
    /// the store's insert, never by a separate lookup.
    pub async fn register(
        &self,
        store: &dyn BallotStore,
        ballot: &StoredBallot,
    ) -> Result<Registration, EngineError> {
        match store.insert_if_absent(ballot).await? {
            InsertOutcome::Inserted => Ok(Registration::Accepted),
            InsertOutcome::Duplicate => Ok(Registration::AlreadyVoted),
        }
    }

    pub async fn has_voted(
        &self,
        store: &dyn BallotStore,
        voter_id: &str,
        election_id: &str,
    ) -> Result<bool, EngineError> {
        let nullifier = self.nullifier(voter_id, election_id);
        store.contains_nullifier(election_id, &nullifier).await
    }
}
