use chrono::{DateTime, SecondsFormat, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::codec::BallotCodec;
use crate::error::{EngineError, Violation};
use crate::ledger::{LedgerClient, LedgerEntry};
use crate::models::{BallotPayload, StoredBallot, VoterCohort};
use crate::nullifier::{NullifierGuard, Registration};
use crate::store::{BallotStore, ElectionSource};
use crate::validation;

/// A ballot as submitted by a voter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastRequest {
    pub voter_id: String,
    pub election_id: String,
    pub scheme: String,
    pub payload: BallotPayload,
    #[serde(default)]
    pub cohort: VoterCohort,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub ballot_id: String,
    pub vote_hash: String,
    pub nullifier: String,
    pub accepted_at: DateTime<Utc>,
}

/// Expected, user-visible reasons a ballot is not counted. Resubmitting the
/// same ballot reproduces the same rejection.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    StructuralInvalid(Vec<Violation>),
    UnknownCandidate(Vec<Violation>),
    UnknownScheme,
    DuplicateVote,
    VotingClosed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CastOutcome {
    Accepted(Receipt),
    Rejected(Rejection),
}

/// The write path: validate, derive the nullifier, then insert atomically.
pub struct BallotCaster {
    store: Arc<dyn BallotStore>,
    elections: Arc<dyn ElectionSource>,
    codec: Arc<dyn BallotCodec>,
    ledger: Arc<dyn LedgerClient>,
    guard: NullifierGuard,
}

impl BallotCaster {
    pub fn new(
        store: Arc<dyn BallotStore>,
        elections: Arc<dyn ElectionSource>,
        codec: Arc<dyn BallotCodec>,
        ledger: Arc<dyn LedgerClient>,
        guard: NullifierGuard,
    ) -> Self {
        Self {
            store,
            elections,
            codec,
            ledger,
            guard,
        }
    }

    pub async fn cast(
        &self,
        request: &CastRequest,
        now: DateTime<Utc>,
    ) -> Result<CastOutcome, EngineError> {
        // Only a missing election escalates; everything else is an outcome
        let election = self.elections.get_election(&request.election_id).await?;

        if !election.is_voting_open(now) {
            return Ok(CastOutcome::Rejected(Rejection::VotingClosed));
        }

        let violations = validation::validate(&request.scheme, &request.payload, &election);
        if !violations.is_empty() {
            return Ok(CastOutcome::Rejected(classify(violations)));
        }

        let nullifier = self.guard.nullifier(&request.voter_id, &election.id);
        let encoded_payload = self.codec.encode(&request.payload)?;
        let vote_hash = vote_hash(&encoded_payload, &nullifier, now);

        let ballot = StoredBallot {
            id: Uuid::new_v4().to_string(),
            election_id: election.id.clone(),
            nullifier,
            encoded_payload,
            vote_hash,
            cohort: request.cohort.clone(),
            accepted_at: now,
        };

        match self.guard.register(self.store.as_ref(), &ballot).await? {
            Registration::Accepted => {
                info!("Accepted ballot {} for election {}", ballot.id, election.id);
                self.notify_ledger(&ballot);
                Ok(CastOutcome::Accepted(Receipt {
                    ballot_id: ballot.id,
                    vote_hash: ballot.vote_hash,
                    nullifier: ballot.nullifier,
                    accepted_at: ballot.accepted_at,
                }))
            }
            Registration::AlreadyVoted => {
                warn!(
                    "Duplicate vote for election {} (nullifier {}…)",
                    election.id,
                    &ballot.nullifier[..8]
                );
                Ok(CastOutcome::Rejected(Rejection::DuplicateVote))
            }
        }
    }

    /// Reads committed ballots, so it is consistent with any prior `cast`.
    pub async fn has_voted(&self, voter_id: &str, election_id: &str) -> Result<bool, EngineError> {
        self.guard.has_voted(self.store.as_ref(), voter_id, election_id).await
    }

    fn notify_ledger(&self, ballot: &StoredBallot) {
        let ledger = Arc::clone(&self.ledger);
        let entry = LedgerEntry {
            ballot_id: ballot.id.clone(),
            vote_hash: ballot.vote_hash.clone(),
            nullifier: ballot.nullifier.clone(),
        };

        // Fire and forget: the ballot already counts
        tokio::spawn(async move {
            if let Err(e) = ledger.record(&entry).await {
                error!("Ledger record failed for ballot {}: {}", entry.ballot_id, e);
            }
        });
    }
}

fn classify(violations: Vec<Violation>) -> Rejection {
    if violations.contains(&Violation::InvalidScheme) {
        Rejection::UnknownScheme
    } else if violations.iter().any(Violation::is_configuration_mismatch) {
        Rejection::UnknownCandidate(violations)
    } else {
        Rejection::StructuralInvalid(violations)
    }
}

fn vote_hash(encoded_payload: &str, nullifier: &str, accepted_at: DateTime<Utc>) -> String {
    let accepted_at = accepted_at.to_rfc3339_opts(SecondsFormat::Micros, true);
    let mut hasher = Sha256::new();
    hasher.update(b"trusty-tally/vote-hash/v1");
    for part in [encoded_payload.as_bytes(), nullifier.as_bytes(), accepted_at.as_bytes()] {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}
