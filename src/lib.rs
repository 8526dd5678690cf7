//! Ballot validation, double-vote prevention and tallying for
//! single-choice, ranked-choice and quadratic elections.

pub mod casting;
pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod live;
pub mod models;
pub mod nullifier;
pub mod store;
pub mod tasks;
pub mod validation;
pub mod voting;

pub use casting::{BallotCaster, CastOutcome, CastRequest, Receipt, Rejection};
pub use error::{EngineError, Violation};
pub use models::{BallotPayload, Election, Scheme, TallyResult};
