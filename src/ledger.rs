use async_trait::async_trait;
use log::info;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub ballot_id: String,
    pub vote_hash: String,
    pub nullifier: String,
}

/// External certificate/ledger service. Called after a ballot is durably
/// accepted; its result never affects whether the ballot counts.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn record(&self, entry: &LedgerEntry) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Writes entries to the log. Used when no ledger service is configured.
#[derive(Debug, Default)]
pub struct LogLedger;

#[async_trait]
impl LedgerClient for LogLedger {
    async fn record(&self, entry: &LedgerEntry) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(
            "Ledger entry: {}",
            serde_json::to_string(entry)?
        );
        Ok(())
    }
}
