use crate::codec::BallotCodec;
use crate::db::Database;
use crate::live::{LiveAggregator, LiveConfig, LiveSnapshot};
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use log::{error, info};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::time::interval;

/// Computes a snapshot for every election currently in voting.
pub async fn publish_once(
    database: &Database,
    codec: &dyn BallotCodec,
    config: &LiveConfig,
    now: DateTime<Utc>,
) -> Result<Vec<LiveSnapshot>, EngineError> {
    let elections = database.get_elections_in_voting(now).await?;
    let aggregator = LiveAggregator::new(database, codec, config);

    let mut snapshots = Vec::with_capacity(elections.len());
    for election in &elections {
        match aggregator.snapshot(election, now).await {
            Ok(snapshot) => snapshots.push(snapshot),
            // One bad election shouldn't hide the others
            Err(e) => error!("Snapshot failed for election {}: {}", election.id, e),
        }
    }
    Ok(snapshots)
}

pub async fn publish_snapshots_task(
    database: Arc<Database>,
    codec: Arc<dyn BallotCodec>,
    config: LiveConfig,
    interval_seconds: u64,
) {
    info!("Starting snapshot publisher, every {}s", interval_seconds);
    let mut interval = interval(StdDuration::from_secs(interval_seconds));

    loop {
        interval.tick().await;
        let now = Utc::now();

        match publish_once(&database, codec.as_ref(), &config, now).await {
            Ok(snapshots) => {
                for snapshot in snapshots {
                    match serde_json::to_string(&snapshot) {
                        Ok(json) => info!("Live snapshot: {}", json),
                        Err(e) => error!("Failed to serialize snapshot for {}: {}", snapshot.election_id, e),
                    }
                }
            }
            Err(e) => {
                error!("Failed to query elections in voting: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::HexJsonCodec;
    use crate::db::test_support::memory_db;
    use crate::models::fixtures::election;
    use crate::models::Scheme;
    use crate::store::BallotStore;
    use crate::voting::test_support::single;

    #[tokio::test]
    async fn publishes_one_snapshot_per_open_election() {
        let db = memory_db().await;
        let e = election(Scheme::SingleChoice, &["A", "B"]);
        db.create_election(&e).await.unwrap();
        db.insert_if_absent(&single(&e, &e.candidates[0].id)).await.unwrap();

        let snapshots = publish_once(&db, &HexJsonCodec, &LiveConfig::default(), Utc::now())
            .await
            .unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].election_id, e.id);
        assert_eq!(snapshots[0].total_ballots, 1);
        assert_eq!(snapshots[0].turnout_percentage, 1.0);
    }
}
