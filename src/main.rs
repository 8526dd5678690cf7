use chrono::Utc;
use log::{error, info, warn};
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use trusty_tally::codec::{BallotCodec, HexJsonCodec};
use trusty_tally::config::EngineConfig;
use trusty_tally::db::Database;
use trusty_tally::ledger::LogLedger;
use trusty_tally::nullifier::NullifierGuard;
use trusty_tally::tasks;
use trusty_tally::{BallotCaster, CastOutcome, CastRequest, Rejection};

fn outcome_json(outcome: &CastOutcome) -> serde_json::Value {
    match outcome {
        CastOutcome::Accepted(receipt) => json!({ "status": "accepted", "receipt": receipt }),
        CastOutcome::Rejected(rejection) => {
            let (reason, violations) = match rejection {
                Rejection::StructuralInvalid(v) => ("structural_invalid", v.clone()),
                Rejection::UnknownCandidate(v) => ("unknown_candidate", v.clone()),
                Rejection::UnknownScheme => ("unknown_scheme", Vec::new()),
                Rejection::DuplicateVote => ("duplicate_vote", Vec::new()),
                Rejection::VotingClosed => ("voting_closed", Vec::new()),
            };
            let violations: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
            json!({ "status": "rejected", "reason": reason, "violations": violations })
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize logging
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return;
        }
    };

    // Initialize database
    let database = match Database::new(&config.database_url).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return;
        }
    };
    info!("Connected to {}", config.database_url);

    let codec: Arc<dyn BallotCodec> = Arc::new(HexJsonCodec);

    // --- Start Background Task for Live Snapshots ---
    let db_clone = Arc::clone(&database);
    let codec_clone = Arc::clone(&codec);
    let live_config = config.live.clone();
    let interval_seconds = config.snapshot_interval_seconds;
    tokio::spawn(async move {
        tasks::snapshot_publisher::publish_snapshots_task(db_clone, codec_clone, live_config, interval_seconds).await;
    });

    let caster = BallotCaster::new(
        database.clone(),
        database.clone(),
        codec,
        Arc::new(LogLedger),
        NullifierGuard::new(config.nullifier_secret.clone()),
    );

    // One JSON-encoded CastRequest per line on stdin, one JSON outcome per line on stdout
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let request: CastRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!("Ignoring malformed submission: {}", e);
                println!("{}", json!({ "status": "error", "error": e.to_string() }));
                continue;
            }
        };

        match caster.cast(&request, Utc::now()).await {
            Ok(outcome) => println!("{}", outcome_json(&outcome)),
            Err(e) => {
                error!("Submission for election {} failed: {}", request.election_id, e);
                println!("{}", json!({ "status": "error", "error": e.to_string() }));
            }
        }
    }

    info!("Input closed, shutting down.");
}
