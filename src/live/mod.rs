use crate::codec::BallotCodec;
use crate::error::EngineError;
use crate::models::{percentage, Election, StoredBallot, TallyResult};
use crate::store::BallotStore;
use crate::voting;
use chrono::{DateTime, Duration, TimeZone, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

const UNKNOWN_COHORT: &str = "unknown";

/// Upper bound on timeline buckets per snapshot.
pub const MAX_WINDOW_BUCKETS: usize = 10_000;

/// Voter attribute used for the cohort breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CohortDimension {
    Department,
    CohortYear,
}

impl FromStr for CohortDimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "department" => Ok(CohortDimension::Department),
            "cohort_year" => Ok(CohortDimension::CohortYear),
            other => Err(format!("Unknown cohort dimension: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub bucket_width: Duration,
    pub window_buckets: usize,
    pub cohort_dimension: CohortDimension,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            bucket_width: Duration::hours(1),
            window_buckets: 24,
            cohort_dimension: CohortDimension::Department,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineBucket {
    pub bucket_start: DateTime<Utc>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortCount {
    pub cohort_key: String,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSnapshot {
    pub election_id: String,
    pub results: Vec<TallyResult>,
    pub total_ballots: u64,
    pub turnout_percentage: f64,
    pub timeline: Vec<TimelineBucket>,
    pub cohort_breakdown: Vec<CohortCount>,
    pub integrity_warnings: usize,
    pub generated_at: DateTime<Utc>,
}

/// Point-in-time dashboards over the ballot store. Only ever reads.
pub struct LiveAggregator<'a> {
    store: &'a dyn BallotStore,
    codec: &'a dyn BallotCodec,
    config: &'a LiveConfig,
}

impl<'a> LiveAggregator<'a> {
    pub fn new(store: &'a dyn BallotStore, codec: &'a dyn BallotCodec, config: &'a LiveConfig) -> Self {
        Self { store, codec, config }
    }

    pub async fn snapshot(
        &self,
        election: &Election,
        now: DateTime<Utc>,
    ) -> Result<LiveSnapshot, EngineError> {
        let ballots = self.store.list_by_election(&election.id).await?;
        Ok(build_snapshot(election, &ballots, self.codec, self.config, now))
    }
}

/// Pure snapshot computation over an already-read ballot set.
pub fn build_snapshot(
    election: &Election,
    ballots: &[StoredBallot],
    codec: &dyn BallotCodec,
    config: &LiveConfig,
    now: DateTime<Utc>,
) -> LiveSnapshot {
    let outcome = voting::tally(election, ballots, codec);
    let total_ballots = ballots.len() as u64;

    LiveSnapshot {
        election_id: election.id.clone(),
        results: outcome.results,
        total_ballots,
        // Not clamped: a stale estimate can push this past 100
        turnout_percentage: percentage(total_ballots, election.estimated_eligible_voters),
        timeline: timeline(ballots, config, now),
        cohort_breakdown: cohort_breakdown(ballots, config.cohort_dimension),
        integrity_warnings: outcome.integrity_warnings.len(),
        generated_at: now,
    }
}

/// Fixed-width buckets aligned to the epoch, ending with the bucket that
/// contains `now`. Each bucket covers `[bucket_start, bucket_start + width)`.
pub fn timeline(ballots: &[StoredBallot], config: &LiveConfig, now: DateTime<Utc>) -> Vec<TimelineBucket> {
    let width = config.bucket_width.num_seconds().max(1);
    let buckets = config.window_buckets.clamp(1, MAX_WINDOW_BUCKETS) as i64;

    let now_secs = now.timestamp();
    let current_start = now_secs - now_secs.rem_euclid(width);
    let span = (buckets - 1).checked_mul(width);
    let (Some(first_start), Some(window_end)) = (
        span.and_then(|s| current_start.checked_sub(s)),
        current_start.checked_add(width),
    ) else {
        warn!("Timeline window of {} x {}s does not fit around {}", buckets, width, now);
        return Vec::new();
    };

    let mut counts = vec![0u64; buckets as usize];
    for ballot in ballots {
        let at = ballot.accepted_at.timestamp();
        if at >= first_start && at < window_end {
            counts[((at - first_start) / width) as usize] += 1;
        }
    }

    counts
        .into_iter()
        .enumerate()
        .filter_map(|(i, count)| {
            Utc.timestamp_opt(first_start + i as i64 * width, 0)
                .single()
                .map(|bucket_start| TimelineBucket { bucket_start, count })
        })
        .collect()
}

/// Ballot counts per cohort, largest first, ties by key.
pub fn cohort_breakdown(ballots: &[StoredBallot], dimension: CohortDimension) -> Vec<CohortCount> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for ballot in ballots {
        let key = match dimension {
            CohortDimension::Department => ballot.cohort.department.clone(),
            CohortDimension::CohortYear => ballot.cohort.cohort_year.map(|y| y.to_string()),
        }
        .filter(|k| !k.is_empty())
        .unwrap_or_else(|| UNKNOWN_COHORT.to_string());
        *counts.entry(key).or_insert(0) += 1;
    }

    let total = ballots.len() as u64;
    let mut breakdown: Vec<CohortCount> = counts
        .into_iter()
        .map(|(cohort_key, count)| CohortCount {
            percentage: percentage(count, total),
            cohort_key,
            count,
        })
        .collect();
    breakdown.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.cohort_key.cmp(&b.cohort_key)));
    breakdown
}
