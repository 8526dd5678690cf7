use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info};
use sqlx::{migrate::MigrateDatabase, sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow}, Row, Sqlite};

use crate::error::EngineError;
use crate::models::{Candidate, Election, Scheme, StoredBallot, VoterCohort};
use crate::store::{BallotStore, ElectionSource, InsertOutcome};

pub struct Database {
    pool: SqlitePool,
}

// Fixed-width timestamps so text comparison in SQL matches time order
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(value: &str, column: &str) -> Result<DateTime<Utc>, EngineError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            EngineError::Storage(sqlx::Error::Decode(
                format!("Failed to parse {}: {}", column, e).into(),
            ))
        })
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self, EngineError> {
        Self::connect(db_url, 5).await
    }

    pub async fn connect(db_url: &str, max_connections: u32) -> Result<Self, EngineError> {
        let in_memory = db_url.contains(":memory:");

        // Create database file if it doesn't exist
        if !in_memory && !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            info!("Creating database at {}", db_url);
            Sqlite::create_database(db_url).await?;
        }

        let mut options = SqlitePoolOptions::new().max_connections(max_connections);
        if in_memory {
            // Closing the last connection drops an in-memory database
            options = options.min_connections(1).idle_timeout(None).max_lifetime(None);
        }
        let pool = options.connect(db_url).await?;

        Self::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(pool: &SqlitePool) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS elections (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                scheme TEXT NOT NULL,
                max_rankings INTEGER,
                credit_budget INTEGER,
                estimated_eligible_voters INTEGER NOT NULL,
                registration_start TEXT NOT NULL,
                registration_end TEXT NOT NULL,
                voting_start TEXT NOT NULL,
                voting_end TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candidates (
                id TEXT NOT NULL,
                election_id TEXT NOT NULL,
                name TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (election_id, id),
                FOREIGN KEY (election_id) REFERENCES elections(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        // The unique constraint is the double-vote guard
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ballots (
                id TEXT PRIMARY KEY,
                election_id TEXT NOT NULL,
                nullifier TEXT NOT NULL,
                encoded_payload TEXT NOT NULL,
                vote_hash TEXT NOT NULL,
                department TEXT,
                cohort_year INTEGER,
                accepted_at TEXT NOT NULL,
                UNIQUE (election_id, nullifier),
                FOREIGN KEY (election_id) REFERENCES elections(id)
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS ballots_by_election ON ballots (election_id, accepted_at)")
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Stores a new election with its candidates in insertion order.
    pub async fn create_election(&self, election: &Election) -> Result<(), EngineError> {
        election.check_config()?;

        let mut tx = self.pool.begin().await?;
        Self::insert_election_row(&mut tx, election).await?;
        Self::insert_candidates(&mut tx, election).await?;
        tx.commit().await?;

        info!("Created {} election {}", election.scheme, election.id);
        Ok(())
    }

    /// Replaces an election's configuration. Refused once voting has started.
    pub async fn update_election(
        &self,
        election: &Election,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let current = self.load_election(&election.id).await?.ok_or_else(|| {
            EngineError::ConfigUnavailable {
                election_id: election.id.clone(),
                reason: "not found".to_string(),
            }
        })?;
        if now >= current.voting_start {
            return Err(EngineError::ElectionLocked(election.id.clone()));
        }
        election.check_config()?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM candidates WHERE election_id = ?")
            .bind(&election.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            UPDATE elections
            SET title = ?, scheme = ?, max_rankings = ?, credit_budget = ?, estimated_eligible_voters = ?,
                registration_start = ?, registration_end = ?, voting_start = ?, voting_end = ?
            WHERE id = ?
            "#,
        )
        .bind(&election.title)
        .bind(election.scheme.as_str())
        .bind(election.max_rankings.map(i64::from))
        .bind(election.credit_budget.map(|b| b as i64))
        .bind(election.estimated_eligible_voters as i64)
        .bind(ts(election.registration_start))
        .bind(ts(election.registration_end))
        .bind(ts(election.voting_start))
        .bind(ts(election.voting_end))
        .bind(&election.id)
        .execute(&mut *tx)
        .await?;
        Self::insert_candidates(&mut tx, election).await?;
        tx.commit().await?;

        info!("Updated election {}", election.id);
        Ok(())
    }

    async fn insert_election_row(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        election: &Election,
    ) -> Result<(), EngineError> {
        sqlx::query(
            r#"
            INSERT INTO elections (id, title, scheme, max_rankings, credit_budget, estimated_eligible_voters,
                                   registration_start, registration_end, voting_start, voting_end)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&election.id)
        .bind(&election.title)
        .bind(election.scheme.as_str())
        .bind(election.max_rankings.map(i64::from))
        .bind(election.credit_budget.map(|b| b as i64))
        .bind(election.estimated_eligible_voters as i64)
        .bind(ts(election.registration_start))
        .bind(ts(election.registration_end))
        .bind(ts(election.voting_start))
        .bind(ts(election.voting_end))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_candidates(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        election: &Election,
    ) -> Result<(), EngineError> {
        for (i, candidate) in election.candidates.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO candidates (id, election_id, name, position)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&candidate.id)
            .bind(&election.id)
            .bind(&candidate.name)
            .bind(i as i64)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn load_election(&self, election_id: &str) -> Result<Option<Election>, EngineError> {
        let row = sqlx::query(
            r#"
            SELECT id, title, scheme, max_rankings, credit_budget, estimated_eligible_voters,
                   registration_start, registration_end, voting_start, voting_end
            FROM elections
            WHERE id = ?
            "#,
        )
        .bind(election_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let scheme_str = row.get::<String, _>("scheme");
        let scheme = scheme_str
            .parse::<Scheme>()
            .map_err(|e| EngineError::Storage(sqlx::Error::Decode(e.into())))?;

        let candidates = sqlx::query(
            r#"
            SELECT id, name
            FROM candidates
            WHERE election_id = ?
            ORDER BY position
            "#,
        )
        .bind(election_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| Candidate {
            id: row.get::<String, _>("id"),
            name: row.get::<String, _>("name"),
        })
        .collect();

        Ok(Some(Election {
            id: row.get::<String, _>("id"),
            title: row.get::<String, _>("title"),
            scheme,
            candidates,
            max_rankings: row.get::<Option<i64>, _>("max_rankings").map(|m| m as u32),
            credit_budget: row.get::<Option<i64>, _>("credit_budget").map(|b| b as u64),
            estimated_eligible_voters: row.get::<i64, _>("estimated_eligible_voters") as u64,
            registration_start: parse_ts(&row.get::<String, _>("registration_start"), "registration_start")?,
            registration_end: parse_ts(&row.get::<String, _>("registration_end"), "registration_end")?,
            voting_start: parse_ts(&row.get::<String, _>("voting_start"), "voting_start")?,
            voting_end: parse_ts(&row.get::<String, _>("voting_end"), "voting_end")?,
        }))
    }

    /// Elections whose voting window contains `now`.
    pub async fn get_elections_in_voting(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Election>, EngineError> {
        let now = ts(now);
        let ids: Vec<String> = sqlx::query(
            r#"
            SELECT id
            FROM elections
            WHERE voting_start <= ? AND voting_end > ?
            ORDER BY voting_start
            "#,
        )
        .bind(&now)
        .bind(&now)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| row.get::<String, _>("id"))
        .collect();

        let mut elections = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(election) = self.load_election(&id).await? {
                elections.push(election);
            }
        }
        Ok(elections)
    }

    fn ballot_from_row(row: SqliteRow) -> Result<StoredBallot, EngineError> {
        Ok(StoredBallot {
            id: row.get::<String, _>("id"),
            election_id: row.get::<String, _>("election_id"),
            nullifier: row.get::<String, _>("nullifier"),
            encoded_payload: row.get::<String, _>("encoded_payload"),
            vote_hash: row.get::<String, _>("vote_hash"),
            cohort: VoterCohort {
                department: row.get::<Option<String>, _>("department"),
                cohort_year: row.get::<Option<i64>, _>("cohort_year").map(|y| y as i32),
            },
            accepted_at: parse_ts(&row.get::<String, _>("accepted_at"), "accepted_at")?,
        })
    }
}

#[async_trait]
impl BallotStore for Database {
    async fn insert_if_absent(&self, ballot: &StoredBallot) -> Result<InsertOutcome, EngineError> {
        // Single statement: concurrent submissions race on the constraint, not on a read
        let result = sqlx::query(
            r#"
            INSERT INTO ballots (id, election_id, nullifier, encoded_payload, vote_hash,
                                 department, cohort_year, accepted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (election_id, nullifier) DO NOTHING
            "#,
        )
        .bind(&ballot.id)
        .bind(&ballot.election_id)
        .bind(&ballot.nullifier)
        .bind(&ballot.encoded_payload)
        .bind(&ballot.vote_hash)
        .bind(&ballot.cohort.department)
        .bind(ballot.cohort.cohort_year.map(i64::from))
        .bind(ts(ballot.accepted_at))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(InsertOutcome::Inserted)
        } else {
            debug!("Nullifier already present for election {}", ballot.election_id);
            Ok(InsertOutcome::Duplicate)
        }
    }

    async fn list_by_election(&self, election_id: &str) -> Result<Vec<StoredBallot>, EngineError> {
        sqlx::query(
            r#"
            SELECT id, election_id, nullifier, encoded_payload, vote_hash, department, cohort_year, accepted_at
            FROM ballots
            WHERE election_id = ?
            ORDER BY accepted_at, rowid
            "#,
        )
        .bind(election_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Self::ballot_from_row)
        .collect()
    }

    async fn contains_nullifier(
        &self,
        election_id: &str,
        nullifier: &str,
    ) -> Result<bool, EngineError> {
        let found = sqlx::query("SELECT 1 FROM ballots WHERE election_id = ? AND nullifier = ?")
            .bind(election_id)
            .bind(nullifier)
            .fetch_optional(&self.pool)
            .await?
            .is_some();
        Ok(found)
    }
}

#[async_trait]
impl ElectionSource for Database {
    async fn get_election(&self, election_id: &str) -> Result<Election, EngineError> {
        match self.load_election(election_id).await {
            Ok(Some(election)) => Ok(election),
            Ok(None) => Err(EngineError::ConfigUnavailable {
                election_id: election_id.to_string(),
                reason: "not found".to_string(),
            }),
            Err(e) => Err(EngineError::ConfigUnavailable {
                election_id: election_id.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub async fn memory_db() -> Database {
        // One connection: every connection to :memory: is a separate database
        Database::connect("sqlite::memory:", 1).await.unwrap()
    }

    pub fn ballot(election_id: &str, nullifier: &str, accepted_at: DateTime<Utc>) -> StoredBallot {
        StoredBallot {
            id: uuid::Uuid::new_v4().to_string(),
            election_id: election_id.to_string(),
            nullifier: nullifier.to_string(),
            encoded_payload: "00".to_string(),
            vote_hash: "hash".to_string(),
            cohort: VoterCohort::default(),
            accepted_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::models::fixtures::election;
    use chrono::Duration;
    use std::sync::Arc;

    #[tokio::test]
    async fn election_round_trips_with_candidate_order() {
        let db = memory_db().await;
        let e = election(Scheme::RankedChoice, &["Ada", "Grace", "Alan"]).with_max_rankings(2);
        db.create_election(&e).await.unwrap();

        let loaded = db.get_election(&e.id).await.unwrap();
        assert_eq!(loaded.scheme, Scheme::RankedChoice);
        assert_eq!(loaded.max_rankings, Some(2));
        let names: Vec<_> = loaded.candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Ada", "Grace", "Alan"]);
        assert_eq!(loaded.voting_start.timestamp(), e.voting_start.timestamp());
    }

    #[tokio::test]
    async fn missing_election_is_config_unavailable() {
        let db = memory_db().await;
        let err = db.get_election("nope").await.unwrap_err();
        assert!(matches!(err, EngineError::ConfigUnavailable { .. }));
    }

    #[tokio::test]
    async fn invalid_lifecycle_is_refused() {
        let db = memory_db().await;
        let mut e = election(Scheme::SingleChoice, &["A"]);
        e.voting_start = e.registration_end - Duration::hours(1);
        assert!(matches!(
            db.create_election(&e).await,
            Err(EngineError::InvalidElection(_))
        ));
    }

    #[tokio::test]
    async fn election_is_locked_once_voting_starts() {
        let db = memory_db().await;
        let mut e = election(Scheme::SingleChoice, &["A", "B"]);
        db.create_election(&e).await.unwrap();

        e.title = "Renamed".to_string();
        let err = db.update_election(&e, Utc::now()).await.unwrap_err();
        assert!(matches!(err, EngineError::ElectionLocked(_)));

        let before_voting = e.voting_start - Duration::hours(1);
        db.update_election(&e, before_voting).await.unwrap();
        assert_eq!(db.get_election(&e.id).await.unwrap().title, "Renamed");
    }

    #[tokio::test]
    async fn second_insert_with_same_nullifier_is_duplicate() {
        let db = memory_db().await;
        let e = election(Scheme::SingleChoice, &["A"]);
        db.create_election(&e).await.unwrap();

        let now = Utc::now();
        assert_eq!(
            db.insert_if_absent(&ballot(&e.id, "n1", now)).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            db.insert_if_absent(&ballot(&e.id, "n1", now)).await.unwrap(),
            InsertOutcome::Duplicate
        );
        assert!(db.contains_nullifier(&e.id, "n1").await.unwrap());
        assert!(!db.contains_nullifier(&e.id, "n2").await.unwrap());
        assert_eq!(db.list_by_election(&e.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_inserts_accept_exactly_one() {
        let db = Arc::new(memory_db().await);
        let e = election(Scheme::SingleChoice, &["A"]);
        db.create_election(&e).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let db = Arc::clone(&db);
            let id = e.id.clone();
            handles.push(tokio::spawn(async move {
                db.insert_if_absent(&ballot(&id, "same", Utc::now())).await.unwrap()
            }));
        }

        let mut inserted = 0;
        for h in handles {
            if h.await.unwrap() == InsertOutcome::Inserted {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
    }

    #[tokio::test]
    async fn ballots_list_in_acceptance_order_with_cohort() {
        let db = memory_db().await;
        let e = election(Scheme::SingleChoice, &["A"]);
        db.create_election(&e).await.unwrap();

        let now = Utc::now();
        let mut late = ballot(&e.id, "late", now);
        late.cohort = VoterCohort {
            department: Some("Physics".to_string()),
            cohort_year: Some(2027),
        };
        db.insert_if_absent(&late).await.unwrap();
        db.insert_if_absent(&ballot(&e.id, "early", now - Duration::minutes(5)))
            .await
            .unwrap();

        let listed = db.list_by_election(&e.id).await.unwrap();
        assert_eq!(listed[0].nullifier, "early");
        assert_eq!(listed[1].cohort, late.cohort);
    }

    #[tokio::test]
    async fn elections_in_voting_excludes_closed_ones() {
        let db = memory_db().await;
        let open = election(Scheme::SingleChoice, &["A"]);
        let mut closed = election(Scheme::SingleChoice, &["A"]);
        closed.voting_end = Utc::now() - Duration::hours(1);
        closed.voting_start = closed.voting_end - Duration::hours(2);
        closed.registration_end = closed.voting_start - Duration::hours(1);
        db.create_election(&open).await.unwrap();
        db.create_election(&closed).await.unwrap();

        let active = db.get_elections_in_voting(Utc::now()).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, open.id);
    }
}
