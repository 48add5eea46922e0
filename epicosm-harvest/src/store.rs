//! SQLite-backed document store with per-record duplicate absorption.
//!
//! Every collection is one table: the full JSON document in `doc` plus the key
//! columns its uniqueness constraint needs. Inserts are attempted one record at
//! a time; a unique-constraint violation means "already stored" and is counted,
//! any other failure is recorded against that record and the batch carries on.
//! Nothing spans more than one record except [`DedupStore::annotate`].
use crate::error::HarvestError;
use epicosm_social::twitter::extract::{item_id, tag_follower};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteQueryResult};
use sqlx::{Row, SqlitePool};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, error, info};

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS follows (
        follower_id TEXT NOT NULL,
        id          TEXT NOT NULL,
        doc         TEXT NOT NULL,
        UNIQUE(follower_id, id)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS posts (
        id         TEXT PRIMARY KEY,
        author_id  TEXT,
        created_at TEXT,
        doc        TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS pseudofeed (
        user      TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        text      TEXT NOT NULL,
        doc       TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS pseudofeed_user ON pseudofeed(user)",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Follows,
    Posts,
    Pseudofeed,
}

impl Collection {
    fn table(self) -> &'static str {
        match self {
            Collection::Follows => "follows",
            Collection::Posts => "posts",
            Collection::Pseudofeed => "pseudofeed",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "follows" => Ok(Collection::Follows),
            "posts" | "tweets" => Ok(Collection::Posts),
            "pseudofeed" => Ok(Collection::Pseudofeed),
            other => Err(format!("unknown collection `{other}`")),
        }
    }
}

/// Outcome of one batch insert.
#[derive(Debug, Default, Clone)]
pub struct InsertReport {
    pub inserted: usize,
    pub duplicates: usize,
    pub failures: Vec<RecordFailure>,
}

/// A record that could not be written for a reason other than a duplicate key.
#[derive(Debug, Clone)]
pub struct RecordFailure {
    pub key: String,
    pub error: String,
}

impl InsertReport {
    fn absorb(&mut self, collection: Collection, key: &str, res: Result<SqliteQueryResult, sqlx::Error>) {
        match res {
            Ok(_) => self.inserted += 1,
            Err(err) if is_duplicate(&err) => {
                self.duplicates += 1;
                debug!(%collection, key, "store.duplicate");
            }
            Err(err) => {
                error!(%collection, key, error = %err, "store.insert_failed");
                self.failures.push(RecordFailure {
                    key: key.to_string(),
                    error: err.to_string(),
                });
            }
        }
    }

    fn reject(&mut self, collection: Collection, reason: &str) {
        error!(%collection, reason, "store.insert_rejected");
        self.failures.push(RecordFailure {
            key: "-".into(),
            error: reason.to_string(),
        });
    }
}

fn is_duplicate(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// One stored row.
#[derive(Debug, Clone)]
pub struct StoredDoc {
    pub rowid: i64,
    pub doc: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PseudofeedRecord {
    pub user: u64,
    pub timestamp: String,
    pub text: String,
}

#[derive(Clone)]
pub struct DedupStore {
    pool: SqlitePool,
}

impl DedupStore {
    /// Open (creating if needed) the database at `url` and ensure the schema.
    ///
    /// `sqlite::memory:` gets a single pinned connection so every query sees the
    /// same database.
    pub async fn connect(url: &str) -> Result<Self, HarvestError> {
        let opts = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let in_memory = url.contains(":memory:");
        let pool_opts = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };
        let pool = pool_opts.connect_with(opts).await?;
        let store = Self { pool };
        store.migrate().await?;
        info!(url, "store.connected");
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), HarvestError> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Store follow edges for `follower_id`, tagging each document with it first.
    pub async fn insert_follows(&self, follower_id: u64, docs: &[Value]) -> InsertReport {
        let mut docs = docs.to_vec();
        tag_follower(&mut docs, follower_id);
        let follower = follower_id.to_string();

        let mut report = InsertReport::default();
        for doc in &docs {
            let Some(id) = item_id(doc) else {
                report.reject(Collection::Follows, "edge without id");
                continue;
            };
            let res = sqlx::query("INSERT INTO follows (follower_id, id, doc) VALUES (?1, ?2, ?3)")
                .bind(&follower)
                .bind(&id)
                .bind(doc.to_string())
                .execute(&self.pool)
                .await;
            report.absorb(Collection::Follows, &id, res);
        }
        debug!(
            follower_id,
            inserted = report.inserted,
            duplicates = report.duplicates,
            failed = report.failures.len(),
            "store.insert_follows"
        );
        report
    }

    pub async fn insert_posts(&self, docs: &[Value]) -> InsertReport {
        let mut report = InsertReport::default();
        for doc in docs {
            let Some(id) = item_id(doc) else {
                report.reject(Collection::Posts, "post without id");
                continue;
            };
            let res = sqlx::query(
                "INSERT INTO posts (id, author_id, created_at, doc) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&id)
            .bind(doc.get("author_id").and_then(Value::as_str))
            .bind(doc.get("created_at").and_then(Value::as_str))
            .bind(doc.to_string())
            .execute(&self.pool)
            .await;
            report.absorb(Collection::Posts, &id, res);
        }
        debug!(
            inserted = report.inserted,
            duplicates = report.duplicates,
            failed = report.failures.len(),
            "store.insert_posts"
        );
        report
    }

    pub async fn count_follows_for(&self, follower_id: u64) -> Result<i64, HarvestError> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM follows WHERE follower_id = ?1")
            .bind(follower_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Distinct followed-account ids for a seed, in the order they were first stored.
    pub async fn followed_ids_for(&self, follower_id: u64) -> Result<Vec<String>, HarvestError> {
        let ids = sqlx::query_scalar::<_, String>(
            r#"SELECT id FROM follows
               WHERE follower_id = ?1
               GROUP BY id
               ORDER BY MIN(rowid)"#,
        )
        .bind(follower_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// `(total edges, distinct followers)` across the whole collection.
    pub async fn follow_totals(&self) -> Result<(i64, i64), HarvestError> {
        let row = sqlx::query("SELECT COUNT(*) AS edges, COUNT(DISTINCT follower_id) AS followers FROM follows")
            .fetch_one(&self.pool)
            .await?;
        Ok((row.try_get("edges")?, row.try_get("followers")?))
    }

    pub async fn count(&self, collection: Collection) -> Result<i64, HarvestError> {
        let sql = format!("SELECT COUNT(*) FROM {}", collection.table());
        Ok(sqlx::query_scalar::<_, i64>(&sql).fetch_one(&self.pool).await?)
    }

    pub async fn documents(&self, collection: Collection) -> Result<Vec<StoredDoc>, HarvestError> {
        let sql = format!("SELECT rowid AS rid, doc FROM {} ORDER BY rowid", collection.table());
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: String = row.try_get("doc")?;
            out.push(StoredDoc {
                rowid: row.try_get("rid")?,
                doc: serde_json::from_str(&raw)?,
            });
        }
        Ok(out)
    }

    /// Set `key` on one stored document, replacing any earlier value.
    pub async fn annotate(
        &self,
        collection: Collection,
        rowid: i64,
        key: &str,
        value: Value,
    ) -> Result<(), HarvestError> {
        let table = collection.table();
        let mut tx = self.pool.begin().await?;
        let raw: String = sqlx::query_scalar(&format!("SELECT doc FROM {table} WHERE rowid = ?1"))
            .bind(rowid)
            .fetch_one(&mut *tx)
            .await?;
        let mut doc: Value = serde_json::from_str(&raw)?;
        if let Value::Object(map) = &mut doc {
            map.insert(key.to_string(), value);
        }
        sqlx::query(&format!("UPDATE {table} SET doc = ?1 WHERE rowid = ?2"))
            .bind(doc.to_string())
            .bind(rowid)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Append one pseudofeed snapshot. Never deduplicated.
    pub async fn insert_pseudofeed(&self, record: &PseudofeedRecord) -> Result<(), HarvestError> {
        let doc = serde_json::to_string(record)?;
        sqlx::query("INSERT INTO pseudofeed (user, timestamp, text, doc) VALUES (?1, ?2, ?3, ?4)")
            .bind(record.user.to_string())
            .bind(&record.timestamp)
            .bind(&record.text)
            .bind(doc)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn pseudofeeds_for(&self, user: u64) -> Result<Vec<PseudofeedRecord>, HarvestError> {
        let rows = sqlx::query("SELECT user, timestamp, text FROM pseudofeed WHERE user = ?1 ORDER BY rowid")
            .bind(user.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|r| -> Result<PseudofeedRecord, HarvestError> {
                let user: String = r.try_get("user")?;
                Ok(PseudofeedRecord {
                    user: user.parse().unwrap_or(0),
                    timestamp: r.try_get("timestamp")?,
                    text: r.try_get("text")?,
                })
            })
            .collect()
    }
}
