//! SQLite-backed store.
//!
//! Each record is kept as a JSON body next to the handful of columns the
//! queries filter on. Schema is created on open.
//!
//! Atomicity comes from single statements:
//! - admission list CAS is one `INSERT ... SELECT ... WHERE NOT EXISTS`
//! - deposit updates are `UPDATE ... WHERE id = ? AND revision = ?`

use super::*;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS journals (
    id   TEXT PRIMARY KEY NOT NULL,
    uuid TEXT NOT NULL UNIQUE,
    body TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS whitelist (
    uuid TEXT PRIMARY KEY NOT NULL,
    body TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS blacklist (
    uuid TEXT PRIMARY KEY NOT NULL,
    body TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS deposits (
    id           TEXT PRIMARY KEY NOT NULL,
    journal_id   TEXT NOT NULL,
    deposit_uuid TEXT NOT NULL,
    state        TEXT NOT NULL,
    error_count  INTEGER NOT NULL,
    revision     INTEGER NOT NULL,
    body         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS deposits_journal ON deposits (journal_id);
CREATE INDEX IF NOT EXISTS deposits_state ON deposits (state);
DROP INDEX IF EXISTS deposits_uuid;
CREATE UNIQUE INDEX IF NOT EXISTS deposits_uuid_unique ON deposits (deposit_uuid);

CREATE TABLE IF NOT EXISTS audit (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    journal_uuid TEXT NOT NULL,
    body         TEXT NOT NULL
);
"#;

#[derive(FromRow)]
struct BodyRow {
    body: String,
}

fn decode<T: serde::de::DeserializeOwned>(row: BodyRow) -> StoreResult<T> {
    Ok(serde_json::from_str(&row.body)?)
}

fn decode_all<T: serde::de::DeserializeOwned>(rows: Vec<BodyRow>) -> StoreResult<Vec<T>> {
    rows.into_iter().map(decode).collect()
}

fn db_error(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn to_i64(value: u64, what: &str) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| StoreError::Serialization(format!("{} out of range", what)))
}

fn list_table(kind: ListKind) -> &'static str {
    match kind {
        ListKind::Whitelist => "whitelist",
        ListKind::Blacklist => "blacklist",
    }
}

/// SQLite [`Store`] implementation.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database file at `path`.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(db_error)?;
        Self::with_pool(pool).await
    }

    /// Private in-memory database. A single connection that never expires,
    /// otherwise the database vanishes with it.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(db_error)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(db_error)?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> StoreResult<Self> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await.map_err(db_error)?;
        Ok(Self { pool })
    }

    async fn bodies(&self, sql: &str) -> StoreResult<Vec<BodyRow>> {
        sqlx::query_as::<_, BodyRow>(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)
    }

    async fn deposits_by(&self, column: &str, value: String) -> StoreResult<Vec<Deposit>> {
        let sql = format!("SELECT body FROM deposits WHERE {} = ?1 ORDER BY rowid", column);
        let rows = sqlx::query_as::<_, BodyRow>(&sql)
            .bind(value)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        decode_all(rows)
    }
}

#[async_trait]
impl JournalStore for SqliteStore {
    async fn list_journals(&self) -> StoreResult<Vec<Journal>> {
        decode_all(self.bodies("SELECT body FROM journals ORDER BY rowid").await?)
    }

    async fn get_journal(&self, id: JournalId) -> StoreResult<Option<Journal>> {
        sqlx::query_as::<_, BodyRow>("SELECT body FROM journals WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .map(decode)
            .transpose()
    }

    async fn find_journal_by_uuid(&self, uuid: &str) -> StoreResult<Option<Journal>> {
        sqlx::query_as::<_, BodyRow>("SELECT body FROM journals WHERE uuid = ?1")
            .bind(crate::journal::canonical_uuid(uuid))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .map(decode)
            .transpose()
    }

    async fn save_journal(&self, journal: &Journal) -> StoreResult<()> {
        let body = serde_json::to_string(journal)?;
        sqlx::query(
            "INSERT INTO journals (id, uuid, body) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET uuid = excluded.uuid, body = excluded.body",
        )
        .bind(journal.id().to_string())
        .bind(journal.uuid())
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate(format!("journal uuid {}", journal.uuid()))
            } else {
                db_error(e)
            }
        })?;
        Ok(())
    }

    async fn delete_journal(&self, id: JournalId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM journals WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("journal {}", id)));
        }
        Ok(())
    }

    async fn search_journals(&self, query: &str) -> StoreResult<Vec<Journal>> {
        let journals = self.list_journals().await?;
        Ok(journals.into_iter().filter(|j| j.matches(query)).collect())
    }
}

#[async_trait]
impl ListStore for SqliteStore {
    async fn list_entry(&self, kind: ListKind, uuid: &str) -> StoreResult<Option<ListEntry>> {
        let sql = format!("SELECT body FROM {} WHERE uuid = ?1", list_table(kind));
        sqlx::query_as::<_, BodyRow>(&sql)
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .map(decode)
            .transpose()
    }

    async fn insert_if_unlisted(&self, kind: ListKind, entry: &ListEntry) -> StoreResult<bool> {
        let body = serde_json::to_string(entry)?;
        let sql = format!(
            "INSERT INTO {} (uuid, body)
             SELECT ?1, ?2
             WHERE NOT EXISTS (SELECT 1 FROM whitelist WHERE uuid = ?1)
               AND NOT EXISTS (SELECT 1 FROM blacklist WHERE uuid = ?1)",
            list_table(kind)
        );
        let result = sqlx::query(&sql)
            .bind(&entry.uuid)
            .bind(body)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn remove_listing(&self, uuid: &str) -> StoreResult<usize> {
        let mut removed = 0;
        for kind in [ListKind::Whitelist, ListKind::Blacklist] {
            let sql = format!("DELETE FROM {} WHERE uuid = ?1", list_table(kind));
            let result = sqlx::query(&sql)
                .bind(uuid)
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
            removed += result.rows_affected() as usize;
        }
        Ok(removed)
    }

    async fn list_entries(&self, kind: ListKind) -> StoreResult<Vec<ListEntry>> {
        let sql = format!("SELECT body FROM {} ORDER BY rowid", list_table(kind));
        decode_all(self.bodies(&sql).await?)
    }
}

#[async_trait]
impl DepositStore for SqliteStore {
    async fn insert_deposit(&self, deposit: &Deposit) -> StoreResult<()> {
        let body = serde_json::to_string(deposit)?;
        sqlx::query(
            "INSERT INTO deposits (id, journal_id, deposit_uuid, state, error_count, revision, body)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(deposit.id().to_string())
        .bind(deposit.journal().to_string())
        .bind(deposit.deposit_uuid())
        .bind(deposit.state().as_str())
        .bind(to_i64(deposit.error_count() as u64, "error count")?)
        .bind(to_i64(deposit.revision(), "revision")?)
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Duplicate(format!("deposit {}", deposit.deposit_uuid()))
            } else {
                db_error(e)
            }
        })?;
        Ok(())
    }

    async fn update_deposit(&self, deposit: &mut Deposit) -> StoreResult<()> {
        let current = deposit.revision();
        let next = current + 1;

        let mut updated = deposit.clone();
        updated.set_revision(next);
        let body = serde_json::to_string(&updated)?;

        let result = sqlx::query(
            "UPDATE deposits SET state = ?1, error_count = ?2, revision = ?3, body = ?4
             WHERE id = ?5 AND revision = ?6",
        )
        .bind(updated.state().as_str())
        .bind(to_i64(updated.error_count() as u64, "error count")?)
        .bind(to_i64(next, "revision")?)
        .bind(body)
        .bind(updated.id().to_string())
        .bind(to_i64(current, "revision")?)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return match self.get_deposit(deposit.id()).await? {
                Some(stored) => Err(StoreError::Conflict(format!(
                    "deposit {} is at revision {}, update was based on {}",
                    deposit.id(),
                    stored.revision(),
                    current
                ))),
                None => Err(StoreError::NotFound(format!("deposit {}", deposit.id()))),
            };
        }

        deposit.set_revision(next);
        Ok(())
    }

    async fn get_deposit(&self, id: DepositId) -> StoreResult<Option<Deposit>> {
        sqlx::query_as::<_, BodyRow>("SELECT body FROM deposits WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .map(decode)
            .transpose()
    }

    async fn find_deposit_by_uuid(&self, deposit_uuid: &str) -> StoreResult<Option<Deposit>> {
        Ok(self
            .deposits_by("deposit_uuid", deposit_uuid.trim().to_ascii_uppercase())
            .await?
            .into_iter()
            .next())
    }

    async fn deposits_for_journal(&self, journal: JournalId) -> StoreResult<Vec<Deposit>> {
        self.deposits_by("journal_id", journal.to_string()).await
    }

    async fn deposits_in_state(&self, state: DepositState) -> StoreResult<Vec<Deposit>> {
        self.deposits_by("state", state.as_str().to_string()).await
    }

    async fn deposits_with_errors(&self) -> StoreResult<Vec<Deposit>> {
        decode_all(
            self.bodies("SELECT body FROM deposits WHERE error_count > 0 ORDER BY rowid")
                .await?,
        )
    }

    async fn search_deposits(&self, query: &str) -> StoreResult<Vec<Deposit>> {
        let all: Vec<Deposit> =
            decode_all(self.bodies("SELECT body FROM deposits ORDER BY rowid").await?)?;
        Ok(all.into_iter().filter(|d| d.matches(query)).collect())
    }

    async fn count_deposits(&self, journal: JournalId) -> StoreResult<usize> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM deposits WHERE journal_id = ?1")
            .bind(journal.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        usize::try_from(count).map_err(|_| StoreError::Database(format!("bad count {}", count)))
    }
}

#[async_trait]
impl AuditStore for SqliteStore {
    async fn append_audit(&self, entry: &AuditEntry) -> StoreResult<()> {
        let body = serde_json::to_string(entry)?;
        sqlx::query("INSERT INTO audit (journal_uuid, body) VALUES (?1, ?2)")
            .bind(&entry.journal_uuid)
            .bind(body)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn audit_entries(&self) -> StoreResult<Vec<AuditEntry>> {
        decode_all(self.bodies("SELECT body FROM audit ORDER BY seq").await?)
    }
}
