//! The record sink: one SQLite row per unit, upsert semantics, with an
//! optional per-record file mirror. Writes serialize behind the pool's
//! single connection, so concurrent workers cannot interleave a row.

use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::info;

use crate::error::HarvestError;

pub struct RecordSink {
    pool: Pool<Sqlite>,
    records_dir: Option<PathBuf>,
}

impl RecordSink {
    pub async fn connect(
        db_path: &Path,
        records_dir: Option<PathBuf>,
    ) -> Result<Self, HarvestError> {
        info!(path = %db_path.display(), "opening record store");

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                json TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        if let Some(dir) = &records_dir {
            std::fs::create_dir_all(dir)?;
        }

        Ok(Self { pool, records_dir })
    }

    /// Upsert one record. Re-attempts of the same unit overwrite rather
    /// than duplicate, so a crashed run can safely redo work.
    pub async fn put(&self, id: &str, payload: &[u8]) -> Result<(), HarvestError> {
        let json = String::from_utf8_lossy(payload);
        sqlx::query("INSERT OR REPLACE INTO records (id, json) VALUES (?, ?)")
            .bind(id)
            .bind(json.as_ref())
            .execute(&self.pool)
            .await?;

        if let Some(dir) = &self.records_dir {
            tokio::fs::write(dir.join(format!("{id}.json")), payload).await?;
        }

        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<String>, HarvestError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT json FROM records WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(json,)| json))
    }

    pub async fn count(&self) -> Result<i64, HarvestError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordSink::connect(&dir.path().join("records.db"), None)
            .await
            .unwrap();

        sink.put("24-001", br#"{"contract": "24-001"}"#).await.unwrap();
        assert_eq!(
            sink.get("24-001").await.unwrap().as_deref(),
            Some(r#"{"contract": "24-001"}"#)
        );
        assert_eq!(sink.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_is_an_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordSink::connect(&dir.path().join("records.db"), None)
            .await
            .unwrap();

        sink.put("a", b"{\"v\": 1}").await.unwrap();
        sink.put("a", b"{\"v\": 2}").await.unwrap();

        assert_eq!(sink.count().await.unwrap(), 1);
        assert_eq!(sink.get("a").await.unwrap().as_deref(), Some("{\"v\": 2}"));
    }

    #[tokio::test]
    async fn dual_write_mirrors_to_files() {
        let dir = tempfile::tempdir().unwrap();
        let records_dir = dir.path().join("records");
        let sink = RecordSink::connect(
            &dir.path().join("records.db"),
            Some(records_dir.clone()),
        )
        .await
        .unwrap();

        sink.put("77", b"{\"id\": 77}").await.unwrap();
        let mirrored = std::fs::read_to_string(records_dir.join("77.json")).unwrap();
        assert_eq!(mirrored, "{\"id\": 77}");
    }
}
