use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use uuid::Uuid;

use crate::core::{
    errors::{VaultSyncError, VaultSyncResult},
    models::{SecretRecord, SyncStatus},
};
use crate::storage::record_store::{SYNC_CURSOR_KEY, SecretStore};

const SCHEMA_VERSION: i64 = 1;

const RECORD_COLUMNS: &str = "local_id, server_id, login, password, metadata, binary_data, \
     version, sync_status, created_at, updated_at, deleted_at";

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> VaultSyncResult<Self> {
        let normalized_url = Self::normalize_sqlite_url(database_url);
        let pool = SqlitePool::connect(&normalized_url).await?;
        Ok(Self { pool })
    }

    fn normalize_sqlite_url(database_url: &str) -> String {
        if !database_url.starts_with("sqlite://") {
            return database_url.to_owned();
        }

        if database_url.contains("mode=") {
            return database_url.to_owned();
        }

        if database_url.contains('?') {
            format!("{database_url}&mode=rwc")
        } else {
            format!("{database_url}?mode=rwc")
        }
    }

    fn status_to_str(status: SyncStatus) -> &'static str {
        match status {
            SyncStatus::Synced => "synced",
            SyncStatus::Pending => "pending",
            SyncStatus::Deleted => "deleted",
        }
    }

    fn parse_status(value: &str) -> VaultSyncResult<SyncStatus> {
        match value {
            "synced" => Ok(SyncStatus::Synced),
            "pending" => Ok(SyncStatus::Pending),
            "deleted" => Ok(SyncStatus::Deleted),
            _ => Err(VaultSyncError::Storage),
        }
    }

    fn parse_timestamp(value: &str) -> VaultSyncResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(|_| VaultSyncError::Storage)
    }

    fn record_from_row(row: &SqliteRow) -> VaultSyncResult<SecretRecord> {
        let local_id_text: String = row.try_get("local_id")?;
        let status_text: String = row.try_get("sync_status")?;
        let metadata_text: String = row.try_get("metadata")?;
        let created_at_text: String = row.try_get("created_at")?;
        let updated_at_text: String = row.try_get("updated_at")?;
        let deleted_at_text: Option<String> = row.try_get("deleted_at")?;

        let metadata: BTreeMap<String, String> =
            serde_json::from_str(&metadata_text).map_err(|_| VaultSyncError::Storage)?;

        let deleted_at = deleted_at_text
            .as_deref()
            .map(Self::parse_timestamp)
            .transpose()?;

        Ok(SecretRecord {
            local_id: Uuid::parse_str(&local_id_text).map_err(|_| VaultSyncError::Storage)?,
            server_id: row.try_get("server_id")?,
            login: row.try_get("login")?,
            password: row.try_get("password")?,
            metadata,
            binary_data: row.try_get("binary_data")?,
            version: row.try_get("version")?,
            sync_status: Self::parse_status(&status_text)?,
            created_at: Self::parse_timestamp(&created_at_text)?,
            updated_at: Self::parse_timestamp(&updated_at_text)?,
            deleted_at,
        })
    }

    async fn fetch_records(&self, query: &str, bind: Option<&str>) -> VaultSyncResult<Vec<SecretRecord>> {
        let mut statement = sqlx::query(query);
        if let Some(value) = bind {
            statement = statement.bind(value.to_owned());
        }
        let rows = statement.fetch_all(&self.pool).await?;
        rows.iter().map(Self::record_from_row).collect()
    }
}

#[async_trait]
impl SecretStore for SqliteStore {
    async fn init(&self) -> VaultSyncResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_meta (
                id INTEGER PRIMARY KEY,
                schema_version INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "INSERT INTO schema_meta (id, schema_version)
             VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET schema_version = excluded.schema_version",
        )
        .bind(SCHEMA_VERSION)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS secrets (
                local_id TEXT PRIMARY KEY,
                server_id TEXT UNIQUE,
                login TEXT NOT NULL,
                password TEXT NOT NULL,
                metadata TEXT NOT NULL,
                binary_data BLOB,
                version INTEGER NOT NULL,
                sync_status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sync_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn add(&self, record: &SecretRecord) -> VaultSyncResult<()> {
        sqlx::query(&format!(
            "INSERT INTO secrets ({RECORD_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ))
        .bind(record.local_id.to_string())
        .bind(&record.server_id)
        .bind(&record.login)
        .bind(&record.password)
        .bind(serde_json::to_string(&record.metadata)?)
        .bind(&record.binary_data)
        .bind(record.version)
        .bind(Self::status_to_str(record.sync_status))
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .bind(record.deleted_at.map(|at| at.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn put(&self, record: &SecretRecord) -> VaultSyncResult<()> {
        sqlx::query(&format!(
            "INSERT INTO secrets ({RECORD_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(local_id) DO UPDATE SET
               server_id=excluded.server_id,
               login=excluded.login,
               password=excluded.password,
               metadata=excluded.metadata,
               binary_data=excluded.binary_data,
               version=excluded.version,
               sync_status=excluded.sync_status,
               created_at=excluded.created_at,
               updated_at=excluded.updated_at,
               deleted_at=excluded.deleted_at"
        ))
        .bind(record.local_id.to_string())
        .bind(&record.server_id)
        .bind(&record.login)
        .bind(&record.password)
        .bind(serde_json::to_string(&record.metadata)?)
        .bind(&record.binary_data)
        .bind(record.version)
        .bind(Self::status_to_str(record.sync_status))
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .bind(record.deleted_at.map(|at| at.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, local_id: Uuid) -> VaultSyncResult<()> {
        sqlx::query("DELETE FROM secrets WHERE local_id = ?1")
            .bind(local_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, local_id: Uuid) -> VaultSyncResult<Option<SecretRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM secrets WHERE local_id = ?1"
        ))
        .bind(local_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn get_by_server_id(&self, server_id: &str) -> VaultSyncResult<Option<SecretRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM secrets WHERE server_id = ?1"
        ))
        .bind(server_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn list_active(&self) -> VaultSyncResult<Vec<SecretRecord>> {
        self.fetch_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM secrets
                 WHERE sync_status != 'deleted'
                 ORDER BY updated_at DESC"
            ),
            None,
        )
        .await
    }

    async fn query_by_sync_status(
        &self,
        status: SyncStatus,
    ) -> VaultSyncResult<Vec<SecretRecord>> {
        self.fetch_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM secrets
                 WHERE sync_status = ?1
                 ORDER BY updated_at ASC"
            ),
            Some(Self::status_to_str(status)),
        )
        .await
    }

    async fn list_unsynced(&self) -> VaultSyncResult<Vec<SecretRecord>> {
        self.fetch_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM secrets
                 WHERE sync_status IN ('pending', 'deleted')
                 ORDER BY updated_at ASC"
            ),
            None,
        )
        .await
    }

    async fn unsynced_count(&self) -> VaultSyncResult<usize> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS unsynced FROM secrets
             WHERE sync_status IN ('pending', 'deleted')",
        )
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.try_get("unsynced")?;
        usize::try_from(count).map_err(|_| VaultSyncError::Storage)
    }

    async fn sync_cursor(&self) -> VaultSyncResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM sync_meta WHERE key = ?1")
            .bind(SYNC_CURSOR_KEY)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.try_get::<String, _>("value").map_err(VaultSyncError::from))
            .transpose()
    }

    async fn set_sync_cursor(&self, value: &str) -> VaultSyncResult<()> {
        sqlx::query(
            "INSERT INTO sync_meta (key, value)
             VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(SYNC_CURSOR_KEY)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
