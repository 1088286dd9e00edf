//! Local versioned storage in SQLite.
//!
//! Single-writer and offline. Each write replaces the row in `files` and
//! appends an event to `history` inside one transaction. Version tokens are
//! synthesized as `{content-hash}-{millis}-{sequence}`, so writing identical
//! content twice still yields two distinct tokens.

mod db;

use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::{SqliteConnection, SqlitePool};
use tokio::sync::Mutex;

use crate::adapter::{validate_path, StorageAdapter};
use crate::bundle::{Bundle, BundleType};
use crate::error::StorageError;
use crate::model::{
    normalize_path, Author, File, HistoryEntry, ListEntry, ModeInfo, StorageMode, WriteRequest,
    WriteResult,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSettings {
    pub database_path: PathBuf,
    pub author: Author,
}

impl LocalSettings {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            author: Author::default(),
        }
    }

    pub fn with_author(mut self, author: Author) -> Self {
        self.author = author;
        self
    }
}

#[derive(sqlx::FromRow)]
struct FileRow {
    path: String,
    content: String,
    version_token: String,
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    path: String,
    version_token: String,
    message: String,
    author: String,
    timestamp: String,
    parent_token: Option<String>,
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = StorageError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let timestamp = DateTime::parse_from_rfc3339(&row.timestamp)
            .map_err(|e| StorageError::Encoding(format!("bad timestamp in history: {}", e)))?
            .with_timezone(&Utc);
        Ok(HistoryEntry {
            id: row.version_token,
            message: row.message,
            author: row.author,
            timestamp,
            parent_id: row.parent_token,
            path: Some(row.path),
        })
    }
}

const HISTORY_SELECT: &str = r#"
    SELECT h.path, h.version_token, h.message, h.author, h.timestamp,
        (SELECT p.version_token FROM history p
         WHERE p.path = h.path AND p.id < h.id
         ORDER BY p.id DESC LIMIT 1) AS parent_token
    FROM history h
"#;

/// One row of the change log.
struct Event<'a> {
    path: &'a str,
    version_token: &'a str,
    action: &'static str,
    message: &'a str,
    author: &'a str,
    content_hash: &'a str,
    timestamp: DateTime<Utc>,
}

async fn append_event(conn: &mut SqliteConnection, event: &Event<'_>) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO history (path, version_token, action, message, author, content_hash, timestamp)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.path)
    .bind(event.version_token)
    .bind(event.action)
    .bind(event.message)
    .bind(event.author)
    .bind(event.content_hash)
    .bind(event.timestamp.to_rfc3339())
    .execute(conn)
    .await?;
    Ok(())
}

async fn next_sequence(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) + 1 FROM history")
        .fetch_one(conn)
        .await
}

fn content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

fn version_token(hash: &str, timestamp: DateTime<Utc>, sequence: i64) -> String {
    format!("{}-{}-{}", &hash[..12], timestamp.timestamp_millis(), sequence)
}

const MODE_INFO: ModeInfo = ModeInfo {
    mode: StorageMode::Local,
    name: "Local storage",
    description: "Files are kept in a database on this machine.",
    requires_network: false,
    supports_history: true,
    supports_branches: false,
    supports_export: true,
    capabilities: &["works offline", "change history", "export and import"],
    limitations: &["single device", "no sync"],
};

/// Adapter for the local SQLite store.
#[derive(Debug, Default)]
pub struct LocalVersionedAdapter {
    settings: Option<LocalSettings>,
    pool: Option<SqlitePool>,
    /// Held across each write transaction. SQLite cannot upgrade two
    /// overlapping read transactions to writes.
    writer: Mutex<()>,
}

impl LocalVersionedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn pool(&self) -> Result<&SqlitePool, StorageError> {
        self.pool.as_ref().ok_or(StorageError::NotConfigured)
    }

    fn author(&self) -> &str {
        self.settings
            .as_ref()
            .map(|s| s.author.name.as_str())
            .unwrap_or_default()
    }

    /// Exports every file with the full change log.
    pub async fn export(&self) -> Result<Bundle, StorageError> {
        let pool = self.pool()?;

        let files: Vec<FileRow> =
            sqlx::query_as("SELECT path, content, version_token FROM files ORDER BY path")
                .fetch_all(pool)
                .await?;
        let rows: Vec<HistoryRow> =
            sqlx::query_as(&format!("{} ORDER BY h.id DESC", HISTORY_SELECT))
                .fetch_all(pool)
                .await?;

        let files: Vec<File> = files
            .into_iter()
            .map(|r| File {
                path: r.path,
                content: r.content,
                version_token: r.version_token,
            })
            .collect();
        let history = rows
            .into_iter()
            .map(HistoryEntry::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!("Exported {} files and {} events", files.len(), history.len());
        Ok(Bundle::new(BundleType::LocalExport, files, history))
    }

    /// Replaces the whole store with the bundle's files and history.
    ///
    /// The envelope and paths are checked first; the replacement runs in one
    /// transaction, so a failure leaves the previous contents intact.
    pub async fn import(&self, bundle: &Bundle) -> Result<usize, StorageError> {
        bundle.validate(BundleType::LocalExport)?;
        let paths = bundle
            .files
            .iter()
            .map(|f| validate_path(&f.path))
            .collect::<Result<Vec<_>, _>>()?;

        let pool = self.pool()?;
        let _writer = self.writer.lock().await;
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM files").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM history").execute(&mut *tx).await?;

        let now = Utc::now().to_rfc3339();
        for (path, file) in paths.iter().zip(&bundle.files) {
            sqlx::query(
                "INSERT INTO files (path, content, version_token, updated_at) VALUES (?, ?, ?, ?)",
            )
            .bind(path)
            .bind(&file.content)
            .bind(&file.version_token)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        // Oldest first so row ids keep causal order.
        for entry in bundle.history.iter().rev() {
            let Some(path) = entry.path.as_deref() else {
                continue;
            };
            append_event(
                &mut tx,
                &Event {
                    path,
                    version_token: &entry.id,
                    action: "put",
                    message: &entry.message,
                    author: &entry.author,
                    content_hash: "",
                    timestamp: entry.timestamp,
                },
            )
            .await?;
        }

        tx.commit().await?;
        tracing::info!("Imported {} files", bundle.files.len());
        Ok(bundle.files.len())
    }
}

impl StorageAdapter for LocalVersionedAdapter {
    type Settings = LocalSettings;

    async fn configure(&mut self, settings: LocalSettings) -> Result<(), StorageError> {
        if settings.database_path.as_os_str().is_empty() {
            return Err(StorageError::InvalidSettings(
                "local storage requires 'database_path'".to_string(),
            ));
        }

        let reuse = matches!(
            (&self.settings, &self.pool),
            (Some(current), Some(_)) if current.database_path == settings.database_path
        );
        if !reuse {
            self.pool = Some(db::init_db(&settings.database_path).await?);
            tracing::info!(
                "Configured local storage at {}",
                settings.database_path.display()
            );
        }

        self.settings = Some(settings);
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.pool.is_some()
    }

    async fn get_file(&self, path: &str) -> Result<Option<File>, StorageError> {
        let path = validate_path(path)?;
        let row: Option<FileRow> =
            sqlx::query_as("SELECT path, content, version_token FROM files WHERE path = ?")
                .bind(&path)
                .fetch_optional(self.pool()?)
                .await?;

        Ok(row.map(|r| File {
            path: r.path,
            content: r.content,
            version_token: r.version_token,
        }))
    }

    async fn put_file(&self, request: WriteRequest) -> Result<WriteResult, StorageError> {
        let path = validate_path(&request.path)?;
        let pool = self.pool()?;
        let _writer = self.writer.lock().await;
        let mut tx = pool.begin().await?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT version_token FROM files WHERE path = ?")
                .bind(&path)
                .fetch_optional(&mut *tx)
                .await?;

        if let Some(expected) = request.expected_version_token.as_deref() {
            if !request.force && current.as_deref() != Some(expected) {
                tracing::warn!("Conflict writing {}: expected {}", path, expected);
                return Err(StorageError::conflict(
                    &path,
                    format!(
                        "expected version {} but the current version is {}",
                        expected,
                        current.as_deref().unwrap_or("absent")
                    ),
                ));
            }
        }

        let now = Utc::now();
        let hash = content_hash(&request.content);
        let sequence = next_sequence(&mut tx).await?;
        let token = version_token(&hash, now, sequence);

        sqlx::query(
            r#"
            INSERT INTO files (path, content, version_token, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                content = excluded.content,
                version_token = excluded.version_token,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&path)
        .bind(&request.content)
        .bind(&token)
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        append_event(
            &mut tx,
            &Event {
                path: &path,
                version_token: &token,
                action: "put",
                message: &request.message,
                author: self.author(),
                content_hash: &hash,
                timestamp: now,
            },
        )
        .await?;

        tx.commit().await?;
        tracing::debug!("Wrote {} as {}", path, token);
        Ok(WriteResult {
            version_token: token,
        })
    }

    async fn delete_file(&self, path: &str, message: &str) -> Result<(), StorageError> {
        let path = validate_path(path)?;
        let pool = self.pool()?;
        let _writer = self.writer.lock().await;
        let mut tx = pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM files WHERE path = ?")
            .bind(&path)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(StorageError::NotFound(path));
        }

        let now = Utc::now();
        let sequence = next_sequence(&mut tx).await?;
        let token = version_token(&content_hash(""), now, sequence);
        append_event(
            &mut tx,
            &Event {
                path: &path,
                version_token: &token,
                action: "delete",
                message,
                author: self.author(),
                content_hash: "",
                timestamp: now,
            },
        )
        .await?;

        tx.commit().await?;
        tracing::debug!("Deleted {}", path);
        Ok(())
    }

    async fn list_files(&self, path: &str) -> Result<Vec<ListEntry>, StorageError> {
        let dir = normalize_path(path);
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };

        let paths: Vec<String> = sqlx::query_scalar(
            "SELECT path FROM files WHERE substr(path, 1, length(?)) = ? ORDER BY path",
        )
        .bind(&prefix)
        .bind(&prefix)
        .fetch_all(self.pool()?)
        .await?;

        let mut dirs = BTreeSet::new();
        let mut entries = Vec::new();
        for full in paths {
            let rest = &full[prefix.len()..];
            match rest.split_once('/') {
                Some((child, _)) => {
                    dirs.insert(format!("{}{}", prefix, child));
                }
                None => entries.push(ListEntry::file(full.clone())),
            }
        }
        entries.extend(dirs.into_iter().map(ListEntry::dir));
        Ok(entries)
    }

    async fn get_history(
        &self,
        path: &str,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, StorageError> {
        let path = validate_path(path)?;
        let rows: Vec<HistoryRow> = sqlx::query_as(&format!(
            "{} WHERE h.path = ? ORDER BY h.id DESC LIMIT ?",
            HISTORY_SELECT
        ))
        .bind(&path)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(self.pool()?)
        .await?;

        rows.into_iter().map(HistoryEntry::try_from).collect()
    }

    async fn check_connection(&self) -> bool {
        match &self.pool {
            Some(pool) => sqlx::query("SELECT 1").execute(pool).await.is_ok(),
            None => false,
        }
    }

    fn mode_info(&self) -> ModeInfo {
        MODE_INFO
    }
}
