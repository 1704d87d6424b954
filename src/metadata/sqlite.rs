//! SQLite-backed [`MetadataStore`].

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{BulkWriteOutcome, MetadataStore, WriteError};
use crate::error::IngestError;
use crate::model::{
    BoundingBox, DatasetId, DatasetLocation, DatasetRecord, ImageEntry, ImageRecord,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS datasets (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    source_zip TEXT,
    source_prefix TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY,
    dataset_id TEXT NOT NULL REFERENCES datasets(id),
    image_path TEXT NOT NULL,
    labels TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

const INDEXES: &str = "
CREATE UNIQUE INDEX IF NOT EXISTS uq_dataset_name ON datasets(name);
CREATE UNIQUE INDEX IF NOT EXISTS uq_image_path_per_dataset ON images(dataset_id, image_path);
CREATE INDEX IF NOT EXISTS ix_images_dataset_id ON images(dataset_id);
CREATE INDEX IF NOT EXISTS ix_images_image_path ON images(image_path);
";

/// Metadata store over a single SQLite connection.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: String,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, IngestError> {
        let conn = Connection::open(path)?;
        let store = Self::with_connection(conn, path.display().to_string())?;
        tracing::info!(db = %store.db_path, "metadata store opened");
        Ok(store)
    }

    /// A private in-memory database, mainly for tests and dry runs.
    pub fn in_memory() -> Result<Self, IngestError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, ":memory:".to_string())
    }

    fn with_connection(conn: Connection, db_path: String) -> Result<Self, IngestError> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        conn.execute_batch(INDEXES)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MetadataStore for SqliteStore {
    fn ensure_indexes(&self) -> Result<(), IngestError> {
        self.conn().execute_batch(INDEXES)?;
        Ok(())
    }

    fn upsert_dataset(
        &self,
        name: &str,
        location: &DatasetLocation,
        now: DateTime<Utc>,
    ) -> Result<DatasetId, IngestError> {
        let conn = self.conn();
        let now = now.to_rfc3339();
        conn.execute(
            "INSERT INTO datasets (id, name, source_zip, source_prefix, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(name) DO UPDATE SET
                source_zip = excluded.source_zip,
                source_prefix = excluded.source_prefix,
                updated_at = excluded.updated_at",
            params![
                DatasetId::generate().as_str(),
                name,
                location.archive(),
                location.prefix(),
                now,
            ],
        )?;

        let id: String = conn.query_row(
            "SELECT id FROM datasets WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(DatasetId::new(id))
    }

    fn bulk_upsert_images(
        &self,
        dataset_id: &DatasetId,
        chunk: &[ImageEntry],
        now: DateTime<Utc>,
    ) -> Result<BulkWriteOutcome, IngestError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = now.to_rfc3339();
        let mut outcome = BulkWriteOutcome::default();

        {
            let mut exists = tx.prepare_cached(
                "SELECT EXISTS(SELECT 1 FROM images WHERE dataset_id = ?1 AND image_path = ?2)",
            )?;
            let mut upsert = tx.prepare_cached(
                "INSERT INTO images (dataset_id, image_path, labels, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(dataset_id, image_path) DO UPDATE SET
                    labels = excluded.labels,
                    updated_at = excluded.updated_at",
            )?;

            for entry in chunk {
                let row = encode_labels(entry).and_then(|labels| {
                    let existed: bool = exists
                        .query_row(params![dataset_id.as_str(), entry.image_path], |row| {
                            row.get(0)
                        })?;
                    upsert.execute(params![dataset_id.as_str(), entry.image_path, labels, now])?;
                    Ok(existed)
                });

                match row {
                    Ok(true) => outcome.modified += 1,
                    Ok(false) => outcome.inserted += 1,
                    Err(error) => outcome.errors.push(WriteError {
                        image_path: entry.image_path.clone(),
                        message: error.to_string(),
                    }),
                }
            }
        }

        tx.commit()?;
        Ok(outcome)
    }

    fn find_dataset(&self, name: &str) -> Result<Option<DatasetRecord>, IngestError> {
        let record = self
            .conn()
            .query_row(
                "SELECT id, name, source_zip, source_prefix, created_at, updated_at
                 FROM datasets WHERE name = ?1",
                params![name],
                dataset_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn list_datasets(&self) -> Result<Vec<DatasetRecord>, IngestError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, source_zip, source_prefix, created_at, updated_at
             FROM datasets ORDER BY name",
        )?;
        let records = stmt
            .query_map([], dataset_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn list_images(
        &self,
        dataset_id: &DatasetId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ImageRecord>, IngestError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT image_path, labels, created_at, updated_at
             FROM images WHERE dataset_id = ?1
             ORDER BY image_path LIMIT ?2 OFFSET ?3",
        )?;
        let records = stmt
            .query_map(
                params![dataset_id.as_str(), to_sql_count(limit), to_sql_count(offset)],
                |row| {
                    Ok(ImageRecord {
                        dataset_id: dataset_id.clone(),
                        image_path: row.get(0)?,
                        labels: decode_labels(row, 1)?,
                        created_at: timestamp(row, 2)?,
                        updated_at: timestamp(row, 3)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn count_images(&self, dataset_id: &DatasetId) -> Result<usize, IngestError> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM images WHERE dataset_id = ?1",
            params![dataset_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

fn encode_labels(entry: &ImageEntry) -> Result<String, IngestError> {
    serde_json::to_string(&entry.labels).map_err(|source| IngestError::LabelsEncode {
        image_path: entry.image_path.clone(),
        source,
    })
}

fn to_sql_count(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn dataset_from_row(row: &Row<'_>) -> rusqlite::Result<DatasetRecord> {
    let source_zip: Option<String> = row.get(2)?;
    let source_prefix: Option<String> = row.get(3)?;
    let location = match (source_zip, source_prefix) {
        (Some(uri), _) => Some(DatasetLocation::Archive(uri)),
        (None, Some(uri)) => Some(DatasetLocation::Prefix(uri)),
        (None, None) => None,
    };

    Ok(DatasetRecord {
        id: DatasetId::new(row.get::<_, String>(0)?),
        name: row.get(1)?,
        location,
        created_at: timestamp(row, 4)?,
        updated_at: timestamp(row, 5)?,
    })
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|source| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(source)))
}

fn decode_labels(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<BoundingBox>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|source| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(source)))
}
