//! Durable passage storage on SQLite with `sqlite-vec` similarity search.
//!
//! One database file holds every topic collection: passage rows carry a
//! `topic` column, embeddings live in a sibling table and are compared
//! with `vec_distance_cosine`. Collections survive process restarts.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;

use async_trait::async_trait;
use tokio_rusqlite::{Connection, ffi, rusqlite};

use super::{PassageRecord, VectorStore};
use crate::types::{ParlorError, Topic};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS topics (
    name TEXT PRIMARY KEY
);
CREATE TABLE IF NOT EXISTS passages (
    id          TEXT PRIMARY KEY,
    topic       TEXT NOT NULL,
    source      TEXT NOT NULL,
    page        INTEGER,
    chunk_index INTEGER NOT NULL,
    content     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_passages_topic ON passages(topic);
CREATE TABLE IF NOT EXISTS passage_embeddings (
    id        TEXT PRIMARY KEY,
    embedding BLOB NOT NULL
);
";

/// SQLite-backed [`VectorStore`] using the `sqlite-vec` extension.
#[derive(Clone)]
pub struct SqlitePassageStore {
    conn: Connection,
}

impl SqlitePassageStore {
    /// Opens (or creates) the database at `path` and applies the schema.
    ///
    /// Registers the `sqlite-vec` extension process-wide on first use and
    /// verifies it loaded by querying `vec_version()`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ParlorError> {
        Self::register_sqlite_vec()?;
        let conn = Connection::open(path)
            .await
            .map_err(|err| ParlorError::Storage(err.to_string()))?;

        conn.call::<_, _, rusqlite::Error>(|conn| {
            conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0))?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await
        .map_err(|err| ParlorError::Storage(err.to_string()))?;

        Ok(Self { conn })
    }

    fn register_sqlite_vec() -> Result<(), ParlorError> {
        use std::sync::Mutex;

        static INIT: Once = Once::new();
        static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

        INIT.call_once(|| {
            let result = unsafe {
                type SqliteExtensionInit = unsafe extern "C" fn(
                    *mut ffi::sqlite3,
                    *mut *mut c_char,
                    *const ffi::sqlite3_api_routines,
                ) -> i32;

                let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
                let init_fn: SqliteExtensionInit =
                    transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
                let rc = ffi::sqlite3_auto_extension(Some(init_fn));
                if rc != 0 {
                    Err(format!(
                        "failed to register sqlite-vec extension (code {rc})"
                    ))
                } else {
                    Ok(())
                }
            };
            *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
        });

        INIT_RESULT
            .lock()
            .expect("init result mutex poisoned")
            .clone()
            .expect("init was called but result not set")
            .map_err(ParlorError::Storage)
    }
}

#[async_trait]
impl VectorStore for SqlitePassageStore {
    async fn ensure_collection(&self, topic: &Topic) -> Result<(), ParlorError> {
        let name = topic.as_str().to_string();
        self.conn
            .call::<_, _, rusqlite::Error>(move |conn| {
                conn.execute("INSERT OR IGNORE INTO topics (name) VALUES (?)", [&name])?;
                Ok(())
            })
            .await
            .map_err(|err| ParlorError::Storage(err.to_string()))
    }

    async fn add(&self, records: Vec<(PassageRecord, Vec<f32>)>) -> Result<(), ParlorError> {
        if records.is_empty() {
            return Ok(());
        }

        // sqlite-vec accepts a JSON array through vec_f32() and stores the
        // canonical float32 blob.
        let mut rows = Vec::with_capacity(records.len());
        for (record, vector) in records {
            let embedding_json = serde_json::to_string(&vector)
                .map_err(|err| ParlorError::Storage(err.to_string()))?;
            rows.push((record, embedding_json));
        }

        self.conn
            .call::<_, _, rusqlite::Error>(move |conn| {
                let tx = conn
                    .transaction()?;
                for (record, embedding_json) in rows {
                    tx.execute(
                        "INSERT INTO passages (id, topic, source, page, chunk_index, content) \
                         VALUES (?, ?, ?, ?, ?, ?)",
                        (
                            record.id.as_str(),
                            record.topic.as_str(),
                            record.source.as_str(),
                            record.page.map(i64::from),
                            record.chunk_index as i64,
                            record.content.as_str(),
                        ),
                    )?;
                    tx.execute(
                        "INSERT INTO passage_embeddings (id, embedding) VALUES (?, vec_f32(?))",
                        (record.id.as_str(), embedding_json.as_str()),
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|err| ParlorError::Storage(err.to_string()))
    }

    async fn query(
        &self,
        topic: &Topic,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<(PassageRecord, f32)>, ParlorError> {
        let embedding_json = serde_json::to_string(embedding)
            .map_err(|err| ParlorError::Storage(err.to_string()))?;
        let topic_name = topic.as_str().to_string();

        self.conn
            .call::<_, _, rusqlite::Error>(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT p.id, p.topic, p.source, p.page, p.chunk_index, p.content, \
                         vec_distance_cosine(e.embedding, vec_f32(?)) AS distance \
                         FROM passages p \
                         JOIN passage_embeddings e ON p.id = e.id \
                         WHERE p.topic = ? \
                         ORDER BY distance ASC \
                         LIMIT {k}"
                    ))?;

                let rows = stmt
                    .query_map(
                        (embedding_json.as_str(), topic_name.as_str()),
                        |row| {
                            let record = PassageRecord {
                                id: row.get(0)?,
                                topic: row.get(1)?,
                                source: row.get(2)?,
                                page: row.get::<_, Option<i64>>(3)?.map(|p| p as u32),
                                chunk_index: row.get::<_, i64>(4)? as usize,
                                content: row.get(5)?,
                            };
                            let distance: f32 = row.get(6)?;
                            // Cosine distance to similarity.
                            Ok((record, 1.0 - distance))
                        },
                    )?;

                let mut results = Vec::new();
                for row in rows {
                    results.push(row?);
                }
                Ok(results)
            })
            .await
            .map_err(|err| ParlorError::Storage(err.to_string()))
    }

    async fn count(&self, topic: &Topic) -> Result<usize, ParlorError> {
        let topic_name = topic.as_str().to_string();
        self.conn
            .call::<_, _, rusqlite::Error>(move |conn| {
                let count: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM passages WHERE topic = ?",
                        [&topic_name],
                        |row| row.get(0),
                    )?;
                Ok(count as usize)
            })
            .await
            .map_err(|err| ParlorError::Storage(err.to_string()))
    }
}
