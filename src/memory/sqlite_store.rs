//! The concrete SQLite-backed `MemoryStore`, grounded on subcog's
//! `storage::sqlite` (connection/WAL setup, row-mapping helpers) and
//! `storage::resilience` (retry-wrapped writes).

use super::{recency_boost, score, MemoryStore};
use crate::config::StorageConfig;
use crate::embedding::cosine_similarity;
use crate::models::{Memory, MemoryId, ScoredMemory, Source, SseMode};
use crate::storage::retry_with_backoff;
use crate::{current_timestamp, Error, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::str::FromStr;
use std::sync::Mutex;

/// SQLite-backed memory store. All reads and writes serialize through a
/// single connection guarded by a mutex; SQLite's own file locking plus
/// [`retry_with_backoff`] handle contention from other processes.
pub struct SqliteMemoryStore {
    conn: Mutex<Connection>,
    config: StorageConfig,
}

impl SqliteMemoryStore {
    /// Opens (or creates) the database at `config.database_path` and runs
    /// migrations.
    ///
    /// # Errors
    ///
    /// Returns `Error::OperationFailed` if the database cannot be opened
    /// or migrated.
    pub fn open(config: StorageConfig) -> Result<Self> {
        let conn = crate::storage::open_connection(&config.database_path, &config)?;
        crate::storage::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config,
        })
    }

    /// Opens an in-memory store, for tests.
    ///
    /// # Errors
    ///
    /// Returns `Error::OperationFailed` if the connection cannot be set up.
    pub fn open_in_memory() -> Result<Self> {
        let config = StorageConfig::default();
        let conn = crate::storage::connection::open_in_memory(&config)?;
        crate::storage::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::OperationFailed {
            operation: "lock_connection".to_string(),
            cause: "connection mutex poisoned".to_string(),
        })
    }

    fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn decode_embedding(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|chunk| {
                let bytes: [u8; 4] = chunk.try_into().unwrap_or([0; 4]);
                f32::from_le_bytes(bytes)
            })
            .collect()
    }

    fn row_to_memory(row: &Row<'_>) -> rusqlite::Result<Memory> {
        let id: String = row.get("id")?;
        let text: String = row.get("text")?;
        let source: String = row.get("source")?;
        let embedding_blob: Vec<u8> = row.get("embedding")?;
        let trust: f64 = row.get("trust")?;
        let confidence_declared: f64 = row.get("confidence_declared")?;
        let timestamp_created: i64 = row.get("timestamp_created")?;
        let timestamp_last_seen: i64 = row.get("timestamp_last_seen")?;
        let reinforcement_count: i64 = row.get("reinforcement_count")?;
        let context_json: String = row.get("context")?;
        let sse_mode: String = row.get("sse_mode")?;
        let retired: i64 = row.get("retired")?;
        let user_marked_important: i64 = row.get("user_marked_important")?;

        let source = Source::from_str(&source).unwrap_or(Source::User);
        let sse_mode = match sse_mode.as_str() {
            "uncertain" => SseMode::Uncertain,
            "contradicted" => SseMode::Contradicted,
            _ => SseMode::Stable,
        };
        let context = serde_json::from_str(&context_json).unwrap_or_default();

        Ok(Memory {
            id: MemoryId::new(id),
            text,
            source,
            embedding: Self::decode_embedding(&embedding_blob),
            trust,
            confidence_declared,
            timestamp_created: timestamp_created.max(0) as u64,
            timestamp_last_seen: timestamp_last_seen.max(0) as u64,
            reinforcement_count: reinforcement_count.max(0) as u32,
            context,
            sse_mode,
            retired: retired != 0,
            user_marked_important: user_marked_important != 0,
        })
    }
}

impl MemoryStore for SqliteMemoryStore {
    fn store(&self, memory: &Memory) -> Result<()> {
        let conn = self.lock()?;
        let context_json = serde_json::to_string(&memory.context).map_err(|e| {
            Error::OperationFailed {
                operation: "serialize_context".to_string(),
                cause: e.to_string(),
            }
        })?;
        retry_with_backoff("store_memory", &self.config, || {
            conn.execute(
                "INSERT INTO memories (
                    id, text, source, embedding, trust, confidence_declared,
                    timestamp_created, timestamp_last_seen, reinforcement_count,
                    context, sse_mode, retired, user_marked_important
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                ON CONFLICT(id) DO UPDATE SET
                    trust = excluded.trust,
                    confidence_declared = excluded.confidence_declared,
                    timestamp_last_seen = excluded.timestamp_last_seen,
                    reinforcement_count = excluded.reinforcement_count,
                    context = excluded.context,
                    sse_mode = excluded.sse_mode,
                    retired = excluded.retired,
                    user_marked_important = excluded.user_marked_important",
                params![
                    memory.id.as_str(),
                    memory.text,
                    memory.source.to_string(),
                    Self::encode_embedding(&memory.embedding),
                    memory.trust,
                    memory.confidence_declared,
                    memory.timestamp_created as i64,
                    memory.timestamp_last_seen as i64,
                    i64::from(memory.reinforcement_count),
                    context_json,
                    match memory.sse_mode {
                        SseMode::Stable => "stable",
                        SseMode::Uncertain => "uncertain",
                        SseMode::Contradicted => "contradicted",
                    },
                    i64::from(memory.retired),
                    i64::from(memory.user_marked_important),
                ],
            )
        })?;
        Ok(())
    }

    fn retrieve(
        &self,
        query_embedding: &[f32],
        theta: f64,
        top_k: usize,
        recency_half_life_secs: f64,
    ) -> Result<Vec<ScoredMemory>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT * FROM memories WHERE retired = 0")
            .map_err(|e| Error::OperationFailed {
                operation: "prepare_retrieve".to_string(),
                cause: e.to_string(),
            })?;
        let rows = stmt
            .query_map([], Self::row_to_memory)
            .map_err(|e| Error::OperationFailed {
                operation: "query_retrieve".to_string(),
                cause: e.to_string(),
            })?;

        let now = current_timestamp();
        let mut scored = Vec::new();
        for row in rows {
            let memory = row.map_err(|e| Error::OperationFailed {
                operation: "map_retrieve_row".to_string(),
                cause: e.to_string(),
            })?;
            let similarity = cosine_similarity(query_embedding, &memory.embedding);
            if similarity < theta {
                continue;
            }
            let boost = recency_boost(memory.timestamp_last_seen, now, recency_half_life_secs);
            let final_score = score(similarity, memory.trust, boost);
            scored.push(ScoredMemory {
                memory,
                similarity,
                score: final_score,
            });
        }
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    fn forget(&self, id: &MemoryId) -> Result<()> {
        let conn = self.lock()?;
        retry_with_backoff("forget_memory", &self.config, || {
            conn.execute(
                "UPDATE memories SET retired = 1 WHERE id = ?1",
                params![id.as_str()],
            )
        })?;
        Ok(())
    }

    fn get(&self, id: &MemoryId) -> Result<Option<Memory>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT * FROM memories WHERE id = ?1 AND retired = 0",
            params![id.as_str()],
            Self::row_to_memory,
        )
        .optional()
        .map_err(|e| Error::OperationFailed {
            operation: "get_memory".to_string(),
            cause: e.to_string(),
        })
    }

    fn touch(&self, memory: &Memory) -> Result<()> {
        self.store(memory)
    }

    fn recent_user_texts(&self, limit: usize) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT text, timestamp_created FROM memories
                 WHERE retired = 0 AND source = 'user'
                 ORDER BY timestamp_created DESC, rowid DESC LIMIT ?1",
            )
            .map_err(|e| Error::OperationFailed {
                operation: "prepare_recent_user_texts".to_string(),
                cause: e.to_string(),
            })?;
        let rows = stmt
            .query_map(params![limit as i64], |row| row.get::<_, String>(0))
            .map_err(|e| Error::OperationFailed {
                operation: "query_recent_user_texts".to_string(),
                cause: e.to_string(),
            })?;
        let mut texts = Vec::new();
        for row in rows {
            texts.push(row.map_err(|e| Error::OperationFailed {
                operation: "map_recent_user_texts_row".to_string(),
                cause: e.to_string(),
            })?);
        }
        texts.reverse();
        Ok(texts)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_memory(text: &str) -> Memory {
        Memory::new(text, Source::User, vec![1.0, 0.0, 0.0], 0.8, HashMap::new(), false)
    }

    #[test]
    fn test_store_and_get_round_trips() {
        let store = SqliteMemoryStore::open_in_memory().unwrap();
        let memory = sample_memory("I work at Acme");
        store.store(&memory).unwrap();
        let fetched = store.get(&memory.id).unwrap().unwrap();
        assert_eq!(fetched.text, memory.text);
        assert_eq!(fetched.embedding, memory.embedding);
    }

    #[test]
    fn test_content_addressed_upsert_does_not_duplicate() {
        let store = SqliteMemoryStore::open_in_memory().unwrap();
        let memory = sample_memory("I live in Seattle");
        store.store(&memory).unwrap();
        let mut updated = memory.clone();
        updated.trust = 0.9;
        store.store(&updated).unwrap();

        let results = store.retrieve(&[1.0, 0.0, 0.0], 0.0, 10, 604_800.0).unwrap();
        assert_eq!(results.len(), 1);
        assert!((results[0].memory.trust - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_forget_excludes_from_retrieve_and_get() {
        let store = SqliteMemoryStore::open_in_memory().unwrap();
        let memory = sample_memory("temporary fact");
        store.store(&memory).unwrap();
        store.forget(&memory.id).unwrap();
        assert!(store.get(&memory.id).unwrap().is_none());
        let results = store.retrieve(&[1.0, 0.0, 0.0], 0.0, 10, 604_800.0).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_retrieve_filters_by_theta() {
        let store = SqliteMemoryStore::open_in_memory().unwrap();
        store.store(&sample_memory("orthogonal fact")).unwrap();
        let results = store.retrieve(&[0.0, 1.0, 0.0], 0.5, 10, 604_800.0).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_recent_user_texts_oldest_first_excludes_other_sources() {
        let store = SqliteMemoryStore::open_in_memory().unwrap();
        store.store(&sample_memory("first user message")).unwrap();
        let mut system_memory = sample_memory("a system fact");
        system_memory.source = Source::System;
        system_memory.id = MemoryId::content_address(&system_memory.text, Source::System);
        store.store(&system_memory).unwrap();
        store.store(&sample_memory("second user message")).unwrap();
        let texts = store.recent_user_texts(10).unwrap();
        assert_eq!(texts, vec!["first user message", "second user message"]);
    }

    #[test]
    fn test_retrieve_respects_top_k() {
        let store = SqliteMemoryStore::open_in_memory().unwrap();
        for i in 0..5 {
            store.store(&sample_memory(&format!("fact number {i}"))).unwrap();
        }
        let results = store.retrieve(&[1.0, 0.0, 0.0], 0.0, 2, 604_800.0).unwrap();
        assert_eq!(results.len(), 2);
    }
}
