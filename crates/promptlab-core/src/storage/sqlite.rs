//! SQLite backend. The full run is stored as a JSON body next to the
//! columns used for lookup and ordering.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::SecondsFormat;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use super::{sort_newest_first, RunStore};
use crate::error::StoreError;
use crate::model::{Run, RunId, RunStatus};

const DDL: &str = "
CREATE TABLE IF NOT EXISTS runs (
    id          TEXT PRIMARY KEY,
    prompt_id   TEXT NOT NULL,
    status      TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    body        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_runs_prompt ON runs(prompt_id);
";

#[derive(Clone)]
pub struct SqliteRunStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRunStore {
    /// Open (or create) the database file and its schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                message: format!("failed to create {}: {}", parent.display(), e),
            })?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(DDL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Database {
            message: "connection lock poisoned".to_string(),
        })
    }

    fn columns(run: &Run) -> Result<(String, String), StoreError> {
        // Fixed-width timestamps keep lexical and chronological order equal.
        let created_at = run.created_at.to_rfc3339_opts(SecondsFormat::Micros, true);
        Ok((created_at, serde_json::to_string(run)?))
    }

    fn query_runs(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Run>, StoreError> {
        let mut stmt = conn.prepare(sql)?;
        let bodies = stmt
            .query_map(params, |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut runs = bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(StoreError::from))
            .collect::<Result<Vec<Run>, _>>()?;
        sort_newest_first(&mut runs);
        Ok(runs)
    }
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn create(&self, run: &Run) -> Result<(), StoreError> {
        let (created_at, body) = Self::columns(run)?;
        let conn = self.lock()?;
        let result = conn.execute(
            "INSERT INTO runs (id, prompt_id, status, created_at, body) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run.id.as_str(), run.prompt_id, run.status().as_str(), created_at, body],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::AlreadyExists {
                    run_id: run.id.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, run: &Run) -> Result<(), StoreError> {
        let (created_at, body) = Self::columns(run)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO runs (id, prompt_id, status, created_at, body) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                prompt_id = excluded.prompt_id,
                status = excluded.status,
                created_at = excluded.created_at,
                body = excluded.body",
            params![run.id.as_str(), run.prompt_id, run.status().as_str(), created_at, body],
        )?;
        Ok(())
    }

    async fn transition(&self, run: &Run, expected: RunStatus) -> Result<bool, StoreError> {
        let (_, body) = Self::columns(run)?;
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE runs SET status = ?1, body = ?2 WHERE id = ?3 AND status = ?4",
            params![run.status().as_str(), body, run.id.as_str(), expected.as_str()],
        )?;
        Ok(updated == 1)
    }

    async fn load(&self, run_id: &RunId) -> Result<Option<Run>, StoreError> {
        let conn = self.lock()?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM runs WHERE id = ?1",
                params![run_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        body.map(|b| serde_json::from_str(&b).map_err(StoreError::from))
            .transpose()
    }

    async fn list(&self) -> Result<Vec<Run>, StoreError> {
        let conn = self.lock()?;
        Self::query_runs(&conn, "SELECT body FROM runs ORDER BY created_at DESC", params![])
    }

    async fn list_by_prompt(&self, prompt_id: &str) -> Result<Vec<Run>, StoreError> {
        let conn = self.lock()?;
        Self::query_runs(
            &conn,
            "SELECT body FROM runs WHERE prompt_id = ?1 ORDER BY created_at DESC",
            params![prompt_id],
        )
    }
}
