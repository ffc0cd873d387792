//! SQLite metadata store.
//!
//! One connection behind a mutex, never held across an await. Every write is
//! a single `INSERT OR REPLACE` or keyed `UPDATE`/`DELETE`; there are no
//! multi-statement transactions to get wrong.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{Connection, params};

use kagami_types::{Dependency, DependencyRole, SlotRecord, SourceMeta, ViewMeta, ViewState};

use crate::error::{AfsError, AfsResult};
use crate::store::MetaStore;

const SCHEMA: &str = r#"
-- Source revisions
CREATE TABLE IF NOT EXISTS source_meta (
    mount        TEXT NOT NULL,
    path         TEXT NOT NULL,
    revision     TEXT NOT NULL,
    updated_at   INTEGER NOT NULL,
    drivers_hint TEXT NOT NULL DEFAULT '[]',
    kind         TEXT,
    PRIMARY KEY (mount, path)
);

-- View lifecycle records
CREATE TABLE IF NOT EXISTS view_meta (
    mount        TEXT NOT NULL,
    path         TEXT NOT NULL,
    view_key     TEXT NOT NULL,
    state        TEXT NOT NULL,
    derived_from TEXT,
    storage_path TEXT,
    generated_at INTEGER,
    error        TEXT,
    PRIMARY KEY (mount, path, view_key)
);

-- Provenance edges
CREATE TABLE IF NOT EXISTS dependencies (
    mount          TEXT NOT NULL,
    path           TEXT NOT NULL,
    view_key       TEXT NOT NULL,
    input_path     TEXT NOT NULL,
    input_revision TEXT NOT NULL,
    role           TEXT NOT NULL,
    PRIMARY KEY (mount, path, view_key, input_path, role)
);

-- Slot records
CREATE TABLE IF NOT EXISTS slots (
    mount          TEXT NOT NULL,
    owner_path     TEXT NOT NULL,
    slot_id        TEXT NOT NULL,
    description    TEXT NOT NULL,
    intent_key     TEXT NOT NULL,
    asset_path     TEXT NOT NULL,
    owner_revision TEXT NOT NULL,
    updated_at     INTEGER NOT NULL,
    PRIMARY KEY (mount, owner_path, slot_id)
);
CREATE INDEX IF NOT EXISTS idx_slots_asset ON slots(mount, asset_path);
"#;

/// SQLite-backed [`MetaStore`].
pub struct SqliteMetaStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteMetaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteMetaStore").finish_non_exhaustive()
    }
}

impl SqliteMetaStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> AfsResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> AfsResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> AfsResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| AfsError::store(format!("connection lock: {}", e)))
    }
}

#[async_trait]
impl MetaStore for SqliteMetaStore {
    async fn get_source(&self, mount: &str, path: &str) -> AfsResult<Option<SourceMeta>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT revision, updated_at, drivers_hint, kind
             FROM source_meta WHERE mount = ?1 AND path = ?2",
        )?;
        let mut rows = stmt.query(params![mount, path])?;
        if let Some(row) = rows.next()? {
            let hint_json: String = row.get(2)?;
            Ok(Some(SourceMeta {
                revision: row.get(0)?,
                updated_at: row.get::<_, i64>(1)? as u64,
                drivers_hint: serde_json::from_str(&hint_json).unwrap_or_default(),
                kind: row.get(3)?,
            }))
        } else {
            Ok(None)
        }
    }

    async fn put_source(&self, mount: &str, path: &str, meta: &SourceMeta) -> AfsResult<()> {
        let hint_json = serde_json::to_string(&meta.drivers_hint)
            .map_err(|e| AfsError::store(e.to_string()))?;
        self.lock()?.execute(
            "INSERT OR REPLACE INTO source_meta (mount, path, revision, updated_at, drivers_hint, kind)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                mount,
                path,
                meta.revision,
                meta.updated_at as i64,
                hint_json,
                meta.kind,
            ],
        )?;
        Ok(())
    }

    async fn delete_source(&self, mount: &str, path: &str) -> AfsResult<()> {
        self.lock()?.execute(
            "DELETE FROM source_meta WHERE mount = ?1 AND path = ?2",
            params![mount, path],
        )?;
        Ok(())
    }

    async fn get_view(
        &self,
        mount: &str,
        path: &str,
        view_key: &str,
    ) -> AfsResult<Option<ViewMeta>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT state, derived_from, storage_path, generated_at, error
             FROM view_meta WHERE mount = ?1 AND path = ?2 AND view_key = ?3",
        )?;
        let mut rows = stmt.query(params![mount, path, view_key])?;
        if let Some(row) = rows.next()? {
            let state: String = row.get(0)?;
            Ok(Some(ViewMeta {
                state: ViewState::from_str(&state).unwrap_or_default(),
                derived_from: row.get(1)?,
                storage_path: row.get(2)?,
                generated_at: row.get::<_, Option<i64>>(3)?.map(|v| v as u64),
                error: row.get(4)?,
            }))
        } else {
            Ok(None)
        }
    }

    async fn put_view(
        &self,
        mount: &str,
        path: &str,
        view_key: &str,
        meta: &ViewMeta,
    ) -> AfsResult<()> {
        self.lock()?.execute(
            "INSERT OR REPLACE INTO view_meta
             (mount, path, view_key, state, derived_from, storage_path, generated_at, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                mount,
                path,
                view_key,
                meta.state.as_str(),
                meta.derived_from,
                meta.storage_path,
                meta.generated_at.map(|v| v as i64),
                meta.error,
            ],
        )?;
        Ok(())
    }

    async fn list_views(&self, mount: &str, path: &str) -> AfsResult<Vec<(String, ViewMeta)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT view_key, state, derived_from, storage_path, generated_at, error
             FROM view_meta WHERE mount = ?1 AND path = ?2 ORDER BY view_key",
        )?;
        let views = stmt
            .query_map(params![mount, path], |row| {
                let state: String = row.get(1)?;
                Ok((
                    row.get::<_, String>(0)?,
                    ViewMeta {
                        state: ViewState::from_str(&state).unwrap_or_default(),
                        derived_from: row.get(2)?,
                        storage_path: row.get(3)?,
                        generated_at: row.get::<_, Option<i64>>(4)?.map(|v| v as u64),
                        error: row.get(5)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(views)
    }

    async fn delete_views(&self, mount: &str, path: &str) -> AfsResult<()> {
        self.lock()?.execute(
            "DELETE FROM view_meta WHERE mount = ?1 AND path = ?2",
            params![mount, path],
        )?;
        Ok(())
    }

    async fn mark_views_stale(&self, mount: &str, path: &str) -> AfsResult<()> {
        self.lock()?.execute(
            "UPDATE view_meta SET state = ?3 WHERE mount = ?1 AND path = ?2",
            params![mount, path, ViewState::Stale.as_str()],
        )?;
        Ok(())
    }

    async fn put_dependency(&self, mount: &str, dep: &Dependency) -> AfsResult<()> {
        self.lock()?.execute(
            "INSERT OR REPLACE INTO dependencies
             (mount, path, view_key, input_path, input_revision, role)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                mount,
                dep.path,
                dep.view_key,
                dep.input_path,
                dep.input_revision,
                dep.role.as_str(),
            ],
        )?;
        Ok(())
    }

    async fn dependencies_for(&self, mount: &str, path: &str) -> AfsResult<Vec<Dependency>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT path, view_key, input_path, input_revision, role
             FROM dependencies WHERE mount = ?1 AND path = ?2 ORDER BY view_key, input_path",
        )?;
        let deps = stmt
            .query_map(params![mount, path], |row| {
                let role: String = row.get(4)?;
                Ok(Dependency {
                    path: row.get(0)?,
                    view_key: row.get(1)?,
                    input_path: row.get(2)?,
                    input_revision: row.get(3)?,
                    role: DependencyRole::from_str(&role).unwrap_or(DependencyRole::Source),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(deps)
    }

    async fn upsert_slot(&self, mount: &str, slot: &SlotRecord) -> AfsResult<()> {
        self.lock()?.execute(
            "INSERT OR REPLACE INTO slots
             (mount, owner_path, slot_id, description, intent_key, asset_path, owner_revision, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                mount,
                slot.owner_path,
                slot.slot_id,
                slot.desc,
                slot.intent_key,
                slot.asset_path,
                slot.owner_revision,
                slot.updated_at as i64,
            ],
        )?;
        Ok(())
    }

    async fn get_slot(
        &self,
        mount: &str,
        owner_path: &str,
        slot_id: &str,
    ) -> AfsResult<Option<SlotRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT owner_path, slot_id, description, intent_key, asset_path, owner_revision, updated_at
             FROM slots WHERE mount = ?1 AND owner_path = ?2 AND slot_id = ?3",
        )?;
        let mut rows = stmt.query(params![mount, owner_path, slot_id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row_to_slot(row)?))
        } else {
            Ok(None)
        }
    }

    async fn list_slots(&self, mount: &str, owner_path: &str) -> AfsResult<Vec<SlotRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT owner_path, slot_id, description, intent_key, asset_path, owner_revision, updated_at
             FROM slots WHERE mount = ?1 AND owner_path = ?2 ORDER BY slot_id",
        )?;
        let slots = stmt
            .query_map(params![mount, owner_path], row_to_slot)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(slots)
    }

    async fn slot_by_asset(
        &self,
        mount: &str,
        asset_path: &str,
    ) -> AfsResult<Option<SlotRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT owner_path, slot_id, description, intent_key, asset_path, owner_revision, updated_at
             FROM slots WHERE mount = ?1 AND asset_path = ?2 LIMIT 1",
        )?;
        let mut rows = stmt.query(params![mount, asset_path])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row_to_slot(row)?))
        } else {
            Ok(None)
        }
    }

    async fn delete_slots(&self, mount: &str, owner_path: &str) -> AfsResult<()> {
        self.lock()?.execute(
            "DELETE FROM slots WHERE mount = ?1 AND owner_path = ?2",
            params![mount, owner_path],
        )?;
        Ok(())
    }
}

fn row_to_slot(row: &rusqlite::Row<'_>) -> rusqlite::Result<SlotRecord> {
    Ok(SlotRecord {
        owner_path: row.get(0)?,
        slot_id: row.get(1)?,
        desc: row.get(2)?,
        intent_key: row.get(3)?,
        asset_path: row.get(4)?,
        owner_revision: row.get(5)?,
        updated_at: row.get::<_, i64>(6)? as u64,
    })
}
