//! SQLite-backed node store.
//!
//! Nodes are stamped with the pass in which they were last created or
//! touched; `sweep` removes everything this owner registered that the
//! latest pass did not see again.

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{CachedNode, GraphError, Node, NodeStore, NODE_OWNER};

/// Current schema version. Increment when making schema changes.
const SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    owner TEXT NOT NULL,
    key TEXT,
    last_modified TEXT,
    absolute_path TEXT,
    payload TEXT NOT NULL,
    last_seen INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_nodes_owner_kind ON nodes(owner, kind);

CREATE TABLE IF NOT EXISTS meta (
    name TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
"#;

/// Node counts for the status output.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreSummary {
    pub assets: u64,
    pub directories: u64,
}

impl StoreSummary {
    pub fn total(&self) -> u64 {
        self.assets + self.directories
    }
}

pub struct SqliteNodeStore {
    /// Wrapped in a Mutex because `rusqlite::Connection` is not Sync.
    /// Queries are short and never held across an await point.
    conn: Mutex<Connection>,
    current_pass: AtomicI64,
}

impl SqliteNodeStore {
    pub fn open(path: &Path) -> Result<Self, GraphError> {
        let conn = Connection::open(path).map_err(|e| GraphError::Open {
            path: path.display().to_string(),
            source: e,
        })?;
        // WAL keeps concurrent readers (a parallel `status`) from blocking
        // the sync pass's writes.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, GraphError> {
        let conn = Connection::open_in_memory().map_err(|e| GraphError::Open {
            path: ":memory:".to_string(),
            source: e,
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, GraphError> {
        migrate(&conn)?;
        let pass: Option<i64> = conn
            .query_row("SELECT value FROM meta WHERE name = 'pass'", [], |row| {
                row.get(0)
            })
            .optional()?;
        let pass = match pass {
            Some(p) => p,
            None => {
                conn.execute("INSERT INTO meta (name, value) VALUES ('pass', 1)", [])?;
                1
            }
        };
        Ok(Self {
            conn: Mutex::new(conn),
            current_pass: AtomicI64::new(pass),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, GraphError> {
        self.conn.lock().map_err(|e| GraphError::Lock(e.to_string()))
    }

    /// Start a new pass: nodes created or touched from here on are stamped
    /// with the new pass number. Returns it.
    pub fn begin_pass(&self) -> Result<i64, GraphError> {
        let conn = self.conn()?;
        let next = self.current_pass.load(Ordering::SeqCst) + 1;
        conn.execute("UPDATE meta SET value = ?1 WHERE name = 'pass'", params![next])?;
        self.current_pass.store(next, Ordering::SeqCst);
        Ok(next)
    }

    /// Delete every node of this owner that the current pass neither created
    /// nor touched. Returns the number removed.
    pub fn sweep(&self) -> Result<u64, GraphError> {
        let pass = self.current_pass.load(Ordering::SeqCst);
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM nodes WHERE owner = ?1 AND last_seen < ?2",
            params![NODE_OWNER, pass],
        )?;
        Ok(removed as u64)
    }

    pub fn summary(&self) -> Result<StoreSummary, GraphError> {
        let conn = self.conn()?;
        let count = |kind: &str| -> Result<u64, rusqlite::Error> {
            conn.query_row(
                "SELECT COUNT(*) FROM nodes WHERE owner = ?1 AND kind = ?2",
                params![NODE_OWNER, kind],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as u64)
        };
        Ok(StoreSummary {
            assets: count("asset")?,
            directories: count("directory")?,
        })
    }
}

#[async_trait]
impl NodeStore for SqliteNodeStore {
    async fn create_node(&self, node: Node) -> Result<(), GraphError> {
        let payload = serde_json::to_string(&node)?;
        let pass = self.current_pass.load(Ordering::SeqCst);
        let (key, last_modified, absolute_path) = match &node {
            Node::Asset(asset) => (
                Some(asset.key.clone()),
                Some(asset.last_modified.to_rfc3339()),
                asset.absolute_path.display().to_string(),
            ),
            Node::Directory(dir) => (None, None, dir.absolute_path.display().to_string()),
        };

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO nodes (id, kind, owner, key, last_modified, absolute_path, payload, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                 kind = excluded.kind,
                 key = excluded.key,
                 last_modified = excluded.last_modified,
                 absolute_path = excluded.absolute_path,
                 payload = excluded.payload,
                 last_seen = excluded.last_seen",
            params![
                node.id(),
                node.kind(),
                NODE_OWNER,
                key,
                last_modified,
                absolute_path,
                payload,
                pass
            ],
        )?;
        Ok(())
    }

    async fn touch_node(&self, id: &str) -> Result<(), GraphError> {
        let pass = self.current_pass.load(Ordering::SeqCst);
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE nodes SET last_seen = ?1 WHERE id = ?2",
            params![pass, id],
        )?;
        if updated == 0 {
            return Err(GraphError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn asset_nodes(&self) -> Result<Vec<CachedNode>, GraphError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, key, last_modified FROM nodes WHERE owner = ?1 AND kind = 'asset'",
        )?;
        let rows = stmt.query_map(params![NODE_OWNER], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;

        let mut cached = Vec::new();
        for row in rows {
            let (id, key, last_modified) = row?;
            let (Some(key), Some(raw)) = (key, last_modified) else {
                continue;
            };
            let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) else {
                tracing::warn!("Asset node {} has unparseable last_modified, ignoring", id);
                continue;
            };
            cached.push(CachedNode {
                id,
                key,
                last_modified: parsed.with_timezone(&Utc),
                owner: NODE_OWNER.to_string(),
            });
        }
        Ok(cached)
    }
}

fn migrate(conn: &Connection) -> Result<(), GraphError> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version > SCHEMA_VERSION {
        return Err(GraphError::UnsupportedSchemaVersion {
            found: version,
            expected: SCHEMA_VERSION,
        });
    }
    if version == 0 {
        conn.execute_batch(SCHEMA_V1)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        tracing::debug!("Initialized node store schema at version {}", SCHEMA_VERSION);
    }
    Ok(())
}
