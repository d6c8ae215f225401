//! Connection registry - per-database connection bookkeeping
//!
//! Any number of connections may be open against one database path. The
//! registry closes all of them on `close`, `close_all`, or when it is dropped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::Connection;
use tracing::{info, warn};

use crate::{Error, Result};

/// How long a connection waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared handle to one registered connection.
///
/// Clones refer to the same connection. Once the registry closes it, every
/// clone fails with `Error::ConnectionClosed`.
#[derive(Clone)]
pub struct ConnectionHandle {
    db: Arc<PathBuf>,
    inner: Arc<Mutex<Option<Connection>>>,
}

impl ConnectionHandle {
    fn new(db: PathBuf, conn: Connection) -> Self {
        Self {
            db: Arc::new(db),
            inner: Arc::new(Mutex::new(Some(conn))),
        }
    }

    /// Database this connection belongs to
    pub fn db(&self) -> &Path {
        &self.db
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// Run `f` against the live connection, one caller at a time
    pub fn with<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.lock();
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(Error::ConnectionClosed(self.db.to_path_buf())),
        }
    }

    fn close(&self) -> Result<()> {
        let Some(conn) = self.lock().take() else {
            return Ok(());
        };
        conn.close().map_err(|(_, e)| Error::Query(e))
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("db", &self.db)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Open a connection with foreign keys enforced
fn connect(db: &Path) -> Result<Connection> {
    if let Some(parent) = db.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(db).map_err(|e| Error::DatabaseOpen {
        path: db.to_owned(),
        source: e,
    })?;
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

/// Registry of open connections keyed by database path
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<PathBuf, Vec<ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new connection to `db` and track it
    pub fn open(&mut self, db: impl AsRef<Path>) -> Result<ConnectionHandle> {
        let db = db.as_ref().to_path_buf();
        let handle = ConnectionHandle::new(db.clone(), connect(&db)?);

        let handles = self.connections.entry(db).or_default();
        handles.push(handle.clone());
        info!("Opened connection {} to {}", handles.len(), handle.db().display());
        Ok(handle)
    }

    /// Close every connection to `db`, leaving an empty entry behind.
    ///
    /// All handles are closed even if one fails; the first failure is returned.
    pub fn close(&mut self, db: impl AsRef<Path>) -> Result<()> {
        let db = db.as_ref();
        let handles = self.connections.entry(db.to_path_buf()).or_default();
        let mut first_error = None;

        for handle in handles.drain(..) {
            if let Err(e) = handle.close() {
                warn!("Failed to close connection to {}: {}", db.display(), e);
                first_error.get_or_insert(e);
            }
        }

        info!("Closed connections to {}", db.display());
        first_error.map_or(Ok(()), Err)
    }

    /// Close every registered connection
    pub fn close_all(&mut self) -> Result<()> {
        let dbs: Vec<PathBuf> = self.connections.keys().cloned().collect();
        let mut first_error = None;

        for db in dbs {
            if let Err(e) = self.close(&db) {
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Number of tracked connections for `db`
    pub fn open_count(&self, db: impl AsRef<Path>) -> usize {
        self.connections.get(db.as_ref()).map_or(0, Vec::len)
    }

    /// Every database path with an entry, including emptied ones
    pub fn databases(&self) -> Vec<&Path> {
        self.connections.keys().map(PathBuf::as_path).collect()
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        if let Err(e) = self.close_all() {
            warn!("Error closing connections on drop: {}", e);
        }
    }
}
