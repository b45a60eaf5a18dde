use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, Statement};
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::error::ConnectionError;

/// Advisory lock id for `key`. Every process migrating the same database
/// must derive the same id.
pub fn pg_lock_id(key: &str) -> i64 {
    xxh3_64(key.as_bytes()) as i64
}

/// `<db file>.migrate.lock`, next to the database itself.
pub fn sqlite_lock_path(db_path: &Path) -> PathBuf {
    let mut name = db_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".migrate.lock");
    db_path.with_file_name(name)
}

/// A held migration lock. Release it explicitly; dropping a SQLite guard also
/// frees the OS lock, a Postgres one is freed when its session ends.
pub enum LockGuard {
    Postgres {
        admin: DatabaseConnection,
        key: i64,
    },
    SqliteFile {
        file: File,
        path: PathBuf,
    },
    InMemory,
}

impl LockGuard {
    pub async fn release(self) -> Result<(), ConnectionError> {
        match self {
            LockGuard::InMemory => Ok(()),
            LockGuard::SqliteFile { file, path } => {
                if let Err(e) = fs4::fs_std::FileExt::unlock(&file) {
                    // the handle is closed right after, which frees the lock anyway
                    debug!(lock_path = %path.display(), error = %e, "sqlite lock unlock returned error");
                }
                debug!(lock_path = %path.display(), "sqlite migration lock released");
                Ok(())
            }
            LockGuard::Postgres { admin, key } => {
                let row = admin
                    .query_one(Statement::from_sql_and_values(
                        DatabaseBackend::Postgres,
                        "SELECT pg_advisory_unlock($1) AS unlocked",
                        vec![key.into()],
                    ))
                    .await?;
                let unlocked = match row {
                    Some(row) => row.try_get::<bool>("", "unlocked")?,
                    None => false,
                };
                if !unlocked {
                    warn!(lock_key = key, "advisory unlock reported the lock was not held");
                }
                Ok(())
            }
        }
    }
}

/// Mutual exclusion for schema migrations across processes and test threads.
#[async_trait]
pub trait MigrationLock: Send {
    /// Non-blocking. `None` means somebody else holds the lock.
    async fn try_acquire(&mut self) -> Result<Option<LockGuard>, ConnectionError>;
}

/// Session-level Postgres advisory lock.
///
/// The admin pool must have exactly one connection: the lock belongs to the
/// session that took it, and the unlock has to run on that same session.
pub struct PgAdvisoryLock {
    admin: DatabaseConnection,
    key: i64,
}

impl PgAdvisoryLock {
    pub fn new(admin: DatabaseConnection, key: &str) -> Self {
        Self {
            admin,
            key: pg_lock_id(key),
        }
    }
}

#[async_trait]
impl MigrationLock for PgAdvisoryLock {
    async fn try_acquire(&mut self) -> Result<Option<LockGuard>, ConnectionError> {
        let row = self
            .admin
            .query_one(Statement::from_sql_and_values(
                DatabaseBackend::Postgres,
                "SELECT pg_try_advisory_lock($1) AS locked",
                vec![self.key.into()],
            ))
            .await?;

        let locked = match row {
            Some(row) => row.try_get::<bool>("", "locked")?,
            None => {
                return Err(ConnectionError::config(
                    "pg_try_advisory_lock returned no row",
                ))
            }
        };

        Ok(locked.then(|| LockGuard::Postgres {
            admin: self.admin.clone(),
            key: self.key,
        }))
    }
}

/// Exclusive OS file lock on `<db>.migrate.lock`.
pub struct SqliteFileLock {
    path: PathBuf,
}

impl SqliteFileLock {
    pub fn for_database(db_path: &Path) -> Self {
        Self {
            path: sqlite_lock_path(db_path),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MigrationLock for SqliteFileLock {
    async fn try_acquire(&mut self) -> Result<Option<LockGuard>, ConnectionError> {
        use fs4::fs_std::FileExt;

        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| {
                ConnectionError::config(format!(
                    "failed to open lock file '{}': {e}",
                    self.path.display()
                ))
            })?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(true) => {
                debug!(lock_path = %self.path.display(), "sqlite migration lock acquired");
                Ok(Some(LockGuard::SqliteFile {
                    file,
                    path: self.path.clone(),
                }))
            }
            Ok(false) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(ConnectionError::config(format!(
                "failed to lock '{}': {e}",
                self.path.display()
            ))),
        }
    }
}

/// In-memory databases are private to one pool; nothing to coordinate.
pub struct InMemoryLock;

#[async_trait]
impl MigrationLock for InMemoryLock {
    async fn try_acquire(&mut self) -> Result<Option<LockGuard>, ConnectionError> {
        Ok(Some(LockGuard::InMemory))
    }
}
