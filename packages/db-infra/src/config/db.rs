use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConnectionError;

/// Env file read by [`DbConfig::load`] when no explicit path is given.
pub const DEFAULT_ENV_FILE: &str = ".env.test";

/// Every database the harness touches must carry this suffix.
pub const TEST_DB_SUFFIX: &str = "_test";

const DEFAULT_APP_NAME: &str = "txn-harness";

const DEFAULT_MIGRATE_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Database engine and storage mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbKind {
    Postgres,
    SqliteFile,
    SqliteMemory,
}

impl DbKind {
    /// Engine name for logging
    pub fn engine(self) -> &'static str {
        match self {
            DbKind::Postgres => "postgresql",
            DbKind::SqliteFile | DbKind::SqliteMemory => "sqlite",
        }
    }
}

impl FromStr for DbKind {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(DbKind::Postgres),
            "sqlite-file" | "sqlite_file" | "sqlite" => Ok(DbKind::SqliteFile),
            "sqlite-memory" | "sqlite_memory" | "memory" => Ok(DbKind::SqliteMemory),
            other => Err(ConnectionError::config(format!(
                "unknown DB_KIND '{other}' (expected postgres, sqlite-file or sqlite-memory)"
            ))),
        }
    }
}

/// Database owner enum for different access levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbOwner {
    /// Application-level access (limited permissions)
    App,
    /// Owner-level access (full permissions for migrations)
    Owner,
}

/// What bootstrap does about the schema once connected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaPolicy {
    /// Apply pending migrations
    Migrate,
    /// Fail unless every defined migration is already applied
    RequireCurrent,
    /// Leave the schema alone
    Skip,
}

impl SchemaPolicy {
    /// In-memory databases start empty, so they have to be migrated.
    pub fn default_for(kind: DbKind) -> Self {
        match kind {
            DbKind::SqliteMemory => SchemaPolicy::Migrate,
            DbKind::Postgres | DbKind::SqliteFile => SchemaPolicy::RequireCurrent,
        }
    }
}

impl FromStr for SchemaPolicy {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "migrate" => Ok(SchemaPolicy::Migrate),
            "require" | "require-current" => Ok(SchemaPolicy::RequireCurrent),
            "skip" => Ok(SchemaPolicy::Skip),
            other => Err(ConnectionError::config(format!(
                "unknown DB_SCHEMA_POLICY '{other}' (expected migrate, require or skip)"
            ))),
        }
    }
}

/// User/password pair. The password never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Where the test database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbTarget {
    Postgres {
        host: String,
        port: u16,
        database: String,
        app: Credentials,
        owner: Option<Credentials>,
    },
    SqliteFile {
        path: PathBuf,
    },
    SqliteMemory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl PoolSettings {
    pub fn for_kind(kind: DbKind) -> Self {
        let (min_connections, max_connections) = match kind {
            // each in-memory connection is a separate database
            DbKind::SqliteMemory => (1, 1),
            DbKind::SqliteFile => (1, 4),
            DbKind::Postgres => (1, 5),
        };
        Self {
            min_connections,
            max_connections,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Connection parameters record for the test database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub target: DbTarget,
    pub schema: SchemaPolicy,
    pub pool: PoolSettings,
    pub app_name: String,
    /// How long `Migrate` waits for another process's migration lock
    pub migrate_lock_timeout: Duration,
}

impl DbConfig {
    pub fn new(target: DbTarget) -> Self {
        let kind = kind_of(&target);
        Self {
            target,
            schema: SchemaPolicy::default_for(kind),
            pool: PoolSettings::for_kind(kind),
            app_name: DEFAULT_APP_NAME.to_string(),
            migrate_lock_timeout: DEFAULT_MIGRATE_LOCK_TIMEOUT,
        }
    }

    pub fn sqlite_memory() -> Self {
        Self::new(DbTarget::SqliteMemory)
    }

    pub fn sqlite_file(path: impl Into<PathBuf>) -> Self {
        Self::new(DbTarget::SqliteFile { path: path.into() })
    }

    pub fn with_schema(mut self, schema: SchemaPolicy) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_pool(mut self, pool: PoolSettings) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_migrate_lock_timeout(mut self, timeout: Duration) -> Self {
        self.migrate_lock_timeout = timeout;
        self
    }

    pub fn kind(&self) -> DbKind {
        kind_of(&self.target)
    }

    /// Credentials for the given owner. Owner access falls back to the app
    /// user when no dedicated owner is configured; SQLite has none.
    pub fn credentials(&self, owner: DbOwner) -> Option<&Credentials> {
        match (&self.target, owner) {
            (DbTarget::Postgres { app, .. }, DbOwner::App) => Some(app),
            (
                DbTarget::Postgres {
                    app,
                    owner: dedicated,
                    ..
                },
                DbOwner::Owner,
            ) => Some(dedicated.as_ref().unwrap_or(app)),
            _ => None,
        }
    }

    /// Whether a dedicated owner login is configured
    pub fn has_owner(&self) -> bool {
        matches!(&self.target, DbTarget::Postgres { owner: Some(_), .. })
    }

    /// Password-free description for logs and error messages
    pub fn describe(&self) -> String {
        match &self.target {
            DbTarget::Postgres {
                host,
                port,
                database,
                app,
                ..
            } => format!("postgresql://{}@{host}:{port}/{database}", app.user),
            DbTarget::SqliteFile { path } => format!("sqlite://{}", path.display()),
            DbTarget::SqliteMemory => "sqlite::memory:".to_string(),
        }
    }

    /// Enforce the test-database safety rules and basic pool sanity.
    pub fn validate(&self) -> Result<(), ConnectionError> {
        match &self.target {
            DbTarget::Postgres {
                host,
                port,
                database,
                ..
            } => {
                if host.trim().is_empty() {
                    return Err(ConnectionError::config("POSTGRES_HOST must not be empty"));
                }
                if *port == 0 {
                    return Err(ConnectionError::config("POSTGRES_PORT must not be 0"));
                }
                if !database.ends_with(TEST_DB_SUFFIX) {
                    return Err(ConnectionError::config(format!(
                        "Test database name must end with '{TEST_DB_SUFFIX}', but got: '{database}'"
                    )));
                }
            }
            DbTarget::SqliteFile { path } => {
                let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
                if !stem.ends_with(TEST_DB_SUFFIX) {
                    return Err(ConnectionError::config(format!(
                        "Test database file name must end with '{TEST_DB_SUFFIX}', but got: '{}'",
                        path.display()
                    )));
                }
            }
            DbTarget::SqliteMemory => {}
        }

        if self.pool.max_connections == 0 {
            return Err(ConnectionError::config("pool max_connections must be at least 1"));
        }
        if self.pool.min_connections > self.pool.max_connections {
            return Err(ConnectionError::config(format!(
                "pool min_connections ({}) exceeds max_connections ({})",
                self.pool.min_connections, self.pool.max_connections
            )));
        }
        Ok(())
    }

    /// Build the record from a key/value source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConnectionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let kind = match var("DB_KIND") {
            Some(raw) => raw.parse()?,
            None => DbKind::SqliteMemory,
        };

        let target = match kind {
            DbKind::Postgres => DbTarget::Postgres {
                host: var("POSTGRES_HOST").unwrap_or_else(|| "localhost".to_string()),
                port: parse_var(&var, "POSTGRES_PORT")?.unwrap_or(5432),
                database: must_var(&var, "TEST_DB")?,
                app: Credentials::new(
                    must_var(&var, "APP_DB_USER")?,
                    must_var(&var, "APP_DB_PASSWORD")?,
                ),
                owner: match (var("OWNER_DB_USER"), var("OWNER_DB_PASSWORD")) {
                    (Some(user), Some(password)) => Some(Credentials::new(user, password)),
                    (None, None) => None,
                    _ => {
                        return Err(ConnectionError::config(
                            "OWNER_DB_USER and OWNER_DB_PASSWORD must be set together",
                        ))
                    }
                },
            },
            DbKind::SqliteFile => DbTarget::SqliteFile {
                path: PathBuf::from(must_var(&var, "SQLITE_PATH")?),
            },
            DbKind::SqliteMemory => DbTarget::SqliteMemory,
        };

        let mut config = DbConfig::new(target);
        if let Some(raw) = var("DB_SCHEMA_POLICY") {
            config.schema = raw.parse()?;
        }
        if kind != DbKind::SqliteMemory {
            if let Some(max) = parse_var::<u32, _>(&var, "DB_POOL_MAX")? {
                config.pool.max_connections = max;
                config.pool.min_connections = config.pool.min_connections.min(max);
            }
        }
        if let Some(ms) = parse_var::<u64, _>(&var, "DB_ACQUIRE_TIMEOUT_MS")? {
            config.pool.acquire_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&var, "DB_MIGRATE_LOCK_TIMEOUT_MS")? {
            config.migrate_lock_timeout = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    /// Read the record from the process environment only.
    pub fn from_env() -> Result<Self, ConnectionError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read the record from an env file, with the process environment taking
    /// precedence. Without an explicit path, the nearest `.env.test` in the
    /// current directory or one of its ancestors is used if there is one, so
    /// a workspace-level file is found from every member crate.
    pub fn load(env_file: Option<&Path>) -> Result<Self, ConnectionError> {
        let file_vars = match env_file {
            Some(path) => read_env_file(path)?,
            None => find_default_env_file()?,
        };

        Self::from_lookup(|name| env::var(name).ok().or_else(|| file_vars.get(name).cloned()))
    }
}

fn kind_of(target: &DbTarget) -> DbKind {
    match target {
        DbTarget::Postgres { .. } => DbKind::Postgres,
        DbTarget::SqliteFile { .. } => DbKind::SqliteFile,
        DbTarget::SqliteMemory => DbKind::SqliteMemory,
    }
}

fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConnectionError> {
    let iter = dotenvy::from_path_iter(path).map_err(|e| {
        ConnectionError::config(format!("failed to read env file '{}': {e}", path.display()))
    })?;
    collect_env_iter(iter, &path.display().to_string())
}

/// Only a missing file means "no file"; an unreadable one is an error.
fn find_default_env_file() -> Result<HashMap<String, String>, ConnectionError> {
    match dotenvy::from_filename_iter(DEFAULT_ENV_FILE) {
        Ok(iter) => collect_env_iter(iter, DEFAULT_ENV_FILE),
        Err(e) if e.not_found() => Ok(HashMap::new()),
        Err(e) => Err(ConnectionError::config(format!(
            "failed to read env file '{DEFAULT_ENV_FILE}': {e}"
        ))),
    }
}

fn collect_env_iter<R: std::io::Read>(
    iter: dotenvy::Iter<R>,
    source: &str,
) -> Result<HashMap<String, String>, ConnectionError> {
    iter.map(|item| {
        item.map_err(|e| ConnectionError::config(format!("malformed env file '{source}': {e}")))
    })
    .collect()
}

/// Get required variable or return error
fn must_var<F>(var: &F, name: &str) -> Result<String, ConnectionError>
where
    F: Fn(&str) -> Option<String>,
{
    var(name).ok_or_else(|| {
        ConnectionError::config(format!("Required environment variable '{name}' is not set"))
    })
}

fn parse_var<T, F>(var: &F, name: &str) -> Result<Option<T>, ConnectionError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    var(name)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| {
                ConnectionError::config(format!("invalid value for '{name}': '{raw}' ({e})"))
            })
        })
        .transpose()
}
