//! Database API - wires pool, context, manager, and repositories together.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::info;
use serde::Serialize;
use thiserror::Error;

use crate::connection::{PoolConfig, PoolError, PoolStats, SqlitePool};
use crate::repository::{ConnectionAccessor, MemberRepository};
use crate::service::{MemberService, ServiceError};
use crate::transaction::{
    TransactionContext, TransactionManager, TransactionStats, TxError, UnitOfWorkKey,
};
use crate::translate::SemanticError;

/// Result type for database operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Database errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("data access error: {0}")]
    Data(#[from] SemanticError),

    #[error("transfer failed: {0}")]
    Transfer(#[from] TxError<ServiceError>),

    #[error("database not found: {0}")]
    NotFound(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database configuration options.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the database file.
    pub path: PathBuf,
    /// Create if doesn't exist.
    pub create_if_missing: bool,
    /// Upper bound on pooled connections.
    pub max_connections: usize,
    /// How long to wait for a pooled connection.
    pub acquire_timeout: Duration,
    /// How long SQLite retries a locked database.
    pub busy_timeout: Duration,
    /// Enable verbose logging.
    pub verbose: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("txbind.db"),
            create_if_missing: true,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            verbose: false,
        }
    }
}

impl DatabaseConfig {
    /// Create a new configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set create_if_missing flag.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn max_connections(mut self, value: usize) -> Self {
        self.max_connections = value;
        self
    }

    pub fn acquire_timeout(mut self, value: Duration) -> Self {
        self.acquire_timeout = value;
        self
    }

    pub fn busy_timeout(mut self, value: Duration) -> Self {
        self.busy_timeout = value;
        self
    }

    /// Set verbose flag.
    pub fn verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            path: self.path.clone(),
            max_connections: self.max_connections,
            acquire_timeout: self.acquire_timeout,
            busy_timeout: self.busy_timeout,
        }
    }
}

/// The main database handle.
pub struct Database {
    config: DatabaseConfig,
    pool: Arc<SqlitePool>,
    manager: TransactionManager<SqlitePool>,
    members: MemberRepository<SqlitePool>,
    // Keeps a temporary database alive for the handle's lifetime.
    _scratch: Option<tempfile::TempDir>,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> DatabaseResult<Self> {
        Self::open_with_config(DatabaseConfig::new(path.as_ref()))
    }

    /// Open or create a database with custom configuration.
    pub fn open_with_config(config: DatabaseConfig) -> DatabaseResult<Self> {
        Self::open_inner(config, None)
    }

    /// Create a throwaway database that is deleted when the handle drops.
    pub fn temporary() -> DatabaseResult<Self> {
        let dir = tempfile::TempDir::new()?;
        let config = DatabaseConfig::new(dir.path().join("txbind.db"));
        Self::open_inner(config, Some(dir))
    }

    fn open_inner(
        config: DatabaseConfig,
        scratch: Option<tempfile::TempDir>,
    ) -> DatabaseResult<Self> {
        if !config.path.exists() {
            if !config.create_if_missing {
                return Err(DatabaseError::NotFound(config.path.clone()));
            }
            if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = Arc::new(SqlitePool::open(config.pool_config())?);
        let context = Arc::new(TransactionContext::new());
        let manager = TransactionManager::new(pool.clone(), context.clone());
        let members = MemberRepository::new(ConnectionAccessor::new(pool.clone(), context));

        members.create_schema(&UnitOfWorkKey::new())?;
        info!("opened database at {:?}", config.path);

        Ok(Self {
            config,
            pool,
            manager,
            members,
            _scratch: scratch,
        })
    }

    pub fn members(&self) -> &MemberRepository<SqlitePool> {
        &self.members
    }

    pub fn transaction_manager(&self) -> &TransactionManager<SqlitePool> {
        &self.manager
    }

    /// A transfer service sharing this database's pool and context.
    pub fn member_service(&self) -> MemberService<SqlitePool> {
        MemberService::new(self.manager.clone(), self.members.clone())
    }

    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            pool: self.pool.stats(),
            transactions: self.manager.stats(),
        }
    }

    /// Get the database path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Get the configuration.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }
}

/// Database statistics.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DatabaseStats {
    pub pool: PoolStats,
    pub transactions: TransactionStats,
}
