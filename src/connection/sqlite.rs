//! SQLite-backed connections and a bounded, blocking connection pool.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde::Serialize;

use super::{Connection, ConnectionPool, PoolError, RawError, Row, Value};

/// A pooled SQLite session.
///
/// Disabling auto-commit does not touch the database right away:
/// `BEGIN IMMEDIATE` is issued in front of the next statement. Taking the
/// write lock up front makes concurrent read-then-write transactions wait on
/// the busy timeout instead of failing on a lock upgrade. Commit and rollback
/// end the open transaction, if any, and the next statement opens a fresh one.
pub struct SqliteConnection {
    id: usize,
    conn: rusqlite::Connection,
    auto_commit: bool,
}

impl SqliteConnection {
    fn new(id: usize, conn: rusqlite::Connection) -> Self {
        Self {
            id,
            conn,
            auto_commit: true,
        }
    }

    /// Whether a transaction is open on the underlying session.
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn ensure_transaction(&mut self) -> Result<(), RawError> {
        if !self.auto_commit && !self.in_transaction() {
            self.conn.execute_batch("BEGIN IMMEDIATE")?;
            debug!("connection {}: BEGIN IMMEDIATE", self.id);
        }
        Ok(())
    }
}

impl Connection for SqliteConnection {
    fn id(&self) -> usize {
        self.id
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), RawError> {
        if enabled && !self.auto_commit && self.in_transaction() {
            // Leaving manual mode must not carry half-finished work into
            // the next borrower's session.
            warn!(
                "connection {}: auto-commit re-enabled with an open transaction, rolling back",
                self.id
            );
            self.conn.execute_batch("ROLLBACK")?;
        }
        self.auto_commit = enabled;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), RawError> {
        if self.auto_commit {
            return Err(not_in_transaction("commit"));
        }
        if self.in_transaction() {
            self.conn.execute_batch("COMMIT")?;
            debug!("connection {}: COMMIT", self.id);
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), RawError> {
        if self.auto_commit {
            return Err(not_in_transaction("rollback"));
        }
        if self.in_transaction() {
            self.conn.execute_batch("ROLLBACK")?;
            debug!("connection {}: ROLLBACK", self.id);
        }
        Ok(())
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<usize, RawError> {
        self.ensure_transaction()?;
        let params: Vec<SqlValue> = params.iter().map(to_sql).collect();
        Ok(self
            .conn
            .execute(sql, rusqlite::params_from_iter(params.iter()))?)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, RawError> {
        self.ensure_transaction()?;
        let params: Vec<SqlValue> = params.iter().map(to_sql).collect();

        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (idx, name) in columns.iter().enumerate() {
                record.insert(name.clone(), from_sql(row.get_ref(idx)?));
            }
            out.push(record);
        }
        Ok(out)
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("id", &self.id)
            .field("auto_commit", &self.auto_commit)
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}

fn not_in_transaction(op: &str) -> RawError {
    // SQLSTATE 25000: invalid transaction state
    RawError::with_sqlstate("25000", format!("{op} requested while auto-commit is enabled"))
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Array(b.iter().map(|byte| Value::from(*byte)).collect()),
    }
}

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Database file.
    pub path: PathBuf,
    /// Upper bound on open connections.
    pub max_connections: usize,
    /// How long `acquire` waits for a free connection.
    pub acquire_timeout: Duration,
    /// SQLite busy handler timeout per connection.
    pub busy_timeout: Duration,
}

impl PoolConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Physical connections currently open.
    pub created: usize,
    /// Connections waiting in the pool.
    pub idle: usize,
    /// Total successful acquisitions.
    pub acquired: usize,
    /// Total releases.
    pub released: usize,
    /// Total discards.
    pub discarded: usize,
}

struct PoolState {
    idle: VecDeque<SqliteConnection>,
    created: usize,
    next_id: usize,
}

struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
    available: Condvar,
    acquired: AtomicUsize,
    released: AtomicUsize,
    discarded: AtomicUsize,
}

/// Bounded pool of SQLite connections.
///
/// Cheap to clone; clones share the same connections.
#[derive(Clone)]
pub struct SqlitePool {
    inner: Arc<PoolInner>,
}

impl SqlitePool {
    /// Create a pool and open its first connection to validate the path.
    pub fn open(mut config: PoolConfig) -> Result<Self, PoolError> {
        config.max_connections = config.max_connections.max(1);

        let first = open_connection(&config, 1).map_err(PoolError::Connect)?;
        let mut idle = VecDeque::with_capacity(config.max_connections);
        idle.push_back(first);

        debug!(
            "opened pool on {:?} (max {} connections)",
            config.path, config.max_connections
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(PoolState {
                    idle,
                    created: 1,
                    next_id: 1,
                }),
                available: Condvar::new(),
                acquired: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
                discarded: AtomicUsize::new(0),
            }),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            created: state.created,
            idle: state.idle.len(),
            acquired: self.inner.acquired.load(Ordering::Relaxed),
            released: self.inner.released.load(Ordering::Relaxed),
            discarded: self.inner.discarded.load(Ordering::Relaxed),
        }
    }

    fn checked_out(&self, conn: SqliteConnection) -> SqliteConnection {
        self.inner.acquired.fetch_add(1, Ordering::Relaxed);
        debug!("acquired connection {}", conn.id);
        conn
    }
}

fn open_connection(config: &PoolConfig, id: usize) -> Result<SqliteConnection, RawError> {
    let conn = rusqlite::Connection::open(&config.path)?;
    conn.busy_timeout(config.busy_timeout)?;
    Ok(SqliteConnection::new(id, conn))
}

impl ConnectionPool for SqlitePool {
    type Conn = SqliteConnection;

    fn acquire(&self) -> Result<SqliteConnection, PoolError> {
        let config = &self.inner.config;
        let deadline = Instant::now() + config.acquire_timeout;
        let mut state = self.inner.state.lock();

        loop {
            if let Some(conn) = state.idle.pop_front() {
                return Ok(self.checked_out(conn));
            }

            if state.created < config.max_connections {
                state.created += 1;
                state.next_id += 1;
                let id = state.next_id;
                drop(state);

                return match open_connection(config, id) {
                    Ok(conn) => Ok(self.checked_out(conn)),
                    Err(e) => {
                        self.inner.state.lock().created -= 1;
                        self.inner.available.notify_one();
                        Err(PoolError::Connect(e))
                    }
                };
            }

            if self
                .inner
                .available
                .wait_until(&mut state, deadline)
                .timed_out()
                && state.idle.is_empty()
                && state.created >= config.max_connections
            {
                return Err(PoolError::Timeout {
                    waited: config.acquire_timeout,
                });
            }
        }
    }

    fn release(&self, conn: SqliteConnection) {
        if !conn.auto_commit() {
            warn!(
                "connection {} returned to the pool with auto-commit disabled",
                conn.id
            );
        }
        debug!("released connection {}", conn.id);

        self.inner.state.lock().idle.push_back(conn);
        self.inner.released.fetch_add(1, Ordering::Relaxed);
        self.inner.available.notify_one();
    }

    fn discard(&self, conn: SqliteConnection) {
        debug!("discarding connection {}", conn.id);
        drop(conn);

        self.inner.state.lock().created -= 1;
        self.inner.discarded.fetch_add(1, Ordering::Relaxed);
        self.inner.available.notify_one();
    }
}

impl std::fmt::Debug for SqlitePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlitePool")
            .field("path", &self.inner.config.path)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;
    use tempfile::TempDir;

    fn setup(max_connections: usize) -> (TempDir, SqlitePool) {
        let dir = TempDir::new().unwrap();
        let mut config = PoolConfig::new(dir.path().join("pool.db"));
        config.max_connections = max_connections;
        config.acquire_timeout = Duration::from_millis(200);
        let pool = SqlitePool::open(config).unwrap();

        let mut conn = pool.acquire().unwrap();
        conn.execute(
            "CREATE TABLE item (id TEXT PRIMARY KEY, qty INTEGER NOT NULL)",
            &[],
        )
        .unwrap();
        pool.release(conn);

        (dir, pool)
    }

    fn count(pool: &SqlitePool) -> i64 {
        let mut conn = pool.acquire().unwrap();
        let rows = conn.query("SELECT COUNT(*) AS n FROM item", &[]).unwrap();
        pool.release(conn);
        rows[0]["n"].as_i64().unwrap()
    }

    #[test]
    fn test_pool_reuse() {
        let (_dir, pool) = setup(5);

        let conn1 = pool.acquire().unwrap();
        let conn2 = pool.acquire().unwrap();
        assert_eq!(pool.stats().created, 2);
        pool.release(conn1);
        pool.release(conn2);

        assert_eq!(pool.stats().idle, 2);

        // Reuse existing connection.
        let _conn3 = pool.acquire().unwrap();
        assert_eq!(pool.stats().created, 2);
    }

    #[test]
    fn test_acquire_times_out_when_exhausted() {
        let (_dir, pool) = setup(1);

        let held = pool.acquire().unwrap();
        let err = pool.acquire().unwrap_err();
        assert!(matches!(err, PoolError::Timeout { .. }));

        pool.release(held);
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn test_blocked_acquire_wakes_on_release() {
        let (_dir, pool) = setup(1);
        let held = pool.acquire().unwrap();

        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || pool.acquire().map(|c| c.id()))
        };

        thread::sleep(Duration::from_millis(20));
        let id = held.id();
        pool.release(held);

        assert_eq!(waiter.join().unwrap().unwrap(), id);
    }

    #[test]
    fn test_discard_frees_a_slot() {
        let (_dir, pool) = setup(1);

        let conn = pool.acquire().unwrap();
        pool.discard(conn);

        let stats = pool.stats();
        assert_eq!(stats.created, 0);
        assert_eq!(stats.discarded, 1);

        let conn = pool.acquire().unwrap();
        assert_eq!(conn.id(), 2);
    }

    #[test]
    fn test_manual_mode_commit() {
        let (_dir, pool) = setup(2);
        let mut conn = pool.acquire().unwrap();

        conn.set_auto_commit(false).unwrap();
        assert!(!conn.in_transaction());

        conn.execute(
            "INSERT INTO item (id, qty) VALUES (?1, ?2)",
            &[json!("a"), json!(3)],
        )
        .unwrap();
        assert!(conn.in_transaction());

        conn.commit().unwrap();
        assert!(!conn.in_transaction());
        conn.set_auto_commit(true).unwrap();
        pool.release(conn);

        assert_eq!(count(&pool), 1);
    }

    #[test]
    fn test_manual_mode_rollback() {
        let (_dir, pool) = setup(2);
        let mut conn = pool.acquire().unwrap();

        conn.set_auto_commit(false).unwrap();
        conn.execute(
            "INSERT INTO item (id, qty) VALUES (?1, ?2)",
            &[json!("a"), json!(3)],
        )
        .unwrap();
        conn.rollback().unwrap();
        conn.set_auto_commit(true).unwrap();
        pool.release(conn);

        assert_eq!(count(&pool), 0);
    }

    #[test]
    fn test_reenabling_auto_commit_discards_open_transaction() {
        let (_dir, pool) = setup(2);
        let mut conn = pool.acquire().unwrap();

        conn.set_auto_commit(false).unwrap();
        conn.execute(
            "INSERT INTO item (id, qty) VALUES (?1, ?2)",
            &[json!("a"), json!(3)],
        )
        .unwrap();
        conn.set_auto_commit(true).unwrap();
        assert!(!conn.in_transaction());
        pool.release(conn);

        assert_eq!(count(&pool), 0);
    }

    #[test]
    fn test_read_then_write_transactions_queue() {
        let (_dir, pool) = setup(2);
        let mut seed = pool.acquire().unwrap();
        seed.execute("INSERT INTO item (id, qty) VALUES ('a', 0)", &[])
            .unwrap();
        pool.release(seed);

        let mut first = pool.acquire().unwrap();
        let mut second = pool.acquire().unwrap();
        first.set_auto_commit(false).unwrap();
        second.set_auto_commit(false).unwrap();

        // The first transaction reads, so it now holds the write lock.
        first.query("SELECT qty FROM item WHERE id = 'a'", &[]).unwrap();

        let waiter = thread::spawn(move || {
            let rows = second.query("SELECT qty FROM item WHERE id = 'a'", &[])?;
            let qty = rows[0]["qty"].as_i64().unwrap_or_default();
            second.execute(
                "UPDATE item SET qty = ?1 WHERE id = 'a'",
                &[json!(qty + 1)],
            )?;
            second.commit()?;
            second.set_auto_commit(true)?;
            Ok::<_, RawError>(second)
        });

        thread::sleep(Duration::from_millis(50));
        first
            .execute("UPDATE item SET qty = qty + 1 WHERE id = 'a'", &[])
            .unwrap();
        first.commit().unwrap();
        first.set_auto_commit(true).unwrap();

        let second = waiter.join().unwrap().unwrap();
        pool.release(first);
        pool.release(second);

        let mut conn = pool.acquire().unwrap();
        let rows = conn.query("SELECT qty FROM item WHERE id = 'a'", &[]).unwrap();
        assert_eq!(rows[0]["qty"], json!(2));
        pool.release(conn);
    }

    #[test]
    fn test_commit_in_auto_commit_mode_is_rejected() {
        let (_dir, pool) = setup(1);
        let mut conn = pool.acquire().unwrap();

        let err = conn.commit().unwrap_err();
        assert_eq!(err.sqlstate(), Some("25000"));
    }

    #[test]
    fn test_query_maps_column_types() {
        let (_dir, pool) = setup(1);
        let mut conn = pool.acquire().unwrap();

        let rows = conn
            .query(
                "SELECT ?1 AS s, ?2 AS i, 1.5 AS r, NULL AS n",
                &[json!("text"), json!(42)],
            )
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["s"], json!("text"));
        assert_eq!(rows[0]["i"], json!(42));
        assert_eq!(rows[0]["r"], json!(1.5));
        assert_eq!(rows[0]["n"], Value::Null);
    }
}
