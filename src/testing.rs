//! In-memory connection and pool doubles that record what was done to them.

use parking_lot::Mutex;

use crate::connection::{Connection, ConnectionPool, PoolError, RawError, Row, Value};

/// Failures to inject into connections created by a [`FakePool`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Script {
    pub fail_begin: bool,
    pub fail_restore: bool,
    pub fail_commit: bool,
    pub fail_rollback: bool,
}

#[derive(Debug)]
pub struct FakeConnection {
    id: usize,
    auto_commit: bool,
    pub commits: usize,
    pub rollbacks: usize,
    pub statements: Vec<String>,
    script: Script,
}

impl FakeConnection {
    pub fn new(id: usize) -> Self {
        Self::scripted(id, Script::default())
    }

    pub fn scripted(id: usize, script: Script) -> Self {
        Self {
            id,
            auto_commit: true,
            commits: 0,
            rollbacks: 0,
            statements: Vec::new(),
            script,
        }
    }
}

impl Connection for FakeConnection {
    fn id(&self) -> usize {
        self.id
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit
    }

    fn set_auto_commit(&mut self, enabled: bool) -> Result<(), RawError> {
        if !enabled && self.script.fail_begin {
            return Err(RawError::with_code(5, "database is locked"));
        }
        if enabled && self.script.fail_restore {
            return Err(RawError::with_sqlstate("08003", "connection does not exist"));
        }
        self.auto_commit = enabled;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), RawError> {
        self.commits += 1;
        if self.script.fail_commit {
            return Err(RawError::with_code(5, "database is locked"));
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), RawError> {
        self.rollbacks += 1;
        if self.script.fail_rollback {
            return Err(RawError::with_code(10, "disk I/O error"));
        }
        Ok(())
    }

    fn execute(&mut self, sql: &str, _params: &[Value]) -> Result<usize, RawError> {
        self.statements.push(sql.to_string());
        Ok(1)
    }

    fn query(&mut self, sql: &str, _params: &[Value]) -> Result<Vec<Row>, RawError> {
        self.statements.push(sql.to_string());
        Ok(Vec::new())
    }
}

/// What a connection looked like when it came back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Returned {
    pub id: usize,
    pub auto_commit: bool,
    pub commits: usize,
    pub rollbacks: usize,
    pub discarded: bool,
}

#[derive(Default)]
struct FakePoolState {
    idle: Vec<FakeConnection>,
    returned: Vec<Returned>,
    acquired: usize,
    next_id: usize,
}

#[derive(Default)]
pub struct FakePool {
    state: Mutex<FakePoolState>,
    script: Script,
    exhausted: bool,
    manual_commit: bool,
}

impl FakePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(script: Script) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    /// A pool whose connections come out with auto-commit already disabled.
    pub fn manual_commit() -> Self {
        Self {
            manual_commit: true,
            ..Self::default()
        }
    }

    /// A pool that never hands out a connection.
    pub fn exhausted() -> Self {
        Self {
            exhausted: true,
            ..Self::default()
        }
    }

    pub fn acquired(&self) -> usize {
        self.state.lock().acquired
    }

    /// Every release and discard, in order.
    pub fn returned(&self) -> Vec<Returned> {
        self.state.lock().returned.clone()
    }

    fn record(&self, conn: &FakeConnection, discarded: bool) {
        self.state.lock().returned.push(Returned {
            id: conn.id,
            auto_commit: conn.auto_commit,
            commits: conn.commits,
            rollbacks: conn.rollbacks,
            discarded,
        });
    }
}

impl ConnectionPool for FakePool {
    type Conn = FakeConnection;

    fn acquire(&self) -> Result<FakeConnection, PoolError> {
        if self.exhausted {
            return Err(PoolError::Timeout {
                waited: std::time::Duration::from_millis(0),
            });
        }
        let mut state = self.state.lock();
        state.acquired += 1;
        if let Some(conn) = state.idle.pop() {
            return Ok(conn);
        }
        state.next_id += 1;
        let mut conn = FakeConnection::scripted(state.next_id, self.script);
        conn.auto_commit = !self.manual_commit;
        Ok(conn)
    }

    fn release(&self, conn: FakeConnection) {
        self.record(&conn, false);
        self.state.lock().idle.push(conn);
    }

    fn discard(&self, conn: FakeConnection) {
        self.record(&conn, true);
    }
}
