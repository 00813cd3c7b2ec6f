#![allow(dead_code)]

//! In-memory `SqlSession` used to drive the engine without a MySQL server.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use dbmirror::db::{Connector, DbError, Row, SqlSession, SqlValue};
use tokio::sync::Notify;

#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub create_statement: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Pauses one call: `reached` fires when the call arrives, which then waits
/// for `release`.
#[derive(Clone)]
struct Gate {
    reached: Arc<Notify>,
    release: Arc<Notify>,
}

impl Gate {
    fn new() -> Self {
        Self {
            reached: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }

    fn handles(&self) -> (Arc<Notify>, Arc<Notify>) {
        (Arc::clone(&self.reached), Arc::clone(&self.release))
    }

    async fn pass(self) {
        self.reached.notify_one();
        self.release.notified().await;
    }
}

#[derive(Default)]
struct ServerState {
    tables: BTreeMap<String, MemoryTable>,
    fail_connect: bool,
    fail_create: BTreeSet<String>,
    fail_drop: BTreeSet<String>,
    fail_fetch: BTreeSet<String>,
    open_sessions: usize,
    log: Vec<String>,
    insert_gate: Option<(String, Gate)>,
    close_gate: Option<Gate>,
}

/// A fake database server. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryServer {
    state: Arc<Mutex<ServerState>>,
}

pub fn create_statement(name: &str, columns: &[&str]) -> String {
    format!("CREATE TABLE `{}` ({})", name, columns.join(", "))
}

pub fn sample_rows(n: usize) -> Vec<Row> {
    (0..n)
        .map(|i| vec![SqlValue::Int(i as i64), SqlValue::Text(format!("row-{i}"))])
        .collect()
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, name: &str, rows: usize) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.tables.insert(
                name.to_string(),
                MemoryTable {
                    create_statement: create_statement(name, &["id", "label"]),
                    columns: vec!["id".into(), "label".into()],
                    rows: sample_rows(rows),
                },
            );
        }
        self
    }

    pub fn fail_connect(&self) {
        self.state.lock().unwrap().fail_connect = true;
    }

    pub fn fail_create(&self, table: &str) {
        self.state.lock().unwrap().fail_create.insert(table.into());
    }

    pub fn fail_drop(&self, table: &str) {
        self.state.lock().unwrap().fail_drop.insert(table.into());
    }

    pub fn fail_fetch(&self, table: &str) {
        self.state.lock().unwrap().fail_fetch.insert(table.into());
    }

    /// Pause the first insert into `table` until `release` is notified.
    /// Returns `(reached, release)`.
    pub fn gate_insert(&self, table: &str) -> (Arc<Notify>, Arc<Notify>) {
        let gate = Gate::new();
        let handles = gate.handles();
        self.state.lock().unwrap().insert_gate = Some((table.into(), gate));
        handles
    }

    /// Pause the first session close on this server. The engine closes its
    /// sessions after the last step of a run and before recording the
    /// outcome.
    pub fn gate_close(&self) -> (Arc<Notify>, Arc<Notify>) {
        let gate = Gate::new();
        let handles = gate.handles();
        self.state.lock().unwrap().close_gate = Some(gate);
        handles
    }

    pub fn table_names(&self) -> Vec<String> {
        self.state.lock().unwrap().tables.keys().cloned().collect()
    }

    pub fn row_count(&self, table: &str) -> Option<usize> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map(|t| t.rows.len())
    }

    pub fn rows(&self, table: &str) -> Option<Vec<Row>> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
    }

    pub fn open_sessions(&self) -> usize {
        self.state.lock().unwrap().open_sessions
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(MemoryConnector {
            server: self.clone(),
        })
    }

    fn record(&self, entry: String) {
        self.state.lock().unwrap().log.push(entry);
    }
}

struct MemoryConnector {
    server: MemoryServer,
}

#[async_trait::async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn SqlSession>, DbError> {
        let mut state = self.server.state.lock().unwrap();
        if state.fail_connect {
            return Err(DbError::Connection("connection refused".into()));
        }
        state.open_sessions += 1;
        Ok(Box::new(MemorySession {
            server: self.server.clone(),
            closed: false,
        }))
    }

    fn describe(&self) -> String {
        "memory://".into()
    }
}

struct MemorySession {
    server: MemoryServer,
    closed: bool,
}

fn missing(table: &str) -> DbError {
    DbError::Rejected(format!("Table '{table}' doesn't exist"))
}

fn parse_create(sql: &str) -> Option<(String, Vec<String>)> {
    let rest = sql.strip_prefix("CREATE TABLE `")?;
    let (name, rest) = rest.split_once('`')?;
    let open = rest.find('(')?;
    let close = rest.rfind(')')?;
    let columns = rest[open + 1..close]
        .split(',')
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    Some((name.to_string(), columns))
}

impl MemorySession {
    fn ensure_open(&self) -> Result<(), DbError> {
        if self.closed {
            Err(DbError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl SqlSession for MemorySession {
    async fn list_tables(&mut self) -> Result<Vec<String>, DbError> {
        self.ensure_open()?;
        Ok(self.server.table_names())
    }

    async fn show_create_table(&mut self, table: &str) -> Result<String, DbError> {
        self.ensure_open()?;
        self.server.record(format!("SHOW CREATE {table}"));
        let state = self.server.state.lock().unwrap();
        state
            .tables
            .get(table)
            .map(|t| t.create_statement.clone())
            .ok_or_else(|| missing(table))
    }

    async fn drop_table(&mut self, table: &str) -> Result<(), DbError> {
        self.ensure_open()?;
        let mut state = self.server.state.lock().unwrap();
        if state.fail_drop.contains(table) {
            return Err(DbError::Rejected(format!("cannot drop {table}")));
        }
        state.tables.remove(table).ok_or_else(|| missing(table))?;
        state.log.push(format!("DROP {table}"));
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<(), DbError> {
        self.ensure_open()?;
        let (name, columns) = parse_create(sql)
            .ok_or_else(|| DbError::Rejected(format!("unsupported statement: {sql}")))?;
        let mut state = self.server.state.lock().unwrap();
        if state.fail_create.contains(&name) {
            return Err(DbError::Rejected(format!(
                "syntax not supported by target for {name}"
            )));
        }
        if state.tables.contains_key(&name) {
            return Err(DbError::Rejected(format!("Table '{name}' already exists")));
        }
        state.tables.insert(
            name.clone(),
            MemoryTable {
                create_statement: sql.to_string(),
                columns,
                rows: Vec::new(),
            },
        );
        state.log.push(format!("CREATE {name}"));
        Ok(())
    }

    async fn fetch_rows(&mut self, table: &str) -> Result<Vec<Row>, DbError> {
        self.ensure_open()?;
        let mut state = self.server.state.lock().unwrap();
        state.log.push(format!("SELECT {table}"));
        if state.fail_fetch.contains(table) {
            return Err(DbError::Rejected(format!("read of {table} failed")));
        }
        state
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .ok_or_else(|| missing(table))
    }

    async fn column_names(&mut self, table: &str) -> Result<Vec<String>, DbError> {
        self.ensure_open()?;
        let state = self.server.state.lock().unwrap();
        state
            .tables
            .get(table)
            .map(|t| t.columns.clone())
            .ok_or_else(|| missing(table))
    }

    async fn truncate_table(&mut self, table: &str) -> Result<(), DbError> {
        self.ensure_open()?;
        let mut state = self.server.state.lock().unwrap();
        state
            .tables
            .get_mut(table)
            .ok_or_else(|| missing(table))?
            .rows
            .clear();
        state.log.push(format!("TRUNCATE {table}"));
        Ok(())
    }

    async fn insert_rows(
        &mut self,
        table: &str,
        columns: &[String],
        rows: &[Row],
    ) -> Result<u64, DbError> {
        self.ensure_open()?;

        let gate = {
            let mut state = self.server.state.lock().unwrap();
            match &state.insert_gate {
                Some((gated, _)) if gated == table => state.insert_gate.take(),
                _ => None,
            }
        };
        if let Some((_, gate)) = gate {
            gate.pass().await;
        }

        let mut state = self.server.state.lock().unwrap();
        let target = state.tables.get_mut(table).ok_or_else(|| missing(table))?;
        if target.columns != columns {
            return Err(DbError::Rejected(format!(
                "column mismatch for {table}: {:?} vs {:?}",
                target.columns, columns
            )));
        }
        target.rows.extend_from_slice(rows);
        state.log.push(format!("INSERT {table} {}", rows.len()));
        Ok(rows.len() as u64)
    }

    async fn set_foreign_key_checks(&mut self, enabled: bool) -> Result<(), DbError> {
        self.ensure_open()?;
        self.server
            .record(format!("FOREIGN_KEY_CHECKS {}", u8::from(enabled)));
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        self.ensure_open()?;
        self.server.record("COMMIT".into());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DbError> {
        if self.closed {
            return Ok(());
        }
        let gate = self.server.state.lock().unwrap().close_gate.take();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        self.closed = true;
        self.server.state.lock().unwrap().open_sessions -= 1;
        Ok(())
    }
}
