//! Scripted database used by the engine tests.
//!
//! Every statement a session receives is recorded; results are served from a
//! queue in the order they were scripted.

#![allow(dead_code)]

use async_trait::async_trait;
use hybrid_postgres::{
    AppContext, Database, HybridError, MemoryCache, Model, ModelDef, Result, Row, SemanticType,
    Session, Statement, Table, Value,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub enum Reply {
    Rows(Vec<Row>),
    Affected(u64),
    Fail(HybridError),
}

#[derive(Default)]
struct State {
    replies: VecDeque<Reply>,
    statements: Vec<Statement>,
}

/// Pool stand-in. Clones share the script and counters.
#[derive(Clone, Default)]
pub struct ScriptedDb {
    state: Arc<Mutex<State>>,
    acquired: Arc<AtomicUsize>,
    open: Arc<AtomicUsize>,
}

impl ScriptedDb {
    pub fn new() -> Self {
        init_tracing();
        Self::default()
    }

    pub fn rows(&self, rows: Vec<Row>) -> &Self {
        self.state.lock().replies.push_back(Reply::Rows(rows));
        self
    }

    pub fn affected(&self, n: u64) -> &Self {
        self.state.lock().replies.push_back(Reply::Affected(n));
        self
    }

    pub fn fail(&self, err: HybridError) -> &Self {
        self.state.lock().replies.push_back(Reply::Fail(err));
        self
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.state.lock().statements.clone()
    }

    pub fn sql(&self) -> Vec<String> {
        self.statements().into_iter().map(|s| s.sql).collect()
    }

    pub fn pending(&self) -> usize {
        self.state.lock().replies.len()
    }

    /// Sessions handed out so far.
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Sessions not yet dropped.
    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// A session outside the pool, as a caller holding its own connection would have.
    pub fn session(&self) -> ScriptedSession {
        self.open.fetch_add(1, Ordering::SeqCst);
        ScriptedSession { db: self.clone() }
    }

    fn next(&self, stmt: &Statement) -> Result<Reply> {
        let mut state = self.state.lock();
        state.statements.push(stmt.clone());
        state
            .replies
            .pop_front()
            .ok_or_else(|| HybridError::Internal(format!("unscripted statement: {}", stmt.sql)))
    }
}

#[async_trait]
impl Database for ScriptedDb {
    async fn acquire(&self) -> Result<Box<dyn Session>> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.session()))
    }
}

pub struct ScriptedSession {
    db: ScriptedDb,
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        self.db.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Session for ScriptedSession {
    async fn fetch_all(&mut self, stmt: &Statement) -> Result<Vec<Row>> {
        match self.db.next(stmt)? {
            Reply::Rows(rows) => Ok(rows),
            Reply::Affected(_) => Ok(Vec::new()),
            Reply::Fail(err) => Err(err),
        }
    }

    async fn execute(&mut self, stmt: &Statement) -> Result<u64> {
        match self.db.next(stmt)? {
            Reply::Rows(rows) => Ok(rows.len() as u64),
            Reply::Affected(n) => Ok(n),
            Reply::Fail(err) => Err(err),
        }
    }
}

/// Routes engine spans and events to the test output; `RUST_LOG` overrides the level.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("hybrid_postgres=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

pub fn row(pairs: &[(&str, Value)]) -> Row {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

pub fn context(db: &ScriptedDb, cache: &MemoryCache) -> AppContext {
    AppContext::new(Arc::new(db.clone()), Arc::new(cache.clone()))
}

pub fn items_table() -> Table {
    Table::new("items")
        .and_then(|t| t.column("id", SemanticType::Native("AutoField".into())))
        .and_then(|t| t.column("name", SemanticType::Native("CharField".into())))
        .and_then(|t| t.column("views", SemanticType::Native("IntegerField".into())))
        .and_then(|t| t.column("price", SemanticType::Native("DecimalField".into())))
        .and_then(|t| t.column("meta", SemanticType::Json))
        .and_then(|t| t.column("updated", SemanticType::Native("DateTimeField".into())))
        .expect("valid table")
}

pub fn items(db: &ScriptedDb, cache: &MemoryCache) -> Model {
    items_with(ModelDef::new("Item", items_table()), db, cache)
}

pub fn items_with(def: ModelDef, db: &ScriptedDb, cache: &MemoryCache) -> Model {
    Model::bind(Arc::new(def), context(db, cache))
}
