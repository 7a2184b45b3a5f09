//! In-memory [`Database`] double for unit tests. Records every statement and
//! answers reads from a queue of scripted result sets.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{Attributes, Database, Executed, Value};
use crate::error::Result;

#[derive(Default)]
pub(crate) struct RecordingDatabase {
    statements: Mutex<Vec<(String, Vec<Value>)>>,
    results: Mutex<VecDeque<Vec<Attributes>>>,
    next_id: AtomicI64,
    reject_inserts: AtomicBool,
}

impl RecordingDatabase {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self { next_id: AtomicI64::new(1), ..Self::default() })
    }

    /// Queues the rows returned by the next read.
    pub(crate) fn push_rows(&self, rows: Vec<Attributes>) {
        self.results.lock().unwrap().push_back(rows);
    }

    /// Makes every following INSERT report no generated id.
    pub(crate) fn reject_inserts(&self) {
        self.reject_inserts.store(true, Ordering::SeqCst);
    }

    pub(crate) fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.statements.lock().unwrap().clone()
    }

    pub(crate) fn sql(&self) -> Vec<String> {
        self.statements().into_iter().map(|(sql, _)| sql).collect()
    }

    fn record(&self, sql: &str, bindings: &[Value]) {
        self.statements.lock().unwrap().push((sql.to_owned(), bindings.to_vec()));
    }
}

#[async_trait]
impl Database for RecordingDatabase {
    async fn execute(&self, sql: &str, bindings: &[Value]) -> Result<Executed> {
        self.record(sql, bindings);
        if sql.starts_with("INSERT") {
            if self.reject_inserts.load(Ordering::SeqCst) {
                return Ok(Executed::default());
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            return Ok(Executed { rows_affected: 1, last_insert_id: Some(id) });
        }
        Ok(Executed { rows_affected: 1, last_insert_id: None })
    }

    async fn fetch_all(&self, sql: &str, bindings: &[Value]) -> Result<Vec<Attributes>> {
        self.record(sql, bindings);
        Ok(self.results.lock().unwrap().pop_front().unwrap_or_default())
    }
}
