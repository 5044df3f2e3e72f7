//! Per-run lookup cache
//!
//! Single-flight: concurrent requests for the same key share one execution
//! and observe the same outcome, success or failure. The cache lives for a
//! single run and is never reused by the next one.

use super::report::FailureKind;
use crate::lookup::LookupKey;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

pub type Outcome = Result<Arc<Value>, FailureKind>;

#[derive(Default)]
pub struct LookupCache {
    cells: Mutex<HashMap<LookupKey, Arc<OnceCell<Outcome>>>>,
    executions: AtomicUsize,
}

impl LookupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached outcome for `key`, running `execute` only if no
    /// other caller has run (or is running) it yet
    pub async fn get_or_execute<F, Fut>(&self, key: &LookupKey, execute: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome>,
    {
        let cell = {
            let mut cells = self.cells.lock().await;
            Arc::clone(cells.entry(key.clone()).or_default())
        };

        cell.get_or_init(|| async {
            self.executions.fetch_add(1, Ordering::SeqCst);
            execute().await
        })
        .await
        .clone()
    }

    /// Outcome for `key` if it has completed
    pub async fn get(&self, key: &LookupKey) -> Option<Outcome> {
        let cells = self.cells.lock().await;
        cells.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Number of times an execution actually ran
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}
