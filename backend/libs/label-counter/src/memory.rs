//! Process-local label store
//!
//! Behaves like a remote table reached through request/response calls: each
//! call may be delayed, which lets concurrent callers interleave between a
//! read and the following write. Faults can be injected per operation.

use crate::error::{LabelError, LabelResult, StoreOp};
use crate::model::Label;
use crate::store::LabelStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Injected misbehavior for the next call of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Reject the call without touching any row
    Fail,
    /// Wait before doing the work
    StallBefore(Duration),
    /// Do the work, then wait before answering
    StallAfter(Duration),
}

/// In-memory label table
pub struct InMemoryLabelStore {
    rows: Mutex<Vec<Label>>,
    next_id: AtomicI64,
    unique_names: bool,
    atomic_increment: bool,
    latency: Duration,
    faults: Mutex<HashMap<StoreOp, VecDeque<Fault>>>,
    calls: Mutex<HashMap<StoreOp, u32>>,
}

impl Default for InMemoryLabelStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLabelStore {
    /// Unique names enforced, no atomic increment, no latency
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
            unique_names: true,
            atomic_increment: false,
            latency: Duration::ZERO,
            faults: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Accept duplicate names, like a table without a unique constraint
    pub fn without_unique_constraint(mut self) -> Self {
        self.unique_names = false;
        self
    }

    /// Advertise and serve `increment` as a single atomic step
    pub fn with_atomic_increment(mut self) -> Self {
        self.atomic_increment = true;
        self
    }

    /// Delay every call by `latency` before it runs
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue a fault for the next call of `op`
    pub fn inject(&self, op: StoreOp, fault: Fault) {
        self.faults.lock().entry(op).or_default().push_back(fault);
    }

    /// Insert a row directly, bypassing faults and uniqueness checks
    pub fn seed(&self, name: &str, count: i64) -> Label {
        let label = Label {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            name: name.to_string(),
            count,
        };
        self.rows.lock().push(label.clone());
        label
    }

    /// All rows in insertion order, duplicates included
    pub fn snapshot(&self) -> Vec<Label> {
        self.rows.lock().clone()
    }

    pub fn records_named(&self, name: &str) -> Vec<Label> {
        self.rows
            .lock()
            .iter()
            .filter(|row| row.name == name)
            .cloned()
            .collect()
    }

    /// Number of calls made for `op`, including failed ones
    pub fn calls(&self, op: StoreOp) -> u32 {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().values().sum()
    }

    async fn begin(&self, op: StoreOp) -> LabelResult<Option<Duration>> {
        *self.calls.lock().entry(op).or_insert(0) += 1;
        let fault = self
            .faults
            .lock()
            .get_mut(&op)
            .and_then(|queue| queue.pop_front());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match fault {
            Some(Fault::Fail) => Err(LabelError::Unavailable(format!(
                "injected failure on {op}"
            ))),
            Some(Fault::StallBefore(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(None)
            }
            Some(Fault::StallAfter(delay)) => Ok(Some(delay)),
            None => Ok(None),
        }
    }

    async fn finish<T>(stall: Option<Duration>, value: T) -> T {
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        value
    }

    fn insert_row(&self, name: &str, count: i64) -> LabelResult<Label> {
        let mut rows = self.rows.lock();
        if self.unique_names && rows.iter().any(|row| row.name == name) {
            return Err(LabelError::DuplicateKey(name.to_string()));
        }

        let label = Label {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            name: name.to_string(),
            count,
        };
        rows.push(label.clone());
        Ok(label)
    }
}

#[async_trait]
impl LabelStore for InMemoryLabelStore {
    async fn find_by_name(&self, name: &str) -> LabelResult<Vec<Label>> {
        let stall = self.begin(StoreOp::Find).await?;
        let mut found = self.records_named(name);
        found.sort_by_key(|row| row.id);
        Ok(Self::finish(stall, found).await)
    }

    async fn insert(&self, name: &str, count: i64) -> LabelResult<Label> {
        let stall = self.begin(StoreOp::Insert).await?;
        let result = self.insert_row(name, count);
        Self::finish(stall, result).await
    }

    async fn update_count(
        &self,
        id: i64,
        expected: i64,
        count: i64,
    ) -> LabelResult<Option<Label>> {
        let stall = self.begin(StoreOp::Update).await?;
        let updated = {
            let mut rows = self.rows.lock();
            match rows.iter_mut().find(|row| row.id == id) {
                Some(row) if row.count == expected => {
                    row.count = count;
                    Some(row.clone())
                }
                _ => None,
            }
        };
        Ok(Self::finish(stall, updated).await)
    }

    fn has_atomic_increment(&self) -> bool {
        self.atomic_increment
    }

    async fn increment(&self, name: &str, by: i64) -> LabelResult<Label> {
        if !self.atomic_increment {
            return Err(LabelError::Unsupported("atomic increment"));
        }

        let stall = self.begin(StoreOp::Increment).await?;
        let label = {
            let mut rows = self.rows.lock();
            match rows.iter_mut().filter(|row| row.name == name).min_by_key(|row| row.id) {
                Some(row) => {
                    row.count += by;
                    row.clone()
                }
                None => {
                    let label = Label {
                        id: self.next_id.fetch_add(1, Ordering::SeqCst),
                        name: name.to_string(),
                        count: by,
                    };
                    rows.push(label.clone());
                    label
                }
            }
        };
        Ok(Self::finish(stall, label).await)
    }

    async fn list(&self) -> LabelResult<Vec<Label>> {
        let stall = self.begin(StoreOp::List).await?;
        let mut rows = self.snapshot();
        rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        Ok(Self::finish(stall, rows).await)
    }
}
