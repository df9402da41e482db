// SPDX-License-Identifier: MIT

//! Keyed, atomically updated store of workflow records.
//!
//! The only shared mutable state in the engine. All mutation goes through
//! `create_if_absent` / `update` under one write lock so concurrent callers
//! never observe a torn write, and `lock_for` hands out per-key mutexes the
//! router holds across a whole run to serialize webhook and timer re-entries
//! for the same conversation.

use super::record::{ApprovalStatus, WorkflowRecord};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Default)]
struct StoreInner {
    records: HashMap<String, WorkflowRecord>,
    /// ticket_ref -> conversation_key; bijective while a workflow is active
    by_ticket: HashMap<String, String>,
}

#[derive(Clone, Default)]
pub struct WorkflowStore {
    inner: Arc<RwLock<StoreInner>>,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl WorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<WorkflowRecord> {
        let inner = self.inner.read().await;
        inner.records.get(key).cloned()
    }

    /// Insert a record unless one already exists for the key; returns the
    /// stored record either way. A workflow is created at most once.
    pub async fn create_if_absent(&self, record: WorkflowRecord) -> WorkflowRecord {
        let mut inner = self.inner.write().await;
        inner
            .records
            .entry(record.conversation_key.clone())
            .or_insert(record)
            .clone()
    }

    /// Atomic read-modify-write. `None` when the key is absent, which is a
    /// valid state (the workflow already completed), not an error.
    pub async fn update<F>(&self, key: &str, mutate: F) -> Option<WorkflowRecord>
    where
        F: FnOnce(&mut WorkflowRecord),
    {
        let mut inner = self.inner.write().await;
        let record = inner.records.get_mut(key)?;
        mutate(record);
        Some(record.clone())
    }

    /// Idempotent removal; also drops ticket index entries for the key.
    pub async fn remove(&self, key: &str) -> bool {
        let mut inner = self.inner.write().await;
        inner.by_ticket.retain(|_, k| k != key);
        inner.records.remove(key).is_some()
    }

    pub async fn register_ticket(&self, ticket_ref: &str, key: &str) {
        let mut inner = self.inner.write().await;
        inner
            .by_ticket
            .insert(ticket_ref.to_string(), key.to_string());
    }

    pub async fn key_for_ticket(&self, ticket_ref: &str) -> Option<String> {
        let inner = self.inner.read().await;
        inner.by_ticket.get(ticket_ref).cloned()
    }

    /// Conversation keys currently waiting on approvals, for the poller.
    pub async fn pending_keys(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        inner
            .records
            .values()
            .filter(|r| r.approval_status == ApprovalStatus::Pending)
            .map(|r| r.conversation_key.clone())
            .collect()
    }

    pub async fn all(&self) -> Vec<WorkflowRecord> {
        let inner = self.inner.read().await;
        inner.records.values().cloned().collect()
    }

    /// Per-key serialization handle. Lock entries are small and workflows are
    /// short-lived, so entries are not reaped.
    pub async fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
