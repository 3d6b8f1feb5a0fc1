//! In-memory collaborator implementations for development and tests.
//!
//! Each store is a mutex-guarded collection with an optional failure queue:
//! `inject_failure` pushes an error that the next operation returns instead
//! of running, which is how the resilience paths get exercised in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::{
    AuditEntry, AuditLog, ContentStore, ErrorRecord, ErrorStore, Notification,
    NotificationDispatcher, StoreError,
};
use crate::workflow::item::{WorkItem, WorkItemFilter, WorkItemPatch};

#[derive(Default)]
struct FailureQueue {
    queued: Mutex<VecDeque<StoreError>>,
}

impl FailureQueue {
    fn push(&self, error: StoreError) {
        self.queued.lock().unwrap().push_back(error);
    }

    fn take(&self) -> Option<StoreError> {
        self.queued.lock().unwrap().pop_front()
    }
}

#[derive(Default)]
pub struct InMemoryContentStore {
    items: Mutex<HashMap<String, WorkItem>>,
    failures: FailureQueue,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error to be returned by the next store call, in place of
    /// running it.
    pub fn inject_failure(&self, error: StoreError) {
        self.failures.push(error);
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_injected(&self) -> Result<(), StoreError> {
        match self.failures.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn get(&self, id: &str) -> Result<WorkItem, StoreError> {
        self.check_injected()?;
        self.items
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn create(&self, item: WorkItem) -> Result<WorkItem, StoreError> {
        self.check_injected()?;
        if item.title.trim().is_empty() {
            return Err(StoreError::Validation("title must not be empty".to_string()));
        }
        let mut items = self.items.lock().unwrap();
        if items.contains_key(&item.id) {
            return Err(StoreError::Validation(format!(
                "work item {} already exists",
                item.id
            )));
        }
        items.insert(item.id.clone(), item.clone());
        Ok(item)
    }

    async fn patch(
        &self,
        id: &str,
        expected_version: u64,
        update: WorkItemPatch,
    ) -> Result<WorkItem, StoreError> {
        self.check_injected()?;
        let mut items = self.items.lock().unwrap();
        let item = items
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if item.version != expected_version {
            return Err(StoreError::VersionConflict {
                id: id.to_string(),
                expected: expected_version,
                found: item.version,
            });
        }

        if let Some(status) = update.status {
            item.status = status;
        }
        if let Some(assigned_to) = update.assigned_to {
            item.assigned_to = assigned_to;
        }
        if let Some(reviewer) = update.reviewer {
            item.reviewer = reviewer;
        }
        item.history.extend(update.append_history);
        item.comments.extend(update.append_comments);
        item.version += 1;

        Ok(item.clone())
    }

    async fn list(&self, filter: &WorkItemFilter) -> Result<Vec<WorkItem>, StoreError> {
        self.check_injected()?;
        let items = self.items.lock().unwrap();
        let mut matched: Vec<WorkItem> = items
            .values()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matched)
    }
}

#[derive(Default)]
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
    failures: FailureQueue,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject_failure(&self, error: StoreError) {
        self.failures.push(error);
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Seed an entry with an explicit timestamp, for retention tests.
    pub fn seed(&self, mut entry: AuditEntry, timestamp: DateTime<Utc>) {
        entry.timestamp = timestamp;
        self.entries.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<(), StoreError> {
        if let Some(error) = self.failures.take() {
            return Err(error);
        }
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        if let Some(error) = self.failures.take() {
            return Err(error);
        }
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|entry| entry.timestamp >= cutoff);
        Ok((before - entries.len()) as u64)
    }

    async fn count_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        if let Some(error) = self.failures.take() {
            return Err(error);
        }
        let entries = self.entries.lock().unwrap();
        Ok(entries.iter().filter(|entry| entry.timestamp < cutoff).count() as u64)
    }
}

#[derive(Default)]
pub struct InMemoryErrorStore {
    records: Mutex<Vec<ErrorRecord>>,
    failures: FailureQueue,
}

impl InMemoryErrorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject_failure(&self, error: StoreError) {
        self.failures.push(error);
    }

    pub fn records(&self) -> Vec<ErrorRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn seed(&self, mut record: ErrorRecord, timestamp: DateTime<Utc>) {
        record.timestamp = timestamp;
        self.records.lock().unwrap().push(record);
    }
}

#[async_trait]
impl ErrorStore for InMemoryErrorStore {
    async fn record(&self, record: ErrorRecord) -> Result<(), StoreError> {
        if let Some(error) = self.failures.take() {
            return Err(error);
        }
        self.records.lock().unwrap().push(record);
        Ok(())
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        if let Some(error) = self.failures.take() {
            return Err(error);
        }
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|record| record.timestamp >= cutoff);
        Ok((before - records.len()) as u64)
    }

    async fn count_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        if let Some(error) = self.failures.take() {
            return Err(error);
        }
        let records = self.records.lock().unwrap();
        Ok(records.iter().filter(|record| record.timestamp < cutoff).count() as u64)
    }
}

#[derive(Default)]
pub struct InMemoryNotificationDispatcher {
    sent: Mutex<Vec<Notification>>,
    failures: FailureQueue,
}

impl InMemoryNotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inject_failure(&self, error: StoreError) {
        self.failures.push(error);
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn seed(&self, mut notification: Notification, timestamp: DateTime<Utc>) {
        notification.created_at = timestamp;
        self.sent.lock().unwrap().push(notification);
    }
}

#[async_trait]
impl NotificationDispatcher for InMemoryNotificationDispatcher {
    async fn send(&self, notification: Notification) -> Result<(), StoreError> {
        if let Some(error) = self.failures.take() {
            return Err(error);
        }
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        if let Some(error) = self.failures.take() {
            return Err(error);
        }
        let mut sent = self.sent.lock().unwrap();
        let before = sent.len();
        sent.retain(|notification| notification.created_at >= cutoff);
        Ok((before - sent.len()) as u64)
    }

    async fn count_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        if let Some(error) = self.failures.take() {
            return Err(error);
        }
        let sent = self.sent.lock().unwrap();
        Ok(sent
            .iter()
            .filter(|notification| notification.created_at < cutoff)
            .count() as u64)
    }
}
