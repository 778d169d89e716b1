//! Append-only record of sync cycle outcomes.

use crate::models::AuditRecord;
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// Number of records the in-memory log keeps.
pub const AUDIT_HISTORY: usize = 500;

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord) -> anyhow::Result<()>;

    /// Most recent records, newest first.
    async fn recent(&self, limit: usize) -> Vec<AuditRecord>;
}

/// Bounded in-memory audit log that also emits every record as a tracing event.
pub struct AuditLog {
    records: Mutex<VecDeque<AuditRecord>>,
    capacity: usize,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_capacity(AUDIT_HISTORY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(AUDIT_HISTORY))),
            capacity: capacity.max(1),
        }
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for AuditLog {
    async fn record(&self, record: AuditRecord) -> anyhow::Result<()> {
        tracing::info!(
            target: "audit",
            cycle_id = %record.cycle_id,
            cycle_timestamp = %record.cycle_timestamp,
            status = record.status.as_str(),
            accounts_count = record.accounts_count,
            transactions_count = record.transactions_count,
            matched_count = record.matched_count,
            suggested_count = record.suggested_count,
            errors = ?record.errors,
            "Sync cycle recorded"
        );

        let mut records = self.records.lock().await;
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Vec<AuditRecord> {
        let records = self.records.lock().await;
        records.iter().rev().take(limit).cloned().collect()
    }
}
