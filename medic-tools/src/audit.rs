//! Process-wide audit trail of every dispatched or refused action.

use crate::traits::AuditSink;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const AUDIT_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub action_type: String,
    pub command_text: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AuditRecord {
    pub fn new(
        action_type: impl Into<String>,
        command_text: impl Into<String>,
        success: bool,
        error_message: Option<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            action_type: action_type.into(),
            command_text: command_text.into(),
            success,
            error_message,
        }
    }
}

/// Bounded in-memory ring buffer. The oldest record is evicted once the
/// capacity is reached.
pub struct AuditTrail {
    capacity: usize,
    records: Mutex<VecDeque<AuditRecord>>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::with_capacity(AUDIT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Records oldest first.
    pub fn snapshot(&self) -> Vec<AuditRecord> {
        self.records.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Snapshot as JSON lines, for handing to an external store.
    pub fn to_json_lines(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for record in self.records.lock().iter() {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }
        Ok(out)
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for AuditTrail {
    fn append(&self, record: AuditRecord) {
        if self.capacity == 0 {
            return;
        }
        let mut records = self.records.lock();
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }
}
