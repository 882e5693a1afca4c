//! Invocation logging (§4.3.5): one `InvocationRecord` per attempt that
//! reaches the executor, independent of the guest's own `log_info`/`log_error`
//! calls which ride along inside the record's `logs` field.

use crate::types::InvocationRecord;
use parking_lot::Mutex;
use std::sync::Arc;

pub trait InvocationLogger: Send + Sync {
    fn record(&self, record: InvocationRecord);
}

/// Bounded in-memory ring used when no external sink is configured; keeps
/// the most recent `capacity` records.
pub struct InMemoryInvocationLogger {
    capacity: usize,
    records: Mutex<Vec<InvocationRecord>>,
}

impl InMemoryInvocationLogger {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            records: Mutex::new(Vec::new()),
        })
    }

    pub fn recent(&self, limit: usize) -> Vec<InvocationRecord> {
        let records = self.records.lock();
        let start = records.len().saturating_sub(limit);
        records[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl InvocationLogger for InMemoryInvocationLogger {
    fn record(&self, record: InvocationRecord) {
        let mut records = self.records.lock();
        records.push(record);
        if records.len() > self.capacity {
            let overflow = records.len() - self.capacity;
            records.drain(0..overflow);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InvocationStatus;
    use chrono::Utc;
    use orama_core::TriggerKind;

    fn dummy_record(id: &str) -> InvocationRecord {
        let now = Utc::now();
        InvocationRecord {
            id: id.to_string(),
            function_id: "fn1".to_string(),
            request_id: "req1".to_string(),
            trigger_kind: TriggerKind::Http,
            caller_identity: None,
            input_size: 0,
            output_size: 0,
            started_at: now,
            completed_at: now,
            duration_ms: 0,
            status: InvocationStatus::Success,
            error_message: None,
            logs: Vec::new(),
        }
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let logger = InMemoryInvocationLogger::new(2);
        logger.record(dummy_record("a"));
        logger.record(dummy_record("b"));
        logger.record(dummy_record("c"));
        assert_eq!(logger.len(), 2);
        let recent = logger.recent(10);
        assert_eq!(recent[0].id, "b");
        assert_eq!(recent[1].id, "c");
    }
}
