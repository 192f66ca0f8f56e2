//! Records of daemons started during boot

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A daemon the supervisor started
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub label: String,
    pub pid: u32,
}

impl ProcessRecord {
    pub fn new(label: impl Into<String>, pid: u32) -> Self {
        Self {
            label: label.into(),
            pid,
        }
    }
}

/// Every daemon started during one boot, in start order.
///
/// Records are only removed by [`drain`](ProcessRegistry::drain), which the
/// shutdown reaper calls.
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    records: Arc<Mutex<Vec<ProcessRecord>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, record: ProcessRecord) {
        self.records.lock().await.push(record);
    }

    pub async fn records(&self) -> Vec<ProcessRecord> {
        self.records.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Remove and return every record
    pub async fn drain(&self) -> Vec<ProcessRecord> {
        std::mem::take(&mut *self.records.lock().await)
    }
}
