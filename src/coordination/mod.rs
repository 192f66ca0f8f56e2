//! Coordination store adapter
//!
//! Capability traits over a hierarchical key/value store with directories,
//! TTL leases and change watches, plus the etcd HTTP client, an in-memory
//! store and the background loops built on them.

pub mod bootstrap;
pub mod client;
pub mod error;
pub mod heartbeat;
pub mod memory;
pub mod users;
pub mod watch;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use client::{ConnectionRetry, EtcdClient};
pub use error::{Severity, StoreError};
pub use memory::MemoryStore;

/// A key or directory in the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default)]
    pub dir: bool,

    /// Children, present for directories read with `get`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<Node>,

    /// Remaining lease in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,

    #[serde(default)]
    pub modified_index: u64,

    #[serde(default)]
    pub created_index: u64,
}

impl Node {
    /// Last path segment of the key
    pub fn name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or_default()
    }
}

/// A change observed by [`Watcher::watch`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    /// Store action, e.g. `set`, `delete`, `expire`
    pub action: String,
    pub node: Node,
}

#[async_trait]
pub trait Getter: Send + Sync {
    async fn get(&self, path: &str, recursive: bool) -> Result<Node, StoreError>;
}

#[async_trait]
pub trait Setter: Send + Sync {
    /// Write a leaf value. A zero `ttl` writes without expiry.
    async fn set(&self, path: &str, value: &str, ttl: Duration) -> Result<Node, StoreError>;
}

#[async_trait]
pub trait DirCreator: Send + Sync {
    /// Create a directory. An existing path yields [`StoreError::AlreadyExists`].
    async fn create_dir(&self, path: &str, ttl: Duration) -> Result<Node, StoreError>;
}

#[async_trait]
pub trait Watcher: Send + Sync {
    /// Block until something changes under `path`
    async fn watch(&self, path: &str, recursive: bool) -> Result<WatchEvent, StoreError>;
}

/// Every capability at once
pub trait CoordinationStore: Getter + Setter + DirCreator + Watcher {}

impl<T: Getter + Setter + DirCreator + Watcher> CoordinationStore for T {}

/// Join a base path and a child name with exactly one slash
pub fn join_path(base: &str, child: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        child.trim_start_matches('/')
    )
}
