//! In-process coordination store

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};

use crate::coordination::error::{StoreError, ETCD_NOT_FILE};
use crate::coordination::{DirCreator, Getter, Node, Setter, WatchEvent, Watcher};

#[derive(Debug, Clone)]
struct Entry {
    value: Option<String>,
    dir: bool,
    ttl: Option<Duration>,
    created_index: u64,
    modified_index: u64,
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<String, Entry>,
    index: u64,
}

/// Store kept entirely in memory, with the same directory, TTL and watch
/// semantics as the etcd client. TTLs are recorded but never expire.
pub struct MemoryStore {
    state: Mutex<State>,
    events: broadcast::Sender<WatchEvent>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    format!("/{}", trimmed)
}

fn parents(path: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    for segment in &segments[..segments.len().saturating_sub(1)] {
        current.push('/');
        current.push_str(segment);
        result.push(current.clone());
    }
    result
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: Mutex::new(State::default()),
            events,
            writes: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Value of a leaf, if present
    pub async fn value(&self, path: &str) -> Option<String> {
        let state = self.state.lock().await;
        state.entries.get(&normalize(path)).and_then(|e| e.value.clone())
    }

    /// Lease recorded for a key
    pub async fn ttl(&self, path: &str) -> Option<Duration> {
        let state = self.state.lock().await;
        state.entries.get(&normalize(path)).and_then(|e| e.ttl)
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.state.lock().await.entries.contains_key(&normalize(path))
    }

    /// Number of successful `set` calls
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every subsequent `set` fail with a connection error
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn node(state: &State, key: &str, recursive: bool, depth: usize) -> Node {
        let entry = state.entries.get(key);
        let dir = key == "/" || entry.map(|e| e.dir).unwrap_or(false);

        let mut nodes = Vec::new();
        if dir && (depth == 0 || recursive) {
            let prefix = if key == "/" { "/".to_string() } else { format!("{}/", key) };
            for child in state
                .entries
                .range(prefix.clone()..)
                .take_while(|(k, _)| k.starts_with(&prefix))
                .map(|(k, _)| k)
                .filter(|k| !k[prefix.len()..].contains('/'))
            {
                nodes.push(Self::node(state, child, recursive, depth + 1));
            }
        }

        Node {
            key: key.to_string(),
            value: entry.and_then(|e| e.value.clone()),
            dir,
            nodes,
            ttl: entry.and_then(|e| e.ttl).map(|t| t.as_secs() as i64),
            modified_index: entry.map(|e| e.modified_index).unwrap_or(0),
            created_index: entry.map(|e| e.created_index).unwrap_or(0),
        }
    }

    /// Insert or update `key`, creating parent directories as needed
    fn put(state: &mut State, key: &str, value: Option<String>, dir: bool, ttl: Duration) {
        state.index += 1;
        let index = state.index;

        for parent in parents(key) {
            state.entries.entry(parent).or_insert(Entry {
                value: None,
                dir: true,
                ttl: None,
                created_index: index,
                modified_index: index,
            });
        }

        let ttl = if ttl.is_zero() { None } else { Some(ttl) };
        let created_index = state
            .entries
            .get(key)
            .map(|e| e.created_index)
            .unwrap_or(index);
        state.entries.insert(
            key.to_string(),
            Entry {
                value,
                dir,
                ttl,
                created_index,
                modified_index: index,
            },
        );
    }

    fn publish(&self, action: &str, node: Node) {
        // No receivers is fine
        let _ = self.events.send(WatchEvent {
            action: action.to_string(),
            node,
        });
    }
}

#[async_trait]
impl Getter for MemoryStore {
    async fn get(&self, path: &str, recursive: bool) -> Result<Node, StoreError> {
        let key = normalize(path);
        let state = self.state.lock().await;
        if key != "/" && !state.entries.contains_key(&key) {
            return Err(StoreError::NotFound(key));
        }
        Ok(Self::node(&state, &key, recursive, 0))
    }
}

#[async_trait]
impl Setter for MemoryStore {
    async fn set(&self, path: &str, value: &str, ttl: Duration) -> Result<Node, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Connection {
                attempts: 1,
                message: "writes disabled".to_string(),
            });
        }

        let key = normalize(path);
        let node = {
            let mut state = self.state.lock().await;
            if key == "/" || state.entries.get(&key).is_some_and(|e| e.dir) {
                return Err(StoreError::Api {
                    code: ETCD_NOT_FILE,
                    message: "Not a file".to_string(),
                    cause: key,
                });
            }
            Self::put(&mut state, &key, Some(value.to_string()), false, ttl);
            Self::node(&state, &key, false, 0)
        };

        self.writes.fetch_add(1, Ordering::SeqCst);
        self.publish("set", node.clone());
        Ok(node)
    }
}

#[async_trait]
impl DirCreator for MemoryStore {
    async fn create_dir(&self, path: &str, ttl: Duration) -> Result<Node, StoreError> {
        if path.trim().is_empty() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }

        let key = normalize(path);
        let node = {
            let mut state = self.state.lock().await;
            if key == "/" || state.entries.contains_key(&key) {
                return Err(StoreError::AlreadyExists(key));
            }
            Self::put(&mut state, &key, None, true, ttl);
            Self::node(&state, &key, false, 0)
        };

        self.publish("create", node.clone());
        Ok(node)
    }
}

#[async_trait]
impl Watcher for MemoryStore {
    async fn watch(&self, path: &str, recursive: bool) -> Result<WatchEvent, StoreError> {
        let key = normalize(path);
        let prefix = if key == "/" { "/".to_string() } else { format!("{}/", key) };
        let mut events = self.events.subscribe();

        loop {
            match events.recv().await {
                Ok(event) => {
                    let changed = &event.node.key;
                    if *changed == key || (recursive && changed.starts_with(&prefix)) {
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return Err(StoreError::Closed),
            }
        }
    }
}
