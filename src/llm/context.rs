//! Rolling conversation context sent to the completion proxy
//!
//! Keeps the most recent `capacity` messages, oldest first. Appending past the
//! capacity evicts from the front. The window is persisted on every mutation
//! under its own storage key, independently of the displayed history.

use crate::messages::storage::{Storage, CONTEXT_KEY};
use crate::messages::types::{ContextMessage, Role};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

/// Number of messages kept in the window unless configured otherwise
pub const DEFAULT_CONTEXT_MESSAGES: usize = 5;

/// Bounded FIFO window of recent messages
#[derive(Clone)]
pub struct ContextStore {
    messages: Arc<RwLock<VecDeque<ContextMessage>>>,
    capacity: usize,
    storage: Arc<dyn Storage>,
}

impl ContextStore {
    /// Load the window persisted in `storage`
    ///
    /// Unreadable data is logged and treated as an empty window. A stored
    /// window longer than `capacity` keeps only its newest entries. A capacity
    /// of zero is raised to one.
    pub fn load(storage: Arc<dyn Storage>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut messages: VecDeque<ContextMessage> = match storage.get(CONTEXT_KEY) {
            Ok(Some(json)) => match serde_json::from_str::<Vec<ContextMessage>>(&json) {
                Ok(stored) => stored.into(),
                Err(e) => {
                    warn!("Error reading context: {}", e);
                    VecDeque::new()
                }
            },
            Ok(None) => VecDeque::new(),
            Err(e) => {
                warn!("Error reading context: {}", e);
                VecDeque::new()
            }
        };

        while messages.len() > capacity {
            messages.pop_front();
        }

        debug!(
            "Loaded context window with {}/{} messages",
            messages.len(),
            capacity
        );

        Self {
            messages: Arc::new(RwLock::new(messages)),
            capacity,
            storage,
        }
    }

    /// Add a message, evicting the oldest entries beyond capacity
    pub fn append(&self, message: ContextMessage) {
        let mut messages = self.messages.write();
        messages.push_back(message);
        while messages.len() > self.capacity {
            messages.pop_front();
        }
        self.persist(&messages);
    }

    /// Add several messages in order under one write
    pub fn extend(&self, batch: impl IntoIterator<Item = ContextMessage>) {
        let mut messages = self.messages.write();
        messages.extend(batch);
        while messages.len() > self.capacity {
            messages.pop_front();
        }
        self.persist(&messages);
    }

    pub fn add_user_message(&self, content: impl Into<String>) {
        self.append(ContextMessage::new(Role::User, content));
    }

    pub fn add_assistant_message(&self, content: impl Into<String>) {
        self.append(ContextMessage::new(Role::Assistant, content));
    }

    /// The window, oldest first
    pub fn current(&self) -> Vec<ContextMessage> {
        self.messages.read().iter().cloned().collect()
    }

    /// Empty the window and drop its durable key
    pub fn clear(&self) {
        self.messages.write().clear();
        if let Err(e) = self.storage.remove(CONTEXT_KEY) {
            warn!("Error clearing context: {}", e);
        }
    }

    /// Render the window as `User: ...` / `Assistant: ...` lines
    pub fn format_for_prompt(&self) -> String {
        self.messages
            .read()
            .iter()
            .map(|m| format!("{}: {}", m.role.label(), m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }

    fn persist(&self, messages: &VecDeque<ContextMessage>) {
        let result = serde_json::to_string(messages)
            .map_err(crate::ParleyError::from)
            .and_then(|json| self.storage.set(CONTEXT_KEY, &json));
        if let Err(e) = result {
            warn!("Error saving context: {}", e);
        }
    }
}

impl std::fmt::Debug for ContextStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextStore")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::storage::MemoryStorage;
    use crate::Result;

    fn store(capacity: usize) -> (ContextStore, MemoryStorage) {
        let storage = MemoryStorage::new();
        (ContextStore::load(Arc::new(storage.clone()), capacity), storage)
    }

    fn numbered(n: usize) -> ContextMessage {
        let role = if n % 2 == 0 { Role::User } else { Role::Assistant };
        ContextMessage::new(role, format!("t{}", n))
    }

    #[test]
    fn test_window_holds_last_k_in_order() {
        for appends in 0..12 {
            let (ctx, _) = store(DEFAULT_CONTEXT_MESSAGES);
            for n in 1..=appends {
                ctx.append(numbered(n));
            }

            let current = ctx.current();
            let expected_len = appends.min(DEFAULT_CONTEXT_MESSAGES);
            assert_eq!(current.len(), expected_len);

            let expected: Vec<_> = ((appends - expected_len + 1)..=appends)
                .map(numbered)
                .collect();
            assert_eq!(current, expected);
        }
    }

    #[test]
    fn test_full_window_evicts_oldest() {
        let (ctx, _) = store(5);
        for n in 1..=5 {
            ctx.append(numbered(n));
        }
        ctx.append(numbered(6));

        let contents: Vec<_> = ctx.current().into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["t2", "t3", "t4", "t5", "t6"]);
    }

    #[test]
    fn test_extend_trims_once() {
        let (ctx, _) = store(3);
        ctx.extend((1..=4).map(numbered));
        let contents: Vec<_> = ctx.current().into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["t2", "t3", "t4"]);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (ctx, storage) = store(5);
        ctx.clear();
        assert!(ctx.current().is_empty());

        ctx.add_user_message("hello");
        ctx.clear();
        ctx.clear();
        assert!(ctx.current().is_empty());
        assert_eq!(storage.get(CONTEXT_KEY).unwrap(), None);
    }

    #[test]
    fn test_window_survives_reload() {
        let (ctx, storage) = store(5);
        ctx.add_user_message("What is Rust?");
        ctx.add_assistant_message("A systems language.");

        let reloaded = ContextStore::load(Arc::new(storage), 5);
        assert_eq!(reloaded.current(), ctx.current());
    }

    #[test]
    fn test_reload_with_smaller_capacity_keeps_newest() {
        let (ctx, storage) = store(5);
        ctx.extend((1..=5).map(numbered));

        let reloaded = ContextStore::load(Arc::new(storage), 2);
        let contents: Vec<_> = reloaded.current().into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["t4", "t5"]);
    }

    #[test]
    fn test_corrupt_window_loads_empty() {
        let storage = MemoryStorage::new();
        storage.set(CONTEXT_KEY, "[{\"role\":\"robot\"}]").unwrap();
        let ctx = ContextStore::load(Arc::new(storage), 5);
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let (ctx, _) = store(0);
        assert_eq!(ctx.capacity(), 1);
        ctx.add_user_message("a");
        ctx.add_user_message("b");
        assert_eq!(ctx.current(), vec![ContextMessage::user("b")]);
    }

    #[test]
    fn test_format_for_prompt() {
        let (ctx, _) = store(5);
        assert_eq!(ctx.format_for_prompt(), "");

        ctx.add_user_message("Hi");
        ctx.add_assistant_message("Hello!");
        assert_eq!(ctx.format_for_prompt(), "User: Hi\nAssistant: Hello!");
    }

    struct FailingStorage;

    impl Storage for FailingStorage {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(crate::ParleyError::Storage("unavailable".to_string()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(crate::ParleyError::Storage("read-only".to_string()))
        }

        fn remove(&self, _key: &str) -> Result<()> {
            Err(crate::ParleyError::Storage("read-only".to_string()))
        }
    }

    #[test]
    fn test_append_succeeds_when_storage_fails() {
        let ctx = ContextStore::load(Arc::new(FailingStorage), 2);
        ctx.add_user_message("a");
        ctx.add_assistant_message("b");
        ctx.add_user_message("c");
        assert_eq!(ctx.len(), 2);
        ctx.clear();
        assert!(ctx.is_empty());
    }
}
