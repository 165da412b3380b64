//! Key/value context with attached conversation memory.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{Memory, Message};

/// Serializable view of a [`Context`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub data: HashMap<String, Value>,
    pub messages: Vec<Message>,
}

/// Arbitrary handler state plus a conversation history.
///
/// The memory is held behind an `Arc` so the same history can back
/// several contexts, and can be swapped with [`Context::set_memory`].
pub struct Context {
    data: RwLock<HashMap<String, Value>>,
    memory: RwLock<Arc<Memory>>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("data", &self.get_all())
            .field("memory", &self.memory())
            .finish()
    }
}

impl Context {
    /// Create a context with a default-sized memory.
    #[must_use]
    pub fn new() -> Self {
        Self::with_memory(Arc::new(Memory::default()))
    }

    /// Create a context backed by an existing memory.
    #[must_use]
    pub fn with_memory(memory: Arc<Memory>) -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            memory: RwLock::new(memory),
        }
    }

    /// Set a value, replacing any previous one.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    /// Get a value, or `default` when the key is missing.
    #[must_use]
    pub fn get(&self, key: &str, default: Value) -> Value {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .unwrap_or(default)
    }

    /// Get a value decoded into `T`.
    ///
    /// Returns `None` when the key is missing or the value has another shape.
    #[must_use]
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self
            .data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()?;
        serde_json::from_value(value).ok()
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Remove a value, returning it if present.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// Remove every value. Messages are kept.
    pub fn clear(&self) {
        self.data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    #[must_use]
    pub fn get_all(&self) -> HashMap<String, Value> {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The attached memory.
    #[must_use]
    pub fn memory(&self) -> Arc<Memory> {
        Arc::clone(&self.memory.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replace the attached memory.
    pub fn set_memory(&self, memory: Arc<Memory>) {
        *self.memory.write().unwrap_or_else(PoisonError::into_inner) = memory;
    }

    pub fn add_message(&self, message: Message) {
        self.memory().add(message);
    }

    #[must_use]
    pub fn get_messages(&self) -> Vec<Message> {
        self.memory().get_all()
    }

    pub fn clear_messages(&self) {
        self.memory().clear();
    }

    /// Data and messages as one structured value.
    #[must_use]
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            data: self.get_all(),
            messages: self.get_messages(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_set_and_get() {
        let ctx = Context::new();
        ctx.set("user_id", 123);
        assert_eq!(ctx.get("user_id", Value::Null), json!(123));
        assert_eq!(ctx.get_as::<u32>("user_id"), Some(123));
        assert_eq!(ctx.get_as::<String>("user_id"), None);
    }

    #[test]
    fn test_missing_key_returns_default_without_inserting() {
        let ctx = Context::new();
        assert_eq!(ctx.get("non_existent", json!("default")), json!("default"));
        assert!(!ctx.has("non_existent"));
        assert!(ctx.get_all().is_empty());
    }

    #[test]
    fn test_has_remove_clear() {
        let ctx = Context::new();
        assert!(!ctx.has("user_id"));
        ctx.set("user_id", 123);
        ctx.set("preferences", json!({"theme": "dark"}));
        assert!(ctx.has("user_id"));

        assert_eq!(ctx.remove("user_id"), Some(json!(123)));
        assert!(!ctx.has("user_id"));
        assert_eq!(ctx.remove("user_id"), None);

        ctx.clear();
        assert!(ctx.get_all().is_empty());
    }

    #[test]
    fn test_messages_delegate_to_memory() {
        let memory = Arc::new(Memory::new(2));
        let ctx = Context::with_memory(Arc::clone(&memory));
        ctx.add_message(Message::user("Hello"));
        ctx.add_message(Message::assistant("Hi"));
        ctx.add_message(Message::user("Again"));

        let messages = ctx.get_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content(), "Hi");
        assert_eq!(memory.size(), 2);

        ctx.clear_messages();
        assert!(ctx.get_messages().is_empty());
    }

    #[test]
    fn test_swap_memory() {
        let ctx = Context::new();
        ctx.add_message(Message::user("old"));
        let fresh = Arc::new(Memory::new(5));
        ctx.set_memory(Arc::clone(&fresh));
        assert!(Arc::ptr_eq(&ctx.memory(), &fresh));
        assert!(ctx.get_messages().is_empty());
    }

    #[test]
    fn test_snapshot() {
        let ctx = Context::new();
        ctx.set("user_id", 123);
        ctx.add_message(Message::user("Hello"));

        let snapshot = serde_json::to_value(ctx.snapshot()).unwrap();
        assert_eq!(
            snapshot,
            json!({
                "data": {"user_id": 123},
                "messages": [{"role": "user", "content": "Hello", "type": "text"}],
            })
        );
    }
}
