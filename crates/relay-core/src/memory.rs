//! Bounded conversation history.

use std::{
    collections::VecDeque,
    sync::{PoisonError, RwLock},
};

use crate::{Message, MessageType, Role};

/// Default history capacity.
pub const DEFAULT_MAX_SIZE: usize = 100;

/// Insertion-ordered message buffer with FIFO eviction.
///
/// All operations take `&self`; the buffer is guarded by a lock so one
/// instance can be shared between handlers behind an `Arc`. The length
/// never exceeds `max_size`, even while readers and writers race.
pub struct Memory {
    messages: RwLock<VecDeque<Message>>,
    max_size: usize,
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("size", &self.size())
            .field("max_size", &self.max_size)
            .finish()
    }
}

impl Memory {
    /// Create a memory holding at most `max_size` messages.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        if max_size == 0 {
            tracing::warn!("Memory capacity of 0 requested, using 1");
        }
        let max_size = max_size.max(1);
        Self {
            messages: RwLock::new(VecDeque::with_capacity(max_size.min(32))),
            max_size,
        }
    }

    /// Append a message, dropping the oldest entries past capacity.
    pub fn add(&self, message: Message) {
        let mut messages = self.messages.write().unwrap_or_else(PoisonError::into_inner);
        Self::push_bounded(&mut messages, message, self.max_size);
    }

    /// Append several messages in order.
    ///
    /// Eviction runs after every insert, so a batch larger than the
    /// capacity leaves exactly its last `max_size` messages.
    pub fn add_multiple<I>(&self, messages: I)
    where
        I: IntoIterator<Item = Message>,
    {
        let mut guard = self.messages.write().unwrap_or_else(PoisonError::into_inner);
        for message in messages {
            Self::push_bounded(&mut guard, message, self.max_size);
        }
    }

    fn push_bounded(messages: &mut VecDeque<Message>, message: Message, max_size: usize) {
        messages.push_back(message);
        while messages.len() > max_size {
            messages.pop_front();
        }
    }

    /// Snapshot of every stored message, oldest first.
    #[must_use]
    pub fn get_all(&self) -> Vec<Message> {
        self.filtered(|_| true)
    }

    /// Messages written by `role`, in insertion order.
    #[must_use]
    pub fn get_by_role(&self, role: Role) -> Vec<Message> {
        self.filtered(|m| m.role() == role)
    }

    /// Messages of the given type, in insertion order.
    #[must_use]
    pub fn get_by_type(&self, kind: &MessageType) -> Vec<Message> {
        self.filtered(|m| m.kind() == kind)
    }

    /// The `n` most recent messages, oldest first.
    #[must_use]
    pub fn last(&self, n: usize) -> Vec<Message> {
        let messages = self.messages.read().unwrap_or_else(PoisonError::into_inner);
        let skip = messages.len().saturating_sub(n);
        messages.iter().skip(skip).cloned().collect()
    }

    fn filtered(&self, predicate: impl Fn(&Message) -> bool) -> Vec<Message> {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|m| predicate(m))
            .cloned()
            .collect()
    }

    /// Remove every message.
    pub fn clear(&self) {
        self.messages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.size() >= self.max_size
    }

    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn contents(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(Message::content).collect()
    }

    #[test]
    fn test_evicts_oldest_first() {
        let memory = Memory::new(3);
        for text in ["First", "Second", "Third", "Fourth"] {
            memory.add(Message::user(text));
        }
        assert_eq!(contents(&memory.get_all()), ["Second", "Third", "Fourth"]);
        assert!(memory.is_full());
    }

    #[test]
    fn test_add_multiple_larger_than_capacity() {
        let memory = Memory::new(2);
        memory.add(Message::system("seed"));
        memory.add_multiple((1..=5).map(|i| Message::user(format!("m{i}"))));
        assert_eq!(contents(&memory.get_all()), ["m4", "m5"]);
    }

    #[test]
    fn test_filters_preserve_order_and_buffer() {
        let memory = Memory::default();
        memory.add_multiple([
            Message::user("q1"),
            Message::assistant("a1"),
            Message::user("q2").with_type(MessageType::Image),
            Message::assistant("a2"),
        ]);

        let users = memory.get_by_role(Role::User);
        assert_eq!(contents(&users), ["q1", "q2"]);
        assert!(users.iter().all(|m| m.role() == Role::User));

        let images = memory.get_by_type(&MessageType::Image);
        assert_eq!(contents(&images), ["q2"]);

        let text = memory.get_by_type(&MessageType::Text);
        assert_eq!(contents(&text), ["q1", "a1", "a2"]);
        assert!(text.len() <= memory.get_all().len());
        assert_eq!(memory.size(), 4);
    }

    #[test]
    fn test_last() {
        let memory = Memory::new(10);
        memory.add_multiple(["a", "b", "c", "d"].map(Message::user));
        assert_eq!(contents(&memory.last(2)), ["c", "d"]);
        assert_eq!(memory.last(10).len(), 4);
    }

    #[test]
    fn test_clear_and_empty() {
        let memory = Memory::new(5);
        assert!(memory.is_empty());
        memory.add(Message::user("x"));
        assert!(!memory.is_empty());
        assert!(!memory.is_full());
        memory.clear();
        assert_eq!(memory.size(), 0);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let memory = Memory::new(0);
        assert_eq!(memory.max_size(), 1);
        memory.add(Message::user("a"));
        memory.add(Message::user("b"));
        assert_eq!(contents(&memory.get_all()), ["b"]);
    }

    #[test]
    fn test_concurrent_writers_respect_capacity() {
        let memory = Arc::new(Memory::new(8));
        std::thread::scope(|s| {
            for t in 0..4 {
                let memory = Arc::clone(&memory);
                s.spawn(move || {
                    for i in 0..100 {
                        memory.add(Message::user(format!("{t}-{i}")));
                        assert!(memory.get_all().len() <= 8);
                    }
                });
            }
        });
        assert_eq!(memory.size(), 8);
    }
}
