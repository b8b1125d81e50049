//! FIFO buffer for chat texts submitted while the session cannot send.

use std::collections::VecDeque;

use crate::error::{Result, SyncError};

/// Ordered, bounded queue of outbound chat texts.
#[derive(Debug)]
pub struct OutboundQueue {
    items: VecDeque<String>,
    max_len: usize,
}

impl OutboundQueue {
    pub fn new(max_len: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_len: max_len.max(1),
        }
    }

    /// Append a text. Returns the queue depth afterwards.
    pub fn push(&mut self, text: impl Into<String>) -> Result<usize> {
        if self.items.len() >= self.max_len {
            return Err(SyncError::QueueFull(self.items.len()));
        }
        self.items.push_back(text.into());
        Ok(self.items.len())
    }

    /// Take the next text to send.
    pub fn pop(&mut self) -> Option<String> {
        self.items.pop_front()
    }

    /// Put a text whose send failed back at the head of the queue.
    ///
    /// Re-queued texts may push the queue past its bound; they were already
    /// accepted once.
    pub fn requeue_front(&mut self, text: String) {
        self.items.push_front(text);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }
}
