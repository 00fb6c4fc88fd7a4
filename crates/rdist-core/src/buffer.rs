//! Bounded FIFO of resources.
//!
//! `ResourceBuffer` is a plain data structure. It performs no locking and no
//! I/O; callers hold the buffer-wide lock around every operation and decide
//! how to wait when the buffer is full or empty.

use std::collections::VecDeque;

use crate::{DomainError, DomainResult, Resource};

/// Bounded first-in, first-out queue of resources.
///
/// Invariant: `0 <= len() <= capacity()`.
#[derive(Debug, Clone)]
pub struct ResourceBuffer {
    capacity: usize,
    items: VecDeque<Resource>,
}

impl ResourceBuffer {
    /// Creates an empty buffer holding at most `capacity` resources.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends a resource at the tail.
    ///
    /// # Errors
    ///
    /// `DomainError::BufferFull` (carrying the resource back) if the buffer
    /// already holds `capacity` resources.
    pub fn enqueue(&mut self, resource: Resource) -> DomainResult<()> {
        if self.is_full() {
            return Err(DomainError::BufferFull {
                capacity: self.capacity,
                resource,
            });
        }
        self.items.push_back(resource);
        Ok(())
    }

    /// Removes and returns the oldest resource.
    ///
    /// # Errors
    ///
    /// `DomainError::BufferEmpty` if there is nothing to dequeue.
    pub fn dequeue(&mut self) -> DomainResult<Resource> {
        self.items.pop_front().ok_or(DomainError::BufferEmpty)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Iterates queued resources from head (oldest) to tail.
    pub fn iter(&self) -> impl Iterator<Item = &Resource> + '_ {
        self.items.iter()
    }
}
