//! Last-write-wins hand-off cell
//!
//! The control role pushes freshly built snapshots; the data role reads the
//! most recent one. Readers never wait on a build: a push only swaps an
//! `Arc` under the channel's short internal lock, and older snapshots that
//! were never read are simply dropped.

use std::sync::Arc;
use tokio::sync::watch;

/// A value published through a [`PendingSlot`]
#[derive(Debug)]
pub struct Published<T> {
    /// 1 for the first push, incremented on every push after
    pub generation: u64,

    /// The published value
    pub value: Arc<T>,
}

impl<T> Clone for Published<T> {
    fn clone(&self) -> Self {
        Self {
            generation: self.generation,
            value: Arc::clone(&self.value),
        }
    }
}

/// Receiver side for async consumers that want to await new snapshots
pub type SlotReceiver<T> = watch::Receiver<Option<Published<T>>>;

/// Single-value hand-off cell, most recent push wins
#[derive(Debug)]
pub struct PendingSlot<T> {
    tx: watch::Sender<Option<Published<T>>>,
}

impl<T> PendingSlot<T> {
    /// Create an empty slot
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Publish a value, replacing whatever was pending
    ///
    /// Returns the generation assigned to the value.
    pub fn push(&self, value: Arc<T>) -> u64 {
        let mut generation = 0;
        self.tx.send_modify(|slot| {
            generation = slot.as_ref().map_or(1, |p| p.generation + 1);
            *slot = Some(Published { generation, value });
        });
        generation
    }

    /// The most recently pushed value, if any
    pub fn latest(&self) -> Option<Published<T>> {
        self.tx.borrow().clone()
    }

    /// Generation of the most recent push, 0 if nothing was pushed
    pub fn generation(&self) -> u64 {
        self.tx.borrow().as_ref().map_or(0, |p| p.generation)
    }

    /// Subscribe to future pushes
    pub fn subscribe(&self) -> SlotReceiver<T> {
        self.tx.subscribe()
    }
}

impl<T> Default for PendingSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_slot() {
        let slot: PendingSlot<u32> = PendingSlot::new();
        assert!(slot.latest().is_none());
        assert_eq!(slot.generation(), 0);
    }

    #[test]
    fn test_last_write_wins() {
        let slot = PendingSlot::new();
        let first = Arc::new(1);
        assert_eq!(slot.push(Arc::clone(&first)), 1);
        assert_eq!(slot.push(Arc::new(2)), 2);
        assert_eq!(slot.push(Arc::new(3)), 3);

        let latest = slot.latest().unwrap();
        assert_eq!(*latest.value, 3);
        assert_eq!(latest.generation, 3);
        // Superseded values are not retained by the slot
        assert_eq!(Arc::strong_count(&first), 1);
    }

    #[tokio::test]
    async fn test_subscriber_sees_latest_after_change() {
        let slot = PendingSlot::new();
        let mut rx = slot.subscribe();

        slot.push(Arc::new("a"));
        slot.push(Arc::new("b"));

        rx.changed().await.unwrap();
        let published = rx.borrow_and_update().clone().unwrap();
        assert_eq!(*published.value, "b");
        assert_eq!(published.generation, 2);
    }
}
