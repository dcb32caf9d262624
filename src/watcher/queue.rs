//! Bounded hand-off queue between the forwarding loop and the dispatcher.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, select};
use serde::{Deserialize, Serialize};

use super::Event;

/// What to do when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued event to make room.
    #[default]
    DropOldest,
    /// Discard the incoming event.
    DropNewest,
    /// Wait for the dispatcher to make room.
    Block,
}

/// Bounded MPMC queue of events.
#[derive(Debug)]
pub struct EventQueue {
    tx: Sender<Event>,
    rx: Receiver<Event>,
    policy: OverflowPolicy,
    /// Shared with the raw event sender, which drops upstream of the queue.
    dropped: Arc<AtomicU64>,
}

impl EventQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            tx,
            rx,
            policy,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Enqueue an event according to the overflow policy.
    ///
    /// `close` is observed while blocking; returns `false` if the event was
    /// not queued.
    pub fn push(&self, event: Event, close: &Receiver<()>) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Disconnected(_)) => false,
            Err(TrySendError::Full(event)) => match self.policy {
                OverflowPolicy::DropNewest => {
                    self.record_drop(&event);
                    false
                }
                OverflowPolicy::DropOldest => {
                    if let Ok(evicted) = self.rx.try_recv() {
                        self.record_drop(&evicted);
                    }
                    match self.tx.try_send(event) {
                        Ok(()) => true,
                        Err(e) => {
                            self.record_drop(&e.into_inner());
                            false
                        }
                    }
                }
                OverflowPolicy::Block => select! {
                    send(self.tx, event) -> res => res.is_ok(),
                    recv(close) -> _ => false,
                },
            },
        }
    }

    /// Receiving end for the dispatcher.
    pub fn receiver(&self) -> &Receiver<Event> {
        &self.rx
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Events lost to overflow so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn drop_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }

    fn record_drop(&self, event: &Event) {
        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!("[watcher] event queue full, dropped {event} ({total} total)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::Op;
    use std::time::Duration;

    fn ev(name: &str) -> Event {
        Event::new(format!("/q/{name}"), Op::WRITE)
    }

    fn drain(queue: &EventQueue) -> Vec<String> {
        queue
            .receiver()
            .try_iter()
            .map(|e| e.path().display().to_string())
            .collect()
    }

    #[test]
    fn test_drop_oldest() {
        let (_close_tx, close) = bounded::<()>(0);
        let queue = EventQueue::new(2, OverflowPolicy::DropOldest);
        assert!(queue.push(ev("1"), &close));
        assert!(queue.push(ev("2"), &close));
        assert!(queue.push(ev("3"), &close));

        assert_eq!(queue.dropped(), 1);
        assert_eq!(drain(&queue), vec!["/q/2", "/q/3"]);
    }

    #[test]
    fn test_drop_newest() {
        let (_close_tx, close) = bounded::<()>(0);
        let queue = EventQueue::new(2, OverflowPolicy::DropNewest);
        queue.push(ev("1"), &close);
        queue.push(ev("2"), &close);
        assert!(!queue.push(ev("3"), &close));

        assert_eq!(queue.dropped(), 1);
        assert_eq!(drain(&queue), vec!["/q/1", "/q/2"]);
    }

    #[test]
    fn test_block_released_by_close() {
        let (close_tx, close) = bounded::<()>(0);
        let queue = EventQueue::new(1, OverflowPolicy::Block);
        queue.push(ev("1"), &close);

        let handle = std::thread::spawn(move || queue.push(ev("2"), &close));
        std::thread::sleep(Duration::from_millis(50));
        drop(close_tx);

        assert!(!handle.join().unwrap());
    }

    #[test]
    fn test_block_waits_for_room() {
        let (_close_tx, close) = bounded::<()>(0);
        let queue = std::sync::Arc::new(EventQueue::new(1, OverflowPolicy::Block));
        queue.push(ev("1"), &close);

        let producer = {
            let queue = std::sync::Arc::clone(&queue);
            std::thread::spawn(move || queue.push(ev("2"), &close))
        };
        std::thread::sleep(Duration::from_millis(50));
        let first = queue.receiver().recv().unwrap();
        assert_eq!(first.path(), std::path::Path::new("/q/1"));

        assert!(producer.join().unwrap());
        assert_eq!(queue.dropped(), 0);
        assert_eq!(drain(&queue), vec!["/q/2"]);
    }
}
