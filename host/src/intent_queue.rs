//! Intent buffering between host ticks
//!
//! Intents can arrive at any point between two ticks, from remote peers over
//! their transport links or from the host's own player through loopback.
//! This module holds them until the next tick drains them:
//! - Each sender has its own FIFO, so one peer's intents are always applied
//!   in the order that peer sent them
//! - Every intent is stamped with a global arrival number, so the drain
//!   interleaves senders exactly as the host received them
//! - Senders that leave the session have their pending intents discarded
//!
//! No intent is ever applied outside of a tick.

use log::{debug, info};
use shared::{ClientId, Intent};
use std::collections::{BTreeMap, VecDeque};

/// Pending intents for one sending peer
#[derive(Debug, Default)]
pub struct SenderQueue {
    /// Intents in the order this sender issued them, stamped with arrival number
    pending: VecDeque<(u64, Intent)>,
    /// Total intents ever accepted from this sender
    received: u64,
}

impl SenderQueue {
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn received(&self) -> u64 {
        self.received
    }
}

/// Per-sender FIFO of intents waiting for the next tick
///
/// The queue does not validate anything. It only guarantees ordering:
/// within a sender intents keep their send order, and across senders
/// they keep the order the host received them in.
#[derive(Debug, Default)]
pub struct IntentQueue {
    senders: BTreeMap<ClientId, SenderQueue>,
    next_arrival: u64,
}

impl IntentQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers an intent from `sender` for the next tick
    pub fn push(&mut self, sender: ClientId, intent: Intent) {
        let arrival = self.next_arrival;
        self.next_arrival += 1;
        let queue = self.senders.entry(sender).or_default();
        queue.pending.push_back((arrival, intent));
        queue.received += 1;
    }

    /// Discards everything a departed sender still had queued
    ///
    /// Returns the number of intents dropped.
    pub fn forget(&mut self, sender: &ClientId) -> usize {
        match self.senders.remove(sender) {
            Some(queue) => {
                if !queue.pending.is_empty() {
                    info!("Dropped {} pending intents from {}", queue.pending.len(), sender);
                }
                queue.pending.len()
            }
            None => 0,
        }
    }

    /// Takes every buffered intent in arrival order
    ///
    /// Leaves each sender's queue empty but keeps its counters.
    pub fn drain(&mut self) -> Vec<(ClientId, Intent)> {
        let mut drained: Vec<(u64, ClientId, Intent)> = Vec::new();
        for (sender, queue) in &mut self.senders {
            drained.extend(queue.pending.drain(..).map(|(arrival, intent)| (arrival, sender.clone(), intent)));
        }
        drained.sort_by_key(|(arrival, _, _)| *arrival);

        if !drained.is_empty() {
            debug!("Draining {} intents", drained.len());
        }
        drained.into_iter().map(|(_, sender, intent)| (sender, intent)).collect()
    }

    /// Number of intents currently buffered across all senders
    pub fn len(&self) -> usize {
        self.senders.values().map(SenderQueue::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.values().all(SenderQueue::is_empty)
    }

    pub fn sender(&self, id: &ClientId) -> Option<&SenderQueue> {
        self.senders.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ControlKey;

    fn key(control: ControlKey) -> Intent {
        Intent::KeyDown { control }
    }

    #[test]
    fn test_drain_keeps_arrival_order_across_senders() {
        let mut queue = IntentQueue::new();
        queue.push(ClientId::from("b"), key(ControlKey::Up));
        queue.push(ClientId::from("a"), key(ControlKey::Down));
        queue.push(ClientId::from("b"), key(ControlKey::Left));

        let drained = queue.drain();

        assert_eq!(
            drained,
            vec![
                (ClientId::from("b"), key(ControlKey::Up)),
                (ClientId::from("a"), key(ControlKey::Down)),
                (ClientId::from("b"), key(ControlKey::Left)),
            ]
        );
        assert!(queue.is_empty());
        assert_eq!(queue.sender(&ClientId::from("b")).map(SenderQueue::received), Some(2));
    }

    #[test]
    fn test_forget_drops_pending() {
        let mut queue = IntentQueue::new();
        queue.push(ClientId::from("a"), key(ControlKey::Up));
        queue.push(ClientId::from("a"), key(ControlKey::Up));
        queue.push(ClientId::from("b"), key(ControlKey::Up));

        assert_eq!(queue.forget(&ClientId::from("a")), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.forget(&ClientId::from("a")), 0);
    }

    #[test]
    fn test_empty_drain() {
        let mut queue = IntentQueue::new();
        assert!(queue.drain().is_empty());
    }
}
