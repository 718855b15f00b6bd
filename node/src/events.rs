//! Node events for in-process subscribers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use tessera_types::{BlockHash, Epoch, Height, Role};

use crate::validator::RejectReason;

/// Pipeline events that observers can subscribe to via the [`EventBus`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeEvent {
    /// The chain follower accepted a new head.
    HeadImported { height: Height, hash: BlockHash },
    /// A new committee became active.
    CommitteeRotated { epoch: Epoch, height: Height },
    /// The local duty for a height was published.
    DutyAssigned { height: Height, role: Role },
    /// A candidate was produced and signed locally.
    BlockProduced { height: Height, hash: BlockHash },
    /// A validator verdict was reached.
    Verdict {
        height: Height,
        hash: BlockHash,
        accepted: bool,
        reason: Option<RejectReason>,
    },
    MiningChanged { mining: bool },
}

type Listener = Box<dyn Fn(&NodeEvent) + Send + Sync>;

/// Synchronous fan-out event bus.
///
/// Listeners are invoked inline on the emitting task; keep handlers fast to
/// avoid stalling the pipeline. After [`EventBus::stop`] events are dropped.
pub struct EventBus {
    listeners: RwLock<Vec<Listener>>,
    stopped: AtomicBool,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self, listener: Listener) {
        if self.is_stopped() {
            return;
        }
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    pub fn emit(&self, event: &NodeEvent) {
        if self.is_stopped() {
            return;
        }
        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
        for listener in listeners.iter() {
            listener(event);
        }
    }

    /// Drop every listener and refuse further events.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        tracing::debug!("event bus stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn listeners_receive_events_until_stopped() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        bus.subscribe(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let event = NodeEvent::MiningChanged { mining: true };
        bus.emit(&event);
        bus.emit(&event);
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        bus.stop();
        bus.emit(&event);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert!(bus.is_stopped());
    }
}
