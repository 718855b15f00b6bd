//! Targeted block announcement to the peers holding duties for a height.

use std::sync::Arc;

use tokio::sync::watch;

use tessera_consensus::EpochSchedule;
use tessera_network::{Announcement, AnnouncementSink, PeerSet};
use tessera_types::{BlockHash, Height, NodeId};

use crate::rounds::EpochBook;
use crate::{tracing_spans, unix_now_secs, NodeMetrics};

/// Outcome of one [`PeerNotifier::fetcher_notify`] call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NotifyReport {
    /// Duty-holders handed an announcement.
    pub delivered: Vec<NodeId>,
    /// Duty-holders without a live connection, or whose send failed.
    pub skipped: Vec<NodeId>,
}

/// Announces a block directly to the Validator and Broadcast holders of its
/// height instead of flooding every peer.
pub struct PeerNotifier {
    local: NodeId,
    peers: Arc<PeerSet>,
    sink: Arc<dyn AnnouncementSink>,
    book: watch::Receiver<Arc<EpochBook>>,
    epochs: EpochSchedule,
    metrics: Arc<NodeMetrics>,
}

impl PeerNotifier {
    pub fn new(
        local: NodeId,
        peers: Arc<PeerSet>,
        sink: Arc<dyn AnnouncementSink>,
        book: watch::Receiver<Arc<EpochBook>>,
        epochs: EpochSchedule,
        metrics: Arc<NodeMetrics>,
    ) -> Self {
        Self {
            local,
            peers,
            sink,
            book,
            epochs,
            metrics,
        }
    }

    /// Announce `hash` at `height` to every connected duty-holder of that
    /// height. Holders without a connection are skipped, not retried.
    pub fn fetcher_notify(&self, hash: BlockHash, height: Height) -> NotifyReport {
        let _span = tracing_spans::notify_span(&hash, height).entered();
        let book = self.book.borrow().clone();
        let Some(roster) = book.roster_for(&self.epochs, height) else {
            tracing::warn!(%height, "no duty roster for height, nothing announced");
            return NotifyReport::default();
        };

        let announcement = Announcement {
            hash,
            height,
            timestamp: unix_now_secs(),
        };
        let mut report = NotifyReport::default();
        for (id, role) in roster.announcement_targets() {
            if id == self.local {
                continue;
            }
            if !self.peers.contains(&id) {
                tracing::info!(peer = %id.short(), %role, "duty-holder not connected, skipped");
                report.skipped.push(id);
                continue;
            }
            match self.sink.notify(id, announcement) {
                Ok(()) => {
                    tracing::trace!(peer = %id.short(), %role, "announcement delivered");
                    report.delivered.push(id);
                }
                Err(e) => {
                    tracing::warn!(peer = %id.short(), %role, error = %e, "announcement failed");
                    report.skipped.push(id);
                }
            }
        }

        self.metrics
            .announcements_delivered
            .inc_by(report.delivered.len() as u64);
        self.metrics
            .announcements_skipped
            .inc_by(report.skipped.len() as u64);
        tracing::debug!(
            delivered = report.delivered.len(),
            skipped = report.skipped.len(),
            "block announced"
        );
        report
    }
}
