//! Pre-built [`tracing::Span`] constructors for the duty pipeline.
//!
//! Consistent span names and field sets make it easy to follow one height
//! through rotation, production, verification and announcement.

use tessera_types::{BlockHash, Epoch, Height};
use tracing::{info_span, Span};

/// One round of the chain follower: duty resolution for `height`.
pub fn round_span(height: Height, epoch: Epoch) -> Span {
    info_span!("round", height = %height, epoch = %epoch)
}

/// A committee rotation at an epoch boundary.
pub fn rotation_span(epoch: Epoch) -> Span {
    info_span!("rotation", epoch = %epoch)
}

/// Building, sealing and signing a candidate.
pub fn produce_span(height: Height) -> Span {
    info_span!("produce", height = %height)
}

/// Checking a candidate under validator duty.
pub fn verify_span(height: Height, hash: &BlockHash) -> Span {
    info_span!("verify", height = %height, hash = %hash)
}

/// Announcing a block to duty-holding peers.
pub fn notify_span(hash: &BlockHash, height: Height) -> Span {
    info_span!("notify", hash = %hash, height = %height)
}
