//! Per-round consensus duty.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The duty an identity holds at a specific height.
///
/// A role is never a global property of a node: it is recomputed every round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// The single identity scheduled to propose the block for this height.
    Producer,
    /// A committee member that checks the candidate and votes on it.
    Validator,
    /// A declared relay node that receives and forwards new blocks.
    Broadcast,
    /// No duty this round.
    Passive,
}

impl Role {
    /// Whether holders of this role receive direct block announcements.
    pub fn receives_announcements(&self) -> bool {
        matches!(self, Self::Validator | Self::Broadcast)
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Passive)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Validator => "validator",
            Self::Broadcast => "broadcast",
            Self::Passive => "passive",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
