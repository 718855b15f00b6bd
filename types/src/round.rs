//! Height and epoch counters.
//!
//! Height strictly increases by one per accepted block. Epoch increases at
//! committee-rotation boundaries, which are a fixed function of height.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A block height.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Height(u64);

impl Height {
    pub const GENESIS: Self = Self(0);

    pub fn new(h: u64) -> Self {
        Self(h)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// The next height.
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// The previous height, or `None` at genesis.
    pub fn prev(&self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }
}

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A committee epoch: a span of heights governed by one committee.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Epoch(u64);

impl Epoch {
    pub fn new(e: u64) -> Self {
        Self(e)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
