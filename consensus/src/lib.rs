//! Consensus roles: who produces, who validates, who relays.
//!
//! Per height, the local node holds exactly one duty. The duty follows from
//! the epoch's committee, the epoch's randomness and the declared relay set:
//!
//! - The committee for each epoch comes from a [`CommitteeSource`] and
//!   becomes active at the epoch boundary ([`rotation`]).
//! - The [`LeaderSchedule`] maps every height of the epoch to one committee
//!   member, seeded by the epoch's randomness ([`schedule`]).
//! - The [`RoleResolver`] partitions identities into producer, validators,
//!   relays and everyone else ([`role`]).
//!
//! ## Module overview
//!
//! - [`committee`]: Committee membership for one epoch.
//! - [`epoch`]: Height to epoch arithmetic.
//! - [`registry`]: Committee and identity registry traits, static election.
//! - [`rotation`]: Active committee per height, rotation events.
//! - [`schedule`]: Deterministic leader schedule.
//! - [`role`]: Duty roster and role resolution.
//! - [`engine`]: Consensus engine (authority or work) selection and sealing.
//! - [`production`]: Block body building and verification seams.
//! - [`error`]: Consensus error types.

pub mod committee;
pub mod engine;
pub mod epoch;
pub mod error;
pub mod production;
pub mod registry;
pub mod role;
pub mod rotation;
pub mod schedule;

pub use committee::Committee;
pub use engine::{ApiDescriptor, AuthorityEngine, Engine, PowMode, SealSigner, WorkEngine};
pub use epoch::EpochSchedule;
pub use error::ConsensusError;
pub use production::{BlockBuilder, BlockVerifier, BuildContext, StructuralVerifier};
pub use registry::{CommitteeSource, IdentityRegistry, StaticElection};
pub use role::{DutyRoster, RoleResolver, RoundDuty};
pub use rotation::{CommitteeRotation, RotationEvent};
pub use schedule::LeaderSchedule;
