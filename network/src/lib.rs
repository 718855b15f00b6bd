//! Peer networking seams for the Tessera node.
//!
//! The wire transport (handshake, framing, sockets) lives outside this crate.
//! Here are the pieces the node talks to:
//!
//! - [`PeerSet`]: live peers by identity, with the peer limit.
//! - [`PeerConnection`]: queue-based handle to one peer.
//! - [`Fetcher`]: receives announcements and fetches header then bodies.
//! - [`ProtocolManager`]: message dispatch and the transaction admission gate.

pub mod connection;
pub mod dedup;
pub mod error;
pub mod fetcher;
pub mod peers;
pub mod protocol;
pub mod txpool;

pub use connection::{ChannelConnection, PeerConnection};
pub use dedup::RecentHashes;
pub use error::NetworkError;
pub use fetcher::{AnnouncementSink, DirectAnnouncer, Fetcher, FetcherHandle};
pub use peers::{PeerRecord, PeerSet};
pub use protocol::ProtocolManager;
pub use tessera_messages::Announcement;
pub use txpool::TxPool;
