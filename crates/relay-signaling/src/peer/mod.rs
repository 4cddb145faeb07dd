//! Relay legs
//!
//! Every relay leg wraps one media engine endpoint in a [`PeerConnection`]
//! state machine:
//!
//! ```text
//! Connecting ──dtls connected──> Connected
//!     │                              │
//!     └──timeout / failure / close───┴──> Closed
//! ```
//!
//! [`SourcePeer`] receives the published stream; [`SinkPeer`] forwards it to
//! one viewer and is closed together with its source.

pub mod connection;
pub mod sink;
pub mod source;

pub use connection::{ConnectionState, ListenerId, PeerConnection, StateListener};
pub use sink::SinkPeer;
pub use source::SourcePeer;
