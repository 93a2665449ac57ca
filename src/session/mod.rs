//! # Duet Session Module
//!
//! Everything a participant needs to join and hold a two-person karaoke
//! session: the control protocol, the duplex transport, playback
//! synchronization, mic-time accounting, persistent identity, and the
//! HTTP session API client.
//!
//! ## Key Components:
//! - **Protocol**: Typed control messages plus the legacy string signals
//! - **Transport**: WebSocket client state machine and send policy
//! - **Playback**: Play/pause mirroring with echo suppression
//! - **Mic Time**: Cumulative singing-time accounting
//! - **Identity**: Persistent guest identity on disk
//! - **Api**: Session creation and score submission over HTTP

pub mod api; // HTTP session API client
pub mod identity; // Persistent guest identity
pub mod mic_time; // Singing-time accounting
pub mod playback; // Play/pause sync with echo suppression
pub mod protocol; // Control message wire format
pub mod transport; // WebSocket client state machine
