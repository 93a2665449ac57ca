//! # Duet Karaoke Session Core
//!
//! Library crate for a two-participant duet karaoke system: the client-side
//! audio pipeline (pitch detection, PCM16 codec, windowed capture), the
//! session layer (control protocol, WebSocket transport, playback sync,
//! mic-time accounting, identity, HTTP session API), and the relay server
//! that connects two participants.
//!
//! ## Application Architecture:
//! - **audio**: Microphone analysis and the binary wire codec
//! - **session**: Everything one participant needs to hold a duet session
//! - **websocket**: The session relay (server side)
//! - **config / state / error**: Runtime configuration, shared state, and
//!   the error taxonomy
//! - **health / middleware / handlers**: The relay's HTTP surface

pub mod audio;
pub mod config;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod session;
pub mod state;
pub mod websocket;
