//! # Session Transport
//!
//! Client side of the duplex session channel. Owns the WebSocket
//! lifecycle for one session: connect, identify, send/receive binary
//! audio frames and JSON control messages, detect close/error.
//!
//! ## Connection States:
//! `Disconnected -> Connecting -> Identified -> (Waiting <-> Active) -> Closed`
//!
//! Reconnection is manual only: a closed transport stays closed until
//! the user initiates a new connection, and the previous capture
//! pipeline must be fully torn down first.
//!
//! ## Dispatch:
//! The protocol state machine ([`SessionState`]) is pure and separate
//! from socket I/O, so ordering, echo and legacy-message behavior are
//! directly testable. The connection task feeds it frames and forwards
//! the resulting [`SessionEvent`]s over a one-way channel.

use crate::audio::codec;
use crate::error::AppError;
use crate::session::identity::UserIdentity;
use crate::session::protocol::{ControlMessage, InboundText};
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No channel; initial state
    Disconnected,
    /// Channel opening in progress
    Connecting,
    /// Channel open, USER_JOIN sent, no participant count seen yet
    Identified,
    /// Connected alone; waiting for the duet partner
    Waiting,
    /// Both participants present
    Active,
    /// Channel closed (error, remote close, or user disconnect)
    Closed,
}

/// Events surfaced to the session owner.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Decoded peer audio for immediate playback
    PeerAudio(Vec<f32>),
    /// Remote participant started playback at the given time
    RemotePlay(f64),
    /// Remote participant paused at the given time
    RemotePause(f64),
    /// Participant count changed; `waiting` reflects the new status
    ParticipantUpdate { count: u32, waiting: bool },
    /// The session was full; the channel has been closed
    SessionFull,
    /// The channel closed (remote close or error)
    Closed,
}

/// Pure protocol state machine for one session connection.
///
/// Tracks connection phase, peer presence and the mute/deafen send
/// policy. All transitions are synchronous and free of I/O.
#[derive(Debug)]
pub struct SessionState {
    state: ConnectionState,
    peer_connected: bool,
    muted: bool,
    deafened: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            peer_connected: false,
            muted: false,
            deafened: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Identified | ConnectionState::Waiting | ConnectionState::Active
        )
    }

    pub fn is_peer_connected(&self) -> bool {
        self.peer_connected
    }

    /// Binary audio frames are sent only while connected, unmuted and
    /// not deafened.
    pub fn can_send_audio(&self) -> bool {
        self.is_connected() && !self.muted && !self.deafened
    }

    /// Control messages are sent only while connected.
    pub fn can_send_control(&self) -> bool {
        self.is_connected()
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn set_deafened(&mut self, deafened: bool) {
        self.deafened = deafened;
        // Deafen implies mute; un-deafen restores the open mic
        self.muted = deafened;
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_deafened(&self) -> bool {
        self.deafened
    }

    /// User initiated a connection attempt.
    pub fn on_connect_initiated(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// Channel opened and USER_JOIN was sent.
    pub fn on_identified(&mut self) {
        self.state = ConnectionState::Identified;
    }

    /// Channel closed from any state. Clears peer presence; capture and
    /// mic-time tracking stop at the call site.
    pub fn on_closed(&mut self) {
        self.state = ConnectionState::Closed;
        self.peer_connected = false;
    }

    /// Apply a participant count from the server.
    fn apply_participant_count(&mut self, count: u32) -> SessionEvent {
        self.peer_connected = count > 1;
        if self.is_connected() {
            self.state = if count > 1 {
                ConnectionState::Active
            } else {
                ConnectionState::Waiting
            };
        }
        SessionEvent::ParticipantUpdate {
            count,
            waiting: count <= 1,
        }
    }

    /// Dispatch one inbound text frame.
    ///
    /// Unparseable JSON is a protocol error: logged, dropped, never
    /// fatal. A `session-full` signal is the one case where the
    /// transport unilaterally closes the channel.
    pub fn handle_text(&mut self, text: &str) -> Option<SessionEvent> {
        match InboundText::classify(text) {
            InboundText::Control(ControlMessage::ParticipantUpdate { count }) => {
                Some(self.apply_participant_count(count))
            }
            InboundText::Control(ControlMessage::Play { time }) => {
                Some(SessionEvent::RemotePlay(time))
            }
            InboundText::Control(ControlMessage::Pause { time }) => {
                Some(SessionEvent::RemotePause(time))
            }
            InboundText::Control(ControlMessage::UserJoin { user_id, .. }) => {
                // Peer identity is served by the session info endpoint;
                // nothing to apply here
                debug!(user_id = %user_id, "peer USER_JOIN observed");
                None
            }
            InboundText::SessionFull => {
                self.on_closed();
                Some(SessionEvent::SessionFull)
            }
            InboundText::PeerConnected => Some(self.apply_participant_count(2)),
            InboundText::PeerDisconnected => Some(self.apply_participant_count(1)),
            InboundText::ConnectedAck(index) => {
                debug!(client_index = index, "relay connection ack");
                None
            }
            InboundText::Malformed(err) => {
                warn!(error = %err, "dropping malformed control message");
                None
            }
            InboundText::Unknown(text) => {
                warn!(text = %text, "ignoring unknown text message");
                None
            }
        }
    }

    /// Dispatch one inbound binary frame: always raw PCM16 peer audio.
    pub fn handle_binary(&mut self, data: &[u8]) -> Option<SessionEvent> {
        match codec::decode(data) {
            Ok(samples) => Some(SessionEvent::PeerAudio(samples)),
            Err(err) => {
                warn!(error = %err, len = data.len(), "dropping undecodable audio frame");
                None
            }
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Outbound traffic from the session owner to the connection task.
#[derive(Debug)]
enum Outbound {
    Audio(Vec<u8>),
    Control(ControlMessage),
    Close,
}

/// Handle for sending on an established session connection.
///
/// Enforces the send policy: audio requires connected + unmuted +
/// undeafened; control requires connected. Sends outside the policy are
/// silently dropped (best-effort, matching the lossy wire contract).
#[derive(Clone)]
pub struct SessionHandle {
    state: Arc<Mutex<SessionState>>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
}

impl SessionHandle {
    pub fn send_audio(&self, pcm16: Vec<u8>) {
        let allowed = self.state.lock().map(|s| s.can_send_audio()).unwrap_or(false);
        if allowed {
            let _ = self.outbound_tx.send(Outbound::Audio(pcm16));
        }
    }

    pub fn send_control(&self, message: ControlMessage) {
        let allowed = self.state.lock().map(|s| s.can_send_control()).unwrap_or(false);
        if allowed {
            let _ = self.outbound_tx.send(Outbound::Control(message));
        }
    }

    pub fn set_muted(&self, muted: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.set_muted(muted);
        }
    }

    pub fn set_deafened(&self, deafened: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.set_deafened(deafened);
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.lock().map(|s| s.state()).unwrap_or(ConnectionState::Closed)
    }

    pub fn is_peer_connected(&self) -> bool {
        self.state.lock().map(|s| s.is_peer_connected()).unwrap_or(false)
    }

    /// Request a cooperative disconnect. Cleanup runs in the connection
    /// task; no in-flight frame is guaranteed delivered afterwards.
    pub fn close(&self) {
        let _ = self.outbound_tx.send(Outbound::Close);
    }
}

/// One active session connection. Exactly one may exist per session per
/// participant; reconnect requires tearing the previous one down.
pub struct SessionTransport {
    pub handle: SessionHandle,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionTransport {
    /// Open the duplex channel to a session-scoped endpoint and identify.
    ///
    /// On success the channel is open, USER_JOIN has been sent, and the
    /// receive loop is running. The caller starts audio capture and
    /// mic-time tracking once this returns.
    pub async fn connect(ws_url: &str, identity: &UserIdentity) -> Result<Self, AppError> {
        let state = Arc::new(Mutex::new(SessionState::new()));
        if let Ok(mut s) = state.lock() {
            s.on_connect_initiated();
        }

        let (ws_stream, _response) = connect_async(ws_url)
            .await
            .map_err(|err| AppError::Transport(format!("channel open failed: {}", err)))?;

        info!(url = %ws_url, "session channel open");
        let (mut sink, mut stream) = ws_stream.split();

        // Identify immediately after the channel opens
        let join = ControlMessage::UserJoin {
            user_id: identity.user_id.clone(),
            display_name: identity.display_name.clone(),
        };
        sink.send(Message::Text(join.to_json()))
            .await
            .map_err(|err| AppError::Transport(format!("identify failed: {}", err)))?;

        if let Ok(mut s) = state.lock() {
            s.on_identified();
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();

        // Writer task: drains outbound traffic into the socket
        let writer_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Some(outbound) = outbound_rx.recv().await {
                let result = match outbound {
                    Outbound::Audio(pcm16) => sink.send(Message::Binary(pcm16)).await,
                    Outbound::Control(message) => sink.send(Message::Text(message.to_json())).await,
                    Outbound::Close => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                };
                if let Err(err) = result {
                    warn!(error = %err, "send failed, closing session channel");
                    break;
                }
            }
            if let Ok(mut s) = writer_state.lock() {
                s.on_closed();
            }
        });

        // Reader task: feeds the state machine and forwards events
        let reader_state = Arc::clone(&state);
        let reader_events = events_tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let event = match frame {
                    Ok(Message::Text(text)) => {
                        reader_state.lock().ok().and_then(|mut s| s.handle_text(&text))
                    }
                    Ok(Message::Binary(data)) => {
                        reader_state.lock().ok().and_then(|mut s| s.handle_binary(&data))
                    }
                    Ok(Message::Close(reason)) => {
                        info!(?reason, "session channel closed by remote");
                        break;
                    }
                    Ok(_) => None, // ping/pong handled by the library
                    Err(err) => {
                        warn!(error = %err, "session channel error");
                        break;
                    }
                };

                if let Some(event) = event {
                    let session_full = event == SessionEvent::SessionFull;
                    if reader_events.send(event).is_err() {
                        break;
                    }
                    if session_full {
                        // The one unilateral termination
                        break;
                    }
                }
            }

            if let Ok(mut s) = reader_state.lock() {
                s.on_closed();
            }
            let _ = reader_events.send(SessionEvent::Closed);
        });

        Ok(Self {
            handle: SessionHandle {
                state,
                outbound_tx,
            },
            events: events_rx,
        })
    }
}

/// Build the session channel URL for a session id, matching the page
/// protocol (`ws` for plaintext origins, `wss` for TLS).
pub fn session_ws_url(host: &str, session_id: &str, secure: bool) -> String {
    let scheme = if secure { "wss" } else { "ws" };
    format!("{}://{}/karaoke/ws/{}", scheme, host, session_id)
}
