//! # WebSocket Session Relay
//!
//! Real-time relay between the participants of a duet session. Clients
//! connect to `/karaoke/ws/{session_id}` and exchange binary voice frames
//! and JSON control messages; the relay fans each message out to the other
//! participant without inspecting audio payloads.
//!
//! ## Relay Protocol:
//! 1. **Connection**: Client connects to a session-scoped URL
//! 2. **Capacity check**: A full session answers `session-full` and closes
//! 3. **Acknowledgement**: Accepted clients receive `connected:<index>`
//!    (zero-based slot), then everyone in the session, the newcomer
//!    included, receives a `PARTICIPANT_UPDATE` with the new count
//! 4. **Identification**: The client's first text message is `USER_JOIN`;
//!    the relay records the identity against the slot
//! 5. **Traffic**: Binary frames and `PLAY`/`PAUSE` messages are forwarded
//!    to every participant except the sender
//!
//! ## Message Format:
//! - **Client → Server**: Binary PCM16 audio or JSON control messages
//! - **Server → Client**: Forwarded peer traffic, the `connected:<index>`
//!   ack, `PARTICIPANT_UPDATE` envelopes, and `session-full` on rejection

use crate::session::protocol::ControlMessage;
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often the relay pings each connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long a connection may stay silent before it is dropped.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// A connected participant as the registry sees it.
///
/// The production implementation is `Addr<KaraokeSocket>`; tests substitute
/// a recording stub so fan-out rules can be checked without an actor system.
pub trait RelayPeer: Clone {
    fn send_text(&self, text: String);
    fn send_binary(&self, data: Vec<u8>);
}

/// Identity a participant announced with `USER_JOIN`.
#[derive(Debug, Clone)]
pub struct PeerIdentity {
    pub user_id: String,
    pub display_name: String,
}

/// One participant slot inside a session room.
struct RoomMember<P> {
    peer_id: usize,
    peer: P,
    identity: Option<PeerIdentity>,
}

/// All participants of one session.
struct SessionRoom<P> {
    members: Vec<RoomMember<P>>,
}

/// Outcome of a successful join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    pub peer_id: usize,
    pub participant_count: usize,
}

/// Session-keyed membership and fan-out rules for the relay.
///
/// The registry owns every routing decision: capacity, acknowledgements,
/// participant-count broadcasts, and the sender-exclusion rule for traffic.
/// The socket actors only translate between WebSocket frames and these
/// calls.
pub struct SessionRegistry<P: RelayPeer> {
    rooms: HashMap<String, SessionRoom<P>>,
    max_participants: usize,
    next_peer_id: usize,
}

impl<P: RelayPeer> SessionRegistry<P> {
    pub fn new(max_participants: usize) -> Self {
        Self {
            rooms: HashMap::new(),
            max_participants,
            next_peer_id: 0,
        }
    }

    /// Admit a connection to a session, or reject it when the session is
    /// already at capacity.
    ///
    /// On acceptance the newcomer receives `connected:<index>` and the
    /// whole session, newcomer included, receives the updated participant
    /// count. On rejection the candidate receives `session-full`; existing
    /// members are never evicted to make room.
    pub fn join(&mut self, session_id: &str, peer: P) -> Result<JoinOutcome, ()> {
        let room = self
            .rooms
            .entry(session_id.to_string())
            .or_insert_with(|| SessionRoom {
                members: Vec::new(),
            });

        if room.members.len() >= self.max_participants {
            peer.send_text("session-full".to_string());
            return Err(());
        }

        let peer_id = self.next_peer_id;
        self.next_peer_id += 1;

        room.members.push(RoomMember {
            peer_id,
            peer: peer.clone(),
            identity: None,
        });

        let participant_count = room.members.len();
        peer.send_text(format!("connected:{}", participant_count - 1));

        let update = ControlMessage::ParticipantUpdate {
            count: participant_count as u32,
        }
        .to_json();
        for member in &room.members {
            member.peer.send_text(update.clone());
        }

        Ok(JoinOutcome {
            peer_id,
            participant_count,
        })
    }

    /// Record the identity a participant announced with `USER_JOIN`.
    pub fn identify(&mut self, session_id: &str, peer_id: usize, identity: PeerIdentity) {
        let Some(room) = self.rooms.get_mut(session_id) else {
            return;
        };

        if let Some(member) = room.members.iter_mut().find(|m| m.peer_id == peer_id) {
            member.identity = Some(identity);
        }
    }

    /// Remove a participant and broadcast the reduced count to the
    /// remaining members. Empty rooms are dropped entirely.
    pub fn leave(&mut self, session_id: &str, peer_id: usize) {
        let Some(room) = self.rooms.get_mut(session_id) else {
            return;
        };

        room.members.retain(|m| m.peer_id != peer_id);

        if room.members.is_empty() {
            self.rooms.remove(session_id);
            return;
        }

        let update = ControlMessage::ParticipantUpdate {
            count: room.members.len() as u32,
        }
        .to_json();

        for member in &room.members {
            member.peer.send_text(update.clone());
        }
    }

    /// Forward a binary voice frame to every participant except the sender.
    /// Returns the number of peers it reached.
    pub fn relay_binary(&self, session_id: &str, sender_id: usize, data: &[u8]) -> usize {
        let Some(room) = self.rooms.get(session_id) else {
            return 0;
        };

        let mut relayed = 0;
        for member in room.members.iter().filter(|m| m.peer_id != sender_id) {
            member.peer.send_binary(data.to_vec());
            relayed += 1;
        }
        relayed
    }

    /// Forward a control message to every participant except the sender.
    /// Returns the number of peers it reached.
    pub fn relay_text(&self, session_id: &str, sender_id: usize, text: &str) -> usize {
        let Some(room) = self.rooms.get(session_id) else {
            return 0;
        };

        let mut relayed = 0;
        for member in room.members.iter().filter(|m| m.peer_id != sender_id) {
            member.peer.send_text(text.to_string());
            relayed += 1;
        }
        relayed
    }

    /// Number of participants currently in a session.
    pub fn participant_count(&self, session_id: &str) -> usize {
        self.rooms
            .get(session_id)
            .map(|room| room.members.len())
            .unwrap_or(0)
    }
}

/// The registry as shared by every connection actor.
pub type SharedRegistry = Arc<Mutex<SessionRegistry<Addr<KaraokeSocket>>>>;

/// Build the shared registry from the configured session capacity.
pub fn shared_registry(max_participants: usize) -> SharedRegistry {
    Arc::new(Mutex::new(SessionRegistry::new(max_participants)))
}

/// Outbound text frame for a connection actor.
#[derive(Message)]
#[rtype(result = "()")]
pub struct SendText(pub String);

/// Outbound binary frame for a connection actor.
#[derive(Message)]
#[rtype(result = "()")]
pub struct SendBinary(pub Vec<u8>);

impl RelayPeer for Addr<KaraokeSocket> {
    fn send_text(&self, text: String) {
        self.do_send(SendText(text));
    }

    fn send_binary(&self, data: Vec<u8>) {
        self.do_send(SendBinary(data));
    }
}

/// WebSocket actor for one participant's relay connection.
///
/// ## Actor Model:
/// Each connection is an independent actor. All cross-connection state
/// lives in the registry; the actor holds only its own session membership
/// and heartbeat clock.
pub struct KaraokeSocket {
    /// Session this connection belongs to
    session_id: String,

    /// Registry-assigned peer id, set once the join is accepted
    peer_id: Option<usize>,

    /// Shared session membership and routing
    registry: SharedRegistry,

    /// Shared application state for metrics
    app_state: web::Data<AppState>,

    /// Last time the client showed signs of life
    last_heartbeat: Instant,
}

impl KaraokeSocket {
    pub fn new(session_id: String, registry: SharedRegistry, app_state: web::Data<AppState>) -> Self {
        Self {
            session_id,
            peer_id: None,
            registry,
            app_state,
            last_heartbeat: Instant::now(),
        }
    }

    /// Handle a text frame from the client.
    ///
    /// `USER_JOIN` is consumed here (identity recording, never relayed);
    /// playback commands are forwarded verbatim to the other participants.
    /// Malformed or unknown traffic is logged and dropped without closing
    /// the connection.
    fn handle_text(&mut self, text: &str) {
        let Some(peer_id) = self.peer_id else {
            return;
        };

        match serde_json::from_str::<ControlMessage>(text) {
            Ok(ControlMessage::UserJoin {
                user_id,
                display_name,
            }) => {
                info!(
                    session_id = %self.session_id,
                    user_id = %user_id,
                    "participant identified"
                );
                self.registry.lock().unwrap().identify(
                    &self.session_id,
                    peer_id,
                    PeerIdentity {
                        user_id,
                        display_name,
                    },
                );
            }
            Ok(ControlMessage::Play { time }) | Ok(ControlMessage::Pause { time }) => {
                debug!(
                    session_id = %self.session_id,
                    time,
                    "forwarding playback command"
                );
                let relayed = self
                    .registry
                    .lock()
                    .unwrap()
                    .relay_text(&self.session_id, peer_id, text);
                if relayed > 0 {
                    self.app_state.record_control_message_relayed();
                }
            }
            Ok(other) => {
                warn!(
                    session_id = %self.session_id,
                    message = ?other,
                    "dropping control message clients should not send"
                );
            }
            Err(err) => {
                warn!(
                    session_id = %self.session_id,
                    error = %err,
                    "dropping malformed control message"
                );
            }
        }
    }

    /// Handle a binary voice frame from the client.
    ///
    /// PCM16 frames always hold whole samples; an odd byte count means the
    /// frame is corrupt, so it is dropped rather than forwarded.
    fn handle_binary(&mut self, data: &[u8]) {
        let Some(peer_id) = self.peer_id else {
            return;
        };

        if data.len() % 2 != 0 {
            warn!(
                session_id = %self.session_id,
                len = data.len(),
                "dropping binary frame with partial sample"
            );
            return;
        }

        let relayed = self
            .registry
            .lock()
            .unwrap()
            .relay_binary(&self.session_id, peer_id, data);
        if relayed > 0 {
            self.app_state.record_audio_frame_relayed();
        }
    }
}

impl Actor for KaraokeSocket {
    type Context = ws::WebsocketContext<Self>;

    /// Join the session on connect; reject and close when it is full.
    fn started(&mut self, ctx: &mut Self::Context) {
        info!(session_id = %self.session_id, "relay connection started");

        match self
            .registry
            .lock()
            .unwrap()
            .join(&self.session_id, ctx.address())
        {
            Ok(outcome) => {
                self.peer_id = Some(outcome.peer_id);
                self.app_state.increment_active_connections();
                info!(
                    session_id = %self.session_id,
                    participants = outcome.participant_count,
                    "participant joined"
                );
            }
            Err(()) => {
                // The rejection text is already queued; the mailbox delivers
                // it before the close frame.
                warn!(session_id = %self.session_id, "rejecting connection, session full");
                ctx.run_later(Duration::from_millis(50), |_, ctx| {
                    ctx.close(Some(ws::CloseReason {
                        code: ws::CloseCode::Again,
                        description: Some("session-full".to_string()),
                    }));
                    ctx.stop();
                });
                return;
            }
        }

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(session_id = %act.session_id, "heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    /// Leave the session when the connection stops for any reason.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(peer_id) = self.peer_id.take() {
            self.registry.lock().unwrap().leave(&self.session_id, peer_id);
            self.app_state.decrement_active_connections();
            info!(session_id = %self.session_id, "participant left");
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for KaraokeSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.handle_text(&text);
            }
            Ok(ws::Message::Binary(data)) => {
                self.handle_binary(&data);
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(session_id = %self.session_id, ?reason, "relay connection closed");
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                warn!(session_id = %self.session_id, error = %err, "websocket protocol error");
                ctx.stop();
            }
        }
    }
}

impl Handler<SendText> for KaraokeSocket {
    type Result = ();

    fn handle(&mut self, msg: SendText, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl Handler<SendBinary> for KaraokeSocket {
    type Result = ();

    fn handle(&mut self, msg: SendBinary, ctx: &mut Self::Context) {
        ctx.binary(msg.0);
    }
}

/// WebSocket endpoint handler for `/karaoke/ws/{session_id}`.
///
/// ## HTTP to WebSocket Upgrade:
/// Handles the initial HTTP request and upgrades it to a WebSocket
/// connection; the relay protocol itself lives in the KaraokeSocket actor.
pub async fn karaoke_websocket(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<String>,
    app_state: web::Data<AppState>,
    registry: web::Data<SharedRegistry>,
) -> ActixResult<HttpResponse> {
    let session_id = path.into_inner();
    info!(
        session_id = %session_id,
        peer = ?req.connection_info().peer_addr(),
        "new relay connection request"
    );

    let socket = KaraokeSocket::new(session_id, registry.get_ref().clone(), app_state);
    ws::start(socket, &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        Text(String),
        Binary(Vec<u8>),
    }

    #[derive(Clone)]
    struct TestPeer {
        sent: Arc<StdMutex<Vec<Sent>>>,
    }

    impl TestPeer {
        fn new() -> Self {
            Self {
                sent: Arc::new(StdMutex::new(Vec::new())),
            }
        }

        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        fn texts(&self) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter_map(|m| match m {
                    Sent::Text(t) => Some(t),
                    Sent::Binary(_) => None,
                })
                .collect()
        }
    }

    impl RelayPeer for TestPeer {
        fn send_text(&self, text: String) {
            self.sent.lock().unwrap().push(Sent::Text(text));
        }

        fn send_binary(&self, data: Vec<u8>) {
            self.sent.lock().unwrap().push(Sent::Binary(data));
        }
    }

    fn identity(user_id: &str) -> PeerIdentity {
        PeerIdentity {
            user_id: user_id.to_string(),
            display_name: format!("Name {}", user_id),
        }
    }

    #[test]
    fn test_join_acks_slot_and_broadcasts_count() {
        let mut registry = SessionRegistry::new(2);

        let first = TestPeer::new();
        let outcome = registry.join("abc", first.clone()).unwrap();
        assert_eq!(outcome.participant_count, 1);
        assert_eq!(
            first.texts(),
            vec!["connected:0", r#"{"type":"PARTICIPANT_UPDATE","count":1}"#]
        );

        let second = TestPeer::new();
        let outcome = registry.join("abc", second.clone()).unwrap();
        assert_eq!(outcome.participant_count, 2);
        assert_eq!(
            second.texts(),
            vec!["connected:1", r#"{"type":"PARTICIPANT_UPDATE","count":2}"#]
        );
        // The existing member learns the new count too
        assert_eq!(
            first.texts().last().map(String::as_str),
            Some(r#"{"type":"PARTICIPANT_UPDATE","count":2}"#)
        );
    }

    #[test]
    fn test_third_participant_rejected_without_eviction() {
        let mut registry = SessionRegistry::new(2);

        let first = TestPeer::new();
        let second = TestPeer::new();
        registry.join("abc", first.clone()).unwrap();
        registry.join("abc", second.clone()).unwrap();

        let third = TestPeer::new();
        assert!(registry.join("abc", third.clone()).is_err());
        assert_eq!(third.texts(), vec!["session-full"]);
        assert_eq!(registry.participant_count("abc"), 2);
        // Existing members never see the count drop
        let dropped = r#"{"type":"PARTICIPANT_UPDATE","count":1}"#.to_string();
        assert!(!first.texts().contains(&dropped));
        assert!(!second.texts().contains(&dropped));
    }

    #[test]
    fn test_sessions_are_isolated() {
        let mut registry = SessionRegistry::new(2);

        let a = TestPeer::new();
        let b = TestPeer::new();
        registry.join("one", a.clone()).unwrap();
        registry.join("two", b.clone()).unwrap();

        registry.relay_binary("one", usize::MAX, &[1, 2]);
        assert!(b.sent().iter().all(|m| !matches!(m, Sent::Binary(_))));

        // Filling session "one" does not affect "two"
        let c = TestPeer::new();
        registry.join("one", c.clone()).unwrap();
        let d = TestPeer::new();
        assert!(registry.join("two", d.clone()).is_ok());
    }

    #[test]
    fn test_identify_is_silent_on_the_wire() {
        let mut registry = SessionRegistry::new(2);

        let first = TestPeer::new();
        let second = TestPeer::new();
        let o1 = registry.join("abc", first.clone()).unwrap();
        let o2 = registry.join("abc", second.clone()).unwrap();

        let before_first = first.sent().len();
        let before_second = second.sent().len();
        registry.identify("abc", o1.peer_id, identity("u1"));
        registry.identify("abc", o2.peer_id, identity("u2"));

        // Identity announcements are recorded, not relayed
        assert_eq!(first.sent().len(), before_first);
        assert_eq!(second.sent().len(), before_second);
    }

    #[test]
    fn test_traffic_excludes_sender() {
        let mut registry = SessionRegistry::new(2);

        let first = TestPeer::new();
        let second = TestPeer::new();
        let o1 = registry.join("abc", first.clone()).unwrap();
        let o2 = registry.join("abc", second.clone()).unwrap();

        let relayed = registry.relay_binary("abc", o1.peer_id, &[1, 2, 3, 4]);
        assert_eq!(relayed, 1);
        assert!(second.sent().contains(&Sent::Binary(vec![1, 2, 3, 4])));
        assert!(first.sent().iter().all(|m| !matches!(m, Sent::Binary(_))));

        let play = r#"{"type":"PLAY","time":3.5}"#;
        let relayed = registry.relay_text("abc", o2.peer_id, play);
        assert_eq!(relayed, 1);
        assert!(first.texts().contains(&play.to_string()));
        assert!(!second.texts().contains(&play.to_string()));
    }

    #[test]
    fn test_leave_notifies_remaining_member() {
        let mut registry = SessionRegistry::new(2);

        let first = TestPeer::new();
        let second = TestPeer::new();
        let o1 = registry.join("abc", first.clone()).unwrap();
        registry.join("abc", second.clone()).unwrap();

        registry.leave("abc", o1.peer_id);

        assert_eq!(
            second.texts().last().map(String::as_str),
            Some(r#"{"type":"PARTICIPANT_UPDATE","count":1}"#)
        );
        assert_eq!(registry.participant_count("abc"), 1);
    }

    #[test]
    fn test_empty_room_is_dropped_and_reusable() {
        let mut registry = SessionRegistry::new(2);

        let first = TestPeer::new();
        let o1 = registry.join("abc", first.clone()).unwrap();
        registry.leave("abc", o1.peer_id);
        assert_eq!(registry.participant_count("abc"), 0);

        // A fresh join starts the count over
        let returner = TestPeer::new();
        registry.join("abc", returner.clone()).unwrap();
        assert_eq!(
            returner.texts(),
            vec!["connected:0", r#"{"type":"PARTICIPANT_UPDATE","count":1}"#]
        );
    }
}
