//! # Playback Synchronization
//!
//! Wraps the shared external video player and keeps the two
//! participants' media clocks aligned. Local play/pause gestures become
//! outbound control messages; remote control messages are applied to
//! the local player without being re-broadcast.
//!
//! ## Echo Suppression:
//! Applying a remote PLAY changes local player state, which fires a
//! local state-change callback. To prevent a feedback loop, every
//! player action carries an explicit [`CommandSource`] and the
//! resulting event carries it back: only `Local` events are broadcast.
//! This replaces the original timed-flag approach, which raced against
//! a fast subsequent remote message (the suppression interval survives
//! as a config knob for hosts whose player cannot propagate sources).
//!
//! ## Conflict Resolution:
//! Near-simultaneous PLAY/PAUSE from both participants is deliberately
//! unresolved: last-write-wins at the network layer, no arbitration.

use crate::session::protocol::ControlMessage;
use tokio::sync::mpsc;
use tracing::debug;

/// Who initiated a player action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandSource {
    /// A gesture by the local participant
    Local,
    /// A control message applied from the peer
    Remote,
}

/// Player state as reported by the host player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Unstarted,
    Playing,
    Paused,
    Ended,
}

/// The shared external video player, as seen by the controller.
///
/// Actions carry the [`CommandSource`] that triggered them; the host
/// player implementation reports resulting state changes back through
/// [`PlaybackSyncController::on_player_event`] with the same source.
pub trait VideoPlayer {
    fn play(&mut self, source: CommandSource);
    fn pause(&mut self, source: CommandSource);
    fn seek(&mut self, time: f64);
    fn current_time(&self) -> f64;
    fn duration(&self) -> f64;
    fn state(&self) -> PlayerState;
}

/// A player state change delivered to the controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerEvent {
    pub state: PlayerState,
    pub time: f64,
    pub source: CommandSource,
}

/// Playback progress snapshot for the progress bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub current_time: f64,
    pub duration: f64,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.duration > 0.0 {
            (self.current_time / self.duration) * 100.0
        } else {
            0.0
        }
    }
}

/// Keeps one external player in sync with the peer over the session
/// channel.
pub struct PlaybackSyncController<P: VideoPlayer> {
    player: P,
    outbound_tx: mpsc::UnboundedSender<ControlMessage>,
    /// End-of-song score prompt already triggered
    score_prompted: bool,
}

impl<P: VideoPlayer> PlaybackSyncController<P> {
    pub fn new(player: P, outbound_tx: mpsc::UnboundedSender<ControlMessage>) -> Self {
        Self {
            player,
            outbound_tx,
            score_prompted: false,
        }
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut P {
        &mut self.player
    }

    /// Toggle between play and pause for the local participant.
    pub fn toggle_play_pause(&mut self) {
        match self.player.state() {
            PlayerState::Playing => self.player.pause(CommandSource::Local),
            _ => self.player.play(CommandSource::Local),
        }
    }

    /// Handle a player state change.
    ///
    /// Locally-originated transitions broadcast the matching control
    /// message; remotely-originated ones are applied silently. Returns
    /// `true` when the end-of-song score prompt should be shown (at
    /// most once per session).
    pub fn on_player_event(&mut self, event: PlayerEvent) -> bool {
        match event.state {
            PlayerState::Playing => {
                if event.source == CommandSource::Local {
                    let _ = self.outbound_tx.send(ControlMessage::Play { time: event.time });
                } else {
                    debug!(time = event.time, "suppressing echo of remote play");
                }
                false
            }
            PlayerState::Paused => {
                if event.source == CommandSource::Local {
                    let _ = self.outbound_tx.send(ControlMessage::Pause { time: event.time });
                }
                false
            }
            PlayerState::Ended => {
                if self.score_prompted {
                    false
                } else {
                    self.score_prompted = true;
                    true
                }
            }
            PlayerState::Unstarted => false,
        }
    }

    /// Apply a remote PLAY: seek to the peer's time, then play. The
    /// action is tagged `Remote` so the resulting local event is not
    /// re-broadcast.
    pub fn apply_remote_play(&mut self, time: f64) {
        self.player.seek(time);
        self.player.play(CommandSource::Remote);
    }

    /// Apply a remote PAUSE: seek, then pause, tagged `Remote`.
    pub fn apply_remote_pause(&mut self, time: f64) {
        self.player.seek(time);
        self.player.pause(CommandSource::Remote);
    }

    /// Progress snapshot, polled at a fixed cadence by the host while
    /// playing. Returns `None` when not playing so the poll loop stops
    /// updating on pause/end.
    pub fn poll_progress(&self) -> Option<Progress> {
        if self.player.state() == PlayerState::Playing {
            Some(Progress {
                current_time: self.player.current_time(),
                duration: self.player.duration(),
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test player that records actions and echoes each state change
    /// back through the controller with the triggering source, the way
    /// a host player wrapper does.
    struct MockPlayer {
        state: PlayerState,
        time: f64,
        duration: f64,
        /// (state, source) transitions pending delivery to the controller
        pending_events: Vec<PlayerEvent>,
    }

    impl MockPlayer {
        fn new() -> Self {
            Self {
                state: PlayerState::Unstarted,
                time: 0.0,
                duration: 240.0,
                pending_events: Vec::new(),
            }
        }
    }

    impl VideoPlayer for MockPlayer {
        fn play(&mut self, source: CommandSource) {
            self.state = PlayerState::Playing;
            self.pending_events.push(PlayerEvent {
                state: PlayerState::Playing,
                time: self.time,
                source,
            });
        }

        fn pause(&mut self, source: CommandSource) {
            self.state = PlayerState::Paused;
            self.pending_events.push(PlayerEvent {
                state: PlayerState::Paused,
                time: self.time,
                source,
            });
        }

        fn seek(&mut self, time: f64) {
            self.time = time;
        }

        fn current_time(&self) -> f64 {
            self.time
        }

        fn duration(&self) -> f64 {
            self.duration
        }

        fn state(&self) -> PlayerState {
            self.state
        }
    }

    fn controller() -> (
        PlaybackSyncController<MockPlayer>,
        mpsc::UnboundedReceiver<ControlMessage>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (PlaybackSyncController::new(MockPlayer::new(), tx), rx)
    }

    /// Deliver all pending player events to the controller, the way the
    /// host event loop would.
    fn pump_events(controller: &mut PlaybackSyncController<MockPlayer>) -> bool {
        let events: Vec<PlayerEvent> = controller.player_mut().pending_events.drain(..).collect();
        let mut prompt = false;
        for event in events {
            prompt |= controller.on_player_event(event);
        }
        prompt
    }

    #[test]
    fn test_local_play_broadcasts_with_time() {
        let (mut controller, mut rx) = controller();

        controller.player_mut().seek(12.5);
        controller.toggle_play_pause();
        pump_events(&mut controller);

        assert_eq!(rx.try_recv().unwrap(), ControlMessage::Play { time: 12.5 });
    }

    #[test]
    fn test_local_pause_broadcasts() {
        let (mut controller, mut rx) = controller();

        controller.toggle_play_pause();
        controller.player_mut().seek(30.0);
        controller.toggle_play_pause();
        pump_events(&mut controller);

        assert_eq!(rx.try_recv().unwrap(), ControlMessage::Play { time: 0.0 });
        assert_eq!(rx.try_recv().unwrap(), ControlMessage::Pause { time: 30.0 });
    }

    #[test]
    fn test_remote_play_is_applied_but_not_rebroadcast() {
        let (mut controller, mut rx) = controller();

        controller.apply_remote_play(12.5);
        pump_events(&mut controller);

        // Player followed the remote command
        assert_eq!(controller.player().state(), PlayerState::Playing);
        assert_eq!(controller.player().current_time(), 12.5);

        // No outbound PLAY was produced, even though local state changed
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_remote_pause_is_applied_but_not_rebroadcast() {
        let (mut controller, mut rx) = controller();

        controller.apply_remote_play(5.0);
        controller.apply_remote_pause(6.0);
        pump_events(&mut controller);

        assert_eq!(controller.player().state(), PlayerState::Paused);
        assert_eq!(controller.player().current_time(), 6.0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_local_gesture_after_remote_apply_still_broadcasts() {
        // Source tagging must not leak across actions: a local gesture
        // immediately after a remote apply is still broadcast
        let (mut controller, mut rx) = controller();

        controller.apply_remote_play(10.0);
        pump_events(&mut controller);
        assert!(rx.try_recv().is_err());

        controller.toggle_play_pause(); // local pause
        pump_events(&mut controller);
        assert_eq!(rx.try_recv().unwrap(), ControlMessage::Pause { time: 10.0 });
    }

    #[test]
    fn test_score_prompt_fires_once() {
        let (mut controller, _rx) = controller();

        let first = controller.on_player_event(PlayerEvent {
            state: PlayerState::Ended,
            time: 240.0,
            source: CommandSource::Local,
        });
        assert!(first);

        let second = controller.on_player_event(PlayerEvent {
            state: PlayerState::Ended,
            time: 240.0,
            source: CommandSource::Local,
        });
        assert!(!second, "score prompt must not repeat");
    }

    #[test]
    fn test_progress_only_while_playing() {
        let (mut controller, _rx) = controller();
        assert!(controller.poll_progress().is_none());

        controller.apply_remote_play(60.0);
        let progress = controller.poll_progress().unwrap();
        assert_eq!(progress.current_time, 60.0);
        assert!((progress.percent() - 25.0).abs() < 0.001);

        controller.apply_remote_pause(61.0);
        assert!(controller.poll_progress().is_none());
    }
}
