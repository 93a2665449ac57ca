//! # Mic Time Tracking
//!
//! Measures cumulative open-microphone duration across mute/deafen
//! toggles and disconnects. The total feeds the live display and the
//! end-of-session score submission.
//!
//! Invariant: at any instant, the effective total equals the folded
//! seconds plus the currently running interval (if the mic is open).

use std::time::Instant;

/// Accumulates open-mic time. `active_since` is set iff the mic is
/// currently open and unmuted.
#[derive(Debug, Default)]
pub struct MicTimeTracker {
    total_seconds: u64,
    active_since: Option<Instant>,
}

impl MicTimeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin tracking. No-op if already active.
    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    /// Stop tracking, folding the running interval into the total.
    pub fn stop(&mut self) {
        self.stop_at(Instant::now());
    }

    /// Current effective total in seconds. Side-effect free: callable
    /// at any time for the live display or the final score submission.
    pub fn current_total(&self) -> u64 {
        self.total_at(Instant::now())
    }

    pub fn is_active(&self) -> bool {
        self.active_since.is_some()
    }

    // Instant-injected variants, used directly by tests and by hosts
    // with their own clock.

    pub fn start_at(&mut self, now: Instant) {
        if self.active_since.is_none() {
            self.active_since = Some(now);
        }
    }

    pub fn stop_at(&mut self, now: Instant) {
        if let Some(since) = self.active_since.take() {
            self.total_seconds += now.saturating_duration_since(since).as_secs();
        }
    }

    pub fn total_at(&self, now: Instant) -> u64 {
        let running = self
            .active_since
            .map(|since| now.saturating_duration_since(since).as_secs())
            .unwrap_or(0);
        self.total_seconds + running
    }
}

/// Format a mic-time total for display: "1h 2m 3s", "2m 3s" or "3s".
pub fn format_mic_time(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_start_stop_accumulates() {
        let t0 = Instant::now();
        let mut tracker = MicTimeTracker::new();

        tracker.start_at(t0);
        assert!(tracker.is_active());

        tracker.stop_at(t0 + Duration::from_secs(30));
        assert!(!tracker.is_active());
        assert_eq!(tracker.total_at(t0 + Duration::from_secs(30)), 30);

        // Restart and query mid-interval without stopping
        tracker.start_at(t0 + Duration::from_secs(40));
        assert_eq!(tracker.total_at(t0 + Duration::from_secs(50)), 40);
    }

    #[test]
    fn test_total_is_side_effect_free() {
        let t0 = Instant::now();
        let mut tracker = MicTimeTracker::new();
        tracker.start_at(t0);

        let at = t0 + Duration::from_secs(10);
        assert_eq!(tracker.total_at(at), 10);
        assert_eq!(tracker.total_at(at), 10);
        assert!(tracker.is_active());
    }

    #[test]
    fn test_double_start_keeps_original_interval() {
        let t0 = Instant::now();
        let mut tracker = MicTimeTracker::new();

        tracker.start_at(t0);
        // A second start while active must not reset the interval
        tracker.start_at(t0 + Duration::from_secs(5));
        assert_eq!(tracker.total_at(t0 + Duration::from_secs(10)), 10);
    }

    #[test]
    fn test_stop_when_inactive_is_noop() {
        let t0 = Instant::now();
        let mut tracker = MicTimeTracker::new();
        tracker.stop_at(t0);
        assert_eq!(tracker.total_at(t0), 0);
    }

    #[test]
    fn test_mute_cycle_folds_elapsed_time() {
        let t0 = Instant::now();
        let mut tracker = MicTimeTracker::new();

        // Open mic, mute after 20s, unmute at 35s, disconnect at 50s
        tracker.start_at(t0);
        tracker.stop_at(t0 + Duration::from_secs(20));
        tracker.start_at(t0 + Duration::from_secs(35));
        tracker.stop_at(t0 + Duration::from_secs(50));

        assert_eq!(tracker.total_at(t0 + Duration::from_secs(50)), 35);
    }

    #[test]
    fn test_format_mic_time() {
        assert_eq!(format_mic_time(45), "45s");
        assert_eq!(format_mic_time(125), "2m 5s");
        assert_eq!(format_mic_time(3723), "1h 2m 3s");
        assert_eq!(format_mic_time(0), "0s");
    }
}
