//! # Capture Processing
//!
//! Runs on the real-time audio path. Incoming microphone callbacks are
//! accumulated into a fixed-size analysis window; each full window is
//! analyzed (RMS volume, pitch, spectrum, optional accuracy against a
//! target pitch), re-encoded to PCM16, and emitted as exactly one
//! [`AnalysisFrame`].
//!
//! ## Capture Strategies:
//! The preferred windowed-analysis path requires the host to deliver
//! float samples into a processing callback. Environments without that
//! primitive use the passthrough strategy instead, which forwards raw
//! PCM16 in fixed chunks and performs no analysis — a deliberate
//! degraded mode where audio relay continuity takes priority.
//!
//! ## Threading:
//! The processor is owned by a dedicated capture task and communicates
//! with the session side only by posting immutable [`AnalysisFrame`]
//! messages over a one-way channel. Configuration updates arrive
//! asynchronously and take effect on the next window.

use crate::audio::codec;
use crate::audio::pitch::{self, NoteLabel, PitchAccuracy, PitchEstimate, PitchParams};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Analysis window capacity in samples.
pub const WINDOW_SIZE: usize = 2048;

/// Chunk size for the passthrough fallback path, in samples.
pub const FALLBACK_CHUNK_SIZE: usize = 4096;

/// Number of spectrum buckets per frame.
pub const SPECTRUM_BANDS: usize = 64;

/// RMS amplitude below which a window is treated as silence.
pub const AUDIBILITY_THRESHOLD: f32 = 0.01;

/// Configuration for a capture processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Sample rate of the capture device in Hz
    pub sample_rate: f32,
    /// Analysis window capacity in samples
    pub window_size: usize,
    /// Chunk size for the passthrough fallback, in samples
    pub fallback_chunk_size: usize,
    /// Exponential smoothing factor for successive pitch estimates (0-1)
    pub smoothing_factor: f32,
    /// Pitch detector thresholds
    pub pitch: PitchParams,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            window_size: WINDOW_SIZE,
            fallback_chunk_size: FALLBACK_CHUNK_SIZE,
            smoothing_factor: 0.8,
            pitch: PitchParams::default(),
        }
    }
}

/// A detected pitch with its note mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchReading {
    pub estimate: PitchEstimate,
    pub note: Option<NoteLabel>,
}

/// One analysis + audio message, produced per filled window.
///
/// Transient: sent to the session side immediately and discarded. The
/// passthrough strategy leaves all analysis fields empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisFrame {
    /// Raw PCM16 little-endian audio for the wire
    #[serde(skip)]
    pub audio: Vec<u8>,
    /// RMS volume of the window
    pub volume: f32,
    /// Detected pitch, if any
    pub pitch: Option<PitchReading>,
    /// 64-band spectrum summary for visualization (zeroed on silence)
    pub spectrum: Vec<f32>,
    /// Accuracy against the target pitch, when one is set
    pub accuracy: Option<PitchAccuracy>,
}

/// Asynchronous configuration update applied between windows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureUpdate {
    /// Target pitch for accuracy scoring; `Some(0.0)` clears it
    pub target_pitch: Option<f32>,
    pub smoothing_factor: Option<f32>,
    pub min_frequency: Option<f32>,
    pub max_frequency: Option<f32>,
}

/// A capture-path processing strategy.
///
/// Selected once at setup time by probing whether the windowed-analysis
/// primitive is available on the host; see [`select_strategy`].
pub trait CaptureStrategy: Send {
    /// Feed one callback's worth of input samples. Returns the frames
    /// completed by this callback (usually zero or one).
    fn process(&mut self, input: &[f32]) -> Vec<AnalysisFrame>;

    /// Apply an asynchronous configuration update. Takes effect on the
    /// next window.
    fn apply(&mut self, update: &CaptureUpdate);
}

/// The preferred strategy: windowed analysis with pitch, volume and
/// spectrum extraction.
pub struct WindowedAnalysis {
    config: CaptureConfig,
    window: Vec<f32>,
    target_pitch: Option<f32>,
    /// Last nonzero frequency, for exponential smoothing
    last_pitch: f32,
}

impl WindowedAnalysis {
    pub fn new(config: CaptureConfig) -> Self {
        let capacity = config.window_size;
        Self {
            config,
            window: Vec::with_capacity(capacity),
            target_pitch: None,
            last_pitch: 0.0,
        }
    }

    /// Analyze one full window and build its frame.
    fn emit_window(&mut self) -> AnalysisFrame {
        let audio = codec::encode(&self.window);
        let volume = rms(&self.window);

        let mut frame = AnalysisFrame {
            audio,
            volume,
            pitch: None,
            spectrum: vec![0.0; SPECTRUM_BANDS],
            accuracy: None,
        };

        // Silence gate: skip pitch and spectrum work entirely
        if volume > AUDIBILITY_THRESHOLD {
            let raw = pitch::autocorrelate(&self.window, self.config.sample_rate, &self.config.pitch);

            let mut estimate = raw;
            if self.last_pitch > 0.0 && raw.is_detected() {
                estimate.frequency =
                    pitch::smooth(self.last_pitch, raw.frequency, self.config.smoothing_factor);
            }

            if estimate.is_detected() {
                self.last_pitch = estimate.frequency;

                frame.pitch = Some(PitchReading {
                    estimate,
                    note: pitch::frequency_to_note(estimate.frequency),
                });

                if let Some(target) = self.target_pitch {
                    frame.accuracy = pitch::pitch_accuracy(estimate.frequency, target);
                }
            }

            frame.spectrum = spectrum(&self.window, SPECTRUM_BANDS);
        }

        // Reset for the next window
        self.window.clear();
        frame
    }
}

impl CaptureStrategy for WindowedAnalysis {
    fn process(&mut self, input: &[f32]) -> Vec<AnalysisFrame> {
        let mut frames = Vec::new();
        let capacity = self.config.window_size;

        // Append up to capacity; samples past the boundary in this
        // callback are dropped. Window boundaries are not phase-locked
        // to callback boundaries.
        for &sample in input {
            if self.window.len() >= capacity {
                break;
            }
            self.window.push(sample);
        }

        if self.window.len() >= capacity {
            frames.push(self.emit_window());
        }

        frames
    }

    fn apply(&mut self, update: &CaptureUpdate) {
        if let Some(target) = update.target_pitch {
            self.target_pitch = if target > 0.0 { Some(target) } else { None };
        }
        if let Some(alpha) = update.smoothing_factor {
            self.config.smoothing_factor = alpha;
        }
        if let Some(min) = update.min_frequency {
            self.config.pitch.min_frequency = min;
        }
        if let Some(max) = update.max_frequency {
            self.config.pitch.max_frequency = max;
        }
    }
}

/// Fallback strategy for hosts without the windowed-analysis primitive:
/// raw PCM16 relay in fixed chunks, no analysis fields.
pub struct PassthroughChunked {
    chunk_size: usize,
    pending: Vec<f32>,
}

impl PassthroughChunked {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            chunk_size: config.fallback_chunk_size,
            pending: Vec::with_capacity(config.fallback_chunk_size),
        }
    }
}

impl CaptureStrategy for PassthroughChunked {
    fn process(&mut self, input: &[f32]) -> Vec<AnalysisFrame> {
        let mut frames = Vec::new();
        self.pending.extend_from_slice(input);

        while self.pending.len() >= self.chunk_size {
            let chunk: Vec<f32> = self.pending.drain(..self.chunk_size).collect();
            frames.push(AnalysisFrame {
                audio: codec::encode(&chunk),
                volume: 0.0,
                pitch: None,
                spectrum: Vec::new(),
                accuracy: None,
            });
        }

        frames
    }

    fn apply(&mut self, _update: &CaptureUpdate) {
        // No analysis configuration exists in the passthrough path
    }
}

/// Pick the capture strategy for this host.
///
/// When the windowed-analysis primitive is available the full analysis
/// path runs; otherwise audio relay continuity takes priority and the
/// passthrough strategy is used.
pub fn select_strategy(config: &CaptureConfig, windowed_available: bool) -> Box<dyn CaptureStrategy> {
    if windowed_available {
        Box::new(WindowedAnalysis::new(config.clone()))
    } else {
        warn!("windowed capture primitive unavailable, falling back to chunked passthrough");
        Box::new(PassthroughChunked::new(config))
    }
}

/// RMS amplitude of a sample window.
pub fn rms(window: &[f32]) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    let sum: f32 = window.iter().map(|&v| v * v).sum();
    (sum / window.len() as f32).sqrt()
}

/// Partition the window into `bands` equal contiguous buckets and score
/// each as (mean absolute amplitude)^1.5. The exponent biases the
/// visualization toward emphasizing louder bands.
pub fn spectrum(window: &[f32], bands: usize) -> Vec<f32> {
    let bucket_size = window.len() / bands;
    if bucket_size == 0 {
        return vec![0.0; bands];
    }

    (0..bands)
        .map(|band| {
            let start = band * bucket_size;
            let sum: f32 = window[start..start + bucket_size].iter().map(|v| v.abs()).sum();
            (sum / bucket_size as f32).powf(1.5)
        })
        .collect()
}

/// Drives a capture strategy on its own task, forwarding completed
/// frames to the session side and draining configuration updates
/// between callbacks.
pub struct CaptureProcessor {
    strategy: Box<dyn CaptureStrategy>,
    frames_tx: mpsc::UnboundedSender<AnalysisFrame>,
    updates_rx: mpsc::UnboundedReceiver<CaptureUpdate>,
}

/// Handle for posting configuration updates to a running processor.
#[derive(Clone)]
pub struct CaptureHandle {
    updates_tx: mpsc::UnboundedSender<CaptureUpdate>,
}

impl CaptureHandle {
    pub fn configure(&self, update: CaptureUpdate) {
        if self.updates_tx.send(update).is_err() {
            debug!("capture processor gone, dropping configuration update");
        }
    }
}

impl CaptureProcessor {
    /// Build a processor plus its control handle and frame receiver.
    pub fn new(
        config: &CaptureConfig,
        windowed_available: bool,
    ) -> (Self, CaptureHandle, mpsc::UnboundedReceiver<AnalysisFrame>) {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();

        let processor = Self {
            strategy: select_strategy(config, windowed_available),
            frames_tx,
            updates_rx,
        };

        (processor, CaptureHandle { updates_tx }, frames_rx)
    }

    /// Feed one audio callback of input. Pending configuration updates
    /// are applied first, then completed frames are posted to the
    /// session side.
    pub fn push_samples(&mut self, input: &[f32]) {
        while let Ok(update) = self.updates_rx.try_recv() {
            self.strategy.apply(&update);
        }

        for frame in self.strategy.process(input) {
            if self.frames_tx.send(frame).is_err() {
                debug!("session side closed, dropping analysis frame");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frequency: f32, sample_rate: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn test_one_frame_per_full_window() {
        let mut strategy = WindowedAnalysis::new(CaptureConfig::default());
        let input = sine(440.0, 44100.0, 512);

        // Three callbacks fill 1536 of 2048 samples: no frame yet
        for _ in 0..3 {
            assert!(strategy.process(&input).is_empty());
        }

        // Fourth callback completes the window: exactly one frame
        let frames = strategy.process(&input);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].audio.len(), WINDOW_SIZE * 2);

        // Window was reset
        assert!(strategy.process(&input).is_empty());
    }

    #[test]
    fn test_callback_excess_is_dropped_at_window_boundary() {
        let mut strategy = WindowedAnalysis::new(CaptureConfig::default());

        // One oversized callback: the window fills, the excess is dropped
        let input = sine(440.0, 44100.0, WINDOW_SIZE + 1000);
        let frames = strategy.process(&input);
        assert_eq!(frames.len(), 1);

        // The dropped 1000 samples are not carried over
        assert!(strategy.process(&sine(440.0, 44100.0, 1000)).is_empty());
    }

    #[test]
    fn test_full_window_carries_pitch_and_spectrum() {
        let mut strategy = WindowedAnalysis::new(CaptureConfig::default());
        let frames = strategy.process(&sine(440.0, 44100.0, WINDOW_SIZE));
        let frame = &frames[0];

        let reading = frame.pitch.as_ref().expect("pitch detected");
        assert!((reading.estimate.frequency - 440.0).abs() / 440.0 < 0.01);
        assert_eq!(reading.note.as_ref().unwrap().name, "A4");

        assert_eq!(frame.spectrum.len(), SPECTRUM_BANDS);
        assert!(frame.spectrum.iter().any(|&band| band > 0.0));
        assert!(frame.volume > AUDIBILITY_THRESHOLD);
        assert!(frame.accuracy.is_none());
    }

    #[test]
    fn test_silent_window_emits_default_frame() {
        let mut strategy = WindowedAnalysis::new(CaptureConfig::default());
        let frames = strategy.process(&vec![0.0f32; WINDOW_SIZE]);
        let frame = &frames[0];

        assert!(frame.pitch.is_none());
        assert!(frame.accuracy.is_none());
        assert_eq!(frame.spectrum, vec![0.0; SPECTRUM_BANDS]);
        assert_eq!(frame.volume, 0.0);
        // Audio is still encoded and relayed even on silence
        assert_eq!(frame.audio.len(), WINDOW_SIZE * 2);
    }

    #[test]
    fn test_target_pitch_enables_accuracy() {
        let mut strategy = WindowedAnalysis::new(CaptureConfig::default());
        strategy.apply(&CaptureUpdate {
            target_pitch: Some(440.0),
            ..CaptureUpdate::default()
        });

        let frames = strategy.process(&sine(440.0, 44100.0, WINDOW_SIZE));
        let accuracy = frames[0].accuracy.expect("accuracy scored");
        assert_eq!(accuracy.status, crate::audio::pitch::AccuracyStatus::Perfect);

        // Clearing the target stops scoring
        strategy.apply(&CaptureUpdate {
            target_pitch: Some(0.0),
            ..CaptureUpdate::default()
        });
        let frames = strategy.process(&sine(440.0, 44100.0, WINDOW_SIZE));
        assert!(frames[0].accuracy.is_none());
    }

    #[test]
    fn test_smoothing_pulls_toward_previous_estimate() {
        let mut strategy = WindowedAnalysis::new(CaptureConfig::default());

        let first = strategy.process(&sine(440.0, 44100.0, WINDOW_SIZE));
        let first_freq = first[0].pitch.as_ref().unwrap().estimate.frequency;

        let second = strategy.process(&sine(880.0, 44100.0, WINDOW_SIZE));
        let second_freq = second[0].pitch.as_ref().unwrap().estimate.frequency;

        // With alpha = 0.8 the new estimate stays close to the previous one
        assert!(second_freq > first_freq);
        assert!(second_freq < 600.0, "smoothed estimate jumped: {}", second_freq);
    }

    #[test]
    fn test_passthrough_emits_fixed_chunks_without_analysis() {
        let config = CaptureConfig::default();
        let mut strategy = PassthroughChunked::new(&config);

        assert!(strategy.process(&vec![0.25f32; 1000]).is_empty());

        let frames = strategy.process(&vec![0.25f32; FALLBACK_CHUNK_SIZE]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].audio.len(), FALLBACK_CHUNK_SIZE * 2);
        assert!(frames[0].pitch.is_none());
        assert!(frames[0].spectrum.is_empty());
    }

    #[test]
    fn test_strategy_selection() {
        let config = CaptureConfig::default();
        // Probing decides the path; the passthrough branch intentionally
        // omits analysis fields
        let mut fallback = select_strategy(&config, false);
        let frames = fallback.process(&vec![0.5f32; FALLBACK_CHUNK_SIZE]);
        assert!(frames[0].pitch.is_none());

        let mut preferred = select_strategy(&config, true);
        let frames = preferred.process(&sine(440.0, 44100.0, WINDOW_SIZE));
        assert!(frames[0].pitch.is_some());
    }

    #[test]
    fn test_processor_forwards_frames_and_updates() {
        let (mut processor, handle, mut frames_rx) =
            CaptureProcessor::new(&CaptureConfig::default(), true);

        handle.configure(CaptureUpdate {
            target_pitch: Some(440.0),
            ..CaptureUpdate::default()
        });

        processor.push_samples(&sine(440.0, 44100.0, WINDOW_SIZE));

        let frame = frames_rx.try_recv().expect("frame forwarded");
        assert!(frame.accuracy.is_some());
    }

    #[test]
    fn test_spectrum_bands() {
        let window = sine(440.0, 44100.0, WINDOW_SIZE);
        let bands = spectrum(&window, SPECTRUM_BANDS);
        assert_eq!(bands.len(), SPECTRUM_BANDS);
        assert!(bands.iter().all(|&b| b >= 0.0));
    }
}
