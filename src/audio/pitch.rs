//! # Pitch Detection
//!
//! Autocorrelation-based pitch detection with parabolic interpolation for
//! sub-sample precision, frequency-to-note mapping, and cents-based
//! accuracy scoring against a target pitch.
//!
//! ## Algorithm:
//! 1. **Energy gate**: windows below a fixed silence threshold return no
//!    pitch (avoids divide-by-near-zero noise on silence)
//! 2. **Autocorrelation scan**: normalized sum-of-products correlation for
//!    every candidate lag up to half the window length; the earliest
//!    strong peak wins so period multiples cannot pull the estimate an
//!    octave down
//! 3. **Parabolic refinement**: the best integer lag is refined using the
//!    correlation values at lag-1, lag, lag+1 for sub-sample precision
//! 4. **Band rejection**: frequencies outside the configured band are
//!    treated as undetected
//!
//! The full scan is O(window squared). For the fixed 2048-sample window at
//! ~21.5 windows/sec this is well within real-time budget, and correctness
//! is prioritized over asymptotic optimality.

use serde::{Deserialize, Serialize};

/// The 12-tone chromatic scale starting at C, indexed by MIDI number mod 12.
const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Minimum signal energy (sum of squares) below which a window is silence.
const SILENCE_ENERGY_THRESHOLD: f32 = 0.01;

/// Minimum RMS below which a window is silence.
const SILENCE_RMS_THRESHOLD: f32 = 0.01;

/// Tunable thresholds for the detector. No other state is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PitchParams {
    /// Lowest detectable frequency in Hz
    pub min_frequency: f32,
    /// Highest detectable frequency in Hz
    pub max_frequency: f32,
    /// Minimum normalized correlation for a lag to count as a detection
    pub correlation_floor: f32,
}

impl Default for PitchParams {
    fn default() -> Self {
        Self {
            min_frequency: 50.0,
            max_frequency: 1500.0,
            correlation_floor: 0.01,
        }
    }
}

/// A per-window pitch estimate. `frequency == 0.0` signals "no pitch
/// detected"; confidence is the best normalized correlation, clamped
/// to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchEstimate {
    pub frequency: f32,
    pub confidence: f32,
}

impl PitchEstimate {
    /// The "no pitch detected" estimate.
    pub fn none() -> Self {
        Self {
            frequency: 0.0,
            confidence: 0.0,
        }
    }

    pub fn is_detected(&self) -> bool {
        self.frequency > 0.0
    }
}

/// A detected frequency mapped onto the equal-temperament scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteLabel {
    /// Pitch class plus octave, e.g. "A4"
    pub name: String,
    /// Deviation from the note center in cents, within [-50, 50]
    pub cents: i32,
    /// Rounded MIDI note number
    pub midi: i32,
}

/// How close a detected pitch is to the target pitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccuracyStatus {
    /// Within 10 cents of the target
    Perfect,
    /// Within 25 cents of the target
    Good,
    /// More than 25 cents off
    Off,
}

/// Accuracy of a detected pitch against a target, in cents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchAccuracy {
    pub status: AccuracyStatus,
    pub cents: f32,
}

/// Estimate the fundamental frequency of a window via autocorrelation.
///
/// Returns [`PitchEstimate::none`] for silent windows, correlations below
/// the detection floor, and frequencies outside the configured band.
pub fn autocorrelate(window: &[f32], sample_rate: f32, params: &PitchParams) -> PitchEstimate {
    let size = window.len();
    if size < 4 {
        return PitchEstimate::none();
    }

    // Energy gate: skip the scan entirely on silence
    let sum_of_squares: f32 = window.iter().map(|&v| v * v).sum();
    if sum_of_squares < SILENCE_ENERGY_THRESHOLD {
        return PitchEstimate::none();
    }
    let rms = (sum_of_squares / size as f32).sqrt();
    if rms < SILENCE_RMS_THRESHOLD {
        return PitchEstimate::none();
    }

    // Normalized sum-of-products correlation for every candidate lag.
    // Lag 0 is always the trivial maximum, so the best-lag search starts
    // at 1; the full curve is kept for the refinement step below.
    let half = size / 2;
    let mut correlations = vec![0.0f32; half];
    let mut best_offset = 0usize;
    let mut best_correlation = 0.0f32;

    for offset in 0..half {
        let mut correlation = 0.0f32;
        for i in 0..half {
            correlation += window[i] * window[i + offset];
        }
        correlation /= half as f32;
        correlations[offset] = correlation;

        if offset > 0 && correlation > best_correlation {
            best_correlation = correlation;
            best_offset = offset;
        }
    }

    if best_correlation <= params.correlation_floor || best_offset == 0 {
        return PitchEstimate::none();
    }

    // The correlation repeats at every multiple of the period, and integer
    // lag sampling can leave a later repeat fractionally higher than the
    // first, which would halve the reported frequency. Prefer the earliest
    // local maximum within 10% of the global one.
    let mut best_offset = best_offset;
    for offset in 1..half - 1 {
        let c = correlations[offset];
        if c >= correlations[offset - 1]
            && c >= correlations[offset + 1]
            && c >= 0.9 * best_correlation
        {
            best_offset = offset;
            break;
        }
    }
    let best_correlation = correlations[best_offset];

    // Parabolic interpolation over the correlation samples at lag-1, lag,
    // lag+1 gives sub-sample lag precision
    let mut refined_lag = best_offset as f32;
    if best_offset + 1 < half {
        let c0 = correlations[best_offset - 1];
        let c1 = correlations[best_offset];
        let c2 = correlations[best_offset + 1];
        let denom = c0 - 2.0 * c1 + c2;
        if denom.abs() > f32::EPSILON {
            let adjustment = 0.5 * (c0 - c2) / denom;
            if adjustment.is_finite() && adjustment.abs() < 1.0 {
                refined_lag += adjustment;
            }
        }
    }

    let frequency = sample_rate / refined_lag;
    if frequency < params.min_frequency || frequency > params.max_frequency {
        return PitchEstimate::none();
    }

    PitchEstimate {
        frequency,
        confidence: best_correlation.clamp(0.0, 1.0),
    }
}

/// Map a frequency onto the nearest equal-temperament note.
///
/// MIDI number = 12 * log2(freq / 440) + 69, rounded. Cents is the
/// deviation of the unrounded value from the rounded one, times 100.
/// Returns `None` for non-positive frequencies.
pub fn frequency_to_note(frequency: f32) -> Option<NoteLabel> {
    if frequency <= 0.0 {
        return None;
    }

    let midi_unrounded = 12.0 * (frequency / 440.0).log2() + 69.0;
    let midi = midi_unrounded.round();
    let cents = ((midi_unrounded - midi) * 100.0).round() as i32;

    let midi = midi as i32;
    let octave = (midi as f32 / 12.0).floor() as i32 - 1;
    let name = NOTE_NAMES[midi.rem_euclid(12) as usize];

    Some(NoteLabel {
        name: format!("{}{}", name, octave),
        cents,
        midi,
    })
}

/// Score a detected pitch against a target pitch in cents.
///
/// cents = 1200 * log2(detected / target). Within 10 cents is perfect,
/// within 25 good, otherwise off. Returns `None` if either input is
/// non-positive.
pub fn pitch_accuracy(detected: f32, target: f32) -> Option<PitchAccuracy> {
    if detected <= 0.0 || target <= 0.0 {
        return None;
    }

    let cents = 1200.0 * (detected / target).log2();
    let status = if cents.abs() <= 10.0 {
        AccuracyStatus::Perfect
    } else if cents.abs() <= 25.0 {
        AccuracyStatus::Good
    } else {
        AccuracyStatus::Off
    };

    Some(PitchAccuracy { status, cents })
}

/// Exponential smoothing of successive frequency estimates.
///
/// Trades responsiveness for stability against transient noise. The
/// capture processor applies this only when both values are nonzero.
pub fn smooth(previous: f32, current: f32, alpha: f32) -> f32 {
    previous * alpha + current * (1.0 - alpha)
}
