//! # Audio Pipeline Module
//!
//! Real-time microphone analysis and the wire codec for streaming voice
//! between duet participants.
//!
//! ## Key Components:
//! - **Pitch Detector**: Autocorrelation-based fundamental frequency
//!   estimation with note naming and accuracy grading
//! - **Audio Codec**: Float sample <-> 16-bit PCM conversion for the
//!   binary wire format
//! - **Capture Processor**: Window accumulation, per-window analysis, and
//!   the chunked passthrough fallback
//!
//! ## Audio Format Requirements:
//! - **Sample Rate**: 44.1kHz (44,100 Hz) by default
//! - **Bit Depth**: 16-bit PCM on the wire
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: Little-endian signed integers

pub mod capture; // Windowed analysis and the passthrough fallback
pub mod codec; // PCM16 wire format
pub mod pitch; // Autocorrelation pitch detection
