//! # Configuration Management
//!
//! This module handles loading and managing application configuration from
//! multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_SERVER_PORT, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! The audio section carries the constants every pipeline component shares:
//! sample rate, window and chunk sizes, silence thresholds, and the pitch
//! detector's frequency band. The session section holds the relay's capacity
//! and the client-side timing knobs.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub session: SessionConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: IP address or hostname to bind the relay to (e.g., "127.0.0.1", "0.0.0.0")
/// - `port`: TCP port number to listen on (1-65535)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Audio pipeline configuration.
///
/// ## Fields:
/// - `sample_rate`: Capture sample rate in Hz (44100 by default)
/// - `window_size`: Samples per analysis window (2048 ≈ 46ms at 44.1kHz)
/// - `fallback_chunk_size`: Samples per passthrough chunk when windowed
///   analysis is unavailable
/// - `spectrum_bands`: Number of coarse spectrum bands per analysis frame
/// - `silence_rms_threshold`: RMS below which a window is treated as silent
/// - `pitch`: Pitch detector tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: f32,
    pub window_size: usize,
    pub fallback_chunk_size: usize,
    pub spectrum_bands: usize,
    pub silence_rms_threshold: f32,
    pub pitch: PitchConfig,
}

/// Pitch detector tuning.
///
/// ## Fields:
/// - `min_frequency` / `max_frequency`: Accepted band in Hz; estimates
///   outside it are rejected as detection artifacts
/// - `smoothing_factor`: Weight of the previous frame in exponential
///   smoothing (0.8 means 80% previous, 20% current)
/// - `correlation_floor`: Minimum normalized correlation for a candidate
///   lag to count as periodic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PitchConfig {
    pub min_frequency: f32,
    pub max_frequency: f32,
    pub smoothing_factor: f32,
    pub correlation_floor: f32,
}

/// Session and relay configuration.
///
/// ## Fields:
/// - `max_participants`: Hard capacity per session (2 for a duet)
/// - `progress_poll_interval_ms`: How often the client samples playback
///   progress while playing
/// - `mic_time_refresh_ms`: How often the mic-time display refreshes
/// - `echo_suppression_ms`: Legacy suppression window, kept as a tuning
///   knob for clients that cannot tag command provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub max_participants: usize,
    pub progress_poll_interval_ms: u64,
    pub mic_time_refresh_ms: u64,
    pub echo_suppression_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            audio: AudioConfig {
                sample_rate: 44100.0,
                window_size: 2048,
                fallback_chunk_size: 4096,
                spectrum_bands: 64,
                silence_rms_threshold: 0.01,
                pitch: PitchConfig {
                    min_frequency: 50.0,
                    max_frequency: 1500.0,
                    smoothing_factor: 0.8,
                    correlation_floor: 0.01,
                },
            },
            session: SessionConfig {
                max_participants: 2,
                progress_poll_interval_ms: 1000,
                mic_time_refresh_ms: 1000,
                echo_suppression_ms: 150,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST and PORT environment variables
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER_HOST=0.0.0.0`: Override server host
    /// - `APP_SESSION_MAX_PARTICIPANTS=2`: Override session capacity
    /// - `HOST=0.0.0.0` / `PORT=3000`: Special cases for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment platforms commonly set HOST/PORT without the APP_ prefix
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - Window and chunk sizes are non-zero
    /// - The pitch band is well-formed (min < max, both positive)
    /// - Smoothing factor lies in [0, 1)
    /// - Session capacity allows at least one participant
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.audio.window_size == 0 || self.audio.window_size % 2 != 0 {
            return Err(anyhow::anyhow!("Analysis window size must be a positive even number"));
        }

        if self.audio.fallback_chunk_size == 0 {
            return Err(anyhow::anyhow!("Fallback chunk size must be greater than 0"));
        }

        if self.audio.spectrum_bands == 0 || self.audio.window_size % self.audio.spectrum_bands != 0
        {
            return Err(anyhow::anyhow!(
                "Spectrum bands must evenly divide the window size"
            ));
        }

        if self.audio.pitch.min_frequency <= 0.0
            || self.audio.pitch.min_frequency >= self.audio.pitch.max_frequency
        {
            return Err(anyhow::anyhow!(
                "Pitch band must satisfy 0 < min_frequency < max_frequency"
            ));
        }

        if !(0.0..1.0).contains(&self.audio.pitch.smoothing_factor) {
            return Err(anyhow::anyhow!("Smoothing factor must be in [0, 1)"));
        }

        if self.session.max_participants < 2 {
            return Err(anyhow::anyhow!("A duet session needs at least 2 participants"));
        }

        Ok(())
    }

    /// Update configuration from a JSON string (used for runtime config updates).
    ///
    /// ## Partial updates:
    /// Only the fields present in the JSON are changed. For example,
    /// `{"session": {"max_participants": 2}}` touches nothing else.
    /// The updated configuration is re-validated before it is accepted.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial_config.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = port as u16;
            }
        }

        if let Some(audio) = partial_config.get("audio") {
            if let Some(rate) = audio.get("sample_rate").and_then(|v| v.as_f64()) {
                self.audio.sample_rate = rate as f32;
            }
            if let Some(window) = audio.get("window_size").and_then(|v| v.as_u64()) {
                self.audio.window_size = window as usize;
            }
            if let Some(chunk) = audio.get("fallback_chunk_size").and_then(|v| v.as_u64()) {
                self.audio.fallback_chunk_size = chunk as usize;
            }
            if let Some(bands) = audio.get("spectrum_bands").and_then(|v| v.as_u64()) {
                self.audio.spectrum_bands = bands as usize;
            }
            if let Some(threshold) = audio.get("silence_rms_threshold").and_then(|v| v.as_f64()) {
                self.audio.silence_rms_threshold = threshold as f32;
            }
            if let Some(pitch) = audio.get("pitch") {
                if let Some(min) = pitch.get("min_frequency").and_then(|v| v.as_f64()) {
                    self.audio.pitch.min_frequency = min as f32;
                }
                if let Some(max) = pitch.get("max_frequency").and_then(|v| v.as_f64()) {
                    self.audio.pitch.max_frequency = max as f32;
                }
                if let Some(alpha) = pitch.get("smoothing_factor").and_then(|v| v.as_f64()) {
                    self.audio.pitch.smoothing_factor = alpha as f32;
                }
                if let Some(floor) = pitch.get("correlation_floor").and_then(|v| v.as_f64()) {
                    self.audio.pitch.correlation_floor = floor as f32;
                }
            }
        }

        if let Some(session) = partial_config.get("session") {
            if let Some(max) = session.get("max_participants").and_then(|v| v.as_u64()) {
                self.session.max_participants = max as usize;
            }
            if let Some(poll) = session
                .get("progress_poll_interval_ms")
                .and_then(|v| v.as_u64())
            {
                self.session.progress_poll_interval_ms = poll;
            }
            if let Some(refresh) = session.get("mic_time_refresh_ms").and_then(|v| v.as_u64()) {
                self.session.mic_time_refresh_ms = refresh;
            }
            if let Some(echo) = session.get("echo_suppression_ms").and_then(|v| v.as_u64()) {
                self.session.echo_suppression_ms = echo;
            }
        }

        self.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.audio.window_size, 2048);
        assert_eq!(config.session.max_participants, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.pitch.min_frequency = 2000.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.pitch.smoothing_factor = 1.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.spectrum_bands = 60;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.session.max_participants = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_update() {
        let mut config = AppConfig::default();
        let json = r#"{"server": {"port": 9090}, "audio": {"pitch": {"max_frequency": 1200}}}"#;
        assert!(config.update_from_json(json).is_ok());
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.audio.pitch.max_frequency, 1200.0);
        // Untouched fields keep their values
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.audio.window_size, 2048);
    }

    #[test]
    fn test_config_update_rejects_invalid() {
        let mut config = AppConfig::default();
        let json = r#"{"session": {"max_participants": 0}}"#;
        assert!(config.update_from_json(json).is_err());
    }
}
