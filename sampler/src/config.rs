use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::adsr::EnvelopeParameters;
use crate::error::ConfigError;

const DEFAULT_VOICES: usize = 8;
const DEFAULT_DISPLAY_WIDTH: usize = 400;
const DEFAULT_ROOT_NOTE: u8 = 60;
const DEFAULT_MAX_SAMPLE_SECONDS: f64 = 60.0;
const DEFAULT_SAMPLE_RATE: u32 = 44_100;
const DEFAULT_OUTPUT_CHANNELS: u16 = 2;
const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Initial ADSR values. Unset fields fall back to the default envelope.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct EnvelopeConfig {
    attack: Option<f32>,
    decay: Option<f32>,
    sustain: Option<f32>,
    release: Option<f32>,
}

/// A YAML representation of the engine configuration.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Fixed number of voices (default: 8).
    voices: Option<usize>,

    /// Columns in the waveform summary (default: 400).
    display_width: Option<usize>,

    /// Root note given to decoded recordings (default: 60).
    root_note: Option<u8>,

    /// Recordings longer than this are truncated (default: 60 seconds).
    max_sample_seconds: Option<f64>,

    /// Output sample rate used until the host prepares the engine (default: 44100).
    sample_rate: Option<u32>,

    /// Interleaved output channels (default: 2).
    output_channels: Option<u16>,

    /// Capacity of the control to render message queue (default: 1024).
    queue_capacity: Option<usize>,

    /// Initial envelope.
    envelope: Option<EnvelopeConfig>,
}

impl EngineConfig {
    /// Reads and validates a YAML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&contents)?;
        info!(path = ?path, "Loaded engine config");
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.voices() == 0 {
            return Err(ConfigError::Invalid("voices must be at least 1".into()));
        }
        if self.display_width() == 0 {
            return Err(ConfigError::Invalid(
                "display_width must be at least 1".into(),
            ));
        }
        if self.root_note() > 127 {
            return Err(ConfigError::Invalid(format!(
                "root_note {} is outside the MIDI range",
                self.root_note()
            )));
        }
        let max_secs = self.max_sample_seconds();
        if !max_secs.is_finite() || max_secs <= 0.0 {
            return Err(ConfigError::Invalid(
                "max_sample_seconds must be positive".into(),
            ));
        }
        if self.sample_rate() == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".into()));
        }
        if self.output_channels() == 0 {
            return Err(ConfigError::Invalid(
                "output_channels must be at least 1".into(),
            ));
        }
        if self.queue_capacity() == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity must be at least 1".into(),
            ));
        }
        if let Some(env) = &self.envelope {
            for (name, value) in [
                ("attack", env.attack),
                ("decay", env.decay),
                ("release", env.release),
            ] {
                if value.is_some_and(|v| !v.is_finite() || v < 0.0) {
                    return Err(ConfigError::Invalid(format!(
                        "envelope {} must be a non-negative number of seconds",
                        name
                    )));
                }
            }
            if env.sustain.is_some_and(|s| !(0.0..=1.0).contains(&s)) {
                return Err(ConfigError::Invalid(
                    "envelope sustain must be between 0 and 1".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn voices(&self) -> usize {
        self.voices.unwrap_or(DEFAULT_VOICES)
    }

    pub fn display_width(&self) -> usize {
        self.display_width.unwrap_or(DEFAULT_DISPLAY_WIDTH)
    }

    pub fn root_note(&self) -> u8 {
        self.root_note.unwrap_or(DEFAULT_ROOT_NOTE)
    }

    pub fn max_sample_seconds(&self) -> f64 {
        self.max_sample_seconds.unwrap_or(DEFAULT_MAX_SAMPLE_SECONDS)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    pub fn output_channels(&self) -> u16 {
        self.output_channels.unwrap_or(DEFAULT_OUTPUT_CHANNELS)
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn envelope(&self) -> EnvelopeParameters {
        let defaults = EnvelopeParameters::default();
        match &self.envelope {
            Some(env) => EnvelopeParameters::new(
                env.attack.unwrap_or(defaults.attack),
                env.decay.unwrap_or(defaults.decay),
                env.sustain.unwrap_or(defaults.sustain),
                env.release.unwrap_or(defaults.release),
            ),
            None => defaults,
        }
    }

    pub fn with_voices(mut self, voices: usize) -> Self {
        self.voices = Some(voices);
        self
    }

    pub fn with_display_width(mut self, width: usize) -> Self {
        self.display_width = Some(width);
        self
    }

    pub fn with_output_channels(mut self, channels: u16) -> Self {
        self.output_channels = Some(channels);
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    pub fn with_envelope(mut self, params: EnvelopeParameters) -> Self {
        self.envelope = Some(EnvelopeConfig {
            attack: Some(params.attack),
            decay: Some(params.decay),
            sustain: Some(params.sustain),
            release: Some(params.release),
        });
        self
    }
}
