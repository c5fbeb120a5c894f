//! A polyphonic sample-playback engine.
//!
//! [`create`] builds the two halves of a sampler that share one recording:
//! a [`ControlSurface`] for the control context and a [`SamplerEngine`]
//! owned by the audio callback.

pub mod adsr;
pub mod audio;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod loader;
pub mod samples;
pub mod voice;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use atomic_float::AtomicF32;
use rtrb::RingBuffer;

pub use adsr::{ADSRPhase, EnvelopeGenerator, EnvelopeParameters};
pub use audio::{Decode, DecodedAudio, SymphoniaDecoder};
pub use config::EngineConfig;
pub use control::{ControlSurface, LoadStatus};
pub use engine::{NoteEvent, SamplerEngine, TimedEvent};
pub use error::{ConfigError, ControlError, DecodeError, EmptySampleError, LoadError};
pub use loader::Loader;
pub use samples::{SampleStore, WaveformSummary};
pub use voice::{Voice, VoiceState};

/// Builds a sampler that decodes recordings with symphonia.
pub fn create(config: &EngineConfig) -> (ControlSurface, SamplerEngine) {
    create_with_decoder(config, Arc::new(SymphoniaDecoder::new(config.root_note())))
}

/// Builds a sampler around a caller-supplied decoder.
pub fn create_with_decoder(
    config: &EngineConfig,
    decoder: Arc<dyn Decode>,
) -> (ControlSurface, SamplerEngine) {
    let (tx, rx) = RingBuffer::new(config.queue_capacity().max(1));
    let store = Arc::new(ArcSwapOption::empty());
    let master_gain = Arc::new(AtomicF32::new(1.0));
    let active_voices = Arc::new(AtomicUsize::new(0));
    let envelope = config.envelope();

    let loader = Arc::new(Loader::new(
        decoder,
        Arc::clone(&store),
        config.display_width(),
        Some(config.max_sample_seconds()),
    ));

    let engine = SamplerEngine::new(
        config.voices(),
        config.output_channels() as usize,
        config.sample_rate() as f32,
        envelope,
        rx,
        store,
        Arc::clone(&master_gain),
        Arc::clone(&active_voices),
    );
    let surface = ControlSurface::new(loader, tx, envelope, master_gain, active_voices);

    (surface, engine)
}
