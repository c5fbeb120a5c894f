use std::sync::Arc;

use crate::adsr::{EnvelopeGenerator, EnvelopeParameters};
use crate::error::EmptySampleError;
use crate::samples::SampleStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,      // Available for allocation
    Playing,   // Envelope in attack/decay/sustain
    Releasing, // Note released, envelope fading out
}

/// Playback speed for `note` relative to the recording's root note.
#[inline]
pub fn pitch_ratio(note: u8, root_note: u8) -> f64 {
    ((note as f64 - root_note as f64) / 12.0).exp2()
}

/// One unit of sample playback within the pool.
#[derive(Debug)]
pub struct Voice {
    state: VoiceState,
    note: u8,
    velocity_gain: f32,
    position: f64, // fractional frame into the store
    pitch_ratio: f64,
    step: f64, // frames advanced per output sample
    age: u64,
    envelope: EnvelopeGenerator,
    store: Option<Arc<SampleStore>>,
}

impl Default for Voice {
    fn default() -> Self {
        Self {
            state: VoiceState::Idle,
            note: 0,
            velocity_gain: 0.0,
            position: 0.0,
            pitch_ratio: 1.0,
            step: 1.0,
            age: 0,
            envelope: EnvelopeGenerator::new(),
            store: None,
        }
    }
}

impl Voice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the voice to `store` and starts playing `note`.
    ///
    /// An empty store leaves the voice exactly as it was.
    pub fn start(
        &mut self,
        note: u8,
        velocity: u8,
        store: &Arc<SampleStore>,
        params: &EnvelopeParameters,
        output_rate: f32,
        age: u64,
    ) -> Result<(), EmptySampleError> {
        if store.is_empty() {
            return Err(EmptySampleError);
        }

        self.note = note;
        self.velocity_gain = velocity.min(127) as f32 / 127.0;
        self.position = store.start_offset() as f64;
        self.pitch_ratio = pitch_ratio(note, store.root_note());
        self.step = self.pitch_ratio * store.sample_rate() as f64 / output_rate.max(1.0) as f64;
        self.age = age;
        self.envelope.trigger(params);
        self.store = Some(Arc::clone(store));
        self.state = VoiceState::Playing;
        Ok(())
    }

    /// Begins the release. Sound continues until the envelope reaches silence.
    pub fn stop(&mut self) {
        if self.state == VoiceState::Playing {
            self.envelope.release();
            self.state = VoiceState::Releasing;
        }
    }

    /// Drops the sample reference and returns to the pool.
    pub fn free(&mut self) {
        self.state = VoiceState::Idle;
        self.store = None;
        self.envelope.reset();
    }

    /// Mixes this voice into `out`, an interleaved block with `channels`
    /// channels. Output channel `c` reads source channel
    /// `min(c, source_channels - 1)`.
    pub fn render(
        &mut self,
        out: &mut [f32],
        channels: usize,
        params: &EnvelopeParameters,
        output_rate: f32,
    ) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        if channels == 0 {
            return;
        }

        let frames = store.frames();
        let src_channels = store.channels() as usize;
        let mut finished = false;

        for frame in out.chunks_exact_mut(channels) {
            let i0 = self.position as usize;
            if i0 >= frames {
                // One-shot: out of data, cut the note.
                finished = true;
                break;
            }
            let i1 = (i0 + 1).min(frames - 1);
            let t = (self.position - i0 as f64) as f32;

            let gain = self.envelope.next_gain(params, output_rate) * self.velocity_gain;
            if !self.envelope.is_active() {
                finished = true;
                break;
            }

            for (oc, o) in frame.iter_mut().enumerate() {
                let sc = oc.min(src_channels - 1);
                let s0 = store.sample(i0, sc);
                let s1 = store.sample(i1, sc);
                *o += (s0 + t * (s1 - s0)) * gain;
            }

            self.position += self.step;
        }

        if finished {
            self.free();
        }
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == VoiceState::Idle
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn age(&self) -> u64 {
        self.age
    }

    pub fn pitch_ratio(&self) -> f64 {
        self.pitch_ratio
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    /// Current envelope level, before velocity.
    pub fn level(&self) -> f32 {
        self.envelope.level()
    }

    /// Whether this voice is playing from `store`.
    pub fn is_bound_to(&self, store: Option<&Arc<SampleStore>>) -> bool {
        match (self.store.as_ref(), store) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}
