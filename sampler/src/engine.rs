//! The render side of the sampler.
//!
//! [`SamplerEngine`] is owned by whatever drives the audio callback. Nothing
//! in here allocates, locks or performs I/O once the engine is constructed:
//! control messages arrive over an SPSC ring, and the current recording is
//! read with a single lock-free pointer load per block.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use atomic_float::AtomicF32;
use rtrb::Consumer;

use crate::adsr::EnvelopeParameters;
use crate::samples::SampleStore;
use crate::voice::{Voice, VoiceState};

/// Highest MIDI note accepted.
pub const MAX_NOTE: u8 = 127;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NoteEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    AllNotesOff,
}

/// A note event positioned within a render block.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TimedEvent {
    /// Frame within the block at which the event takes effect.
    pub offset: usize,
    pub event: NoteEvent,
}

impl TimedEvent {
    pub fn new(offset: usize, event: NoteEvent) -> Self {
        Self { offset, event }
    }
}

/// Messages from the control surface, applied at the start of a block.
#[derive(Debug, Copy, Clone)]
pub(crate) enum EngineMessage {
    Note(NoteEvent),
    Envelope(EnvelopeParameters),
}

pub struct SamplerEngine {
    voices: Vec<Voice>,
    rx: Consumer<EngineMessage>,
    store: Arc<ArcSwapOption<SampleStore>>,
    envelope: EnvelopeParameters,
    sample_rate: f32,
    channels: usize,
    master_gain: Arc<AtomicF32>,
    active_voices: Arc<AtomicUsize>,
    next_age: u64,
}

impl SamplerEngine {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        voices: usize,
        channels: usize,
        sample_rate: f32,
        envelope: EnvelopeParameters,
        rx: Consumer<EngineMessage>,
        store: Arc<ArcSwapOption<SampleStore>>,
        master_gain: Arc<AtomicF32>,
        active_voices: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            voices: (0..voices.max(1)).map(|_| Voice::new()).collect(),
            rx,
            store,
            envelope,
            sample_rate,
            channels: channels.max(1),
            master_gain,
            active_voices,
            next_age: 0,
        }
    }

    /// Sets the output sample rate. Called by the host before rendering,
    /// ideally from the render thread: the first store load on a thread
    /// registers it with arc-swap, which allocates once.
    pub fn prepare(&mut self, sample_rate: f32) {
        if sample_rate.is_finite() && sample_rate > 0.0 {
            self.sample_rate = sample_rate;
        }
        drop(self.store.load_full());
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn envelope(&self) -> EnvelopeParameters {
        self.envelope
    }

    pub fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| !v.is_idle()).count()
    }

    /// Renders `frame_count` interleaved frames into `output`.
    ///
    /// Queued control messages apply at frame 0; `events` apply at their
    /// offsets, which must be in ascending order. Events at or past the end
    /// of the block apply after the last frame. `frame_count` is clamped to
    /// what `output` can hold.
    pub fn render_block(&mut self, output: &mut [f32], events: &[TimedEvent], frame_count: usize) {
        let channels = self.channels;
        let frames = frame_count.min(output.len() / channels);
        let output = &mut output[..frames * channels];
        output.fill(0.0);

        let current = self.store.load_full();

        // A newly published recording sends every voice on the old one into
        // release; they keep their reference until the tail has finished.
        for voice in self.voices.iter_mut() {
            if voice.state() == VoiceState::Playing && !voice.is_bound_to(current.as_ref()) {
                voice.stop();
            }
        }

        while let Ok(msg) = self.rx.pop() {
            match msg {
                EngineMessage::Note(event) => self.apply(event, current.as_ref()),
                EngineMessage::Envelope(params) => self.envelope = params,
            }
        }

        let mut cursor = 0;
        for event in events {
            let at = event.offset.clamp(cursor, frames);
            self.render_span(&mut output[cursor * channels..at * channels]);
            cursor = at;
            self.apply(event.event, current.as_ref());
        }
        self.render_span(&mut output[cursor * channels..]);

        let gain = self.master_gain.load(Ordering::Relaxed);
        if gain != 1.0 {
            output.iter_mut().for_each(|s| *s *= gain);
        }

        self.active_voices
            .store(self.active_voice_count(), Ordering::Relaxed);
    }

    fn render_span(&mut self, out: &mut [f32]) {
        if out.is_empty() {
            return;
        }
        for voice in self.voices.iter_mut().filter(|v| !v.is_idle()) {
            voice.render(out, self.channels, &self.envelope, self.sample_rate);
        }
    }

    fn apply(&mut self, event: NoteEvent, current: Option<&Arc<SampleStore>>) {
        match event {
            NoteEvent::NoteOn { note, velocity: 0 } => self.note_off(note),
            NoteEvent::NoteOn { note, velocity } => self.note_on(note, velocity, current),
            NoteEvent::NoteOff { note } => self.note_off(note),
            NoteEvent::AllNotesOff => self.all_notes_off(),
        }
    }

    fn note_on(&mut self, note: u8, velocity: u8, current: Option<&Arc<SampleStore>>) {
        if note > MAX_NOTE {
            return;
        }
        let Some(store) = current else {
            return;
        };

        let age = self.next_age;
        let idx = self.allocate_voice();
        if self.voices[idx]
            .start(note, velocity, store, &self.envelope, self.sample_rate, age)
            .is_ok()
        {
            self.next_age += 1;
        }
    }

    fn note_off(&mut self, note: u8) {
        for voice in self.voices.iter_mut() {
            if voice.state() == VoiceState::Playing && voice.note() == note {
                voice.stop();
            }
        }
    }

    fn all_notes_off(&mut self) {
        self.voices.iter_mut().for_each(Voice::stop);
    }

    /// Picks the slot for a new note: a free voice if there is one, else the
    /// quietest releasing voice (oldest first on ties), else the oldest
    /// playing voice.
    fn allocate_voice(&self) -> usize {
        if let Some(idx) = self.voices.iter().position(Voice::is_idle) {
            return idx;
        }

        let releasing = self
            .voices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.state() == VoiceState::Releasing)
            .min_by(|(_, a), (_, b)| {
                a.level()
                    .total_cmp(&b.level())
                    .then_with(|| a.age().cmp(&b.age()))
            })
            .map(|(idx, _)| idx);
        if let Some(idx) = releasing {
            return idx;
        }

        self.voices
            .iter()
            .enumerate()
            .min_by_key(|(_, v)| v.age())
            .map(|(idx, _)| idx)
            .unwrap_or(0)
    }
}
