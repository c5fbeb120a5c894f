use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use atomic_float::AtomicF32;
use parking_lot::{Mutex, RwLock};
use rtrb::Producer;
use tracing::{debug, error, info};

use crate::adsr::EnvelopeParameters;
use crate::engine::{EngineMessage, NoteEvent};
use crate::error::{ControlError, LoadError};
use crate::loader::Loader;
use crate::samples::{SampleStore, WaveformSummary};

/// What the most recent load did, for display.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    Idle,
    Loading(PathBuf),
    Ready { name: String, seconds: f64 },
    Failed(String),
}

/// The control-context handle onto the sampler: parameter edits, note
/// input and load requests. Cheap to clone; every clone drives the same
/// engine. Nothing here ever waits on the render path.
#[derive(Clone)]
pub struct ControlSurface {
    loader: Arc<Loader>,
    tx: Arc<Mutex<Producer<EngineMessage>>>,
    envelope: Arc<RwLock<EnvelopeParameters>>,
    master_gain: Arc<AtomicF32>,
    active_voices: Arc<AtomicUsize>,
    // Ticket of the load that last wrote the status.
    status: Arc<RwLock<(u64, LoadStatus)>>,
    loads_in_flight: Arc<AtomicUsize>,
}

impl ControlSurface {
    pub(crate) fn new(
        loader: Arc<Loader>,
        tx: Producer<EngineMessage>,
        envelope: EnvelopeParameters,
        master_gain: Arc<AtomicF32>,
        active_voices: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            loader,
            tx: Arc::new(Mutex::new(tx)),
            envelope: Arc::new(RwLock::new(envelope)),
            master_gain,
            active_voices,
            status: Arc::new(RwLock::new((0, LoadStatus::Idle))),
            loads_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn send(&self, msg: EngineMessage) -> Result<(), ControlError> {
        self.tx
            .lock()
            .push(msg)
            .map_err(|_| ControlError::QueueFull)
    }

    /// Publishes a new envelope snapshot. Out-of-range values are clamped.
    pub fn set_envelope(
        &self,
        attack: f32,
        decay: f32,
        sustain: f32,
        release: f32,
    ) -> Result<(), ControlError> {
        self.set_envelope_parameters(EnvelopeParameters::new(attack, decay, sustain, release))
    }

    pub fn set_envelope_parameters(&self, params: EnvelopeParameters) -> Result<(), ControlError> {
        // Hold the write lock across the push so concurrent edits reach the
        // engine in the same order they are recorded here.
        let mut current = self.envelope.write();
        self.send(EngineMessage::Envelope(params))?;
        *current = params;
        debug!(
            attack = params.attack,
            decay = params.decay,
            sustain = params.sustain,
            release = params.release,
            "Envelope updated"
        );
        Ok(())
    }

    /// The last envelope successfully sent to the engine.
    pub fn envelope(&self) -> EnvelopeParameters {
        *self.envelope.read()
    }

    pub fn note_on(&self, note: u8, velocity: u8) -> Result<(), ControlError> {
        self.send(EngineMessage::Note(NoteEvent::NoteOn { note, velocity }))
    }

    pub fn note_off(&self, note: u8) -> Result<(), ControlError> {
        self.send(EngineMessage::Note(NoteEvent::NoteOff { note }))
    }

    pub fn all_notes_off(&self) -> Result<(), ControlError> {
        self.send(EngineMessage::Note(NoteEvent::AllNotesOff))
    }

    pub fn set_master_gain(&self, gain: f32) {
        let gain = if gain.is_finite() { gain.max(0.0) } else { 0.0 };
        self.master_gain.store(gain, Ordering::Relaxed);
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain.load(Ordering::Relaxed)
    }

    /// Voices sounding as of the last rendered block.
    pub fn active_voices(&self) -> usize {
        self.active_voices.load(Ordering::Relaxed)
    }

    /// Decodes and publishes `path` on the calling thread.
    pub fn load(&self, path: &Path) -> Result<Arc<SampleStore>, LoadError> {
        let ticket = self.loader.next_ticket();
        self.run_load(path.to_path_buf(), ticket)
    }

    /// Decodes and publishes `path` on a background thread. A later request
    /// supersedes this one if it publishes first.
    pub fn request_load(
        &self,
        path: impl Into<PathBuf>,
    ) -> JoinHandle<Result<Arc<SampleStore>, LoadError>> {
        let path = path.into();
        let ticket = self.loader.next_ticket();
        let surface = self.clone();
        thread::spawn(move || surface.run_load(path, ticket))
    }

    fn run_load(&self, path: PathBuf, ticket: u64) -> Result<Arc<SampleStore>, LoadError> {
        self.loads_in_flight.fetch_add(1, Ordering::SeqCst);
        self.set_status(ticket, LoadStatus::Loading(path.clone()));

        let result = self.loader.load_with_ticket(&path, ticket);
        match &result {
            Ok(store) => {
                info!(name = store.name(), "Sample ready");
                self.set_status(
                    ticket,
                    LoadStatus::Ready {
                        name: store.name().to_string(),
                        seconds: store.duration_secs(),
                    },
                );
            }
            Err(LoadError::Superseded(_)) => {}
            Err(e) => {
                error!(path = ?path, err = %e, "Sample load failed");
                self.set_status(ticket, LoadStatus::Failed(e.to_string()));
            }
        }

        self.loads_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    /// Records `status` unless a newer load has already reported or published.
    fn set_status(&self, ticket: u64, status: LoadStatus) {
        let mut current = self.status.write();
        if ticket < current.0 || ticket < self.loader.published_ticket() {
            debug!(ticket, "Ignoring status from a stale load");
            return;
        }
        *current = (ticket, status);
    }

    pub fn is_loading(&self) -> bool {
        self.loads_in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn status(&self) -> LoadStatus {
        self.status.read().1.clone()
    }

    /// Read-only snapshot of the current waveform; safe to call anytime.
    pub fn waveform_summary(&self) -> Arc<WaveformSummary> {
        self.loader.waveform_summary()
    }

    pub fn current_sample(&self) -> Option<Arc<SampleStore>> {
        self.loader.current()
    }

    /// Frees superseded recordings that no voice is playing any more.
    pub fn collect_garbage(&self) -> usize {
        self.loader.collect_garbage()
    }

    pub fn retired_samples(&self) -> usize {
        self.loader.retired_count()
    }
}
