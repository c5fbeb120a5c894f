//! Decoding recordings off the render path and publishing them to it.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::audio::Decode;
use crate::error::LoadError;
use crate::samples::{SampleStore, WaveformSummary};

pub struct Loader {
    decoder: Arc<dyn Decode>,
    store: Arc<ArcSwapOption<SampleStore>>,
    waveform: RwLock<Arc<WaveformSummary>>,
    // Superseded stores, kept until no voice references them so the last
    // reference is never dropped on the render path.
    retired: Mutex<Vec<Arc<SampleStore>>>,
    next_ticket: AtomicU64,
    published_ticket: Mutex<u64>,
    display_width: usize,
    max_sample_seconds: Option<f64>,
}

impl Loader {
    pub fn new(
        decoder: Arc<dyn Decode>,
        store: Arc<ArcSwapOption<SampleStore>>,
        display_width: usize,
        max_sample_seconds: Option<f64>,
    ) -> Self {
        Self {
            decoder,
            store,
            waveform: RwLock::new(Arc::new(WaveformSummary::default())),
            retired: Mutex::new(Vec::new()),
            next_ticket: AtomicU64::new(1),
            published_ticket: Mutex::new(0),
            display_width,
            max_sample_seconds,
        }
    }

    /// Reserves the next load ticket. Later tickets win over earlier ones.
    pub fn next_ticket(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::SeqCst)
    }

    /// Ticket of the most recently published load, or 0 before any.
    pub fn published_ticket(&self) -> u64 {
        *self.published_ticket.lock()
    }

    /// Decodes `path` and publishes it as the current recording.
    pub fn load(&self, path: &Path) -> Result<Arc<SampleStore>, LoadError> {
        let ticket = self.next_ticket();
        self.load_with_ticket(path, ticket)
    }

    pub(crate) fn load_with_ticket(
        &self,
        path: &Path,
        ticket: u64,
    ) -> Result<Arc<SampleStore>, LoadError> {
        info!(path = ?path, ticket, "Loading sample");

        let decoded = self.decoder.decode(path).map_err(|e| {
            warn!(path = ?path, err = %e, "Failed to decode sample");
            e
        })?;

        let max_frames = self
            .max_sample_seconds
            .map(|secs| (secs.max(0.0) * decoded.sample_rate as f64) as usize);
        let name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("unknown");
        let store = Arc::new(SampleStore::from_decoded(decoded, name, max_frames));
        if store.is_empty() {
            warn!(path = ?path, "Decoded sample has no frames; notes will be silent");
        }

        let summary = Arc::new(WaveformSummary::analyze(&store, self.display_width));
        if !self.publish(Arc::clone(&store), summary, ticket) {
            debug!(path = ?path, ticket, "Discarding superseded load");
            return Err(LoadError::Superseded(path.to_path_buf()));
        }

        info!(
            path = ?path,
            channels = store.channels(),
            sample_rate = store.sample_rate(),
            frames = store.frames(),
            duration_ms = Duration::from_secs_f64(store.duration_secs()).as_millis(),
            "Sample loaded"
        );
        Ok(store)
    }

    /// Swaps in the new store and summary together. Returns false without
    /// publishing if a newer ticket already has been.
    fn publish(&self, store: Arc<SampleStore>, summary: Arc<WaveformSummary>, ticket: u64) -> bool {
        let mut published = self.published_ticket.lock();
        if ticket < *published {
            return false;
        }
        *published = ticket;

        *self.waveform.write() = summary;
        if let Some(prior) = self.store.swap(Some(store)) {
            self.retired.lock().push(prior);
        }
        drop(published);

        self.collect_garbage();
        true
    }

    /// Frees retired stores no voice is still playing. Returns how many were
    /// released.
    pub fn collect_garbage(&self) -> usize {
        let mut retired = self.retired.lock();
        let before = retired.len();
        retired.retain(|store| Arc::strong_count(store) > 1);
        let freed = before - retired.len();
        if freed > 0 {
            debug!(freed, remaining = retired.len(), "Released retired samples");
        }
        freed
    }

    /// Number of superseded stores still referenced by voices.
    pub fn retired_count(&self) -> usize {
        self.retired.lock().len()
    }

    pub fn current(&self) -> Option<Arc<SampleStore>> {
        self.store.load_full()
    }

    pub fn waveform_summary(&self) -> Arc<WaveformSummary> {
        self.waveform.read().clone()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audio::DecodedAudio;
    use crate::error::DecodeError;
    use std::path::PathBuf;

    /// Decodes any path to a mono ramp whose length is the file stem.
    pub(crate) struct FakeDecoder;

    impl Decode for FakeDecoder {
        fn decode(&self, path: &Path) -> Result<DecodedAudio, DecodeError> {
            let frames: usize = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| DecodeError::Unsupported {
                    path: path.to_path_buf(),
                    reason: "not a number".to_string(),
                })?;
            Ok(DecodedAudio {
                pcm: (0..frames).map(|i| i as f32 / frames as f32).collect(),
                channels: 1,
                sample_rate: 100,
                root_note: 60,
            })
        }
    }

    fn loader(width: usize, max_secs: Option<f64>) -> Loader {
        Loader::new(
            Arc::new(FakeDecoder),
            Arc::new(ArcSwapOption::empty()),
            width,
            max_secs,
        )
    }

    #[test]
    fn test_load_publishes_store_and_summary() {
        let loader = loader(10, None);
        assert!(loader.current().is_none());
        assert!(loader.waveform_summary().is_empty());

        let store = loader.load(Path::new("1000.wav")).unwrap();
        assert_eq!(loader.published_ticket(), 1);
        assert_eq!(store.frames(), 1000);
        assert_eq!(store.name(), "1000.wav");
        assert!(Arc::ptr_eq(&loader.current().unwrap(), &store));

        let summary = loader.waveform_summary();
        assert_eq!(summary.len(), 10);
        assert!(summary.peaks.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_decode_error_leaves_current_sample() {
        let loader = loader(10, None);
        let store = loader.load(Path::new("50.wav")).unwrap();
        let err = loader.load(Path::new("bogus.wav")).unwrap_err();
        assert!(matches!(err, LoadError::Decode(DecodeError::Unsupported { .. })));
        assert!(Arc::ptr_eq(&loader.current().unwrap(), &store));
        assert_eq!(loader.waveform_summary().len(), 10);
    }

    #[test]
    fn test_max_sample_length() {
        let loader = loader(4, Some(2.0));
        let store = loader.load(Path::new("1000.wav")).unwrap();
        assert_eq!(store.frames(), 200);
    }

    #[test]
    fn test_superseded_load_is_discarded() {
        let loader = loader(4, None);
        let older = loader.next_ticket();
        let newer = loader.next_ticket();
        let winner = loader.load_with_ticket(Path::new("20.wav"), newer).unwrap();

        let err = loader
            .load_with_ticket(Path::new("30.wav"), older)
            .unwrap_err();
        assert!(matches!(err, LoadError::Superseded(p) if p == PathBuf::from("30.wav")));
        assert_eq!(loader.published_ticket(), newer);
        assert!(Arc::ptr_eq(&loader.current().unwrap(), &winner));
    }

    #[test]
    fn test_prior_store_outlives_its_last_voice() {
        let loader = loader(4, None);
        let first = loader.load(Path::new("10.wav")).unwrap();
        // Stand-in for a voice still playing the first recording.
        let voice_ref = Arc::clone(&first);
        drop(first);

        loader.load(Path::new("20.wav")).unwrap();
        assert_eq!(loader.retired_count(), 1);
        assert_eq!(voice_ref.frames(), 10);

        assert_eq!(loader.collect_garbage(), 0);
        drop(voice_ref);
        assert_eq!(loader.collect_garbage(), 1);
        assert_eq!(loader.retired_count(), 0);
    }

    #[test]
    fn test_unreferenced_store_is_collected_on_publish() {
        let loader = loader(4, None);
        drop(loader.load(Path::new("10.wav")).unwrap());
        drop(loader.load(Path::new("20.wav")).unwrap());
        assert_eq!(loader.retired_count(), 0);
    }
}
