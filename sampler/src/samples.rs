use crate::audio::DecodedAudio;

/// Decoded PCM for one recording, shared read-only by every voice playing it.
///
/// Never mutated after construction. A new load builds a new store and
/// publishes it; voices still holding the previous one keep it alive.
#[derive(Debug)]
pub struct SampleStore {
    pcm: Vec<f32>, // interleaved
    channels: u16,
    sample_rate: u32,
    root_note: u8,
    start_offset: usize,
    name: String,
}

impl SampleStore {
    pub fn new(mut pcm: Vec<f32>, channels: u16, sample_rate: u32, root_note: u8) -> Self {
        let channels = channels.max(1);
        // Drop a trailing partial frame so every frame has all channels.
        pcm.truncate(pcm.len() - pcm.len() % channels as usize);
        Self {
            pcm,
            channels,
            sample_rate,
            root_note: root_note.min(127),
            start_offset: 0,
            name: String::new(),
        }
    }

    /// Builds a store from decoder output, keeping at most `max_frames` frames.
    pub fn from_decoded(decoded: DecodedAudio, name: &str, max_frames: Option<usize>) -> Self {
        let mut store = Self::new(
            decoded.pcm,
            decoded.channels,
            decoded.sample_rate,
            decoded.root_note,
        );
        if let Some(max) = max_frames {
            store.pcm.truncate(max.saturating_mul(store.channels as usize));
        }
        store.name = name.to_string();
        store
    }

    /// Sets the frame at which voices begin playback. Clamped to the data.
    pub fn with_start_offset(mut self, frames: usize) -> Self {
        self.start_offset = frames.min(self.frames());
        self
    }

    pub fn frames(&self) -> usize {
        self.pcm.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn root_note(&self) -> u8 {
        self.root_note
    }

    pub fn start_offset(&self) -> usize {
        self.start_offset
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn pcm(&self) -> &[f32] {
        &self.pcm
    }

    /// Reads one sample. Out-of-range frames or channels read as silence.
    #[inline]
    pub fn sample(&self, frame: usize, channel: usize) -> f32 {
        if channel >= self.channels as usize {
            return 0.0;
        }
        self.pcm
            .get(frame * self.channels as usize + channel)
            .copied()
            .unwrap_or(0.0)
    }
}

/// Per-column peak levels for drawing a waveform trace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaveformSummary {
    pub peaks: Vec<f32>,
}

impl WaveformSummary {
    /// Splits the recording into `display_width` windows of
    /// `frames / display_width` frames (at least one) and takes the largest
    /// absolute sample across all channels in each. Frames past the last
    /// whole window are not shown; columns past the end of a short
    /// recording are 0.
    pub fn analyze(store: &SampleStore, display_width: usize) -> Self {
        if display_width == 0 {
            return Self::default();
        }

        let frames = store.frames();
        let channels = store.channels() as usize;
        let window = (frames / display_width).max(1);
        let pcm = store.pcm();

        let peaks = (0..display_width)
            .map(|column| {
                let start = (column * window).min(frames);
                let end = (start + window).min(frames);
                pcm[start * channels..end * channels]
                    .iter()
                    .fold(0.0f32, |peak, s| peak.max(s.abs()))
            })
            .collect();

        Self { peaks }
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn max_peak(&self) -> f32 {
        self.peaks.iter().copied().fold(0.0, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(frames: usize) -> Vec<f32> {
        (0..frames).map(|i| i as f32 / frames as f32).collect()
    }

    #[test]
    fn test_store_basics() {
        let store = SampleStore::new(vec![0.1, -0.1, 0.2, -0.2, 0.3], 2, 48_000, 60);
        assert_eq!(store.frames(), 2);
        assert_eq!(store.channels(), 2);
        assert_eq!(store.sample(1, 0), 0.2);
        assert_eq!(store.sample(1, 1), -0.2);
        assert_eq!(store.sample(2, 0), 0.0);
        assert_eq!(store.sample(0, 2), 0.0);
    }

    #[test]
    fn test_from_decoded_truncates() {
        let decoded = DecodedAudio {
            pcm: ramp(1000),
            channels: 1,
            sample_rate: 100,
            root_note: 64,
        };
        let store = SampleStore::from_decoded(decoded, "ramp.wav", Some(250));
        assert_eq!(store.frames(), 250);
        assert_eq!(store.name(), "ramp.wav");
        assert_eq!(store.root_note(), 64);
        assert!((store.duration_secs() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_start_offset_is_clamped() {
        let store = SampleStore::new(ramp(10), 1, 100, 60).with_start_offset(50);
        assert_eq!(store.start_offset(), 10);
    }

    #[test]
    fn test_waveform_has_one_peak_per_column() {
        let pcm: Vec<f32> = (0..1000)
            .map(|i| if i % 2 == 0 { 0.5 } else { -0.75 })
            .collect();
        let store = SampleStore::new(pcm, 1, 44_100, 60);
        let summary = WaveformSummary::analyze(&store, 7);
        assert_eq!(summary.len(), 7);
        assert!(summary.peaks.iter().all(|p| (*p - 0.75).abs() < 1e-6));
    }

    #[test]
    fn test_waveform_peaks_bounded_by_window() {
        let store = SampleStore::new(ramp(400), 1, 44_100, 60);
        let summary = WaveformSummary::analyze(&store, 4);
        let window = 100;
        for (column, peak) in summary.peaks.iter().enumerate() {
            let slice = &store.pcm()[column * window..(column + 1) * window];
            let max = slice.iter().fold(0.0f32, |m, s| m.max(s.abs()));
            assert!(*peak >= 0.0 && *peak <= max);
            assert_eq!(*peak, max);
        }
    }

    #[test]
    fn test_waveform_short_recording() {
        let store = SampleStore::new(vec![0.5, -1.0, 0.25], 1, 44_100, 60);
        let summary = WaveformSummary::analyze(&store, 5);
        assert_eq!(summary.peaks, vec![0.5, 1.0, 0.25, 0.0, 0.0]);
    }

    #[test]
    fn test_waveform_empty_store() {
        let store = SampleStore::new(Vec::new(), 1, 44_100, 60);
        let summary = WaveformSummary::analyze(&store, 3);
        assert_eq!(summary.peaks, vec![0.0; 3]);
        assert!(WaveformSummary::analyze(&store, 0).is_empty());
    }
}
