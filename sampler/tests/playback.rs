use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use sampler::{
    ControlError, ControlSurface, DecodeError, EngineConfig, EnvelopeParameters, LoadError,
    LoadStatus, SamplerEngine,
};

const RATE: u32 = 44_100;

/// Writes a mono 16-bit WAV holding `samples` into `dir`.
fn write_wav(dir: &Path, name: &str, samples: &[i16]) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for &s in samples {
        writer.write_sample(s).unwrap();
    }
    writer.finalize().unwrap();
    path
}

/// Polls `check` until it holds or a few seconds pass.
fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    check()
}

fn sampler(config: EngineConfig) -> (ControlSurface, SamplerEngine) {
    sampler::create(&config)
}

fn flat() -> EnvelopeParameters {
    EnvelopeParameters::new(0.0, 0.0, 1.0, 0.0)
}

fn assert_close(actual: f32, expected: f32) {
    assert!(
        (actual - expected).abs() < 1e-4,
        "expected {}, got {}",
        expected,
        actual
    );
}

#[test]
fn test_silent_recording_renders_silence() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path(), "silence.wav", &vec![0; RATE as usize]);
    let (surface, mut engine) = sampler(EngineConfig::default());

    let store = surface.load(&path).unwrap();
    assert_eq!(store.frames(), RATE as usize);
    assert_eq!(store.sample_rate(), RATE);

    surface.note_on(60, 127).unwrap();
    let mut out = vec![1.0f32; 512 * 2];
    engine.render_block(&mut out, &[], 512);
    assert!(out.iter().all(|s| *s == 0.0));
    assert_eq!(surface.active_voices(), 1);
}

#[test]
fn test_waveform_summary_after_load() {
    let dir = tempfile::tempdir().unwrap();
    let samples: Vec<i16> = (0..1000)
        .map(|i| ((i as f32 * 0.05).sin() * 16384.0) as i16)
        .collect();
    let path = write_wav(dir.path(), "sine.wav", &samples);
    let (surface, _engine) = sampler(EngineConfig::default().with_display_width(50));

    assert!(surface.waveform_summary().is_empty());
    surface.load(&path).unwrap();

    let summary = surface.waveform_summary();
    assert_eq!(summary.len(), 50);
    assert!(summary.peaks.iter().all(|p| (0.0..=1.0).contains(p)));
    assert!(summary.max_peak() > 0.45 && summary.max_peak() <= 0.5);
}

#[test]
fn test_background_load_publishes() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path(), "tone.wav", &vec![8192; 4410]);
    let (surface, _engine) = sampler(EngineConfig::default());

    let handle = surface.request_load(&path);
    assert!(eventually(|| surface.current_sample().is_some()));
    let store = handle.join().unwrap().unwrap();

    assert!(Arc::ptr_eq(&surface.current_sample().unwrap(), &store));
    assert!(eventually(|| !surface.is_loading()));
    match surface.status() {
        LoadStatus::Ready { name, seconds } => {
            assert_eq!(name, "tone.wav");
            assert!((seconds - 0.1).abs() < 1e-9);
        }
        other => panic!("unexpected status {:?}", other),
    }
}

#[test]
fn test_failed_load_keeps_current_sample() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path(), "good.wav", &vec![100; 441]);
    let (surface, _engine) = sampler(EngineConfig::default().with_display_width(10));
    let store = surface.load(&path).unwrap();

    let err = surface.load(&dir.path().join("missing.wav")).unwrap_err();
    assert!(matches!(err, LoadError::Decode(DecodeError::Io { .. })));
    assert!(matches!(surface.status(), LoadStatus::Failed(_)));
    assert!(Arc::ptr_eq(&surface.current_sample().unwrap(), &store));
    assert_eq!(surface.waveform_summary().len(), 10);
}

#[test]
fn test_envelope_and_gain_reach_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path(), "half.wav", &vec![16384; 4410]);
    let (surface, mut engine) = sampler(EngineConfig::default());
    surface.load(&path).unwrap();

    surface.set_envelope(0.0, 0.0, 1.0, 0.0).unwrap();
    assert_eq!(surface.envelope(), flat());
    surface.note_on(60, 127).unwrap();

    let mut out = vec![0.0f32; 64 * 2];
    engine.render_block(&mut out, &[], 64);
    assert_eq!(engine.envelope(), flat());
    assert_close(out[0], 0.5);
    assert_close(out[1], 0.5);

    surface.set_master_gain(0.5);
    engine.render_block(&mut out, &[], 64);
    assert!(out.iter().all(|s| (s - 0.25).abs() < 1e-4));
}

#[test]
fn test_all_notes_off_silences_pool() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path(), "chord.wav", &vec![8192; 44_100]);
    let (surface, mut engine) = sampler(EngineConfig::default().with_envelope(flat()));
    surface.load(&path).unwrap();

    for note in [60, 64, 67] {
        surface.note_on(note, 100).unwrap();
    }
    let mut out = vec![0.0f32; 128 * 2];
    engine.render_block(&mut out, &[], 128);
    assert_eq!(surface.active_voices(), 3);

    surface.all_notes_off().unwrap();
    engine.render_block(&mut out, &[], 128);
    assert_eq!(surface.active_voices(), 0);
    assert!(out.iter().all(|s| *s == 0.0));
}

#[test]
fn test_replaced_sample_is_freed_after_its_voices() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_wav(dir.path(), "first.wav", &vec![16384; 44_100]);
    let second = write_wav(dir.path(), "second.wav", &vec![4096; 44_100]);
    let config =
        EngineConfig::default().with_envelope(EnvelopeParameters::new(0.0, 0.0, 1.0, 0.01));
    let (surface, mut engine) = sampler(config);

    drop(surface.load(&first).unwrap());
    surface.note_on(60, 127).unwrap();
    let mut out = vec![0.0f32; 1024 * 2];
    engine.render_block(&mut out, &[], 64);
    assert_eq!(surface.active_voices(), 1);

    drop(surface.load(&second).unwrap());
    // The sounding voice still holds the first recording.
    assert_eq!(surface.retired_samples(), 1);
    assert_eq!(surface.collect_garbage(), 0);

    // The voice releases over 441 frames and then lets go.
    engine.render_block(&mut out, &[], 1024);
    assert!(out[0] > 0.4);
    assert_eq!(out[2 * 1000], 0.0);
    assert_eq!(surface.active_voices(), 0);

    assert_eq!(surface.collect_garbage(), 1);
    assert_eq!(surface.retired_samples(), 0);
    assert_eq!(surface.current_sample().unwrap().name(), "second.wav");
}

#[test]
fn test_full_queue_is_reported() {
    let config = EngineConfig::from_yaml("queue_capacity: 2").unwrap();
    let (surface, _engine) = sampler(config);

    surface.note_on(60, 100).unwrap();
    surface.note_on(62, 100).unwrap();
    assert_eq!(surface.note_on(64, 100), Err(ControlError::QueueFull));

    let before = surface.envelope();
    assert_eq!(
        surface.set_envelope_parameters(EnvelopeParameters::pad()),
        Err(ControlError::QueueFull)
    );
    assert_eq!(surface.envelope(), before);
}
