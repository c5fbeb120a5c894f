use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use sampler::{
    ConfigError, ControlError, EngineConfig, EnvelopeParameters, LoadError, SamplerEngine,
};

// Frames rendered per engine call inside the device callback.
const RENDER_CHUNK_FRAMES: usize = 1024;

const SPARKLINE: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

#[derive(Debug, thiserror::Error)]
enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error("no audio output device available")]
    NoOutputDevice,

    #[error("unknown envelope preset {0:?}")]
    UnknownPreset(String),

    #[error("unsupported output sample format {0:?}")]
    UnsupportedSampleFormat(cpal::SampleFormat),

    #[error(transparent)]
    DefaultStreamConfig(#[from] cpal::DefaultStreamConfigError),

    #[error(transparent)]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error(transparent)]
    PlayStream(#[from] cpal::PlayStreamError),
}

#[derive(Parser)]
#[clap(
    version = crate_version!(),
    about = "A polyphonic sample player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Loads a recording and plays notes from it through the default output device.
    Play {
        /// The audio file to load.
        file: PathBuf,
        /// Comma separated MIDI notes to play together.
        #[arg(short, long, value_delimiter = ',', default_value = "60")]
        notes: Vec<u8>,
        /// Seconds to hold the notes before releasing them.
        #[arg(long, default_value_t = 1.0)]
        hold: f64,
        /// Envelope preset: default, percussive, pad or pluck.
        #[arg(short, long)]
        preset: Option<String>,
        /// The path to a YAML engine config.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Prints the waveform summary of a recording.
    Summary {
        /// The audio file to analyze.
        file: PathBuf,
        /// Number of columns in the summary.
        #[arg(short, long, default_value_t = 80)]
        width: usize,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Play {
            file,
            notes,
            hold,
            preset,
            config,
        } => play(&file, &notes, hold, preset.as_deref(), config.as_deref()),
        Commands::Summary { file, width } => summary(&file, width),
    };

    if let Err(e) = result {
        error!(err = %e, "sampler failed");
        std::process::exit(1);
    }
}

fn play(
    file: &Path,
    notes: &[u8],
    hold: f64,
    preset: Option<&str>,
    config_path: Option<&Path>,
) -> Result<(), EngineError> {
    let config = match config_path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    let envelope = match preset {
        Some(name) => EnvelopeParameters::preset(name)
            .ok_or_else(|| EngineError::UnknownPreset(name.to_string()))?,
        None => config.envelope(),
    };

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(EngineError::NoOutputDevice)?;
    let supported = device.default_output_config()?;
    let sample_format = supported.sample_format();
    let stream_config: cpal::StreamConfig = supported.into();
    info!(
        device = %device.name().unwrap_or_default(),
        channels = stream_config.channels,
        sample_rate = stream_config.sample_rate.0,
        "Opened output device"
    );

    let config = config
        .with_output_channels(stream_config.channels)
        .with_sample_rate(stream_config.sample_rate.0);
    let (surface, mut engine) = sampler::create(&config);
    engine.prepare(stream_config.sample_rate.0 as f32);

    surface.load(file)?;
    surface.set_envelope_parameters(envelope)?;

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, engine)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, engine)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, engine)?,
        other => return Err(EngineError::UnsupportedSampleFormat(other)),
    };
    stream.play()?;

    for &note in notes {
        surface.note_on(note, 100)?;
    }
    thread::sleep(Duration::from_secs_f64(hold.max(0.0)));
    for &note in notes {
        surface.note_off(note)?;
    }

    // Let the release tail ring out.
    let tail = Duration::from_secs_f64(envelope.release as f64);
    thread::sleep(tail + Duration::from_millis(100));
    while surface.active_voices() > 0 {
        thread::sleep(Duration::from_millis(10));
    }

    drop(stream);
    surface.collect_garbage();
    Ok(())
}

fn summary(file: &Path, width: usize) -> Result<(), EngineError> {
    let config = EngineConfig::default().with_display_width(width.max(1));
    config.validate()?;
    let (surface, _engine) = sampler::create(&config);
    let store = surface.load(file)?;
    let summary = surface.waveform_summary();

    println!(
        "{}: {} channel(s), {} Hz, {:.3}s",
        store.name(),
        store.channels(),
        store.sample_rate(),
        store.duration_secs()
    );
    let max = summary.max_peak();
    if max <= 0.0 {
        println!("(silent)");
        return Ok(());
    }
    let line: String = summary
        .peaks
        .iter()
        .map(|p| {
            let idx = ((p / max) * (SPARKLINE.len() - 1) as f32).round() as usize;
            SPARKLINE[idx.min(SPARKLINE.len() - 1)]
        })
        .collect();
    println!("{}", line);
    println!("peak {:.4}", max);
    Ok(())
}

fn build_stream<T: cpal::Sample + SizedSample + FromSample<f32> + 'static>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut engine: SamplerEngine,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    let channels = engine.channels();
    if channels != config.channels as usize {
        warn!(
            engine = channels,
            device = config.channels,
            "Channel count mismatch"
        );
    }
    let err_fn = |err: cpal::StreamError| error!(err = %err, "Audio stream error");

    let stream = device.build_output_stream(
        config,
        {
            let mut scratch = vec![0.0f32; RENDER_CHUNK_FRAMES * channels];
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for chunk in data.chunks_mut(RENDER_CHUNK_FRAMES * channels) {
                    let frames = chunk.len() / channels;
                    engine.render_block(&mut scratch, &[], frames);
                    for (d, s) in chunk.iter_mut().zip(scratch.iter()) {
                        *d = T::from_sample(*s);
                    }
                    for d in chunk.iter_mut().skip(frames * channels) {
                        *d = T::from_sample(0.0f32);
                    }
                }
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}
