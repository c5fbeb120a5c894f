use std::fs::File;
use std::path::Path;

use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use tracing::debug;

use crate::error::DecodeError;

/// Raw output of a decoder: interleaved PCM plus what the store needs to
/// play it back at the right pitch.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub pcm: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
    pub root_note: u8,
}

/// The capability of turning a file on disk into PCM.
///
/// Only ever called from the control context.
pub trait Decode: Send + Sync {
    fn decode(&self, path: &Path) -> Result<DecodedAudio, DecodeError>;
}

/// Decodes any format symphonia supports. Recordings carry no pitch
/// metadata, so every file is assigned the configured root note.
#[derive(Debug, Clone)]
pub struct SymphoniaDecoder {
    root_note: u8,
}

impl Default for SymphoniaDecoder {
    fn default() -> Self {
        Self::new(60)
    }
}

impl SymphoniaDecoder {
    pub fn new(root_note: u8) -> Self {
        Self {
            root_note: root_note.min(127),
        }
    }
}

impl Decode for SymphoniaDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedAudio, DecodeError> {
        let codec_err = |source: SymphoniaError| match source {
            SymphoniaError::IoError(source) => DecodeError::Io {
                path: path.to_path_buf(),
                source,
            },
            SymphoniaError::Unsupported(reason) => DecodeError::Unsupported {
                path: path.to_path_buf(),
                reason: reason.to_string(),
            },
            source => DecodeError::Codec {
                path: path.to_path_buf(),
                source,
            },
        };

        let file = File::open(path).map_err(|source| DecodeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(codec_err)?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::Unsupported {
                path: path.to_path_buf(),
                reason: "no decodable audio track".to_string(),
            })?;
        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| DecodeError::MissingSampleRate(path.to_path_buf()))?;
        let mut channels = track.codec_params.channels.map(|c| c.count() as u16);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(codec_err)?;

        let mut pcm: Vec<f32> = Vec::new();
        let mut sample_buf: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(codec_err(e)),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(reason)) => {
                    // A corrupt packet costs a few milliseconds of audio, not the file.
                    debug!(path = ?path, reason, "Skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(codec_err(e)),
            };

            let spec = *decoded.spec();
            let needed = decoded.capacity() * spec.channels.count();
            if sample_buf.as_ref().map_or(true, |b| b.capacity() < needed) {
                sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
            }
            if let Some(buf) = sample_buf.as_mut() {
                buf.copy_interleaved_ref(decoded);
                pcm.extend_from_slice(buf.samples());
            }
            channels.get_or_insert(spec.channels.count() as u16);
        }

        let channels = channels.ok_or_else(|| DecodeError::Unsupported {
            path: path.to_path_buf(),
            reason: "unknown channel layout".to_string(),
        })?;

        Ok(DecodedAudio {
            pcm,
            channels,
            sample_rate,
            root_note: self.root_note,
        })
    }
}
