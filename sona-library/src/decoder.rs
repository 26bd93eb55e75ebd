//! Audio decoding: the decoder seam and a Symphonia-backed default

use sona_analysis::DecodedAudioBuffer;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

/// Errors that can occur while decoding a source
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("No audio track found")]
    NoAudioTrack,
    #[error("Unsupported source: {0}")]
    Unsupported(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Source contains no audio frames")]
    Empty,
}

impl From<std::io::Error> for DecodeError {
    fn from(e: std::io::Error) -> Self {
        DecodeError::Io(e.to_string())
    }
}

/// A source resolved to something a decoder can read
///
/// Blob-backed entries are resolved to their bytes on the event thread
/// before decoding starts, so a worker never touches the catalog.
#[derive(Debug, Clone)]
pub enum DecodeSource {
    Path(PathBuf),
    Url(String),
    Bytes {
        data: Arc<[u8]>,
        /// File extension used to pick a demuxer, if known
        extension: Option<String>,
    },
}

/// Turns raw audio into a [`DecodedAudioBuffer`]
///
/// Implementations are called from worker threads.
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, source: &DecodeSource) -> Result<DecodedAudioBuffer, DecodeError>;
}

/// Decoder for local files and in-memory uploads using Symphonia
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self
    }

    fn decode_stream(
        &self,
        source: Box<dyn MediaSource>,
        extension: Option<&str>,
    ) -> Result<DecodedAudioBuffer, DecodeError> {
        let mss = MediaSourceStream::new(source, Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| match e {
                SymphoniaError::Unsupported(what) => DecodeError::Unsupported(what.to_string()),
                other => DecodeError::Decode(other.to_string()),
            })?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecodeError::NoAudioTrack)?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();
        let mut sample_rate = codec_params.sample_rate.unwrap_or(0);
        let mut channel_count = codec_params.channels.map(|c| c.count()).unwrap_or(0);

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| DecodeError::Decode(e.to_string()))?;

        let mut interleaved: Vec<f32> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(DecodeError::Decode(e.to_string())),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                // Corrupt packets are skipped, the rest of the stream is still usable
                Err(SymphoniaError::DecodeError(msg)) => {
                    tracing::debug!(reason = msg, "skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(DecodeError::Decode(e.to_string())),
            };

            let spec = *decoded.spec();
            sample_rate = spec.rate;
            channel_count = spec.channels.count();

            let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            interleaved.extend_from_slice(sample_buf.samples());
        }

        if interleaved.is_empty() || channel_count == 0 || sample_rate == 0 {
            return Err(DecodeError::Empty);
        }

        Ok(DecodedAudioBuffer::from_interleaved(
            sample_rate,
            channel_count,
            &interleaved,
        ))
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, source: &DecodeSource) -> Result<DecodedAudioBuffer, DecodeError> {
        match source {
            DecodeSource::Path(path) => {
                let file = std::fs::File::open(path)?;
                self.decode_stream(Box::new(file), extension_of(path).as_deref())
            }
            DecodeSource::Bytes { data, extension } => {
                self.decode_stream(Box::new(Cursor::new(data.clone())), extension.as_deref())
            }
            DecodeSource::Url(url) => Err(DecodeError::Unsupported(format!(
                "remote source {url}"
            ))),
        }
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal 16-bit PCM mono WAV file
    fn wav_bytes(sample_rate: u32, samples: &[i16]) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&1u16.to_le_bytes()); // mono
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }

    #[test]
    fn test_decode_wav_bytes() {
        let samples: Vec<i16> = (0..800).map(|i| if i % 100 == 0 { i16::MAX } else { 0 }).collect();
        let source = DecodeSource::Bytes {
            data: wav_bytes(8000, &samples).into(),
            extension: Some("wav".into()),
        };

        let buffer = SymphoniaDecoder::new().decode(&source).unwrap();
        assert_eq!(buffer.sample_rate(), 8000);
        assert_eq!(buffer.channel_count(), 1);
        assert_eq!(buffer.frame_count(), 800);
        assert!(buffer.channel(0).unwrap()[0] > 0.99);
    }

    #[test]
    fn test_garbage_fails() {
        let source = DecodeSource::Bytes {
            data: vec![0u8; 64].into(),
            extension: None,
        };
        assert!(SymphoniaDecoder::new().decode(&source).is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let source = DecodeSource::Path(PathBuf::from("/definitely/not/here.wav"));
        assert!(matches!(
            SymphoniaDecoder::new().decode(&source),
            Err(DecodeError::Io(_))
        ));
    }

    #[test]
    fn test_url_is_unsupported() {
        let source = DecodeSource::Url("https://example.com/a.mp3".into());
        assert!(matches!(
            SymphoniaDecoder::new().decode(&source),
            Err(DecodeError::Unsupported(_))
        ));
    }
}
