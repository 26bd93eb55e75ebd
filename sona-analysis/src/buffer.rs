//! Decoded audio buffer shared by analysis, playback and rendering

use std::sync::Arc;

/// Fully materialized, planar audio at a fixed sample rate.
///
/// Produced once per decode and never mutated afterwards; consumers share
/// it through an `Arc` so the analyzer and the renderer see the same data.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudioBuffer {
    sample_rate: u32,
    /// One sample sequence per channel, values in -1.0..=1.0
    channels: Vec<Vec<f32>>,
}

impl DecodedAudioBuffer {
    /// Create a buffer from planar channel data
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Create a buffer from interleaved samples
    pub fn from_interleaved(sample_rate: u32, channel_count: usize, samples: &[f32]) -> Self {
        if channel_count == 0 {
            return Self::new(sample_rate, Vec::new());
        }

        let frames = samples.len() / channel_count;
        let channels = (0..channel_count)
            .map(|ch| (0..frames).map(|f| samples[f * channel_count + ch]).collect())
            .collect();

        Self::new(sample_rate, channels)
    }

    /// Create a single-channel buffer
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self::new(sample_rate, vec![samples])
    }

    /// Wrap in Arc for sharing across the pipeline
    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames (samples per channel)
    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Samples of one channel, if it exists
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Duration in seconds, 0.0 for an empty buffer or zero sample rate
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.frame_count() == 0 || self.channels.is_empty()
    }
}
