//! Downsampled waveform overview with a dominant frequency band per point

use crate::buffer::DecodedAudioBuffer;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Dominant frequency band for a waveform point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrequencyBand {
    /// Below 250Hz
    Low,
    /// 250Hz-4kHz
    #[default]
    Mid,
    /// Above 4kHz
    High,
}

/// Single point of the overview
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WaveformPoint {
    /// Peak magnitude within the bucket (0.0-1.0)
    pub amplitude: f32,
    pub band: FrequencyBand,
}

/// Fixed-resolution overview of a whole buffer, ready to draw
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaveformOverview {
    pub points: Vec<WaveformPoint>,
    pub duration_secs: f64,
}

impl WaveformOverview {
    /// FFT size used for band classification
    const FFT_SIZE: usize = 512;

    /// Build an overview of channel 0 with `target_points` buckets
    pub fn from_buffer(buffer: &DecodedAudioBuffer, target_points: usize) -> Self {
        let samples = match buffer.channel(0) {
            Some(samples) if !samples.is_empty() && target_points > 0 => samples,
            _ => {
                return Self {
                    points: vec![WaveformPoint::default(); target_points],
                    duration_secs: buffer.duration_secs(),
                }
            }
        };

        let mut classifier = BandClassifier::new(buffer.sample_rate(), Self::FFT_SIZE);
        let frames_per_point = samples.len().div_ceil(target_points).max(1);

        let points = (0..target_points)
            .map(|idx| {
                let start = idx * frames_per_point;
                if start >= samples.len() {
                    return WaveformPoint::default();
                }
                let chunk = &samples[start..(start + frames_per_point).min(samples.len())];

                let amplitude = chunk.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
                let band = if chunk.len() >= Self::FFT_SIZE / 4 {
                    classifier.classify(chunk)
                } else {
                    FrequencyBand::Mid
                };

                WaveformPoint {
                    amplitude: amplitude.min(1.0),
                    band,
                }
            })
            .collect();

        Self {
            points,
            duration_secs: buffer.duration_secs(),
        }
    }

    /// Wrap in Arc for sharing with renderers
    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Amplitude at a normalized position (0.0-1.0)
    pub fn amplitude_at(&self, position: f64) -> f32 {
        self.point_at(position).map_or(0.0, |p| p.amplitude)
    }

    /// Band at a normalized position (0.0-1.0)
    pub fn band_at(&self, position: f64) -> FrequencyBand {
        self.point_at(position).map_or(FrequencyBand::Mid, |p| p.band)
    }

    fn point_at(&self, position: f64) -> Option<&WaveformPoint> {
        if self.points.is_empty() {
            return None;
        }
        let idx = ((position.clamp(0.0, 1.0) * self.points.len() as f64) as usize)
            .min(self.points.len() - 1);
        self.points.get(idx)
    }
}

/// Hann-windowed FFT that picks the band with the highest mean energy
struct BandClassifier {
    sample_rate: u32,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
}

impl BandClassifier {
    fn new(sample_rate: u32, fft_size: usize) -> Self {
        let fft = FftPlanner::new().plan_fft_forward(fft_size);
        let window = (0..fft_size)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / fft_size as f32).cos()))
            .collect();

        Self {
            sample_rate,
            fft,
            window,
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
        }
    }

    fn classify(&mut self, samples: &[f32]) -> FrequencyBand {
        let size = self.scratch.len();
        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let sample = samples.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let bin_width = self.sample_rate as f32 / size as f32;
        let nyquist = size / 2;
        let low_end = ((250.0 / bin_width) as usize).clamp(1, nyquist);
        let mid_end = ((4000.0 / bin_width) as usize).clamp(low_end, nyquist);

        let mean_energy = |range: std::ops::Range<usize>| -> f32 {
            if range.is_empty() {
                return 0.0;
            }
            let len = range.len() as f32;
            self.scratch[range].iter().map(|c| c.norm_sqr()).sum::<f32>() / len
        };

        let low = mean_energy(1..low_end);
        let mid = mean_energy(low_end..mid_end);
        let high = mean_energy(mid_end..nyquist);

        if low >= mid && low >= high {
            FrequencyBand::Low
        } else if high >= mid {
            FrequencyBand::High
        } else {
            FrequencyBand::Mid
        }
    }
}
