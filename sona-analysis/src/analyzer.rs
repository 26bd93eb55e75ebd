//! Whole-buffer signal metrics: duration, amplitude, peaks and a rough tempo

use crate::buffer::DecodedAudioBuffer;
use crate::peaks::{average_amplitude, PeakDetector};
use thiserror::Error;

/// Errors that can occur during analysis
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("Buffer has no frames or no channels")]
    EmptyBuffer,
    #[error("Sample rate must be greater than zero")]
    InvalidSampleRate,
}

/// Metrics derived from a decoded buffer
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    /// Duration in seconds (frames / sample rate)
    pub duration: f64,
    pub channels: usize,
    pub sample_rate: u32,
    /// Rough tempo estimate, only when more than one peak was found
    pub estimated_bpm: Option<u32>,
    /// Mean absolute sample value of channel 0
    pub average_amplitude: f32,
    pub peak_count: usize,
}

impl AnalysisResult {
    /// Duration with two decimals, e.g. "5.00 seconds"
    pub fn duration_label(&self) -> String {
        format!("{:.2} seconds", self.duration)
    }

    /// Estimated BPM, or "N/A" when no estimate exists
    pub fn bpm_label(&self) -> String {
        match self.estimated_bpm {
            Some(bpm) => bpm.to_string(),
            None => "N/A".to_string(),
        }
    }

    /// Average amplitude with three decimals
    pub fn amplitude_label(&self) -> String {
        format!("{:.3}", self.average_amplitude)
    }

    pub fn sample_rate_label(&self) -> String {
        format!("{} Hz", self.sample_rate)
    }
}

/// Computes [`AnalysisResult`] from a [`DecodedAudioBuffer`]
///
/// Stateless and deterministic: the same buffer always produces the same
/// result, so calling it repeatedly is safe.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalAnalyzer;

impl SignalAnalyzer {
    /// Lowest tempo reported
    pub const MIN_BPM: u32 = 60;
    /// Highest tempo reported
    pub const MAX_BPM: u32 = 180;

    pub fn new() -> Self {
        Self
    }

    /// Analyze a decoded buffer
    pub fn analyze(&self, buffer: &DecodedAudioBuffer) -> Result<AnalysisResult, AnalysisError> {
        let samples = match buffer.channel(0) {
            Some(samples) if !samples.is_empty() => samples,
            _ => return Err(AnalysisError::EmptyBuffer),
        };
        if buffer.sample_rate() == 0 {
            return Err(AnalysisError::InvalidSampleRate);
        }

        let sample_rate = buffer.sample_rate();
        let frame_count = buffer.frame_count();
        let duration = frame_count as f64 / sample_rate as f64;

        let average_amplitude = average_amplitude(samples);
        let peaks = PeakDetector::new(sample_rate).detect(samples, average_amplitude);
        let estimated_bpm = Self::estimate_bpm(frame_count, peaks.len(), sample_rate);

        tracing::debug!(
            frames = frame_count,
            peaks = peaks.len(),
            bpm = ?estimated_bpm,
            "analyzed buffer"
        );

        Ok(AnalysisResult {
            duration,
            channels: buffer.channel_count(),
            sample_rate,
            estimated_bpm,
            average_amplitude,
            peak_count: peaks.len(),
        })
    }

    /// Tempo from the mean spacing of peaks over the whole buffer
    fn estimate_bpm(frame_count: usize, peak_count: usize, sample_rate: u32) -> Option<u32> {
        if peak_count <= 1 {
            return None;
        }

        let avg_interval_secs = frame_count as f64 / peak_count as f64 / sample_rate as f64;
        if avg_interval_secs <= 0.0 {
            return None;
        }

        let bpm = (60.0 / avg_interval_secs).round();
        Some((bpm as u32).clamp(Self::MIN_BPM, Self::MAX_BPM))
    }
}

/// Analyze a buffer with the default analyzer
pub fn analyze(buffer: &DecodedAudioBuffer) -> Result<AnalysisResult, AnalysisError> {
    SignalAnalyzer::new().analyze(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Mono buffer with a single full-scale click every `interval_secs`
    fn click_track(sample_rate: u32, secs: f64, interval_secs: f64) -> DecodedAudioBuffer {
        let frames = (secs * sample_rate as f64) as usize;
        let step = (interval_secs * sample_rate as f64).round() as usize;
        let samples = (0..frames).map(|i| if i % step == 0 { 1.0 } else { 0.0 }).collect();
        DecodedAudioBuffer::mono(sample_rate, samples)
    }

    #[test]
    fn test_silence() {
        let buffer = DecodedAudioBuffer::mono(44100, vec![0.0; 5 * 44100]);
        let result = analyze(&buffer).unwrap();

        assert_eq!(result.duration, 5.0);
        assert_eq!(result.average_amplitude, 0.0);
        assert_eq!(result.peak_count, 0);
        assert_eq!(result.estimated_bpm, None);
        assert_eq!(result.channels, 1);
        assert_eq!(result.sample_rate, 44100);
    }

    #[test]
    fn test_click_track_120_bpm() {
        let buffer = click_track(44100, 10.0, 0.5);
        let result = analyze(&buffer).unwrap();

        assert!((19..=21).contains(&result.peak_count), "peaks = {}", result.peak_count);
        assert_eq!(result.estimated_bpm, Some(120));
    }

    #[test]
    fn test_duration_is_exact() {
        for (rate, frames) in [(44100u32, 12345usize), (48000, 48000), (22050, 7)] {
            let buffer = DecodedAudioBuffer::mono(rate, vec![0.25; frames]);
            let result = analyze(&buffer).unwrap();
            assert_eq!(result.duration, frames as f64 / rate as f64);
        }
    }

    #[test]
    fn test_idempotent() {
        let buffer = click_track(8000, 3.0, 0.3);
        let first = analyze(&buffer).unwrap();
        let second = analyze(&buffer).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_bpm_is_clamped() {
        // Dense clicks: min spacing caps at 5 peaks/sec = 300 BPM before clamp
        let fast = analyze(&click_track(1000, 10.0, 0.05)).unwrap();
        assert_eq!(fast.estimated_bpm, Some(SignalAnalyzer::MAX_BPM));

        // Two clicks in 10 seconds: 12 BPM before clamp
        let mut samples = vec![0.0; 10_000];
        samples[0] = 1.0;
        samples[5_000] = 1.0;
        let slow = analyze(&DecodedAudioBuffer::mono(1000, samples)).unwrap();
        assert_eq!(slow.peak_count, 2);
        assert_eq!(slow.estimated_bpm, Some(SignalAnalyzer::MIN_BPM));
    }

    #[test]
    fn test_single_peak_has_no_bpm() {
        let mut samples = vec![0.0; 1000];
        samples[500] = 0.8;
        let result = analyze(&DecodedAudioBuffer::mono(1000, samples)).unwrap();
        assert_eq!(result.peak_count, 1);
        assert_eq!(result.estimated_bpm, None);
    }

    #[test]
    fn test_only_channel_zero_is_measured() {
        let left = vec![0.5; 100];
        let right = vec![1.0; 100];
        let result = analyze(&DecodedAudioBuffer::new(100, vec![left, right])).unwrap();
        assert_eq!(result.channels, 2);
        assert!((result.average_amplitude - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_empty_buffer_fails() {
        assert_eq!(
            analyze(&DecodedAudioBuffer::new(44100, Vec::new())),
            Err(AnalysisError::EmptyBuffer)
        );
        assert_eq!(
            analyze(&DecodedAudioBuffer::mono(44100, Vec::new())),
            Err(AnalysisError::EmptyBuffer)
        );
        assert_eq!(
            analyze(&DecodedAudioBuffer::mono(0, vec![0.1; 10])),
            Err(AnalysisError::InvalidSampleRate)
        );
    }

    #[test]
    fn test_labels() {
        let result = AnalysisResult {
            duration: 5.0,
            channels: 2,
            sample_rate: 44100,
            estimated_bpm: None,
            average_amplitude: 0.12345,
            peak_count: 0,
        };
        assert_eq!(result.duration_label(), "5.00 seconds");
        assert_eq!(result.bpm_label(), "N/A");
        assert_eq!(result.amplitude_label(), "0.123");
        assert_eq!(result.sample_rate_label(), "44100 Hz");
    }
}
