//! Amplitude peak detection with a minimum spacing between peaks

/// Threshold-based peak detector over a single channel
///
/// A sample is a peak when its magnitude exceeds the adaptive threshold
/// (`average_amplitude * multiplier`, never below `floor`) and at least
/// `min_interval_secs` worth of samples have passed since the last
/// accepted peak. The first qualifying sample is always accepted.
#[derive(Debug, Clone, Copy)]
pub struct PeakDetector {
    sample_rate: u32,
    multiplier: f32,
    floor: f32,
    min_interval_secs: f64,
}

impl PeakDetector {
    /// Threshold multiplier applied to the average amplitude
    pub const THRESHOLD_MULTIPLIER: f32 = 1.5;
    /// Lowest threshold used, so silence and near-silence never yield peaks
    pub const SILENCE_FLOOR: f32 = 1e-4;
    /// Minimum time between two accepted peaks (200ms)
    pub const MIN_INTERVAL_SECS: f64 = 0.2;

    /// Create a detector with the default multiplier, floor and spacing
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            multiplier: Self::THRESHOLD_MULTIPLIER,
            floor: Self::SILENCE_FLOOR,
            min_interval_secs: Self::MIN_INTERVAL_SECS,
        }
    }

    /// Override the threshold multiplier
    pub fn with_multiplier(mut self, multiplier: f32) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Override the threshold floor
    pub fn with_floor(mut self, floor: f32) -> Self {
        self.floor = floor.max(0.0);
        self
    }

    /// Override the minimum spacing between peaks
    pub fn with_min_interval(mut self, secs: f64) -> Self {
        self.min_interval_secs = secs.max(0.0);
        self
    }

    /// Minimum number of samples between two accepted peaks
    pub fn min_gap_samples(&self) -> usize {
        (self.min_interval_secs * self.sample_rate as f64).round() as usize
    }

    /// Threshold used for a signal with the given average amplitude
    pub fn threshold(&self, average_amplitude: f32) -> f32 {
        (average_amplitude * self.multiplier).max(self.floor)
    }

    /// Scan samples in index order and return accepted peak indices
    pub fn detect(&self, samples: &[f32], average_amplitude: f32) -> Vec<usize> {
        let threshold = self.threshold(average_amplitude);
        let min_gap = self.min_gap_samples();

        let mut peaks = Vec::new();
        let mut last_peak: Option<usize> = None;

        for (i, sample) in samples.iter().enumerate() {
            if sample.abs() <= threshold {
                continue;
            }
            let spaced = match last_peak {
                Some(prev) => i - prev >= min_gap,
                None => true,
            };
            if spaced {
                peaks.push(i);
                last_peak = Some(i);
            }
        }

        peaks
    }
}

/// Mean absolute value of the samples, 0.0 when empty
pub fn average_amplitude(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    // Accumulate in f64 so long tracks don't lose precision
    let sum: f64 = samples.iter().map(|s| s.abs() as f64).sum();
    (sum / samples.len() as f64) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_amplitude() {
        assert_eq!(average_amplitude(&[]), 0.0);
        assert!((average_amplitude(&[0.5, -0.5, 0.0, 1.0]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_silence_has_no_peaks() {
        let detector = PeakDetector::new(1000);
        let samples = vec![0.0; 5000];
        assert!(detector.detect(&samples, 0.0).is_empty());
    }

    #[test]
    fn test_floor_suppresses_noise() {
        let detector = PeakDetector::new(1000);
        let samples: Vec<f32> = (0..5000).map(|i| if i % 2 == 0 { 1e-5 } else { -1e-5 }).collect();
        let avg = average_amplitude(&samples);
        assert!(detector.detect(&samples, avg).is_empty());
    }

    #[test]
    fn test_first_peak_at_index_zero_is_accepted() {
        let detector = PeakDetector::new(1000);
        let mut samples = vec![0.0; 1000];
        samples[0] = 1.0;
        assert_eq!(detector.detect(&samples, average_amplitude(&samples)), vec![0]);
    }

    #[test]
    fn test_min_gap_is_enforced() {
        let detector = PeakDetector::new(1000);
        assert_eq!(detector.min_gap_samples(), 200);

        // Bursts every 50 samples; only one per 200 may survive
        let samples: Vec<f32> = (0..2000).map(|i| if i % 50 == 0 { 0.9 } else { 0.0 }).collect();
        let peaks = detector.detect(&samples, average_amplitude(&samples));

        assert_eq!(peaks, vec![0, 200, 400, 600, 800, 1000, 1200, 1400, 1600, 1800]);
        for pair in peaks.windows(2) {
            assert!(pair[1] - pair[0] >= detector.min_gap_samples());
        }
    }

    #[test]
    fn test_threshold_respects_floor() {
        let detector = PeakDetector::new(44100);
        assert_eq!(detector.threshold(0.0), PeakDetector::SILENCE_FLOOR);
        assert!((detector.threshold(0.2) - 0.3).abs() < 1e-6);

        let custom = PeakDetector::new(44100).with_floor(0.0).with_multiplier(2.0);
        assert_eq!(custom.threshold(0.0), 0.0);
        assert!((custom.threshold(0.2) - 0.4).abs() < 1e-6);
    }
}
