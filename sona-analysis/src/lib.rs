//! Signal analysis for SONA
//!
//! Turns a decoded buffer into display metrics (duration, average
//! amplitude, peak count, tempo estimate) and a waveform overview.

mod analyzer;
mod buffer;
mod peaks;
mod waveform;

pub use analyzer::{analyze, AnalysisError, AnalysisResult, SignalAnalyzer};
pub use buffer::DecodedAudioBuffer;
pub use peaks::{average_amplitude, PeakDetector};
pub use waveform::{FrequencyBand, WaveformOverview, WaveformPoint};
