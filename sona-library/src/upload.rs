//! Validation of user-supplied audio files

use crate::catalog::LibraryError;
use std::path::Path;

/// Extensions accepted when no media type is given
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac", "m4a", "aac"];

/// A file handed over by the presentation layer
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    /// MIME type reported by the picker, e.g. "audio/mpeg"
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, media_type: Option<&str>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            media_type: media_type.map(str::to_string),
            bytes,
        }
    }

    /// Lowercase extension of the file name
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
    }

    /// Whether this looks like an audio file
    pub fn is_audio(&self) -> bool {
        match &self.media_type {
            Some(media_type) => media_type.to_ascii_lowercase().starts_with("audio/"),
            None => self
                .extension()
                .map_or(false, |ext| AUDIO_EXTENSIONS.contains(&ext.as_str())),
        }
    }

    /// File name without its extension
    pub fn stem(&self) -> &str {
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.file_name)
    }

    /// Display name: custom name if non-blank, otherwise the file stem
    pub fn display_name(&self, custom_name: Option<&str>) -> String {
        match custom_name.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.stem().to_string(),
        }
    }

    /// Reject non-audio, empty and oversized payloads
    pub fn validate(&self, max_bytes: usize) -> Result<(), LibraryError> {
        if !self.is_audio() {
            return Err(LibraryError::NotAudio(self.file_name.clone()));
        }
        if self.bytes.is_empty() {
            return Err(LibraryError::EmptyUpload);
        }
        if self.bytes.len() > max_bytes {
            return Err(LibraryError::UploadTooLarge {
                size: self.bytes.len(),
                max: max_bytes,
            });
        }
        Ok(())
    }
}
