//! Ordered in-memory catalog of audio entries with a single current selection

use crate::blob::BlobStore;
use crate::decoder::DecodeSource;
use crate::entry::{AudioEntry, EntryId, SourceRef};
use crate::upload::UploadFile;
use std::path::Path;
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Errors from catalog operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LibraryError {
    #[error("Not an audio file: {0}")]
    NotAudio(String),
    #[error("Upload is empty")]
    EmptyUpload,
    #[error("Upload is {size} bytes, limit is {max}")]
    UploadTooLarge { size: usize, max: usize },
    #[error("No entry with id {0}")]
    UnknownEntry(EntryId),
    #[error("An entry with id {0} already exists")]
    DuplicateEntry(EntryId),
    #[error("Uploaded data for {0} has been released")]
    SourceReleased(EntryId),
}

/// Outcome of removing an entry
#[derive(Debug, Clone)]
pub struct Removal {
    pub entry: AudioEntry,
    /// True if the removed entry was the current one
    pub was_current: bool,
    /// Current entry after the removal
    pub current: Option<EntryId>,
}

/// The audio catalog
///
/// Newest entries come first. Uploaded bytes live in the catalog's
/// [`BlobStore`] and are released when their entry is removed, after the
/// selection has moved away from it.
#[derive(Debug)]
pub struct AudioLibrary {
    entries: Vec<AudioEntry>,
    current: Option<EntryId>,
    blobs: BlobStore,
    next_local_id: u64,
    max_upload_bytes: usize,
}

impl Default for AudioLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioLibrary {
    /// Default upload size limit (10 MiB)
    pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

    const DEMO_ENTRIES: [(&'static str, &'static str, &'static str); 3] = [
        ("1", "Guitar Acoustic", "sample1.mp3"),
        ("2", "Electronic Beat", "sample2.mp3"),
        ("3", "Ambient Sounds", "sample3.mp3"),
    ];

    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            current: None,
            blobs: BlobStore::new(),
            next_local_id: 0,
            max_upload_bytes: Self::DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    /// Set the upload size limit
    pub fn with_max_upload_bytes(mut self, max: usize) -> Self {
        self.max_upload_bytes = max;
        self
    }

    /// Catalog seeded with the three bundled demo tracks from `dir`,
    /// each one a day older than the previous
    pub fn with_demo_entries(dir: &Path) -> Self {
        let mut library = Self::new();
        let now = SystemTime::now();
        for (age_days, (id, name, file)) in Self::DEMO_ENTRIES.iter().enumerate() {
            let created_at = now - Duration::from_secs(86_400 * age_days as u64);
            library.entries.push(
                AudioEntry::new(EntryId::new(*id), *name, SourceRef::Path(dir.join(file)))
                    .with_created_at(created_at),
            );
        }
        library
    }

    /// All entries in catalog order
    pub fn entries(&self) -> &[AudioEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &EntryId) -> Option<&AudioEntry> {
        self.entries.iter().find(|e| e.id() == id)
    }

    fn position(&self, id: &EntryId) -> Option<usize> {
        self.entries.iter().position(|e| e.id() == id)
    }

    /// Insert an entry at the front of the catalog
    pub fn add(&mut self, entry: AudioEntry) -> Result<(), LibraryError> {
        if self.get(entry.id()).is_some() {
            return Err(LibraryError::DuplicateEntry(entry.id().clone()));
        }
        tracing::debug!(entry = %entry.id(), name = entry.name(), "added entry");
        self.entries.insert(0, entry);
        Ok(())
    }

    /// Validate an upload, store its bytes and add it to the front
    pub fn upload(
        &mut self,
        file: UploadFile,
        custom_name: Option<&str>,
    ) -> Result<AudioEntry, LibraryError> {
        file.validate(self.max_upload_bytes)?;

        let name = file.display_name(custom_name);
        let id = EntryId::new(format!("local-{}", self.next_local_id + 1));
        if self.get(&id).is_some() {
            return Err(LibraryError::DuplicateEntry(id));
        }
        self.next_local_id += 1;

        let UploadFile {
            file_name, bytes, ..
        } = file;
        let handle = self.blobs.insert(bytes);
        let entry = AudioEntry::new(id, name, SourceRef::Blob(handle)).with_filename(file_name);

        if let Err(e) = self.add(entry.clone()) {
            self.blobs.revoke(handle);
            return Err(e);
        }
        tracing::info!(entry = %entry.id(), name = entry.name(), "uploaded audio");
        Ok(entry)
    }

    /// Change an entry's display name
    pub fn rename(&mut self, id: &EntryId, name: impl Into<String>) -> Result<(), LibraryError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id() == id)
            .ok_or_else(|| LibraryError::UnknownEntry(id.clone()))?;
        entry.rename(name.into());
        Ok(())
    }

    /// Make an entry current
    pub fn select(&mut self, id: &EntryId) -> Result<&AudioEntry, LibraryError> {
        let idx = self
            .position(id)
            .ok_or_else(|| LibraryError::UnknownEntry(id.clone()))?;
        self.current = Some(id.clone());
        Ok(&self.entries[idx])
    }

    pub fn clear_selection(&mut self) {
        self.current = None;
    }

    pub fn current(&self) -> Option<&AudioEntry> {
        self.current.as_ref().and_then(|id| self.get(id))
    }

    pub fn current_id(&self) -> Option<&EntryId> {
        self.current.as_ref()
    }

    /// Remove an entry
    ///
    /// If it was current, the selection moves to the entry that followed
    /// it, or to the first remaining entry when it was last. Uploaded bytes
    /// are released once the selection no longer points at the entry.
    pub fn remove(&mut self, id: &EntryId) -> Result<Removal, LibraryError> {
        let idx = self
            .position(id)
            .ok_or_else(|| LibraryError::UnknownEntry(id.clone()))?;

        let was_current = self.current.as_ref() == Some(id);
        let entry = self.entries.remove(idx);

        if was_current {
            self.current = self
                .entries
                .get(idx)
                .or_else(|| self.entries.first())
                .map(|e| e.id().clone());
        }

        if let SourceRef::Blob(handle) = entry.source() {
            debug_assert!(self.current.as_ref() != Some(entry.id()));
            if self.blobs.revoke(*handle) {
                tracing::debug!(entry = %entry.id(), "released uploaded data");
            }
        }

        tracing::info!(entry = %entry.id(), was_current, "removed entry");
        Ok(Removal {
            entry,
            was_current,
            current: self.current.clone(),
        })
    }

    /// Resolve an entry's source into something a decoder can read
    pub fn decode_source(&self, entry: &AudioEntry) -> Result<DecodeSource, LibraryError> {
        match entry.source() {
            SourceRef::Path(path) => Ok(DecodeSource::Path(path.clone())),
            SourceRef::Url(url) => Ok(DecodeSource::Url(url.clone())),
            SourceRef::Blob(handle) => {
                let data = self
                    .blobs
                    .resolve(*handle)
                    .ok_or_else(|| LibraryError::SourceReleased(entry.id().clone()))?;
                let extension = entry
                    .filename()
                    .and_then(|f| Path::new(f).extension())
                    .and_then(|e| e.to_str())
                    .map(str::to_ascii_lowercase);
                Ok(DecodeSource::Bytes { data, extension })
            }
        }
    }

    /// Uploaded-data store, for inspection
    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Drop every entry and release all uploaded data
    pub fn clear(&mut self) {
        self.current = None;
        self.entries.clear();
        self.blobs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(name: &str) -> UploadFile {
        UploadFile::new(name, Some("audio/mpeg"), vec![1, 2, 3])
    }

    fn ids(library: &AudioLibrary) -> Vec<&str> {
        library.entries().iter().map(|e| e.id().as_str()).collect()
    }

    #[test]
    fn test_demo_entries() {
        let library = AudioLibrary::with_demo_entries(Path::new("demos"));
        assert_eq!(ids(&library), vec!["1", "2", "3"]);
        assert_eq!(library.entries()[1].name(), "Electronic Beat");
        assert!(library.entries()[0].created_at() > library.entries()[2].created_at());
        assert!(library.current().is_none());
    }

    #[test]
    fn test_upload_prepends() {
        let mut library = AudioLibrary::with_demo_entries(Path::new("demos"));
        let entry = library.upload(audio("kick.wav"), Some("Kick")).unwrap();

        assert_eq!(entry.id().as_str(), "local-1");
        assert_eq!(entry.name(), "Kick");
        assert_eq!(entry.filename(), Some("kick.wav"));
        assert_eq!(ids(&library), vec!["local-1", "1", "2", "3"]);
        assert_eq!(library.blobs().live_count(), 1);
    }

    #[test]
    fn test_rejected_upload_changes_nothing() {
        let mut library = AudioLibrary::new();
        let err = library
            .upload(UploadFile::new("doc.pdf", Some("application/pdf"), vec![1]), None)
            .unwrap_err();
        assert!(matches!(err, LibraryError::NotAudio(_)));
        assert!(library.is_empty());
        assert_eq!(library.blobs().live_count(), 0);
    }

    #[test]
    fn test_upload_with_taken_id_stores_nothing() {
        let mut library = AudioLibrary::new();
        let squatter = AudioEntry::new("local-1".into(), "Squatter", SourceRef::Url("x".into()));
        library.add(squatter).unwrap();

        let err = library.upload(audio("kick.wav"), None).unwrap_err();
        assert_eq!(err, LibraryError::DuplicateEntry("local-1".into()));
        assert_eq!(library.len(), 1);
        assert_eq!(library.blobs().live_count(), 0);
        assert_eq!(library.blobs().revoked_count(), 0);
    }

    #[test]
    fn test_remove_non_current_keeps_selection() {
        let mut library = AudioLibrary::with_demo_entries(Path::new("demos"));
        library.select(&"1".into()).unwrap();

        let removal = library.remove(&"2".into()).unwrap();
        assert!(!removal.was_current);
        assert_eq!(library.len(), 2);
        assert_eq!(library.current_id(), Some(&EntryId::new("1")));
    }

    #[test]
    fn test_remove_current_advances_to_next() {
        let mut library = AudioLibrary::with_demo_entries(Path::new("demos"));
        library.select(&"2".into()).unwrap();

        let removal = library.remove(&"2".into()).unwrap();
        assert!(removal.was_current);
        assert_eq!(removal.current, Some(EntryId::new("3")));
    }

    #[test]
    fn test_remove_last_current_wraps_to_first() {
        let mut library = AudioLibrary::with_demo_entries(Path::new("demos"));
        library.select(&"3".into()).unwrap();

        library.remove(&"3".into()).unwrap();
        assert_eq!(library.current_id(), Some(&EntryId::new("1")));
    }

    #[test]
    fn test_remove_only_entry_clears_selection() {
        let mut library = AudioLibrary::new();
        let entry = library.upload(audio("a.mp3"), None).unwrap();
        library.select(entry.id()).unwrap();

        let removal = library.remove(entry.id()).unwrap();
        assert!(removal.current.is_none());
        assert!(library.current().is_none());
        assert_eq!(library.blobs().live_count(), 0);
        assert_eq!(library.blobs().revoked_count(), 1);
    }

    #[test]
    fn test_remove_unknown() {
        let mut library = AudioLibrary::new();
        assert_eq!(
            library.remove(&"nope".into()).unwrap_err(),
            LibraryError::UnknownEntry("nope".into())
        );
    }

    #[test]
    fn test_decode_source_for_released_blob() {
        let mut library = AudioLibrary::new();
        let entry = library.upload(audio("a.ogg"), None).unwrap();

        match library.decode_source(&entry).unwrap() {
            DecodeSource::Bytes { data, extension } => {
                assert_eq!(&*data, &[1, 2, 3]);
                assert_eq!(extension.as_deref(), Some("ogg"));
            }
            other => panic!("unexpected source {other:?}"),
        }

        library.remove(entry.id()).unwrap();
        assert!(matches!(
            library.decode_source(&entry),
            Err(LibraryError::SourceReleased(_))
        ));
    }

    #[test]
    fn test_rename() {
        let mut library = AudioLibrary::with_demo_entries(Path::new("demos"));
        library.rename(&"1".into(), "Renamed").unwrap();
        assert_eq!(library.get(&"1".into()).unwrap().name(), "Renamed");
        assert!(library.rename(&"9".into(), "x").is_err());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut library = AudioLibrary::with_demo_entries(Path::new("demos"));
        let dup = AudioEntry::new("1".into(), "Dup", SourceRef::Url("x".into()));
        assert_eq!(
            library.add(dup).unwrap_err(),
            LibraryError::DuplicateEntry("1".into())
        );
    }
}
