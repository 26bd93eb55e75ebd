//! Catalog entries and the references to their audio data

use crate::blob::BlobHandle;
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

/// Unique identifier of a catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(String);

impl EntryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Where an entry's bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    /// File on local disk
    Path(PathBuf),
    /// Remote location, fetched by the decoder
    Url(String),
    /// Locally uploaded bytes held in the blob store
    Blob(BlobHandle),
}

impl SourceRef {
    /// Whether the source owns a transient blob handle
    pub fn is_blob(&self) -> bool {
        matches!(self, SourceRef::Blob(_))
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Path(path) => write!(f, "{}", path.display()),
            SourceRef::Url(url) => f.write_str(url),
            SourceRef::Blob(handle) => write!(f, "blob:{}", handle.id()),
        }
    }
}

/// One audio item in the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct AudioEntry {
    id: EntryId,
    name: String,
    filename: Option<String>,
    source: SourceRef,
    created_at: SystemTime,
}

impl AudioEntry {
    pub fn new(id: EntryId, name: impl Into<String>, source: SourceRef) -> Self {
        Self {
            id,
            name: name.into(),
            filename: None,
            source,
            created_at: SystemTime::now(),
        }
    }

    /// Attach the original file name
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Override the creation time
    pub fn with_created_at(mut self, created_at: SystemTime) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn id(&self) -> &EntryId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn source(&self) -> &SourceRef {
        &self.source
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// The only mutation an entry allows
    pub(crate) fn rename(&mut self, name: String) {
        self.name = name;
    }
}
