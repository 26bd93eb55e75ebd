//! Audio catalog for SONA - entries, uploads, decoding and config

mod blob;
mod catalog;
mod config;
mod decoder;
mod entry;
mod upload;

pub use blob::{BlobHandle, BlobStore};
pub use catalog::{AudioLibrary, LibraryError, Removal};
pub use config::Config;
pub use decoder::{AudioDecoder, DecodeError, DecodeSource, SymphoniaDecoder};
pub use entry::{AudioEntry, EntryId, SourceRef};
pub use upload::{UploadFile, AUDIO_EXTENSIONS};
