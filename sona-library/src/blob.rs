//! In-memory store for uploaded audio bytes
//!
//! Each upload gets a transient handle. A handle is revoked exactly once,
//! after which its bytes are dropped by the store (decodes already in
//! flight keep their own `Arc`).

use std::collections::HashMap;
use std::sync::Arc;

/// Handle to bytes held in a [`BlobStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobHandle(u64);

impl BlobHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Owner of uploaded payloads
#[derive(Debug, Default)]
pub struct BlobStore {
    blobs: HashMap<u64, Arc<[u8]>>,
    next_id: u64,
    revoked: u64,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a payload and hand out a handle to it
    pub fn insert(&mut self, bytes: impl Into<Arc<[u8]>>) -> BlobHandle {
        self.next_id += 1;
        let handle = BlobHandle(self.next_id);
        self.blobs.insert(handle.0, bytes.into());
        handle
    }

    /// Bytes behind a live handle
    pub fn resolve(&self, handle: BlobHandle) -> Option<Arc<[u8]>> {
        self.blobs.get(&handle.0).cloned()
    }

    /// Release a handle. Returns false if it was already released.
    pub fn revoke(&mut self, handle: BlobHandle) -> bool {
        if self.blobs.remove(&handle.0).is_some() {
            self.revoked += 1;
            true
        } else {
            false
        }
    }

    pub fn is_live(&self, handle: BlobHandle) -> bool {
        self.blobs.contains_key(&handle.0)
    }

    /// Number of handles not yet revoked
    pub fn live_count(&self) -> usize {
        self.blobs.len()
    }

    /// Total number of revocations performed
    pub fn revoked_count(&self) -> u64 {
        self.revoked
    }

    /// Release every live handle
    pub fn clear(&mut self) {
        self.revoked += self.blobs.len() as u64;
        self.blobs.clear();
    }
}
