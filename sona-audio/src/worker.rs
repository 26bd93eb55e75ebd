//! Background decoding
//!
//! Each request is decoded on its own thread; the only way back to the
//! event thread is a generation-tagged message on the completion channel.

use crate::playback::{DecodeRequest, Generation};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use sona_analysis::DecodedAudioBuffer;
use sona_library::{AudioDecoder, DecodeError, EntryId};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Decode result delivered to the event thread
#[derive(Debug)]
pub struct DecodeCompletion {
    pub generation: Generation,
    pub entry: EntryId,
    pub result: Result<Arc<DecodedAudioBuffer>, DecodeError>,
}

/// Runs an [`AudioDecoder`] off the event thread
pub struct DecodeWorker {
    decoder: Arc<dyn AudioDecoder>,
    completion_tx: Sender<DecodeCompletion>,
    completion_rx: Receiver<DecodeCompletion>,
}

impl DecodeWorker {
    pub fn new(decoder: Arc<dyn AudioDecoder>) -> Self {
        let (completion_tx, completion_rx) = unbounded();
        Self {
            decoder,
            completion_tx,
            completion_rx,
        }
    }

    /// Start decoding in the background
    pub fn dispatch(&self, request: DecodeRequest) {
        let decoder = self.decoder.clone();
        let tx = self.completion_tx.clone();
        let DecodeRequest {
            generation,
            entry,
            source,
        } = request;

        let spawned = thread::Builder::new()
            .name(format!("sona-decode-{}", generation.value()))
            .spawn({
                let entry = entry.clone();
                move || {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| decoder.decode(&source)))
                        .unwrap_or_else(|_| Err(DecodeError::Decode("decoder panicked".into())))
                        .and_then(validate)
                        .map(Arc::new);
                    // Receiver gone means the session was dropped
                    let _ = tx.send(DecodeCompletion {
                        generation,
                        entry,
                        result,
                    });
                }
            });

        if let Err(e) = spawned {
            tracing::error!(generation = %generation, error = %e, "failed to spawn decode thread");
            let _ = self.completion_tx.send(DecodeCompletion {
                generation,
                entry,
                result: Err(DecodeError::Io(e.to_string())),
            });
        }
    }

    /// Next finished decode, if any
    pub fn try_next(&self) -> Option<DecodeCompletion> {
        self.completion_rx.try_recv().ok()
    }

    /// Wait up to `timeout` for a finished decode
    pub fn next_timeout(&self, timeout: Duration) -> Option<DecodeCompletion> {
        match self.completion_rx.recv_timeout(timeout) {
            Ok(completion) => Some(completion),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

/// Reject buffers the analyzer and transport cannot use
fn validate(buffer: DecodedAudioBuffer) -> Result<DecodedAudioBuffer, DecodeError> {
    if buffer.is_empty() {
        return Err(DecodeError::Empty);
    }
    if buffer.sample_rate() == 0 {
        return Err(DecodeError::Decode("sample rate is zero".into()));
    }
    Ok(buffer)
}
