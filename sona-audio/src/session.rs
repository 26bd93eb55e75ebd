//! Session - the single owned object the presentation layer talks to

use crate::playback::{Completion, PlaybackEngine, PlaybackStatus, TickOutcome, TransitionError};
use crate::renderer::{RendererError, RendererFactory};
use crate::sync::{SyncError, SyncView, VisualizationSync};
use crate::worker::{DecodeCompletion, DecodeWorker};
use sona_analysis::{AnalysisError, AnalysisResult};
use sona_library::{
    AudioDecoder, AudioEntry, AudioLibrary, Config, DecodeError, EntryId, LibraryError, UploadFile,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Container name handed to the renderer factory
pub const WAVEFORM_CONTAINER: &str = "waveform";

/// Errors surfaced by [`Session`] operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Bad input: non-audio upload, unknown id and the like
    #[error(transparent)]
    Validation(#[from] LibraryError),
    #[error("No entry selected")]
    NoSelection,
    #[error("Failed to decode audio: {0}")]
    Decode(#[from] DecodeError),
    #[error("Waveform unavailable: {0}")]
    Resource(#[from] RendererError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("Transport is disabled: {0}")]
    TransportDisabled(String),
    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),
}

impl From<SyncError> for SessionError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Transition(t) => SessionError::Transition(t),
            SyncError::TransportDisabled(reason) => SessionError::TransportDisabled(reason),
        }
    }
}

/// Everything the presentation layer renders
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub entries: Vec<AudioEntry>,
    pub current_entry: Option<AudioEntry>,
    pub status: PlaybackStatus,
    pub is_playing: bool,
    /// Seconds; zero until decoded
    pub duration: f64,
    pub current_time: f64,
    pub metrics: Option<AnalysisResult>,
    pub error: Option<String>,
    pub analyzing: bool,
    pub sync: SyncView,
}

/// Audio catalog, transport, analysis and waveform for one user
///
/// All state lives here and is mutated only on the thread that owns the
/// session. Decodes run in the background and are folded in by
/// [`Session::pump`].
pub struct Session {
    config: Config,
    library: AudioLibrary,
    engine: PlaybackEngine,
    worker: DecodeWorker,
    sync: VisualizationSync,
    error: Option<String>,
    disposed: bool,
}

impl Session {
    /// Session over the demo catalog from `config.demo_dir`, or an empty one
    pub fn new(
        config: Config,
        decoder: Arc<dyn AudioDecoder>,
        renderer_factory: Box<dyn RendererFactory>,
    ) -> Self {
        let library = match &config.demo_dir {
            Some(dir) => AudioLibrary::with_demo_entries(dir),
            None => AudioLibrary::new(),
        };
        Self::with_library(config, library, decoder, renderer_factory)
    }

    /// Session over an existing catalog. The first entry, if any, is selected.
    pub fn with_library(
        config: Config,
        library: AudioLibrary,
        decoder: Arc<dyn AudioDecoder>,
        renderer_factory: Box<dyn RendererFactory>,
    ) -> Self {
        let library = library.with_max_upload_bytes(config.max_upload_bytes);
        let mut session = Self {
            config,
            library,
            engine: PlaybackEngine::new(),
            worker: DecodeWorker::new(decoder),
            sync: VisualizationSync::new(renderer_factory, WAVEFORM_CONTAINER),
            error: None,
            disposed: false,
        };

        if let Some(first) = session.library.entries().first().map(|e| e.id().clone()) {
            if let Err(e) = session.select(&first) {
                tracing::warn!(entry = %first, error = %e, "initial selection failed");
            }
        }
        session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn library(&self) -> &AudioLibrary {
        &self.library
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    pub fn sync(&self) -> &VisualizationSync {
        &self.sync
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Whether a decode for the current selection is still outstanding
    pub fn is_loading(&self) -> bool {
        self.engine.status() == PlaybackStatus::Loading
    }

    fn surface(&mut self, e: SessionError) -> SessionError {
        tracing::warn!(error = %e, "session error");
        self.error = Some(e.to_string());
        e
    }

    /// Make `id` current and start decoding it
    pub fn select(&mut self, id: &EntryId) -> Result<(), SessionError> {
        // Resolve everything before touching the selection
        let resolved = self
            .library
            .get(id)
            .cloned()
            .ok_or_else(|| LibraryError::UnknownEntry(id.clone()))
            .and_then(|entry| {
                let source = self.library.decode_source(&entry)?;
                Ok((entry, source))
            });
        let (entry, source) = match resolved {
            Ok(resolved) => resolved,
            Err(e) => return Err(self.surface(e.into())),
        };
        if let Err(e) = self.library.select(id) {
            return Err(self.surface(e.into()));
        }

        self.error = None;
        let request = self.engine.select_source(entry.id().clone(), source);
        tracing::info!(entry = %entry.id(), generation = %request.generation, "loading");
        self.sync.begin(request.generation);
        self.worker.dispatch(request);
        Ok(())
    }

    /// Add an uploaded file to the front of the catalog and select it
    pub fn upload(
        &mut self,
        file: UploadFile,
        custom_name: Option<&str>,
    ) -> Result<AudioEntry, SessionError> {
        let entry = match self.library.upload(file, custom_name) {
            Ok(entry) => entry,
            Err(e) => return Err(self.surface(e.into())),
        };
        self.select(entry.id())?;
        Ok(entry)
    }

    pub fn rename(&mut self, id: &EntryId, name: &str) -> Result<(), SessionError> {
        self.library
            .rename(id, name)
            .map_err(|e| self.surface(e.into()))
    }

    /// Remove an entry; if it was current, move on to the next one
    pub fn delete(&mut self, id: &EntryId) -> Result<AudioEntry, SessionError> {
        let removal = match self.library.remove(id) {
            Ok(removal) => removal,
            Err(e) => return Err(self.surface(e.into())),
        };

        if removal.was_current {
            match removal.current {
                Some(next) => self.select(&next)?,
                None => {
                    tracing::debug!("catalog empty, detaching");
                    self.engine.reset();
                    self.sync.detach();
                }
            }
        }
        Ok(removal.entry)
    }

    /// Analyze `id`: selects it, or re-runs analysis when it is already loaded
    pub fn analyze(&mut self, id: &EntryId) -> Result<(), SessionError> {
        let loaded = self.engine.entry() == Some(id) && self.engine.buffer().is_some();
        if !loaded {
            return self.select(id);
        }
        match self.sync.reanalyze() {
            Ok(_) => Ok(()),
            Err(e) => Err(self.surface(e.into())),
        }
    }

    pub fn play(&mut self) -> Result<(), SessionError> {
        self.ensure_selection()?;
        Ok(self.sync.play(&mut self.engine)?)
    }

    pub fn pause(&mut self) -> Result<(), SessionError> {
        self.ensure_selection()?;
        Ok(self.sync.pause(&mut self.engine)?)
    }

    pub fn toggle_play(&mut self) -> Result<(), SessionError> {
        self.ensure_selection()?;
        Ok(self.sync.toggle(&mut self.engine)?)
    }

    /// Seek to `seconds`, clamped to the source. Returns the new position.
    pub fn seek(&mut self, seconds: f64) -> Result<f64, SessionError> {
        self.ensure_selection()?;
        Ok(self.sync.seek(&mut self.engine, seconds)?)
    }

    fn ensure_selection(&mut self) -> Result<(), SessionError> {
        if self.library.current_id().is_none() {
            return Err(self.surface(SessionError::NoSelection));
        }
        Ok(())
    }

    /// Advance the playhead by `elapsed` of wall time
    pub fn tick(&mut self, elapsed: Duration) -> TickOutcome {
        let outcome = self.engine.tick(elapsed);
        self.sync.after_tick(outcome);
        outcome
    }

    /// Fold in finished decodes and pending renderer callbacks
    ///
    /// Returns the number of messages applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Some(completion) = self.worker.try_next() {
            self.apply_completion(completion);
            applied += 1;
        }
        applied + self.pump_callbacks()
    }

    /// Like [`Session::pump`], waiting up to `timeout` for a decode first
    pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
        let mut applied = 0;
        if let Some(completion) = self.worker.next_timeout(timeout) {
            self.apply_completion(completion);
            applied += 1;
        }
        applied + self.pump()
    }

    fn pump_callbacks(&mut self) -> usize {
        match self.sync.pump(&mut self.engine) {
            Ok(applied) => applied,
            Err(e) => {
                self.surface(e.into());
                0
            }
        }
    }

    fn apply_completion(&mut self, completion: DecodeCompletion) {
        let DecodeCompletion {
            generation,
            entry,
            result,
        } = completion;

        match self.engine.complete_decode(generation, result) {
            Completion::Discarded => {
                tracing::debug!(generation = %generation, entry = %entry, "dropped superseded decode");
            }
            Completion::Ready(buffer) => {
                if let Err(e) = self.sync.attach(generation, buffer) {
                    self.surface(e.into());
                }
            }
            Completion::Failed(e) => {
                self.sync.fail(generation);
                self.surface(e.into());
            }
        }
    }

    /// Snapshot for rendering
    pub fn view(&self) -> SessionView {
        let state = self.engine.state();
        // Metrics only ever describe the engine's current generation
        let metrics = if self.sync.generation() == Some(self.engine.generation()) {
            self.sync.metrics().cloned()
        } else {
            None
        };

        SessionView {
            entries: self.library.entries().to_vec(),
            current_entry: self.library.current().cloned(),
            status: state.status,
            is_playing: state.is_playing(),
            duration: state.duration_secs,
            current_time: state.position_secs,
            metrics,
            error: self.error.clone(),
            analyzing: self.sync.analyzing(),
            sync: self.sync.view(state),
        }
    }

    /// Release the renderer, the catalog and all uploaded data
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.sync.detach();
        self.engine.reset();
        self.library.clear();
        self.error = None;
        tracing::debug!("session disposed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::HeadlessRendererFactory;
    use sona_analysis::DecodedAudioBuffer;
    use sona_library::DecodeSource;

    struct ToneDecoder;

    impl AudioDecoder for ToneDecoder {
        fn decode(&self, _source: &DecodeSource) -> Result<DecodedAudioBuffer, DecodeError> {
            Ok(DecodedAudioBuffer::mono(100, vec![0.25; 300]))
        }
    }

    fn session(library: AudioLibrary) -> Session {
        Session::with_library(
            Config::default(),
            library,
            Arc::new(ToneDecoder),
            Box::new(HeadlessRendererFactory::new(16)),
        )
    }

    fn settle(session: &mut Session) {
        for _ in 0..100 {
            session.pump_timeout(Duration::from_millis(50));
            if !session.is_loading() && !session.view().analyzing {
                return;
            }
        }
        panic!("session did not settle");
    }

    #[test]
    fn test_empty_session() {
        let mut session = Session::new(
            Config::default(),
            Arc::new(ToneDecoder),
            Box::new(HeadlessRendererFactory::new(16)),
        );
        let view = session.view();
        assert!(view.entries.is_empty());
        assert_eq!(view.status, PlaybackStatus::Idle);
        assert_eq!(session.play(), Err(SessionError::NoSelection));
    }

    #[test]
    fn test_upload_selects_and_analyzes() {
        let mut session = session(AudioLibrary::new());
        let entry = session
            .upload(UploadFile::new("tone.wav", Some("audio/wav"), vec![0; 8]), None)
            .unwrap();
        assert_eq!(entry.name(), "tone");
        settle(&mut session);

        let view = session.view();
        assert_eq!(view.current_entry.as_ref().map(|e| e.id()), Some(entry.id()));
        assert_eq!(view.duration, 3.0);
        assert_eq!(view.metrics.unwrap().average_amplitude, 0.25);
        assert!(view.error.is_none());
    }

    #[test]
    fn test_rejected_upload_sets_error() {
        let mut session = session(AudioLibrary::new());
        let err = session
            .upload(UploadFile::new("notes.txt", Some("text/plain"), vec![1]), None)
            .unwrap_err();
        assert!(matches!(err, SessionError::Validation(LibraryError::NotAudio(_))));
        assert!(session.view().error.is_some());
        assert!(session.view().entries.is_empty());

        session.clear_error();
        assert!(session.view().error.is_none());
    }

    #[test]
    fn test_transport_after_ready() {
        let mut session = session(AudioLibrary::new());
        session
            .upload(UploadFile::new("tone.wav", None, vec![0; 8]), None)
            .unwrap();
        settle(&mut session);

        session.toggle_play().unwrap();
        session.pump();
        session.tick(Duration::from_secs(1));
        let view = session.view();
        assert!(view.is_playing);
        assert_eq!(view.current_time, 1.0);
        assert_eq!(view.sync.transport_label, "0:01 / 0:03");

        assert_eq!(session.seek(2.5), Ok(2.5));
        session.pause().unwrap();
        session.pump();
        assert_eq!(session.view().status, PlaybackStatus::Paused);
        assert_eq!(session.view().current_time, 2.5);
    }

    #[test]
    fn test_failed_select_keeps_state() {
        let mut session = session(AudioLibrary::new());
        let entry = session
            .upload(UploadFile::new("tone.wav", None, vec![0; 8]), None)
            .unwrap();
        settle(&mut session);
        let generation = session.engine().generation();

        let err = session.select(&EntryId::new("missing")).unwrap_err();
        assert_eq!(err, SessionError::Validation(LibraryError::UnknownEntry("missing".into())));
        assert_eq!(session.library().current_id(), Some(entry.id()));
        assert_eq!(session.engine().generation(), generation);
        assert_eq!(session.view().status, PlaybackStatus::Ready);
    }

    #[test]
    fn test_analyze_current_reruns() {
        let mut session = session(AudioLibrary::new());
        let entry = session
            .upload(UploadFile::new("tone.wav", None, vec![0; 8]), None)
            .unwrap();
        settle(&mut session);

        session.analyze(entry.id()).unwrap();
        assert!(session.view().metrics.is_some());
        assert_eq!(session.engine().generation().value(), 1);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let mut session = session(AudioLibrary::new());
        session
            .upload(UploadFile::new("tone.wav", None, vec![0; 8]), None)
            .unwrap();
        settle(&mut session);

        session.dispose();
        session.dispose();
        assert!(session.view().entries.is_empty());
        assert_eq!(session.library().blobs().live_count(), 0);
        assert_eq!(session.view().status, PlaybackStatus::Idle);
    }
}
