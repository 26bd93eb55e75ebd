//! Playback engine - transport state machine keyed by selection generation

use sona_analysis::DecodedAudioBuffer;
use sona_library::{DecodeError, DecodeSource, EntryId};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Identifier of a source selection
///
/// Every selection gets a strictly larger generation than the previous
/// one. Asynchronous results carry the generation they were started for
/// and are dropped when it no longer matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    pub fn value(self) -> u64 {
        self.0
    }

    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Transport status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Finished,
    Error,
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackStatus::Idle => "idle",
            PlaybackStatus::Loading => "loading",
            PlaybackStatus::Ready => "ready",
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Paused => "paused",
            PlaybackStatus::Finished => "finished",
            PlaybackStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// Transport actions, for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportAction {
    Play,
    Pause,
    Seek,
    Fail,
}

impl fmt::Display for TransportAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportAction::Play => "play",
            TransportAction::Pause => "pause",
            TransportAction::Seek => "seek",
            TransportAction::Fail => "fail",
        };
        f.write_str(name)
    }
}

/// Rejected transport request; state is left untouched
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot {action} while {from}")]
pub struct TransitionError {
    pub from: PlaybackStatus,
    pub action: TransportAction,
}

/// Why the engine entered [`PlaybackStatus::Error`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackFailure {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("playback backend failed: {0}")]
    Backend(String),
}

/// Snapshot of the transport
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaybackState {
    pub status: PlaybackStatus,
    /// Seconds from the start
    pub position_secs: f64,
    pub duration_secs: f64,
    /// Cause, when `status` is `Error`
    pub failure: Option<PlaybackFailure>,
}

impl PlaybackState {
    fn loading() -> Self {
        Self {
            status: PlaybackStatus::Loading,
            ..Self::default()
        }
    }

    pub fn is_playing(&self) -> bool {
        self.status == PlaybackStatus::Playing
    }

    /// Whether a buffer is loaded and the transport can be driven
    pub fn is_loaded(&self) -> bool {
        matches!(
            self.status,
            PlaybackStatus::Ready
                | PlaybackStatus::Playing
                | PlaybackStatus::Paused
                | PlaybackStatus::Finished
        )
    }
}

/// Work item for the decode worker
#[derive(Debug, Clone)]
pub struct DecodeRequest {
    pub generation: Generation,
    pub entry: EntryId,
    pub source: DecodeSource,
}

/// What the engine did with a decode result
#[derive(Debug, Clone)]
pub enum Completion {
    /// Result belonged to a superseded selection and was dropped
    Discarded,
    /// Buffer accepted, transport is `Ready`
    Ready(Arc<DecodedAudioBuffer>),
    /// Decode failed, transport is in `Error`
    Failed(DecodeError),
}

/// Result of a position tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Not playing, nothing moved
    Stalled,
    /// Position advanced to the given second
    Advanced(f64),
    /// Reached the end of the buffer
    Finished(f64),
}

/// Transport state machine for the current source
///
/// Owns exactly one [`PlaybackState`] which is replaced wholesale on every
/// selection. Only results tagged with the current [`Generation`] may
/// touch it.
#[derive(Debug, Default)]
pub struct PlaybackEngine {
    generation: Generation,
    state: PlaybackState,
    entry: Option<EntryId>,
    buffer: Option<Arc<DecodedAudioBuffer>>,
}

impl PlaybackEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn status(&self) -> PlaybackStatus {
        self.state.status
    }

    /// Entry the current generation belongs to
    pub fn entry(&self) -> Option<&EntryId> {
        self.entry.as_ref()
    }

    /// Decoded buffer of the current generation, once ready
    pub fn buffer(&self) -> Option<&Arc<DecodedAudioBuffer>> {
        self.buffer.as_ref()
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        generation == self.generation
    }

    /// Start loading a new source, superseding whatever was in flight
    pub fn select_source(&mut self, entry: EntryId, source: DecodeSource) -> DecodeRequest {
        self.generation = self.generation.next();
        self.state = PlaybackState::loading();
        self.buffer = None;
        self.entry = Some(entry.clone());

        tracing::debug!(generation = %self.generation, entry = %entry, "selected source");

        DecodeRequest {
            generation: self.generation,
            entry,
            source,
        }
    }

    /// Apply a decode result
    pub fn complete_decode(
        &mut self,
        generation: Generation,
        result: Result<Arc<DecodedAudioBuffer>, DecodeError>,
    ) -> Completion {
        if !self.is_current(generation) || self.state.status != PlaybackStatus::Loading {
            tracing::debug!(
                generation = %generation,
                current = %self.generation,
                "discarding superseded decode"
            );
            return Completion::Discarded;
        }

        match result {
            Ok(buffer) => {
                self.state = PlaybackState {
                    status: PlaybackStatus::Ready,
                    position_secs: 0.0,
                    duration_secs: buffer.duration_secs(),
                    failure: None,
                };
                self.buffer = Some(buffer.clone());
                tracing::info!(
                    generation = %generation,
                    duration = self.state.duration_secs,
                    "source ready"
                );
                Completion::Ready(buffer)
            }
            Err(e) => {
                tracing::warn!(generation = %generation, error = %e, "decode failed");
                self.state = PlaybackState {
                    status: PlaybackStatus::Error,
                    failure: Some(PlaybackFailure::Decode(e.clone())),
                    ..PlaybackState::default()
                };
                Completion::Failed(e)
            }
        }
    }

    /// Start or resume playback. From `Finished`, restarts at zero.
    pub fn play(&mut self) -> Result<(), TransitionError> {
        match self.state.status {
            PlaybackStatus::Ready | PlaybackStatus::Paused | PlaybackStatus::Playing => {}
            PlaybackStatus::Finished => self.state.position_secs = 0.0,
            from => return Err(self.invalid(from, TransportAction::Play)),
        }
        self.state.status = PlaybackStatus::Playing;
        Ok(())
    }

    /// Pause playback
    pub fn pause(&mut self) -> Result<(), TransitionError> {
        match self.state.status {
            PlaybackStatus::Ready | PlaybackStatus::Paused => Ok(()),
            PlaybackStatus::Playing => {
                self.state.status = PlaybackStatus::Paused;
                Ok(())
            }
            from => Err(self.invalid(from, TransportAction::Pause)),
        }
    }

    /// Toggle play/pause
    pub fn toggle(&mut self) -> Result<(), TransitionError> {
        if self.state.is_playing() {
            self.pause()
        } else {
            self.play()
        }
    }

    /// Move the playhead, clamped to `[0, duration]`. Returns the new position.
    pub fn seek(&mut self, seconds: f64) -> Result<f64, TransitionError> {
        if !self.state.is_loaded() {
            return Err(self.invalid(self.state.status, TransportAction::Seek));
        }

        let target = if seconds.is_nan() { 0.0 } else { seconds };
        let position = target.clamp(0.0, self.state.duration_secs);
        self.state.position_secs = position;

        if self.state.status == PlaybackStatus::Finished && position < self.state.duration_secs {
            self.state.status = PlaybackStatus::Paused;
        }
        Ok(position)
    }

    /// Advance the playhead while playing
    pub fn tick(&mut self, elapsed: Duration) -> TickOutcome {
        if self.state.status != PlaybackStatus::Playing {
            return TickOutcome::Stalled;
        }

        let position = (self.state.position_secs + elapsed.as_secs_f64()).min(self.state.duration_secs);
        self.state.position_secs = position;

        if position >= self.state.duration_secs {
            self.state.status = PlaybackStatus::Finished;
            tracing::debug!(generation = %self.generation, "playback finished");
            TickOutcome::Finished(position)
        } else {
            TickOutcome::Advanced(position)
        }
    }

    /// Adopt a position reported by the playback backend
    ///
    /// While playing the playhead never moves backwards this way.
    pub fn sync_position(&mut self, generation: Generation, seconds: f64) -> bool {
        if !self.is_current(generation) || !self.state.is_loaded() || seconds.is_nan() {
            return false;
        }

        let position = seconds.clamp(0.0, self.state.duration_secs);
        if self.state.is_playing() && position < self.state.position_secs {
            return false;
        }
        self.state.position_secs = position;
        true
    }

    /// Follow a backend-initiated start of playback
    pub fn follow_play(&mut self, generation: Generation) -> bool {
        self.is_current(generation) && !self.state.is_playing() && self.play().is_ok()
    }

    /// Follow a backend-initiated pause
    pub fn follow_pause(&mut self, generation: Generation) -> bool {
        self.is_current(generation) && self.state.is_playing() && self.pause().is_ok()
    }

    /// Backend reached the end of the source
    pub fn finish(&mut self, generation: Generation) -> bool {
        if !self.is_current(generation)
            || !matches!(self.state.status, PlaybackStatus::Playing | PlaybackStatus::Paused)
        {
            return false;
        }
        self.state.position_secs = self.state.duration_secs;
        self.state.status = PlaybackStatus::Finished;
        true
    }

    /// Backend failure while loading or playing
    pub fn fail(&mut self, generation: Generation, cause: impl Into<String>) -> Result<bool, TransitionError> {
        if !self.is_current(generation) {
            return Ok(false);
        }
        match self.state.status {
            PlaybackStatus::Loading | PlaybackStatus::Playing => {
                let cause = cause.into();
                tracing::warn!(generation = %generation, cause = cause.as_str(), "playback failed");
                self.state.status = PlaybackStatus::Error;
                self.state.failure = Some(PlaybackFailure::Backend(cause));
                Ok(true)
            }
            from => Err(self.invalid(from, TransportAction::Fail)),
        }
    }

    /// Drop the current source and return to `Idle`
    ///
    /// Bumps the generation so anything still in flight is discarded.
    pub fn reset(&mut self) {
        self.generation = self.generation.next();
        self.state = PlaybackState::default();
        self.buffer = None;
        self.entry = None;
    }

    fn invalid(&self, from: PlaybackStatus, action: TransportAction) -> TransitionError {
        tracing::debug!(%from, %action, "rejected transport request");
        TransitionError { from, action }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn source() -> DecodeSource {
        DecodeSource::Path(PathBuf::from("a.wav"))
    }

    fn buffer(secs: usize) -> Arc<DecodedAudioBuffer> {
        DecodedAudioBuffer::mono(100, vec![0.0; secs * 100]).into_arc()
    }

    fn ready_engine(secs: usize) -> (PlaybackEngine, Generation) {
        let mut engine = PlaybackEngine::new();
        let req = engine.select_source("a".into(), source());
        engine.complete_decode(req.generation, Ok(buffer(secs)));
        (engine, req.generation)
    }

    #[test]
    fn test_select_starts_loading_with_new_generation() {
        let mut engine = PlaybackEngine::new();
        assert_eq!(engine.status(), PlaybackStatus::Idle);

        let first = engine.select_source("a".into(), source());
        let second = engine.select_source("b".into(), source());
        assert!(second.generation > first.generation);
        assert_eq!(engine.status(), PlaybackStatus::Loading);
        assert_eq!(engine.entry(), Some(&EntryId::new("b")));
    }

    #[test]
    fn test_stale_decode_is_discarded() {
        let mut engine = PlaybackEngine::new();
        let a = engine.select_source("a".into(), source());
        let b = engine.select_source("b".into(), source());

        assert!(matches!(engine.complete_decode(a.generation, Ok(buffer(3))), Completion::Discarded));
        assert_eq!(engine.status(), PlaybackStatus::Loading);

        // A stale failure is not reported either
        assert!(matches!(
            engine.complete_decode(a.generation, Err(DecodeError::Empty)),
            Completion::Discarded
        ));
        assert_eq!(engine.status(), PlaybackStatus::Loading);

        assert!(matches!(engine.complete_decode(b.generation, Ok(buffer(5))), Completion::Ready(_)));
        assert_eq!(engine.state().duration_secs, 5.0);
    }

    #[test]
    fn test_decode_failure_enters_error() {
        let mut engine = PlaybackEngine::new();
        let req = engine.select_source("a".into(), source());
        engine.complete_decode(req.generation, Err(DecodeError::NoAudioTrack));

        assert_eq!(engine.status(), PlaybackStatus::Error);
        assert_eq!(
            engine.state().failure,
            Some(PlaybackFailure::Decode(DecodeError::NoAudioTrack))
        );
        assert!(engine.play().is_err());

        // Recoverable through a new selection
        engine.select_source("a".into(), source());
        assert_eq!(engine.status(), PlaybackStatus::Loading);
        assert!(engine.state().failure.is_none());
    }

    #[test]
    fn test_play_pause_transitions() {
        let (mut engine, _) = ready_engine(2);
        engine.play().unwrap();
        assert_eq!(engine.status(), PlaybackStatus::Playing);
        engine.pause().unwrap();
        assert_eq!(engine.status(), PlaybackStatus::Paused);
        engine.toggle().unwrap();
        assert_eq!(engine.status(), PlaybackStatus::Playing);
    }

    #[test]
    fn test_invalid_transitions_are_reported() {
        let mut engine = PlaybackEngine::new();
        assert_eq!(
            engine.play(),
            Err(TransitionError {
                from: PlaybackStatus::Idle,
                action: TransportAction::Play
            })
        );

        engine.select_source("a".into(), source());
        assert!(engine.pause().is_err());
        assert!(engine.seek(1.0).is_err());
        assert_eq!(engine.status(), PlaybackStatus::Loading);
    }

    #[test]
    fn test_seek_clamps() {
        let (mut engine, _) = ready_engine(10);
        assert_eq!(engine.seek(-3.0), Ok(0.0));
        assert_eq!(engine.seek(42.0), Ok(10.0));
        assert_eq!(engine.seek(4.5), Ok(4.5));
        assert_eq!(engine.state().position_secs, 4.5);
    }

    #[test]
    fn test_tick_advances_to_finished() {
        let (mut engine, _) = ready_engine(1);
        assert_eq!(engine.tick(Duration::from_millis(100)), TickOutcome::Stalled);

        engine.play().unwrap();
        let mut last = 0.0;
        loop {
            match engine.tick(Duration::from_millis(300)) {
                TickOutcome::Advanced(pos) => {
                    assert!(pos >= last);
                    last = pos;
                }
                TickOutcome::Finished(pos) => {
                    assert_eq!(pos, 1.0);
                    break;
                }
                TickOutcome::Stalled => panic!("stalled while playing"),
            }
        }
        assert_eq!(engine.status(), PlaybackStatus::Finished);
        assert_eq!(engine.state().position_secs, 1.0);
    }

    #[test]
    fn test_play_after_finish_restarts() {
        let (mut engine, _) = ready_engine(1);
        engine.play().unwrap();
        engine.tick(Duration::from_secs(2));
        assert_eq!(engine.status(), PlaybackStatus::Finished);

        engine.play().unwrap();
        assert_eq!(engine.state().position_secs, 0.0);
        assert_eq!(engine.status(), PlaybackStatus::Playing);
    }

    #[test]
    fn test_seek_out_of_finished() {
        let (mut engine, _) = ready_engine(4);
        engine.play().unwrap();
        engine.tick(Duration::from_secs(5));
        engine.seek(1.0).unwrap();
        assert_eq!(engine.status(), PlaybackStatus::Paused);
    }

    #[test]
    fn test_sync_position_is_monotonic_while_playing() {
        let (mut engine, generation) = ready_engine(10);
        engine.play().unwrap();
        assert!(engine.sync_position(generation, 3.0));
        assert!(!engine.sync_position(generation, 2.0));
        assert_eq!(engine.state().position_secs, 3.0);

        engine.pause().unwrap();
        assert!(engine.sync_position(generation, 2.0));
        assert_eq!(engine.state().position_secs, 2.0);
    }

    #[test]
    fn test_stale_backend_events_are_ignored() {
        let (mut engine, old) = ready_engine(10);
        let req = engine.select_source("b".into(), source());
        engine.complete_decode(req.generation, Ok(buffer(3)));

        assert!(!engine.sync_position(old, 1.0));
        assert!(!engine.follow_play(old));
        assert!(!engine.finish(old));
        assert_eq!(engine.fail(old, "boom"), Ok(false));
        assert_eq!(engine.status(), PlaybackStatus::Ready);
        assert_eq!(engine.state().position_secs, 0.0);
    }

    #[test]
    fn test_backend_failure() {
        let (mut engine, generation) = ready_engine(10);
        assert!(engine.fail(generation, "device lost").is_err());

        engine.play().unwrap();
        assert_eq!(engine.fail(generation, "device lost"), Ok(true));
        assert_eq!(engine.status(), PlaybackStatus::Error);
        assert_eq!(
            engine.state().failure,
            Some(PlaybackFailure::Backend("device lost".into()))
        );
    }

    #[test]
    fn test_reset_supersedes_in_flight() {
        let mut engine = PlaybackEngine::new();
        let req = engine.select_source("a".into(), source());
        engine.reset();
        assert!(matches!(engine.complete_decode(req.generation, Ok(buffer(1))), Completion::Discarded));
        assert_eq!(engine.status(), PlaybackStatus::Idle);
        assert!(engine.entry().is_none());
    }
}
