//! Playback and visualization engine for SONA
//!
//! - Playback: transport state machine keyed by selection generation
//! - Worker: background decoding over a completion channel
//! - Renderer: waveform renderer seam and a headless implementation
//! - Sync: keeps renderer, transport and metrics on one generation
//! - Session: the owned object a front end drives

mod playback;
mod renderer;
mod session;
mod sync;
mod worker;

pub use playback::{
    Completion, DecodeRequest, Generation, PlaybackEngine, PlaybackFailure, PlaybackState,
    PlaybackStatus, TickOutcome, TransitionError, TransportAction,
};
pub use renderer::{
    CallbackSink, HeadlessRenderer, HeadlessRendererFactory, RendererCallback, RendererError,
    RendererEvent, RendererEventKind, RendererFactory, RendererLog, SubscriptionId,
    WaveformRenderer,
};
pub use session::{Session, SessionError, SessionView, WAVEFORM_CONTAINER};
pub use sync::{format_time, MetricsView, RenderState, SyncError, SyncView, VisualizationSync};
pub use worker::{DecodeCompletion, DecodeWorker};
