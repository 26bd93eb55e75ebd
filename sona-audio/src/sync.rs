//! Visualization sync - keeps the waveform renderer, transport and metrics
//! pointed at the same decode generation

use crate::playback::{
    Generation, PlaybackEngine, PlaybackState, PlaybackStatus, TickOutcome, TransitionError,
};
use crate::renderer::{
    CallbackSink, RendererCallback, RendererError, RendererEvent, RendererEventKind,
    RendererFactory, SubscriptionId, WaveformRenderer,
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use sona_analysis::{AnalysisError, AnalysisResult, DecodedAudioBuffer, SignalAnalyzer};
use std::sync::Arc;
use thiserror::Error;

/// Errors from transport requests routed through the sync
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("Transport is disabled: {0}")]
    TransportDisabled(String),
}

/// Lifecycle of the waveform view
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RenderState {
    /// No renderer bound
    #[default]
    Detached,
    /// Waiting for decode or for the renderer to accept the buffer
    Loading,
    Ready,
    /// Renderer could not be created or loaded
    Failed(String),
}

/// Display strings for the metrics panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsView {
    pub duration: String,
    pub estimated_bpm: String,
    pub channels: String,
    pub sample_rate: String,
    pub average_amplitude: String,
    pub peak_count: String,
}

impl From<&AnalysisResult> for MetricsView {
    fn from(result: &AnalysisResult) -> Self {
        Self {
            duration: result.duration_label(),
            estimated_bpm: result.bpm_label(),
            channels: result.channels.to_string(),
            sample_rate: result.sample_rate_label(),
            average_amplitude: result.amplitude_label(),
            peak_count: result.peak_count.to_string(),
        }
    }
}

/// Projection consumed by the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncView {
    pub render_state: RenderState,
    /// "elapsed / total", e.g. "1:05 / 3:20"
    pub transport_label: String,
    /// Time left, e.g. "2:15"
    pub remaining_label: String,
    pub transport_enabled: bool,
    pub metrics_view: Option<MetricsView>,
}

/// Format seconds as m:ss
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

const UNKNOWN_TIME: &str = "--:--";

#[derive(Debug, Clone, Copy)]
enum Echo {
    Toggle,
    Seek,
}

/// The live renderer and the subscriptions made on it
struct RendererBinding {
    generation: Generation,
    renderer: Box<dyn WaveformRenderer>,
    subscriptions: Vec<SubscriptionId>,
    playing: bool,
    /// Play/Pause events still owed for our own `play_pause` calls
    pending_toggles: usize,
    /// Position events still owed for our own `seek_to` calls
    pending_seeks: usize,
}

impl RendererBinding {
    fn new(
        generation: Generation,
        renderer: Box<dyn WaveformRenderer>,
        subscriptions: Vec<SubscriptionId>,
    ) -> Self {
        Self {
            generation,
            renderer,
            subscriptions,
            playing: false,
            pending_toggles: 0,
            pending_seeks: 0,
        }
    }

    fn toggle(&mut self) {
        self.renderer.play_pause();
        self.playing = !self.playing;
        self.pending_toggles += 1;
    }

    fn seek(&mut self, seconds: f64) {
        self.renderer.seek_to(seconds);
        self.pending_seeks += 1;
    }

    /// Consume one expected echo of our own command, if any is owed
    fn take_echo(&mut self, echo: Echo) -> bool {
        let pending = match echo {
            Echo::Toggle => &mut self.pending_toggles,
            Echo::Seek => &mut self.pending_seeks,
        };
        if *pending > 0 {
            *pending -= 1;
            true
        } else {
            false
        }
    }

    /// Unsubscribe everything, then destroy
    fn teardown(mut self) {
        for id in self.subscriptions.drain(..) {
            self.renderer.unsubscribe(id);
        }
        self.renderer.destroy();
    }
}

/// Binds [`PlaybackEngine`] and [`SignalAnalyzer`] output to a waveform
/// renderer
///
/// Engine-driven progress moves the renderer cursor silently; user seeks go
/// to both the engine and the renderer. Renderer callbacks arrive on a
/// channel and are applied only when they come from the renderer bound to
/// the engine's current generation.
pub struct VisualizationSync {
    factory: Box<dyn RendererFactory>,
    container: String,
    analyzer: SignalAnalyzer,
    callback_tx: Sender<RendererCallback>,
    callback_rx: Receiver<RendererCallback>,
    binding: Option<RendererBinding>,
    generation: Option<Generation>,
    buffer: Option<Arc<DecodedAudioBuffer>>,
    render_state: RenderState,
    metrics: Option<AnalysisResult>,
    analyzing: bool,
}

impl VisualizationSync {
    pub fn new(factory: Box<dyn RendererFactory>, container: impl Into<String>) -> Self {
        let (callback_tx, callback_rx) = unbounded();
        Self {
            factory,
            container: container.into(),
            analyzer: SignalAnalyzer::new(),
            callback_tx,
            callback_rx,
            binding: None,
            generation: None,
            buffer: None,
            render_state: RenderState::Detached,
            metrics: None,
            analyzing: false,
        }
    }

    /// Generation the sync currently follows
    pub fn generation(&self) -> Option<Generation> {
        self.generation
    }

    pub fn render_state(&self) -> &RenderState {
        &self.render_state
    }

    /// Metrics of the current generation, once analyzed
    pub fn metrics(&self) -> Option<&AnalysisResult> {
        self.metrics.as_ref()
    }

    pub fn analyzing(&self) -> bool {
        self.analyzing
    }

    pub fn transport_enabled(&self) -> bool {
        self.render_state == RenderState::Ready && self.binding.is_some()
    }

    /// A new selection started: drop the old renderer and results
    pub fn begin(&mut self, generation: Generation) {
        self.teardown();
        self.generation = Some(generation);
        self.buffer = None;
        self.metrics = None;
        self.render_state = RenderState::Loading;
        self.analyzing = true;
    }

    /// Bind a fresh renderer to the decoded buffer of `generation`
    ///
    /// On failure the transport stays disabled but metrics are still
    /// computed from the buffer.
    pub fn attach(
        &mut self,
        generation: Generation,
        buffer: Arc<DecodedAudioBuffer>,
    ) -> Result<(), RendererError> {
        if self.generation != Some(generation) {
            tracing::debug!(generation = %generation, "ignoring attach for superseded generation");
            return Ok(());
        }

        self.teardown();
        self.buffer = Some(buffer.clone());

        match self.bind(generation, buffer) {
            Ok(binding) => {
                tracing::debug!(generation = %generation, "renderer bound");
                self.binding = Some(binding);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(generation = %generation, error = %e, "renderer unavailable");
                self.render_state = RenderState::Failed(e.to_string());
                if let Err(analysis) = self.run_analysis() {
                    tracing::warn!(error = %analysis, "analysis failed");
                }
                Err(e)
            }
        }
    }

    fn bind(
        &mut self,
        generation: Generation,
        buffer: Arc<DecodedAudioBuffer>,
    ) -> Result<RendererBinding, RendererError> {
        let mut renderer = self.factory.create(&self.container)?;
        let subscriptions = RendererEventKind::ALL
            .iter()
            .map(|kind| renderer.on(*kind, CallbackSink::new(generation, self.callback_tx.clone())))
            .collect();

        let mut binding = RendererBinding::new(generation, renderer, subscriptions);

        if let Err(e) = binding.renderer.load(buffer) {
            binding.teardown();
            return Err(e);
        }
        Ok(binding)
    }

    /// The decode for `generation` failed
    pub fn fail(&mut self, generation: Generation) {
        if self.generation != Some(generation) {
            return;
        }
        self.teardown();
        self.buffer = None;
        self.metrics = None;
        self.render_state = RenderState::Detached;
        self.analyzing = false;
    }

    /// Drop everything; nothing is current anymore
    pub fn detach(&mut self) {
        self.teardown();
        self.generation = None;
        self.buffer = None;
        self.metrics = None;
        self.render_state = RenderState::Detached;
        self.analyzing = false;
        while self.callback_rx.try_recv().is_ok() {}
    }

    fn teardown(&mut self) {
        if let Some(binding) = self.binding.take() {
            tracing::debug!(generation = %binding.generation, "tearing down renderer");
            binding.teardown();
        }
    }

    /// Recompute metrics from the bound buffer
    ///
    /// Returns false when no buffer has been accepted yet.
    pub fn reanalyze(&mut self) -> Result<bool, AnalysisError> {
        let accepted = matches!(self.render_state, RenderState::Ready | RenderState::Failed(_));
        if !accepted || self.buffer.is_none() {
            return Ok(false);
        }
        self.run_analysis().map(|_| true)
    }

    fn run_analysis(&mut self) -> Result<(), AnalysisError> {
        self.analyzing = false;
        let Some(buffer) = self.buffer.as_ref() else {
            return Ok(());
        };
        match self.analyzer.analyze(buffer) {
            Ok(result) => {
                self.metrics = Some(result);
                Ok(())
            }
            Err(e) => {
                self.metrics = None;
                Err(e)
            }
        }
    }

    /// Apply every pending renderer callback. Returns how many were applied.
    pub fn pump(&mut self, engine: &mut PlaybackEngine) -> Result<usize, AnalysisError> {
        let mut applied = 0;
        while let Ok(callback) = self.callback_rx.try_recv() {
            if self.handle_callback(engine, callback)? {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Apply one renderer callback, dropping it if it is stale
    pub fn handle_callback(
        &mut self,
        engine: &mut PlaybackEngine,
        callback: RendererCallback,
    ) -> Result<bool, AnalysisError> {
        let RendererCallback { generation, event } = callback;
        let bound = self.binding.as_ref().map(|b| b.generation);
        if bound != Some(generation) || !engine.is_current(generation) {
            tracing::trace!(generation = %generation, ?event, "dropping stale renderer callback");
            return Ok(false);
        }

        match event {
            RendererEvent::Ready { .. } => {
                self.render_state = RenderState::Ready;
                self.run_analysis()?;
            }
            RendererEvent::Position(seconds) => {
                // Our own seeks come back as positions; the engine already has them.
                // Anything else is the user seeking on the waveform.
                if !self.take_echo(Echo::Seek) {
                    if let Err(e) = engine.seek(seconds) {
                        tracing::debug!(generation = %generation, error = %e, "ignoring renderer seek");
                    }
                }
            }
            RendererEvent::Play => {
                if !self.take_echo(Echo::Toggle) {
                    self.set_renderer_playing(true);
                    engine.follow_play(generation);
                }
            }
            RendererEvent::Pause => {
                if !self.take_echo(Echo::Toggle) {
                    self.set_renderer_playing(false);
                    engine.follow_pause(generation);
                }
            }
            RendererEvent::Finish => {
                self.set_renderer_playing(false);
                engine.finish(generation);
            }
        }
        Ok(true)
    }

    fn take_echo(&mut self, echo: Echo) -> bool {
        self.binding.as_mut().is_some_and(|binding| binding.take_echo(echo))
    }

    fn set_renderer_playing(&mut self, playing: bool) {
        if let Some(binding) = self.binding.as_mut() {
            binding.playing = playing;
        }
    }

    fn transport(&mut self) -> Result<&mut RendererBinding, SyncError> {
        let reason = match &self.render_state {
            RenderState::Ready => None,
            RenderState::Loading => Some("waveform is still loading".to_string()),
            RenderState::Detached => Some("no source loaded".to_string()),
            RenderState::Failed(msg) => Some(msg.clone()),
        };
        match (reason, self.binding.as_mut()) {
            (None, Some(binding)) => Ok(binding),
            (reason, _) => Err(SyncError::TransportDisabled(
                reason.unwrap_or_else(|| "no renderer".to_string()),
            )),
        }
    }

    pub fn play(&mut self, engine: &mut PlaybackEngine) -> Result<(), SyncError> {
        let binding = self.transport()?;
        let restart = engine.status() == PlaybackStatus::Finished;
        engine.play()?;
        if restart {
            binding.renderer.set_cursor(0.0);
        }
        if !binding.playing {
            binding.toggle();
        }
        Ok(())
    }

    pub fn pause(&mut self, engine: &mut PlaybackEngine) -> Result<(), SyncError> {
        let binding = self.transport()?;
        engine.pause()?;
        if binding.playing {
            binding.toggle();
        }
        Ok(())
    }

    pub fn toggle(&mut self, engine: &mut PlaybackEngine) -> Result<(), SyncError> {
        if engine.state().is_playing() {
            self.pause(engine)
        } else {
            self.play(engine)
        }
    }

    /// User-driven seek: moves the engine, then the renderer
    pub fn seek(&mut self, engine: &mut PlaybackEngine, seconds: f64) -> Result<f64, SyncError> {
        let binding = self.transport()?;
        let position = engine.seek(seconds)?;
        binding.seek(position);
        Ok(position)
    }

    /// Follow engine-driven progress without echoing a seek
    pub fn after_tick(&mut self, outcome: TickOutcome) {
        let Some(binding) = self.binding.as_mut() else {
            return;
        };
        match outcome {
            TickOutcome::Stalled => {}
            TickOutcome::Advanced(position) => binding.renderer.set_cursor(position),
            TickOutcome::Finished(position) => {
                binding.renderer.set_cursor(position);
                if binding.playing {
                    binding.toggle();
                }
            }
        }
    }

    /// Current projection for the presentation layer
    pub fn view(&self, state: &PlaybackState) -> SyncView {
        let known = state.duration_secs > 0.0;
        let total = if known {
            format_time(state.duration_secs)
        } else {
            UNKNOWN_TIME.to_string()
        };
        let remaining = if known {
            format_time(state.duration_secs - state.position_secs)
        } else {
            UNKNOWN_TIME.to_string()
        };

        SyncView {
            render_state: self.render_state.clone(),
            transport_label: format!("{} / {}", format_time(state.position_secs), total),
            remaining_label: remaining,
            transport_enabled: self.transport_enabled(),
            metrics_view: self.metrics.as_ref().map(MetricsView::from),
        }
    }
}

impl Drop for VisualizationSync {
    fn drop(&mut self) {
        self.teardown();
    }
}
