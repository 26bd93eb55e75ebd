//! Waveform renderer seam and a headless implementation
//!
//! A renderer draws the waveform and a cursor, and reports transport
//! events back through subscriptions. Every subscription gets a
//! [`CallbackSink`] that stamps events with the generation the renderer was
//! created for.

use crate::playback::Generation;
use crossbeam_channel::Sender;
use sona_analysis::{DecodedAudioBuffer, WaveformOverview};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by a renderer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RendererError {
    #[error("Failed to create renderer: {0}")]
    Create(String),
    #[error("Failed to load waveform: {0}")]
    Load(String),
}

/// Event kinds a renderer can be subscribed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RendererEventKind {
    Ready,
    Position,
    Play,
    Pause,
    Finish,
}

impl RendererEventKind {
    pub const ALL: [RendererEventKind; 5] = [
        RendererEventKind::Ready,
        RendererEventKind::Position,
        RendererEventKind::Play,
        RendererEventKind::Pause,
        RendererEventKind::Finish,
    ];
}

/// Event emitted by a renderer
#[derive(Debug, Clone, PartialEq)]
pub enum RendererEvent {
    /// Buffer accepted and drawn
    Ready { duration_secs: f64 },
    /// Playhead moved by the renderer itself (user interaction)
    Position(f64),
    Play,
    Pause,
    Finish,
}

impl RendererEvent {
    pub fn kind(&self) -> RendererEventKind {
        match self {
            RendererEvent::Ready { .. } => RendererEventKind::Ready,
            RendererEvent::Position(_) => RendererEventKind::Position,
            RendererEvent::Play => RendererEventKind::Play,
            RendererEvent::Pause => RendererEventKind::Pause,
            RendererEvent::Finish => RendererEventKind::Finish,
        }
    }
}

/// An event together with the generation of the renderer that sent it
#[derive(Debug, Clone, PartialEq)]
pub struct RendererCallback {
    pub generation: Generation,
    pub event: RendererEvent,
}

/// Delivery end of a subscription
#[derive(Debug, Clone)]
pub struct CallbackSink {
    generation: Generation,
    tx: Sender<RendererCallback>,
}

impl CallbackSink {
    pub fn new(generation: Generation, tx: Sender<RendererCallback>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Deliver an event. Returns false if nobody is listening anymore.
    pub fn emit(&self, event: RendererEvent) -> bool {
        self.tx
            .send(RendererCallback {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Handle returned by [`WaveformRenderer::on`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// A waveform view with its own transport surface
///
/// Exactly one instance is live per source; it must be destroyed before
/// the next one is created.
pub trait WaveformRenderer {
    /// Accept a decoded buffer; emits `Ready` once drawn
    fn load(&mut self, buffer: Arc<DecodedAudioBuffer>) -> Result<(), RendererError>;
    /// Subscribe to one kind of event
    fn on(&mut self, kind: RendererEventKind, sink: CallbackSink) -> SubscriptionId;
    fn unsubscribe(&mut self, id: SubscriptionId);
    fn play_pause(&mut self);
    /// User-initiated playhead move
    fn seek_to(&mut self, seconds: f64);
    /// Move the cursor to follow playback; never emits `Position`
    fn set_cursor(&mut self, seconds: f64);
    fn destroy(&mut self);
}

/// Creates renderers bound to a display container
pub trait RendererFactory {
    fn create(&mut self, container: &str) -> Result<Box<dyn WaveformRenderer>, RendererError>;
}

/// What the headless renderers have been asked to do, for inspection
#[derive(Debug, Clone, Default)]
pub struct RendererLog {
    pub created: usize,
    pub destroyed: usize,
    /// Highest number of simultaneously live renderers seen
    pub max_live: usize,
    /// Subscriptions currently attached across live renderers
    pub subscriptions: usize,
    pub cursor_secs: f64,
    /// Explicit seek commands received
    pub seeks: Vec<f64>,
    pub playing: bool,
    pub overview: Option<Arc<WaveformOverview>>,
}

impl RendererLog {
    pub fn live(&self) -> usize {
        self.created - self.destroyed
    }
}

/// Renderer that computes a waveform overview and keeps a cursor, without
/// drawing anything
pub struct HeadlessRenderer {
    waveform_points: usize,
    subscriptions: Vec<(SubscriptionId, RendererEventKind, CallbackSink)>,
    next_subscription: u64,
    duration_secs: f64,
    loaded: bool,
    destroyed: bool,
    log: Rc<RefCell<RendererLog>>,
}

impl HeadlessRenderer {
    fn new(waveform_points: usize, log: Rc<RefCell<RendererLog>>) -> Self {
        Self {
            waveform_points,
            subscriptions: Vec::new(),
            next_subscription: 0,
            duration_secs: 0.0,
            loaded: false,
            destroyed: false,
            log,
        }
    }

    fn emit(&self, event: RendererEvent) {
        if self.destroyed {
            return;
        }
        let kind = event.kind();
        for (_, _, sink) in self.subscriptions.iter().filter(|(_, k, _)| *k == kind) {
            sink.emit(event.clone());
        }
    }
}

impl WaveformRenderer for HeadlessRenderer {
    fn load(&mut self, buffer: Arc<DecodedAudioBuffer>) -> Result<(), RendererError> {
        if self.destroyed {
            return Err(RendererError::Load("renderer was destroyed".into()));
        }

        let overview = WaveformOverview::from_buffer(&buffer, self.waveform_points).into_arc();
        self.duration_secs = buffer.duration_secs();
        self.loaded = true;
        {
            let mut log = self.log.borrow_mut();
            log.overview = Some(overview);
            log.cursor_secs = 0.0;
            log.playing = false;
        }

        self.emit(RendererEvent::Ready {
            duration_secs: self.duration_secs,
        });
        Ok(())
    }

    fn on(&mut self, kind: RendererEventKind, sink: CallbackSink) -> SubscriptionId {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.subscriptions.push((id, kind, sink));
        self.log.borrow_mut().subscriptions += 1;
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|(sub, _, _)| *sub != id);
        if self.subscriptions.len() < before {
            self.log.borrow_mut().subscriptions -= 1;
        }
    }

    fn play_pause(&mut self) {
        if !self.loaded || self.destroyed {
            return;
        }
        let playing = {
            let mut log = self.log.borrow_mut();
            log.playing = !log.playing;
            log.playing
        };
        self.emit(if playing {
            RendererEvent::Play
        } else {
            RendererEvent::Pause
        });
    }

    fn seek_to(&mut self, seconds: f64) {
        if !self.loaded || self.destroyed {
            return;
        }
        let position = seconds.clamp(0.0, self.duration_secs);
        {
            let mut log = self.log.borrow_mut();
            log.cursor_secs = position;
            log.seeks.push(position);
        }
        self.emit(RendererEvent::Position(position));
    }

    fn set_cursor(&mut self, seconds: f64) {
        if self.loaded && !self.destroyed {
            self.log.borrow_mut().cursor_secs = seconds.clamp(0.0, self.duration_secs);
        }
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        let mut log = self.log.borrow_mut();
        log.subscriptions -= self.subscriptions.len();
        log.destroyed += 1;
        log.playing = false;
        log.overview = None;
        self.subscriptions.clear();
    }
}

impl Drop for HeadlessRenderer {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Factory for [`HeadlessRenderer`]s sharing one [`RendererLog`]
pub struct HeadlessRendererFactory {
    waveform_points: usize,
    log: Rc<RefCell<RendererLog>>,
}

impl HeadlessRendererFactory {
    pub fn new(waveform_points: usize) -> Self {
        Self {
            waveform_points,
            log: Rc::new(RefCell::new(RendererLog::default())),
        }
    }

    /// Shared view of what renderers from this factory have done
    pub fn log(&self) -> Rc<RefCell<RendererLog>> {
        self.log.clone()
    }
}

impl RendererFactory for HeadlessRendererFactory {
    fn create(&mut self, container: &str) -> Result<Box<dyn WaveformRenderer>, RendererError> {
        if container.is_empty() {
            return Err(RendererError::Create("no container".into()));
        }
        {
            let mut log = self.log.borrow_mut();
            log.created += 1;
            log.max_live = log.max_live.max(log.live());
        }
        Ok(Box::new(HeadlessRenderer::new(self.waveform_points, self.log.clone())))
    }
}
