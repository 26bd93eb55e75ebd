//! SONA - audio analysis and playback sync
//!
//! Headless front end: loads the given files (or the demo catalog),
//! prints metrics and a waveform sketch for each, and optionally plays
//! them against the wall clock.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sona_analysis::{FrequencyBand, WaveformOverview};
use sona_audio::{HeadlessRendererFactory, PlaybackStatus, Session, TickOutcome};
use sona_library::{AudioEntry, AudioLibrary, Config, EntryId, SourceRef, SymphoniaDecoder};

/// Longest wait for one source to decode and analyze
const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Columns of the printed waveform
const SKETCH_WIDTH: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "sona")]
#[command(about = "Analyze audio files and play them against a headless waveform", long_about = None)]
struct Args {
    /// Play each file through in real time after analysis
    #[arg(short, long)]
    play: bool,

    /// Audio files to load; the configured demo_dir is used when none are given
    files: Vec<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::load();
    tracing::debug!(?config, "loaded config");

    let library = if args.files.is_empty() {
        match &config.demo_dir {
            Some(dir) => AudioLibrary::with_demo_entries(dir),
            None => bail!("no files given and no demo_dir configured"),
        }
    } else {
        library_from_files(&args.files)?
    };

    let factory = HeadlessRendererFactory::new(config.waveform_points);
    let log = factory.log();
    let tick = config.tick_interval();
    let mut session = Session::with_library(
        config,
        library,
        Arc::new(SymphoniaDecoder::new()),
        Box::new(factory),
    );

    let ids: Vec<EntryId> = session.view().entries.iter().map(|e| e.id().clone()).collect();
    for id in ids {
        if session.library().current_id() != Some(&id) {
            session.select(&id)?;
        }
        settle(&mut session)?;
        report(&session, log.borrow().overview.as_deref());

        if args.play && session.view().sync.transport_enabled {
            play_through(&mut session, tick)?;
        }
    }

    session.dispose();
    Ok(())
}

/// Catalog over files given on the command line, in argument order
fn library_from_files(files: &[PathBuf]) -> anyhow::Result<AudioLibrary> {
    let mut library = AudioLibrary::new();
    for (idx, path) in files.iter().enumerate().rev() {
        if !path.is_file() {
            bail!("not a file: {}", path.display());
        }
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("untitled");
        let mut entry = AudioEntry::new(
            EntryId::new(format!("file-{}", idx + 1)),
            name,
            SourceRef::Path(path.clone()),
        );
        if let Some(file_name) = path.file_name().and_then(|s| s.to_str()) {
            entry = entry.with_filename(file_name);
        }
        library
            .add(entry)
            .with_context(|| format!("adding {}", path.display()))?;
    }
    Ok(library)
}

/// Pump until the current source is decoded and analyzed
fn settle(session: &mut Session) -> anyhow::Result<()> {
    let deadline = Instant::now() + SETTLE_TIMEOUT;
    loop {
        session.pump_timeout(Duration::from_millis(50));
        let view = session.view();
        if !session.is_loading() && !view.analyzing {
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!("timed out waiting for audio to load");
        }
    }
}

fn report(session: &Session, overview: Option<&WaveformOverview>) {
    let view = session.view();
    let Some(entry) = view.current_entry.as_ref() else {
        return;
    };

    println!();
    println!("{} ({})", entry.name(), entry.source());
    if let Some(error) = &view.error {
        println!("  error: {error}");
    }
    if let Some(metrics) = &view.sync.metrics_view {
        println!("  duration     {}", metrics.duration);
        println!("  tempo        {}", metrics.estimated_bpm);
        println!("  channels     {}", metrics.channels);
        println!("  sample rate  {}", metrics.sample_rate);
        println!("  amplitude    {}", metrics.average_amplitude);
        println!("  peaks        {}", metrics.peak_count);
    }
    if let Some(overview) = overview {
        println!("  {}", sketch(overview, SKETCH_WIDTH));
    }
}

/// One-line waveform: bar height from amplitude, bars tinted by band
fn sketch(overview: &WaveformOverview, width: usize) -> String {
    const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
    if overview.is_empty() || width == 0 {
        return String::new();
    }

    let peak = overview
        .points
        .iter()
        .map(|p| p.amplitude)
        .fold(0.0f32, f32::max);
    let chunk = overview.len().div_ceil(width).max(1);

    overview
        .points
        .chunks(chunk)
        .map(|points| {
            let loudest = points
                .iter()
                .max_by(|a, b| a.amplitude.total_cmp(&b.amplitude))
                .map(|p| (p.amplitude, p.band))
                .unwrap_or((0.0, FrequencyBand::Mid));
            let level = if peak > 0.0 { loudest.0 / peak } else { 0.0 };
            let idx = ((level * (BARS.len() - 1) as f32).round() as usize).min(BARS.len() - 1);
            match loudest.1 {
                FrequencyBand::Low => format!("\x1b[31m{}\x1b[0m", BARS[idx]),
                FrequencyBand::Mid => format!("\x1b[32m{}\x1b[0m", BARS[idx]),
                FrequencyBand::High => format!("\x1b[34m{}\x1b[0m", BARS[idx]),
            }
        })
        .collect()
}

/// Run the transport in real time until the source finishes
fn play_through(session: &mut Session, tick: Duration) -> anyhow::Result<()> {
    session.play()?;
    let mut stdout = io::stdout();
    let mut last = Instant::now();

    loop {
        thread::sleep(tick);
        let now = Instant::now();
        let outcome = session.tick(now - last);
        last = now;
        session.pump();

        let view = session.view();
        write!(
            stdout,
            "\r  {}  (-{})  ",
            view.sync.transport_label, view.sync.remaining_label
        )?;
        stdout.flush()?;

        if matches!(outcome, TickOutcome::Finished(_) | TickOutcome::Stalled)
            || view.status != PlaybackStatus::Playing
        {
            break;
        }
    }
    writeln!(stdout)?;
    Ok(())
}
