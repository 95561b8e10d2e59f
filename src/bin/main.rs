//! Tesla Coil MIDI Synth - Desktop Emulator Demo
//!
//! A minimal standalone player that wires a [`Config`], loads an impulse
//! response, plays a small built-in note sequence through the real `cpal`
//! output device, and logs generator/output telemetry until interrupted.
//!
//! # Usage
//!
//! ```bash
//! teslacoil-synth coil.ir
//! teslacoil-synth coil.ir --config synth.toml --seconds 30
//! ```
//!
//! An external MIDI parser (out of scope for this crate) would call the
//! same [`MidiController`] methods this demo calls directly.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use teslacoil_synth::{Channel, Config, MidiController, Orchestrator};

#[derive(Parser)]
#[command(name = "teslacoil-synth")]
#[command(author, version, about = "Tesla coil MIDI synth - desktop emulator demo")]
struct Args {
    /// Impulse response file (raw little-endian f32 complex spectrum, spec §6)
    ir: PathBuf,

    /// Optional TOML config file overriding `Config::default()`
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run for this many seconds, then exit. `0` runs until Ctrl-C.
    #[arg(long, default_value_t = 0)]
    seconds: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if !args.ir.exists() {
        anyhow::bail!("impulse response file not found: {}", args.ir.display());
    }

    let config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            Config::from_toml_str(&text)?
        }
        None => Config::default(),
    };
    config.validate()?;

    let mut orchestrator = Orchestrator::new(config)?;
    orchestrator.start(&args.ir)?;
    info!("orchestrator started, playing demo sequence");

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = running.clone();
    ctrlc::set_handler(move || {
        running_handler.store(false, Ordering::SeqCst);
    })
    .context("installing Ctrl-C handler")?;

    run_demo_sequence(&orchestrator);

    let start = Instant::now();
    let deadline = (args.seconds > 0).then(|| Duration::from_secs(args.seconds));
    let mut last_report = Instant::now();
    while running.load(Ordering::SeqCst) {
        if let Some(deadline) = deadline
            && start.elapsed() >= deadline
        {
            break;
        }
        if last_report.elapsed() >= Duration::from_secs(1) {
            let snapshot = orchestrator.metrics();
            info!(
                frames = snapshot.frames_generated,
                samples = snapshot.samples_generated,
                underruns = snapshot.underruns,
                overruns = snapshot.overruns,
                "generator telemetry"
            );
            last_report = Instant::now();
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    info!("shutting down");
    orchestrator.stop();
    Ok(())
}

/// A small fixed demo: a held chord on the NOTE channel, an arpeggio, and a
/// drum hit, each on its own MIDI channel number so they occupy distinct
/// voice slots (spec §8 scenarios S1-S3). Scheduling is driven by the
/// orchestrator's own shared clock ([`Orchestrator::now_ms`]) rather than
/// the host's wall clock, matching what the tick thread reads.
fn run_demo_sequence(orchestrator: &Orchestrator) {
    let midi = orchestrator.midi();
    let base = orchestrator.now_ms();

    // C major triad, held for 2 seconds, on the NOTE channel.
    for (slot, note) in [(0u8, 60u8), (1, 64), (2, 67)] {
        midi.note_on(Channel::Note, slot, note, 100, base);
    }
    schedule(orchestrator, base + 2_000, |midi, now| {
        for (slot, note) in [(0u8, 60u8), (1, 64), (2, 67)] {
            midi.note_off(Channel::Note, slot, note, now);
        }
    });

    // An ascending arpeggio on a dedicated MIDI channel, lasting ~5 seconds.
    schedule(orchestrator, base + 500, |midi, now| {
        for note in [60u8, 64, 67, 72] {
            midi.note_on(Channel::Arp, 3, note, 90, now);
        }
    });
    schedule(orchestrator, base + 5_500, |midi, now| {
        for note in [60u8, 64, 67, 72] {
            midi.note_off(Channel::Arp, 3, note, now);
        }
    });

    // A single kick-drum hit (program 0) a few seconds in.
    schedule(orchestrator, base + 6_000, |midi, now| {
        midi.note_on(Channel::Drum, 4, 0, 120, now);
    });
    schedule(orchestrator, base + 6_050, |midi, now| {
        midi.note_off(Channel::Drum, 4, 0, now);
    });
}

/// Run `action` once `orchestrator.now_ms()` reaches `at_ms`, on a detached
/// helper thread. Coarse (50ms poll), which is plenty for a demo sequence —
/// the voice engine itself ticks independently at its own cadence.
fn schedule(orchestrator: &Orchestrator, at_ms: i64, action: fn(&MidiController, i64)) {
    let midi = orchestrator.midi().clone();
    let epoch_now = orchestrator.now_ms();
    let wait = (at_ms - epoch_now).max(0) as u64;
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(wait));
        let now = epoch_now + wait as i64;
        action(&midi, now);
    });
}
