//! quadstep: headless sequencer host that logs the MIDI it would send

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use quadstep_core::{divider, MidiMessage};
use quadstep_services::{
    config_path, load_config, load_config_from, save_config, EngineConfig, SequencerEngine,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("quadstep=info".parse()?)
                .add_directive("quadstep_services=info".parse()?),
        )
        .init();

    let config = read_config(std::env::args().nth(1).map(PathBuf::from));
    info!(
        bpm = config.bpm,
        timing = ?config.timing,
        base_rate = divider::label(divider::DEFAULT_DIVIDER),
        "Starting quadstep"
    );

    let mut engine = SequencerEngine::new(&config);
    for preset in &config.euclidean {
        engine
            .apply_euclidean(preset.track, preset.length, preset.beats, preset.rotation)
            .with_context(|| format!("euclidean preset for track {}", preset.track))?;
    }

    let rx = engine.midi_receiver();
    engine.start()?;
    engine.play();

    let deadline = (config.run_seconds > 0)
        .then(|| Instant::now() + Duration::from_secs(config.run_seconds));
    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(message) => log_message(&message),
            Err(e) if e.is_disconnected() => break,
            Err(_) => {}
        }
    }

    engine.stop()?;
    for message in rx.try_iter() {
        log_message(&message);
    }
    info!(dropped = engine.dropped_messages(), "Stopped");
    Ok(())
}

/// A missing file gives defaults; an unreadable or invalid one warns and does too.
/// On first run the defaults are written to the user config directory.
fn read_config(path: Option<PathBuf>) -> EngineConfig {
    let loaded = match &path {
        Some(path) => load_config_from(path),
        None if !config_path().exists() => {
            let config = EngineConfig::default();
            if let Err(e) = save_config(&config) {
                warn!(error = %e, "Could not write default config");
            }
            Ok(config)
        }
        None => load_config(),
    };
    loaded.unwrap_or_else(|e| {
        warn!(error = %e, "Config unusable, using defaults");
        EngineConfig::default()
    })
}

fn log_message(message: &MidiMessage) {
    match *message {
        MidiMessage::NoteOn { channel, note, velocity } => {
            info!(ch = channel + 1, note, velocity, "note on")
        }
        MidiMessage::NoteOff { channel, note, .. } => info!(ch = channel + 1, note, "note off"),
        MidiMessage::ControlChange { channel, controller, value } => {
            info!(ch = channel + 1, cc = controller, value, "control change")
        }
    }
}
