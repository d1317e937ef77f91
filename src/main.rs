use std::time::Duration;

use tracing::{info, warn};

use quaver::audio::{ChannelConfig, InstrumentKind, Pitch, SynthModel};
use quaver::{
    EngineCommand, EngineUpdate, MasterConfig, NoteEvent, PlaybackState, Song, TempoEvent,
    TimeSignature, TimeSignatureEvent, TrackData, spawn_engine,
};

fn demo_song() -> Song {
    let lead: Vec<NoteEvent> = [(0, 60), (192, 64), (384, 67), (576, 72)]
        .into_iter()
        .map(|(tick, midi)| NoteEvent::new(tick, Some(144), Pitch(midi), 0.8))
        .collect();
    let bass: Vec<NoteEvent> = [(0, 36), (384, 43)]
        .into_iter()
        .map(|(tick, midi)| NoteEvent::new(tick, Some(336), Pitch(midi), 0.9))
        .collect();

    Song {
        name: "demo".to_string(),
        master: MasterConfig {
            volume: -18.0,
            muted: false,
        },
        tempos: vec![
            TempoEvent {
                tick: 0,
                bpm: 120.0,
            },
            TempoEvent {
                tick: 768,
                bpm: 150.0,
            },
        ],
        time_signatures: vec![TimeSignatureEvent {
            tick: 0,
            signature: TimeSignature::four_four(),
        }],
        tracks: vec![
            TrackData {
                name: "lead".to_string(),
                channel: ChannelConfig::default(),
                instrument: InstrumentKind::synth(SynthModel::Simple, 32),
                notes: lead,
            },
            TrackData {
                name: "bass".to_string(),
                channel: ChannelConfig {
                    volume: -3.0,
                    ..ChannelConfig::default()
                },
                instrument: InstrumentKind::synth(SynthModel::Mono, 1),
                notes: bass,
            },
        ],
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut handle = spawn_engine();

    handle
        .command_tx
        .send(EngineCommand::ReloadSong(demo_song()))
        .expect("engine is running");
    handle
        .command_tx
        .send(EngineCommand::SetPlaybackState(PlaybackState::Started))
        .expect("engine is running");

    // Drive the transport at animation cadence for a few bars.
    for _ in 0..240 {
        let _ = handle.command_tx.send(EngineCommand::Advance { dt: 1.0 / 60.0 });

        for step in handle.poll_steps() {
            let transport = handle.transport();
            info!(
                track = step.track_id,
                tick = step.tick,
                pitch = %step.note.pitch,
                bpm = transport.bpm,
                "step"
            );
        }
        while let Ok(update) = handle.update_rx.try_recv() {
            if let EngineUpdate::Error { message } = update {
                warn!(%message, "engine error");
            }
        }

        std::thread::sleep(Duration::from_millis(16));
    }

    let _ = handle
        .command_tx
        .send(EngineCommand::SetPlaybackState(PlaybackState::Stopped));
}
