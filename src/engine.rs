use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use crossbeam::channel::{Receiver, Sender};
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Producer, Split},
};
use tracing::{info, warn};

use crate::audio::{
    ActiveNote, ChannelConfig, Effect, InstrumentKind, Pitch, ReadySampleLoader,
    SampleBatchReport, SampleLoader,
};
use crate::events::{NoteEvent, StepEvent, TempoEvent, TimeSignatureEvent};
use crate::player::{MasterConfig, Player};
use crate::project::Song;
use crate::timing::{ClockSnapshot, PlaybackState};

const STEP_QUEUE_CAPACITY: usize = 4096;

#[derive(Debug, Clone)]
pub enum EngineCommand {
    LoadSong(PathBuf),
    ReloadSong(Song),
    SetPlaybackState(PlaybackState),
    ReplaceTempos(Vec<TempoEvent>),
    ReplaceTimeSignatures(Vec<TimeSignatureEvent>),
    ReplaceNotes {
        track_id: usize,
        notes: Vec<NoteEvent>,
    },
    SetActiveNotes {
        track_id: usize,
        notes: Vec<ActiveNote>,
    },
    SetInstrument {
        track_id: usize,
        instrument_index: usize,
        kind: InstrumentKind,
    },
    SetSamples {
        track_id: usize,
        instrument_index: usize,
        samples: BTreeMap<Pitch, String>,
    },
    AddEffect {
        track_id: usize,
        effect: Effect,
    },
    RemoveEffect {
        track_id: usize,
        effect_id: String,
    },
    SetChannel {
        track_id: usize,
        channel: ChannelConfig,
    },
    SetMaster(MasterConfig),
    /// One periodic step from the external driver.
    Advance {
        dt: f64,
    },
}

#[derive(Debug, Clone)]
pub enum EngineUpdate {
    SongLoaded { song: Song },
    PlaybackState { state: PlaybackState },
    SamplesLoaded {
        track_id: usize,
        report: SampleBatchReport,
    },
    Error { message: String },
}

/// Control surface of a running engine. Commands go down a channel, updates
/// come back up; the transport snapshot is lock-free for render-rate polls,
/// and fired steps stream through a bounded queue.
pub struct EngineHandle {
    pub command_tx: Sender<EngineCommand>,
    pub update_rx: Receiver<EngineUpdate>,
    transport: Arc<ArcSwap<ClockSnapshot>>,
    steps: HeapCons<StepEvent>,
}

impl EngineHandle {
    pub fn transport(&self) -> ClockSnapshot {
        **self.transport.load()
    }

    pub fn poll_steps(&mut self) -> Vec<StepEvent> {
        let mut fired = Vec::new();
        while let Some(step) = self.steps.try_pop() {
            fired.push(step);
        }
        fired
    }
}

pub fn spawn_engine() -> EngineHandle {
    spawn_engine_with_loader(Box::new(ReadySampleLoader))
}

pub fn spawn_engine_with_loader(loader: Box<dyn SampleLoader>) -> EngineHandle {
    let (command_tx, command_rx) = crossbeam::channel::unbounded();
    let (update_tx, update_rx) = crossbeam::channel::unbounded();

    let ring = HeapRb::<StepEvent>::new(STEP_QUEUE_CAPACITY);
    let (step_tx, step_rx) = ring.split();

    let transport = Arc::new(ArcSwap::from_pointee(
        crate::timing::Clock::new().snapshot(),
    ));
    let transport_engine = transport.clone();

    std::thread::spawn(move || {
        engine_thread(command_rx, update_tx, step_tx, transport_engine, loader);
    });

    EngineHandle {
        command_tx,
        update_rx,
        transport,
        steps: step_rx,
    }
}

fn engine_thread(
    command_rx: Receiver<EngineCommand>,
    update_tx: Sender<EngineUpdate>,
    mut steps: HeapProd<StepEvent>,
    transport: Arc<ArcSwap<ClockSnapshot>>,
    loader: Box<dyn SampleLoader>,
) {
    let mut player = Player::new();

    loop {
        match command_rx.recv() {
            Ok(command) => {
                handle_command(
                    command,
                    &mut player,
                    &update_tx,
                    &mut steps,
                    loader.as_ref(),
                );
                transport.store(Arc::new(player.snapshot()));
            }
            Err(crossbeam::channel::RecvError) => break,
        }
    }
}

fn handle_command(
    command: EngineCommand,
    player: &mut Player,
    update_tx: &Sender<EngineUpdate>,
    steps: &mut HeapProd<StepEvent>,
    loader: &dyn SampleLoader,
) {
    match command {
        EngineCommand::LoadSong(path) => match Song::load(&path) {
            Ok(song) => {
                info!(name = %song.name, "song loaded");
                install_song(&song, player, update_tx, loader);
                let _ = update_tx.send(EngineUpdate::SongLoaded { song });
            }
            Err(e) => {
                let _ = update_tx.send(EngineUpdate::Error {
                    message: format!("Failed to load song: {}", e),
                });
            }
        },

        EngineCommand::ReloadSong(song) => {
            install_song(&song, player, update_tx, loader);
            let _ = update_tx.send(EngineUpdate::SongLoaded { song });
        }

        EngineCommand::SetPlaybackState(state) => {
            player.set_playback_state(state);
            let _ = update_tx.send(EngineUpdate::PlaybackState {
                state: player.playback_state(),
            });
        }

        EngineCommand::ReplaceTempos(tempos) => {
            player.replace_tempos(tempos);
        }

        EngineCommand::ReplaceTimeSignatures(time_signatures) => {
            player.replace_time_signatures(time_signatures);
        }

        EngineCommand::ReplaceNotes { track_id, notes } => {
            player.replace_notes(track_id, notes);
        }

        EngineCommand::SetActiveNotes { track_id, notes } => {
            player.set_active_notes(track_id, &notes);
        }

        EngineCommand::SetInstrument {
            track_id,
            instrument_index,
            kind,
        } => {
            if let Some(track) = player.track_mut(track_id) {
                if let Some(report) = track.set_instrument_kind(instrument_index, kind, loader) {
                    let _ = update_tx.send(EngineUpdate::SamplesLoaded { track_id, report });
                }
            }
        }

        EngineCommand::SetSamples {
            track_id,
            instrument_index,
            samples,
        } => {
            let report = player
                .track_mut(track_id)
                .and_then(|track| track.instrument_mut(instrument_index))
                .and_then(|instrument| instrument.set_samples(samples, loader));
            if let Some(report) = report {
                let _ = update_tx.send(EngineUpdate::SamplesLoaded { track_id, report });
            }
        }

        EngineCommand::AddEffect { track_id, effect } => {
            if let Some(track) = player.track_mut(track_id) {
                track.add_effect(effect);
            }
        }

        EngineCommand::RemoveEffect {
            track_id,
            effect_id,
        } => {
            if let Some(track) = player.track_mut(track_id) {
                track.remove_effect(&effect_id);
            }
        }

        EngineCommand::SetChannel { track_id, channel } => {
            if let Some(track) = player.track_mut(track_id) {
                track.set_channel(channel);
            }
        }

        EngineCommand::SetMaster(master) => {
            player.set_master(master);
        }

        EngineCommand::Advance { dt } => {
            for step in player.drive_seconds(dt) {
                if steps.try_push(step).is_err() {
                    warn!("step queue full, dropping fired step");
                }
            }
        }
    }
}

/// Build the player anew from a song. Mirrors a fresh load: playback is
/// stopped and every scheduler starts from the supplied lists.
fn install_song(
    song: &Song,
    player: &mut Player,
    update_tx: &Sender<EngineUpdate>,
    loader: &dyn SampleLoader,
) {
    *player = Player::new();
    player.set_master(song.master);
    player.replace_tempos(song.tempos.clone());
    player.replace_time_signatures(song.time_signatures.clone());

    for data in &song.tracks {
        let track_id = player.add_track(data.name.clone());
        let Some(track) = player.track_mut(track_id) else {
            continue;
        };
        track.set_channel(data.channel);
        track.set_notes(data.notes.clone());
        if let Some(report) = track.add_instrument(data.instrument.clone(), loader) {
            let _ = update_tx.send(EngineUpdate::SamplesLoaded { track_id, report });
        }
    }
}
