//! Sequencer engine: the scheduling thread and the editing-side API

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use quadstep_core::{
    LaneAnchor, LaneSnapshot, MidiMessage, MidiOutput, NearestDegree, RandomSource, Role,
    SequenceTrack, Sequencer, SequencerError, TimingMode, TrackSettings, Transport, WallClock,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::guard::MutationGuard;
use crate::midi_out::ChannelOutput;
use crate::playhead::PlayheadState;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Sequencer error: {0}")]
    Sequencer(#[from] SequencerError),
    #[error("Failed to spawn scheduler thread: {0}")]
    Spawn(#[from] io::Error),
    #[error("Engine already running")]
    AlreadyRunning,
    #[error("Engine not running")]
    NotRunning,
}

/// Milliseconds since the engine was created
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Everything the scheduling pass mutates, kept behind one lock
pub(crate) struct Session {
    pub(crate) sequencer: Sequencer,
    pub(crate) transport: Transport,
}

/// Result of one scheduler poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Stopped, or no tick due yet
    Idle,
    /// A scheduling pass ran
    Ticked,
    /// The editing context holds the sequencer; this poll was skipped
    Paused,
}

/// Engine state shared between the editing context and the scheduling thread
pub struct EngineState {
    session: Mutex<Session>,
    /// Display copies; reading them never touches the session lock
    pub playheads: PlayheadState,
    playing: AtomicBool,
    bpm_bits: AtomicU64,
    running: AtomicBool,
    paused_polls: AtomicU64,
}

impl EngineState {
    pub fn new(config: &EngineConfig) -> Self {
        let mut sequencer = Sequencer::new();
        for (t, track) in sequencer.tracks_mut().iter_mut().enumerate() {
            track.settings = config.track_settings(t);
        }
        let transport = Transport::new(config.bpm, config.timing);
        let playheads = PlayheadState::default();
        playheads.publish_lanes(&sequencer);
        Self {
            playing: AtomicBool::new(false),
            bpm_bits: AtomicU64::new(transport.clock.bpm().to_bits()),
            session: Mutex::new(Session {
                sequencer,
                transport,
            }),
            playheads,
            running: AtomicBool::new(false),
            paused_polls: AtomicU64::new(0),
        }
    }

    /// Exclusive editing access; the scheduler pauses until the guard drops
    pub fn edit(&self) -> MutationGuard<'_> {
        MutationGuard::new(self.lock_session(), &self.playheads)
    }

    /// Polls skipped because an edit was in progress
    pub fn paused_polls(&self) -> u64 {
        self.paused_polls.load(Ordering::Relaxed)
    }

    /// One non-blocking scheduler poll (scheduling context)
    pub fn poll<O, R>(&self, now_ms: u64, output: &mut O, rng: &mut R) -> PollOutcome
    where
        O: MidiOutput,
        R: RandomSource,
    {
        let mut session = match self.session.try_lock() {
            Ok(session) => session,
            Err(TryLockError::WouldBlock) => {
                self.paused_polls.fetch_add(1, Ordering::Relaxed);
                return PollOutcome::Paused;
            }
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
        };

        let Session {
            sequencer,
            transport,
        } = &mut *session;
        if !transport.tick(now_ms, sequencer, output, rng, &NearestDegree) {
            return PollOutcome::Idle;
        }
        self.playheads.publish(sequencer);
        self.playheads.count_pass();
        PollOutcome::Ticked
    }

    pub fn play(&self, now_ms: u64) {
        let mut session = self.lock_session();
        let Session {
            sequencer,
            transport,
        } = &mut *session;
        transport.play(sequencer, now_ms);
        self.playheads.publish(sequencer);
        self.playing.store(true, Ordering::SeqCst);
        info!(bpm = transport.clock.bpm(), "Playback started");
    }

    pub fn stop_playback(&self, output: &mut impl MidiOutput) {
        let mut session = self.lock_session();
        let Session {
            sequencer,
            transport,
        } = &mut *session;
        transport.stop(sequencer, output);
        self.playheads.publish(sequencer);
        self.playing.store(false, Ordering::SeqCst);
        info!("Playback stopped");
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn set_bpm(&self, bpm: f64) {
        let mut session = self.lock_session();
        session.transport.clock.set_bpm(bpm);
        let bpm = session.transport.clock.bpm();
        self.bpm_bits.store(bpm.to_bits(), Ordering::SeqCst);
        info!(bpm, "Tempo changed");
    }

    pub fn bpm(&self) -> f64 {
        f64::from_bits(self.bpm_bits.load(Ordering::SeqCst))
    }

    pub fn set_timing(&self, timing: TimingMode) {
        self.lock_session().transport.clock.timing = timing;
        info!(?timing, "Timing mode changed");
    }

    /// Copy of a lane for presentation, taken from the display copies
    pub fn snapshot(&self, track: usize, role: Role) -> Result<LaneSnapshot, EngineError> {
        self.playheads
            .lane(track, role)
            .ok_or(EngineError::Sequencer(SequencerError::TrackNotFound(track)))
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns the scheduling thread and the MIDI queue
pub struct SequencerEngine {
    state: Arc<EngineState>,
    output: ChannelOutput,
    receiver: Receiver<MidiMessage>,
    clock: MonotonicClock,
    poll_interval: Duration,
    seed: Option<u64>,
    worker: Option<JoinHandle<()>>,
}

impl SequencerEngine {
    pub fn new(config: &EngineConfig) -> Self {
        let (output, receiver) = ChannelOutput::new(config.midi_queue);
        Self {
            state: Arc::new(EngineState::new(config)),
            output,
            receiver,
            clock: MonotonicClock::new(),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            seed: config.seed,
            worker: None,
        }
    }

    /// Get shared state for display access
    pub fn state(&self) -> Arc<EngineState> {
        self.state.clone()
    }

    /// Receiving end of the outgoing MIDI queue
    pub fn midi_receiver(&self) -> Receiver<MidiMessage> {
        self.receiver.clone()
    }

    /// Messages dropped because the MIDI queue was full
    pub fn dropped_messages(&self) -> u64 {
        self.output.dropped()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Start the scheduling thread
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.worker.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        let state = self.state.clone();
        let mut output = self.output.clone();
        let clock = self.clock;
        let interval = self.poll_interval;
        let mut rng = match self.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };

        state.running.store(true, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name("quadstep-scheduler".into())
            .spawn(move || {
                while state.running.load(Ordering::SeqCst) {
                    state.poll(clock.now_ms(), &mut output, &mut rng);
                    thread::sleep(interval);
                }
            });
        let worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                self.state.running.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        self.worker = Some(worker);
        info!(poll_ms = interval.as_millis() as u64, "Sequencer engine started");
        Ok(())
    }

    /// Stop the scheduling thread, silencing anything still sounding
    pub fn stop(&mut self) -> Result<(), EngineError> {
        let worker = self.worker.take().ok_or(EngineError::NotRunning)?;
        self.state.running.store(false, Ordering::SeqCst);
        if worker.join().is_err() {
            warn!("Scheduler thread panicked");
        }
        self.stop_playback();
        info!(
            passes = self.state.playheads.passes(),
            dropped = self.output.dropped(),
            "Sequencer engine stopped"
        );
        Ok(())
    }

    /// Start playback from the top of every lane
    pub fn play(&self) {
        self.state.play(self.clock.now_ms());
    }

    /// Stop playback and send note-off for every sounding note
    pub fn stop_playback(&self) {
        let mut output = self.output.clone();
        self.state.stop_playback(&mut output);
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn set_bpm(&self, bpm: f64) {
        self.state.set_bpm(bpm);
    }

    pub fn bpm(&self) -> f64 {
        self.state.bpm()
    }

    /// Exclusive editing access for multi-lane edits
    pub fn edit(&self) -> MutationGuard<'_> {
        self.state.edit()
    }

    /// Run `f` on one lane with the scheduler paused
    pub fn edit_lane<F, R>(&self, track: usize, role: Role, f: F) -> Result<R, EngineError>
    where
        F: FnOnce(&mut SequenceTrack) -> R,
    {
        let mut guard = self.state.edit();
        let lane = guard.lane_mut(track, role)?;
        Ok(f(lane))
    }

    pub fn set_track_settings(
        &self,
        track: usize,
        settings: TrackSettings,
    ) -> Result<(), EngineError> {
        let mut guard = self.state.edit();
        *guard.settings_mut(track)? = settings;
        debug!(track, ?settings, "Track settings updated");
        Ok(())
    }

    /// Configure and project a Euclidean pattern onto a track's probability lane
    pub fn apply_euclidean(
        &self,
        track: usize,
        length: u8,
        beats: u8,
        rotation: u8,
    ) -> Result<(), EngineError> {
        let mut guard = self.state.edit();
        let lane = guard.lane_mut(track, Role::Probability)?;
        lane.set_euclidean(length, beats)?;
        lane.set_anchor(LaneAnchor::Rotation(rotation));
        lane.apply_euclidean();
        debug!(track, length, beats, rotation, "Euclidean pattern applied");
        Ok(())
    }

    pub fn snapshot(&self, track: usize, role: Role) -> Result<LaneSnapshot, EngineError> {
        self.state.snapshot(track, role)
    }

    /// Current playhead of a lane, read without locking
    pub fn playhead(&self, track: usize, role: Role) -> usize {
        self.state.playheads.index(track, role)
    }
}

impl Drop for SequencerEngine {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quadstep_core::{StepState, TRACKS};

    fn state() -> EngineState {
        EngineState::new(&EngineConfig::default())
    }

    /// Poll every millisecond from `from` up to `to`, counting passes
    fn run(
        state: &EngineState,
        from: u64,
        to: u64,
        out: &mut Vec<MidiMessage>,
        rng: &mut fastrand::Rng,
    ) -> usize {
        (from..to)
            .filter(|now| state.poll(*now, out, rng) == PollOutcome::Ticked)
            .count()
    }

    #[test]
    fn test_stopped_engine_idles() {
        let state = state();
        let mut out = Vec::new();
        let mut rng = fastrand::Rng::with_seed(3);
        assert_eq!(state.poll(500, &mut out, &mut rng), PollOutcome::Idle);
        assert!(out.is_empty());
    }

    #[test]
    fn test_play_emits_notes_and_publishes_playheads() {
        let state = state();
        let mut out = Vec::new();
        let mut rng = fastrand::Rng::with_seed(3);
        state.play(0);

        // 120 bpm: one pass every 21ms, the first step after 24 passes
        let passes = run(&state, 1, 24 * 21 + 1, &mut out, &mut rng);
        assert_eq!(passes, 24);
        assert_eq!(out.iter().filter(|m| m.is_note_on()).count(), 4);
        assert_eq!(state.playheads.index(0, Role::Notes), 1);
        assert_eq!(state.playheads.passes(), 24);
        assert!(state.playheads.is_sounding(0));
    }

    #[test]
    fn test_held_guard_pauses_scheduling() {
        let state = state();
        let mut out = Vec::new();
        let mut rng = fastrand::Rng::with_seed(3);
        state.play(0);

        {
            let mut guard = state.edit();
            assert_eq!(state.poll(100, &mut out, &mut rng), PollOutcome::Paused);
            assert_eq!(state.poll(200, &mut out, &mut rng), PollOutcome::Paused);
            guard.lane_mut(0, Role::Notes).unwrap().set_value(1, 5).unwrap();
        }
        assert_eq!(state.paused_polls(), 2);

        // Elapsed time collapses into a single pass once the guard is gone
        assert_eq!(state.poll(300, &mut out, &mut rng), PollOutcome::Ticked);
        assert_eq!(state.poll(301, &mut out, &mut rng), PollOutcome::Idle);
        assert_eq!(state.snapshot(0, Role::Notes).unwrap().values[1], 5);
    }

    #[test]
    fn test_display_reads_do_not_pause_scheduling() {
        let state = state();
        let mut out = Vec::new();
        let mut rng = fastrand::Rng::with_seed(3);
        state.play(0);

        {
            // A display read in progress holds only the lane copies
            let _reading = state.playheads.lanes.lock().unwrap();
            assert_eq!(state.poll(100, &mut out, &mut rng), PollOutcome::Ticked);
            assert!(state.is_playing());
            assert_eq!(state.bpm(), 120.0);
        }

        let mut now = 100;
        for _ in 0..30 {
            let snap = state.snapshot(0, Role::Notes).unwrap();
            assert_eq!(snap.role, Role::Notes);
            now += 21;
            assert_eq!(state.poll(now, &mut out, &mut rng), PollOutcome::Ticked);
        }
        assert_eq!(state.paused_polls(), 0);
        assert_eq!(state.snapshot(0, Role::Notes).unwrap().index, 1);
        assert!(state.snapshot(TRACKS, Role::Notes).is_err());
    }

    #[test]
    fn test_guard_normalizes_on_drop() {
        let state = state();
        {
            let mut guard = state.edit();
            let lane = guard.lane_mut(1, Role::Velocities).unwrap();
            lane.last = 3;
            lane.first = 9;
            lane.index = 12;
            lane.values[0] = 500;
        }
        let snap = state.snapshot(1, Role::Velocities).unwrap();
        assert_eq!((snap.first, snap.last, snap.index), (3, 3, 3));
        assert_eq!(snap.values[0], Role::Velocities.max_value());
    }

    #[test]
    fn test_stop_playback_silences() {
        let state = state();
        let mut out = Vec::new();
        let mut rng = fastrand::Rng::with_seed(3);
        state.play(0);
        run(&state, 1, 24 * 21 + 1, &mut out, &mut rng);

        out.clear();
        state.stop_playback(&mut out);
        assert!(!state.is_playing());
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|m| m.is_note_off()));
    }

    #[test]
    fn test_engine_edits_through_guard() {
        let engine = SequencerEngine::new(&EngineConfig::default());
        let toggled = engine
            .edit_lane(2, Role::Notes, |lane| lane.toggle_step(4))
            .unwrap()
            .unwrap();
        assert_eq!(toggled, StepState::Off);
        assert!(matches!(
            engine.edit_lane(9, Role::Notes, |_| ()),
            Err(EngineError::Sequencer(SequencerError::TrackNotFound(9)))
        ));

        engine.apply_euclidean(0, 8, 3, 0).unwrap();
        let snap = engine.snapshot(0, Role::Probability).unwrap();
        assert_eq!(snap.last, 7);
        assert_eq!(&snap.values[..8], &[9, 0, 0, 9, 0, 0, 9, 0]);
        assert!(engine.apply_euclidean(0, 4, 6, 0).is_err());

        let mut settings = TrackSettings::for_track(3);
        settings.midi_channel = 10;
        engine.set_track_settings(3, settings).unwrap();
        assert_eq!(engine.edit().track(3).unwrap().settings.note_channel(), 9);
    }

    #[test]
    fn test_tempo_is_clamped() {
        let engine = SequencerEngine::new(&EngineConfig::default());
        engine.set_bpm(5.0);
        assert_eq!(engine.bpm(), 20.0);
    }

    #[test]
    fn test_start_stop_lifecycle() {
        let mut config = EngineConfig::default();
        config.bpm = 300.0;
        config.seed = Some(1);
        let mut engine = SequencerEngine::new(&config);
        let rx = engine.midi_receiver();

        assert!(matches!(engine.stop(), Err(EngineError::NotRunning)));
        engine.start().unwrap();
        assert!(matches!(engine.start(), Err(EngineError::AlreadyRunning)));

        engine.play();
        thread::sleep(Duration::from_millis(600));
        engine.stop().unwrap();
        assert!(!engine.is_running());

        let received: Vec<MidiMessage> = rx.try_iter().collect();
        assert!(received.iter().any(|m| m.is_note_on()));
        assert!(received.last().is_some_and(|m| m.is_note_off()));
    }
}
