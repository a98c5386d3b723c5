// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! The looping sequencer.
//!
//! Owns the track collection, the loop/look-ahead configuration, and the
//! transport timekeeping. A host loop calls [`Sequencer::tick`] at high
//! frequency; each tick reads the primary backend's clock, derives the
//! time within the loop, and runs the per-track look-ahead scan,
//! dispatching due notes to every backend that accepts pre-scheduled
//! sound. Mutation (insert/remove notes, tempo changes, transport) is safe
//! to call between ticks on the same thread.

use tracing::{debug, warn};

use super::event::{EventLabel, NoteEvent, Sound};
use super::list::EventHandle;
use super::track::Track;
use crate::error::EngineError;
use crate::playback::PlaybackBackend;

/// Default loop length for a new sequencer
pub const DEFAULT_LOOP_LENGTH_MILLIS: f64 = 2000.0;
/// Default look-ahead window
pub const DEFAULT_LOOK_AHEAD_MILLIS: f64 = 25.0;

/// Transport timekeeping.
///
/// While paused the loop phase is frozen at the value captured on pause;
/// while running it is derived purely from the backend clock minus the
/// resume instant plus the frozen accumulator. Pausing and resuming
/// therefore never loses or duplicates phase.
#[derive(Debug, Clone, Copy)]
struct Timekeeping {
    running: bool,
    /// Backend clock at the most recent unpause
    resume_instant_millis: f64,
    /// Loop-phase accumulator captured at the most recent pause. Whole
    /// loops are kept (not reduced modulo the loop length) so the loop
    /// iteration index increments exactly at the wrap.
    frozen_elapsed_millis: f64,
}

impl Timekeeping {
    fn new() -> Self {
        Self {
            running: false,
            resume_instant_millis: 0.0,
            frozen_elapsed_millis: 0.0,
        }
    }

    /// Total loop-phase time at backend clock `now`
    fn elapsed(&self, now: f64) -> f64 {
        if self.running {
            now - self.resume_instant_millis + self.frozen_elapsed_millis
        } else {
            self.frozen_elapsed_millis
        }
    }
}

/// Looping multi-track note scheduler.
pub struct Sequencer {
    tracks: Vec<Track>,
    loop_length_millis: f64,
    look_ahead_millis: f64,
    timekeeping: Timekeeping,
    /// Loop phase seen on the previous tick, for wrap detection
    last_time_within_loop: f64,
    backends: Vec<Box<dyn PlaybackBackend>>,
    next_label: u64,
}

impl Sequencer {
    /// Create a sequencer with the given loop and look-ahead window.
    ///
    /// The loop must be strictly longer than the look-ahead window or the
    /// wrap-around scan would overlap itself.
    pub fn new(loop_length_millis: f64, look_ahead_millis: f64) -> Result<Self, EngineError> {
        validate_window(loop_length_millis, look_ahead_millis)?;
        Ok(Self {
            tracks: Vec::new(),
            loop_length_millis,
            look_ahead_millis,
            timekeeping: Timekeeping::new(),
            last_time_within_loop: 0.0,
            backends: Vec::new(),
            next_label: 0,
        })
    }

    /// Register a playback backend.
    ///
    /// The first registered backend is also the sequencer's clock source.
    pub fn add_backend(&mut self, backend: Box<dyn PlaybackBackend>) {
        self.backends.push(backend);
    }

    /// Loop length in milliseconds
    pub fn loop_length_millis(&self) -> f64 {
        self.loop_length_millis
    }

    /// Look-ahead window in milliseconds
    pub fn look_ahead_millis(&self) -> f64 {
        self.look_ahead_millis
    }

    /// Whether the transport is running
    pub fn is_running(&self) -> bool {
        self.timekeeping.running
    }

    /// Current time within the loop (frozen while paused)
    pub fn time_within_loop(&self) -> f64 {
        let now = self.clock().unwrap_or(0.0);
        self.timekeeping.elapsed(now) % self.loop_length_millis
    }

    /// Completed loop cycles since the phase was last zeroed
    pub fn loop_index(&self) -> u64 {
        let now = self.clock().unwrap_or(0.0);
        (self.timekeeping.elapsed(now) / self.loop_length_millis) as u64
    }

    /// The tracks, in row order
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Number of tracks
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Read one track
    pub fn track(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    /// Mint a fresh event label, unique within this sequencer
    pub fn mint_label(&mut self) -> EventLabel {
        let label = EventLabel(self.next_label);
        self.next_label += 1;
        label
    }

    /// Freeze the loop phase. Idempotent.
    pub fn pause(&mut self) {
        if !self.timekeeping.running {
            return;
        }
        let now = self.clock().unwrap_or(0.0);
        self.timekeeping.frozen_elapsed_millis = self.timekeeping.elapsed(now);
        self.timekeeping.running = false;
        debug!(
            phase = self.timekeeping.frozen_elapsed_millis % self.loop_length_millis,
            "transport paused"
        );
    }

    /// Resume from the frozen phase. Idempotent.
    pub fn unpause(&mut self) {
        if self.timekeeping.running {
            return;
        }
        self.timekeeping.resume_instant_millis = self.clock().unwrap_or(0.0);
        self.timekeeping.running = true;
        debug!("transport running");
    }

    /// Zero the loop phase without touching the run/pause flag, and forget
    /// which iteration every event last fired on, so events already passed
    /// in the new loop pass will fire again.
    pub fn restart(&mut self) {
        self.timekeeping.frozen_elapsed_millis = 0.0;
        self.timekeeping.resume_instant_millis = self.clock().unwrap_or(0.0);
        self.last_time_within_loop = 0.0;
        for track in &mut self.tracks {
            track.clear_iteration_stamps();
            track.reset_cursor();
        }
    }

    /// Change the loop length, stretching every track and the frozen phase
    /// proportionally so relative position in the loop is preserved.
    pub fn set_loop_length_millis(&mut self, new_length: f64) -> Result<(), EngineError> {
        validate_window(new_length, self.look_ahead_millis)?;
        if new_length == self.loop_length_millis {
            return Ok(());
        }
        let ratio = new_length / self.loop_length_millis;
        for track in &mut self.tracks {
            track.set_loop_length_millis(new_length);
        }
        // Fold running time into the accumulator, then stretch it, so the
        // phase keeps its relative position whether paused or running
        let now = self.clock().unwrap_or(0.0);
        self.timekeeping.frozen_elapsed_millis = self.timekeeping.elapsed(now) * ratio;
        if self.timekeeping.running {
            self.timekeeping.resume_instant_millis = now;
        }
        self.loop_length_millis = new_length;
        self.last_time_within_loop = self.timekeeping.frozen_elapsed_millis % new_length;
        Ok(())
    }

    /// Change the look-ahead window
    pub fn set_look_ahead_millis(&mut self, look_ahead: f64) -> Result<(), EngineError> {
        validate_window(self.loop_length_millis, look_ahead)?;
        self.look_ahead_millis = look_ahead;
        Ok(())
    }

    /// Append an empty track, returning its index
    pub fn add_track(&mut self) -> usize {
        self.tracks.push(Track::new(self.loop_length_millis));
        self.tracks.len() - 1
    }

    /// Remove and return the track at `index`
    pub fn remove_track_at(&mut self, index: usize) -> Result<Track, EngineError> {
        if index >= self.tracks.len() {
            return Err(self.track_range_error(index));
        }
        Ok(self.tracks.remove(index))
    }

    /// Move a track to a new row, preserving the relative order of all
    /// other tracks
    pub fn move_track(&mut self, from: usize, to: usize) -> Result<(), EngineError> {
        if from >= self.tracks.len() {
            return Err(self.track_range_error(from));
        }
        if to >= self.tracks.len() {
            return Err(self.track_range_error(to));
        }
        let track = self.tracks.remove(from);
        self.tracks.insert(to, track);
        Ok(())
    }

    /// Change a track's subdivision count
    pub fn set_track_subdivisions(
        &mut self,
        index: usize,
        subdivisions: u32,
    ) -> Result<(), EngineError> {
        self.track_mut(index)?.set_subdivisions(subdivisions);
        Ok(())
    }

    /// Toggle a track's beat quantization
    pub fn set_track_quantization(
        &mut self,
        index: usize,
        quantized: bool,
    ) -> Result<(), EngineError> {
        self.track_mut(index)?.set_quantized(quantized)
    }

    /// Insert a note into a track
    pub fn insert_note(
        &mut self,
        index: usize,
        event: NoteEvent,
    ) -> Result<EventHandle, EngineError> {
        Ok(self.track_mut(index)?.insert_event(event))
    }

    /// Remove a note from a track by label, returning it for reuse
    pub fn remove_note(
        &mut self,
        index: usize,
        label: EventLabel,
    ) -> Result<NoteEvent, EngineError> {
        self.track_mut(index)?.remove_event(label)
    }

    /// Replace the whole pattern atomically: loop length, look-ahead, and
    /// every track's contents. Nothing changes unless validation passes.
    pub fn replace_tracks(
        &mut self,
        loop_length_millis: f64,
        look_ahead_millis: f64,
        mut tracks: Vec<Track>,
    ) -> Result<(), EngineError> {
        validate_window(loop_length_millis, look_ahead_millis)?;
        for track in &tracks {
            if track.loop_length_millis() != loop_length_millis {
                return Err(EngineError::InvalidConfiguration(format!(
                    "track loop length {} does not match pattern loop length {}",
                    track.loop_length_millis(),
                    loop_length_millis
                )));
            }
        }
        for track in &mut tracks {
            track.clear_iteration_stamps();
            track.reset_cursor();
        }
        let highest_label = tracks
            .iter()
            .flat_map(|track| track.events())
            .map(|event| event.label().0)
            .max();
        if let Some(highest) = highest_label {
            self.next_label = self.next_label.max(highest + 1);
        }
        self.tracks = tracks;
        self.loop_length_millis = loop_length_millis;
        self.look_ahead_millis = look_ahead_millis;
        self.last_time_within_loop = self.time_within_loop();
        Ok(())
    }

    /// Dispatch a sound immediately to every backend, bypassing scheduling
    pub fn play_now(&mut self, sound: &Sound) {
        for backend in &mut self.backends {
            if let Err(error) = backend.play_sound(sound) {
                warn!(%error, "backend failed to play sound");
            }
        }
    }

    /// Request future playback from every backend that can pre-schedule;
    /// backends that cannot are skipped, which is not an error
    pub fn schedule_at(&mut self, sound: &Sound, at_millis: f64) {
        for backend in &mut self.backends {
            if !backend.supports_scheduling() {
                continue;
            }
            if let Err(error) = backend.schedule_sound(sound, at_millis) {
                warn!(%error, "backend rejected scheduled sound");
            }
        }
    }

    /// Advance timekeeping and dispatch due notes.
    ///
    /// Never fails: backend errors are logged and do not halt scheduling
    /// for other tracks or backends. Paused transport freezes the loop
    /// phase and dispatches nothing.
    pub fn tick(&mut self) {
        let Some(now) = self.clock() else {
            return;
        };
        if !self.timekeeping.running {
            return;
        }

        let elapsed = self.timekeeping.elapsed(now);
        let time_within_loop = elapsed % self.loop_length_millis;
        let loop_start = now - time_within_loop;
        let iteration = (elapsed / self.loop_length_millis) as u64;

        if time_within_loop < self.last_time_within_loop {
            for track in &mut self.tracks {
                track.reset_cursor();
            }
        }
        self.last_time_within_loop = time_within_loop;

        let mut dispatches = Vec::new();
        for track in &mut self.tracks {
            for note in track.scan(time_within_loop, self.look_ahead_millis, iteration) {
                let at = if note.wrapped {
                    loop_start + self.loop_length_millis + note.offset_millis
                } else {
                    loop_start + note.offset_millis
                };
                dispatches.push((note.sound, at));
            }
        }

        for (sound, at) in dispatches {
            debug!(sample = %sound.sample, at_millis = at, iteration, "dispatching note");
            self.schedule_at(&sound, at);
        }
    }

    fn clock(&self) -> Option<f64> {
        self.backends.first().map(|backend| backend.current_time_millis())
    }

    fn track_mut(&mut self, index: usize) -> Result<&mut Track, EngineError> {
        let len = self.tracks.len();
        self.tracks
            .get_mut(index)
            .ok_or(EngineError::IndexOutOfRange { index, len })
    }

    fn track_range_error(&self, index: usize) -> EngineError {
        EngineError::IndexOutOfRange {
            index,
            len: self.tracks.len(),
        }
    }
}

fn validate_window(loop_length: f64, look_ahead: f64) -> Result<(), EngineError> {
    if !loop_length.is_finite() || loop_length <= 0.0 {
        return Err(EngineError::InvalidConfiguration(format!(
            "loop length must be positive, got {loop_length}"
        )));
    }
    if !look_ahead.is_finite() || look_ahead <= 0.0 {
        return Err(EngineError::InvalidConfiguration(format!(
            "look-ahead must be positive, got {look_ahead}"
        )));
    }
    if loop_length <= look_ahead {
        return Err(EngineError::InvalidConfiguration(format!(
            "loop length {loop_length} must exceed look-ahead window {look_ahead}"
        )));
    }
    Ok(())
}
