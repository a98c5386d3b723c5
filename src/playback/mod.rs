// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Playback backend abstraction.
//!
//! The sequencer core does not produce sound; it hands [`Sound`] payloads
//! to backends behind this trait. A backend supplies the logical clock and
//! accepts "play now" requests; backends that can pre-schedule also accept
//! "play at future instant" requests, which is how the look-ahead scan
//! dispatches notes slightly ahead of their due time.

pub mod log;
pub mod midi;

pub use log::{DispatchRecord, LogBackend};
pub use midi::{list_ports, print_ports, MidiBackend};

use anyhow::Result;

use crate::engine::Sound;

/// Trait for playback backends consumed by the sequencer.
///
/// The first backend registered with a sequencer doubles as its clock
/// source, so `current_time_millis` must be monotonic and share a time
/// base with the instants passed to `schedule_sound`.
pub trait PlaybackBackend: Send {
    /// Monotonic logical clock in milliseconds
    fn current_time_millis(&self) -> f64;

    /// Whether this backend accepts pre-scheduled sound.
    ///
    /// The sequencer only calls `schedule_sound` on backends that return
    /// true; others are skipped, which is not an error.
    fn supports_scheduling(&self) -> bool;

    /// Play a sound immediately
    fn play_sound(&mut self, sound: &Sound) -> Result<()>;

    /// Request playback at a future instant on this backend's clock
    fn schedule_sound(&mut self, sound: &Sound, at_millis: f64) -> Result<()>;
}
