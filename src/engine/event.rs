// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Event model for the looping scheduler.
//!
//! A [`NoteEvent`] is one scheduled note inside a track's loop: an opaque
//! label identity, a time-within-loop in milliseconds, an optional
//! subdivision index when the note is quantized, and the sound payload the
//! playback backends consume.

use serde::{Deserialize, Serialize};

/// Opaque, stable identity of an event.
///
/// Labels are assigned by the caller (or minted by the sequencer) and are
/// used as lookup keys for removal and re-insertion. They stay constant for
/// the event's lifetime; uniqueness within a track is the caller's contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventLabel(pub u64);

/// Sound payload handed to playback backends.
///
/// Opaque to the list and the scheduler; the engine only moves it around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sound {
    /// Sample identity in the sound bank
    pub sample: String,
    /// Gain (0.0 - 1.0), applied by the backend
    pub volume: f64,
    /// MIDI note number
    pub midi_note: u8,
    /// MIDI velocity before gain scaling
    pub midi_velocity: u8,
    /// MIDI channel (0-15)
    pub midi_channel: u8,
}

impl Sound {
    /// Create a sound with default volume, velocity, and the GM drum channel
    pub fn new(sample: impl Into<String>, midi_note: u8) -> Self {
        Self {
            sample: sample.into(),
            volume: 1.0,
            midi_note,
            midi_velocity: 100,
            midi_channel: 9,
        }
    }

    /// Set the gain
    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = volume.clamp(0.0, 1.0);
        self
    }

    /// Set the MIDI channel
    pub fn with_channel(mut self, channel: u8) -> Self {
        self.midi_channel = channel.min(15);
        self
    }

    /// Set the MIDI velocity
    pub fn with_velocity(mut self, velocity: u8) -> Self {
        self.midi_velocity = velocity.min(127);
        self
    }
}

/// A note scheduled within a track's loop.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteEvent {
    /// Stable lookup identity
    label: EventLabel,
    /// Time within the loop, in milliseconds; the list's sort key
    priority: f64,
    /// Subdivision index when quantized, `None` for free placement
    beat: Option<u32>,
    /// Loop iteration this event was last dispatched on, `None` for never
    last_scheduled_iteration: Option<u64>,
    /// Sound payload, owned by the caller's domain
    sound: Sound,
}

impl NoteEvent {
    /// Create an unquantized event at a raw time within the loop
    pub fn new(label: EventLabel, priority: f64, sound: Sound) -> Self {
        Self {
            label,
            priority,
            beat: None,
            last_scheduled_iteration: None,
            sound,
        }
    }

    /// Attach a subdivision index (used when building quantized tracks)
    pub fn with_beat(mut self, beat: u32) -> Self {
        self.beat = Some(beat);
        self
    }

    /// The event's label
    pub fn label(&self) -> EventLabel {
        self.label
    }

    /// Time within the loop in milliseconds
    pub fn priority(&self) -> f64 {
        self.priority
    }

    /// Subdivision index, `None` when not quantized
    pub fn beat(&self) -> Option<u32> {
        self.beat
    }

    /// Loop iteration this event was last dispatched on
    pub fn last_scheduled_iteration(&self) -> Option<u64> {
        self.last_scheduled_iteration
    }

    /// The sound payload
    pub fn sound(&self) -> &Sound {
        &self.sound
    }

    pub(crate) fn set_priority(&mut self, priority: f64) {
        self.priority = priority;
    }

    pub(crate) fn set_beat(&mut self, beat: Option<u32>) {
        self.beat = beat;
    }

    pub(crate) fn stamp_iteration(&mut self, iteration: u64) {
        self.last_scheduled_iteration = Some(iteration);
    }

    pub(crate) fn clear_iteration_stamp(&mut self) {
        self.last_scheduled_iteration = None;
    }
}
