// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! LOOPSEQ - a looping, multi-track note scheduler.
//!
//! Time-stamped sound events are arranged into independent tracks; a
//! sequencer continuously determines, ahead of real time, which events
//! fall within an upcoming playback window and hands them to playback
//! backends at the correct moment. Notes, tempo, subdivisions, and
//! quantization can all be changed live without duplicate or missed
//! triggers.
//!
//! - [`engine`] - the ordered event store, tracks, and the sequencer
//! - [`playback`] - the backend boundary plus MIDI and logging backends
//! - [`pattern`] - YAML pattern files, the sound kit, and hot reload

pub mod engine;
pub mod error;
pub mod pattern;
pub mod playback;

pub use engine::{
    EventHandle, EventLabel, NoteEvent, OrderedEventList, Sequencer, Sound, Track,
};
pub use error::EngineError;
pub use pattern::{Kit, PatternFile};
pub use playback::{LogBackend, MidiBackend, PlaybackBackend};
