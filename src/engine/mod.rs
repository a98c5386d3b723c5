// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Scheduling engine core.
//!
//! This module provides the looping scheduler infrastructure:
//! - Ordered, arena-backed event storage with stable handles
//! - Tracks with subdivision grids, quantization, and cursor management
//! - The sequencer with loop-relative timekeeping and two-phase
//!   look-ahead scanning

pub mod event;
pub mod list;
pub mod sequencer;
pub mod track;

pub use event::{EventLabel, NoteEvent, Sound};
pub use list::{EventHandle, OrderedEventList};
pub use sequencer::{Sequencer, DEFAULT_LOOK_AHEAD_MILLIS, DEFAULT_LOOP_LENGTH_MILLIS};
pub use track::{Track, DEFAULT_REFERENCE_LINES, DEFAULT_SUBDIVISIONS};
