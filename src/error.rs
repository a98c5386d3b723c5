// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Error types for the scheduling engine.

use thiserror::Error;

use crate::engine::EventLabel;

/// Errors surfaced by the engine.
///
/// `NotFound`, `IndexOutOfRange`, and `UnknownSample` indicate a caller
/// broke a documented contract (removing a label that was never inserted,
/// addressing a track that does not exist, asking the kit for a sample it
/// does not define). `InvalidConfiguration` is returned at setter
/// boundaries for values that would corrupt the scheduling scan, such as
/// a loop shorter than the look-ahead window.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// No event with the given label exists in the track's list
    #[error("no event labeled {0:?} in track")]
    NotFound(EventLabel),
    /// Track or list index out of range
    #[error("index {index} out of range (length {len})")]
    IndexOutOfRange { index: usize, len: usize },
    /// Configuration value rejected at the setter boundary
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// Sample name not present in the current sound bank
    #[error("unknown sample {0:?}")]
    UnknownSample(String),
}
