// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Logging playback backend.
//!
//! Accepts pre-scheduled sound, records every dispatch, and reports it
//! through tracing. Useful for running patterns without sound hardware and
//! for inspecting what the scheduler decided to play.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Result;
use tracing::info;

use super::PlaybackBackend;
use crate::engine::Sound;

/// One recorded dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRecord {
    /// Sample identity that was dispatched
    pub sample: String,
    /// Target instant in milliseconds, `None` for immediate playback
    pub at_millis: Option<f64>,
}

/// Backend that logs and records dispatches instead of producing sound.
pub struct LogBackend {
    origin: Instant,
    records: Arc<Mutex<Vec<DispatchRecord>>>,
}

impl LogBackend {
    /// Create a backend whose clock starts at zero now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared handle to the dispatch records, usable after the backend has
    /// been moved into a sequencer
    pub fn records(&self) -> Arc<Mutex<Vec<DispatchRecord>>> {
        Arc::clone(&self.records)
    }

    fn record(&self, sample: &str, at_millis: Option<f64>) {
        if let Ok(mut records) = self.records.lock() {
            records.push(DispatchRecord {
                sample: sample.to_string(),
                at_millis,
            });
        }
    }
}

impl Default for LogBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackBackend for LogBackend {
    fn current_time_millis(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    fn supports_scheduling(&self) -> bool {
        true
    }

    fn play_sound(&mut self, sound: &Sound) -> Result<()> {
        info!(sample = %sound.sample, volume = sound.volume, "play");
        self.record(&sound.sample, None);
        Ok(())
    }

    fn schedule_sound(&mut self, sound: &Sound, at_millis: f64) -> Result<()> {
        info!(sample = %sound.sample, at_millis, "schedule");
        self.record(&sound.sample, Some(at_millis));
        Ok(())
    }
}
