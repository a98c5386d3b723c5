// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Pattern persistence for the looping scheduler.
//!
//! This module owns the textual form of a pattern: loop configuration,
//! per-track grids, and note placements, plus the kit that maps sample
//! names to playable sounds. The engine itself only exposes read accessors
//! and the atomic bulk-load entry point; everything file-shaped lives here.

pub mod watcher;

pub use watcher::{PatternEvent, PatternWatcher};

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::engine::{EventLabel, NoteEvent, Sequencer, Track};
use crate::error::EngineError;

/// Root of a pattern file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternFile {
    /// Loop-level settings
    pub pattern: PatternConfig,
    /// Track definitions, in row order
    #[serde(default)]
    pub tracks: Vec<TrackPattern>,
    /// Sample name to sound mapping
    #[serde(default)]
    pub kit: Kit,
}

/// Loop-level settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternConfig {
    /// Pattern name
    pub name: String,
    /// Loop length in milliseconds
    #[serde(default = "default_loop_length")]
    pub loop_length_millis: f64,
    /// Look-ahead window in milliseconds
    #[serde(default = "default_look_ahead")]
    pub look_ahead_millis: f64,
}

fn default_loop_length() -> f64 {
    crate::engine::DEFAULT_LOOP_LENGTH_MILLIS
}
fn default_look_ahead() -> f64 {
    crate::engine::DEFAULT_LOOK_AHEAD_MILLIS
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            name: "Untitled".to_string(),
            loop_length_millis: default_loop_length(),
            look_ahead_millis: default_look_ahead(),
        }
    }
}

/// One track's configuration and notes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackPattern {
    /// Subdivision count (0 means no grid)
    #[serde(default = "default_subdivisions")]
    pub subdivisions: u32,
    /// Whether notes snap to the subdivision grid
    #[serde(default)]
    pub quantized: bool,
    /// Reference-line count
    #[serde(default = "default_reference_lines")]
    pub reference_lines: u32,
    /// Phase shift of the subdivision grid
    #[serde(default)]
    pub subdivision_offset_millis: f64,
    /// Phase shift of the reference lines
    #[serde(default)]
    pub reference_offset_millis: f64,
    /// Notes on this track
    #[serde(default)]
    pub notes: Vec<NotePattern>,
}

fn default_subdivisions() -> u32 {
    crate::engine::DEFAULT_SUBDIVISIONS
}
fn default_reference_lines() -> u32 {
    crate::engine::DEFAULT_REFERENCE_LINES
}

impl Default for TrackPattern {
    fn default() -> Self {
        Self {
            subdivisions: default_subdivisions(),
            quantized: false,
            reference_lines: default_reference_lines(),
            subdivision_offset_millis: 0.0,
            reference_offset_millis: 0.0,
            notes: Vec::new(),
        }
    }
}

/// One note placement: a beat index on the track's grid, or a raw time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotePattern {
    /// Sample name, resolved through the kit
    pub sample: String,
    /// Subdivision index placement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beat: Option<u32>,
    /// Raw time placement in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_millis: Option<f64>,
    /// Gain (0.0 - 1.0)
    #[serde(default = "default_volume")]
    pub volume: f64,
}

fn default_volume() -> f64 {
    1.0
}

/// Sound definition inside a kit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KitSound {
    /// MIDI note number
    pub note: u8,
    /// MIDI channel (0-15)
    #[serde(default = "default_channel")]
    pub channel: u8,
    /// MIDI velocity before gain scaling
    #[serde(default = "default_velocity")]
    pub velocity: u8,
}

fn default_channel() -> u8 {
    9
}
fn default_velocity() -> u8 {
    100
}

/// Sound bank: named samples mapped to playable definitions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Kit {
    sounds: HashMap<String, KitSound>,
}

impl Kit {
    /// Create an empty kit
    pub fn empty() -> Self {
        Self {
            sounds: HashMap::new(),
        }
    }

    /// Whether the kit defines a sample
    pub fn contains(&self, sample: &str) -> bool {
        self.sounds.contains_key(sample)
    }

    /// Add or replace a sample definition
    pub fn insert(&mut self, sample: impl Into<String>, sound: KitSound) {
        self.sounds.insert(sample.into(), sound);
    }

    /// Resolve a sample name to a playable sound.
    ///
    /// Asking for a sample the kit does not define is a caller error.
    pub fn resolve(&self, sample: &str, volume: f64) -> Result<crate::engine::Sound, EngineError> {
        let def = self
            .sounds
            .get(sample)
            .ok_or_else(|| EngineError::UnknownSample(sample.to_string()))?;
        Ok(crate::engine::Sound::new(sample, def.note)
            .with_channel(def.channel)
            .with_velocity(def.velocity)
            .with_volume(volume))
    }

    /// Iterate sample definitions
    pub fn iter(&self) -> impl Iterator<Item = (&String, &KitSound)> {
        self.sounds.iter()
    }
}

impl Default for Kit {
    /// General MIDI percussion on channel 10
    fn default() -> Self {
        let mut kit = Kit::empty();
        for (name, note) in [
            ("kick", 36),
            ("rimshot", 37),
            ("snare", 38),
            ("clap", 39),
            ("hat_closed", 42),
            ("tom_low", 45),
            ("hat_open", 46),
            ("crash", 49),
            ("tom_high", 50),
            ("ride", 51),
        ] {
            kit.insert(name, KitSound {
                note,
                channel: default_channel(),
                velocity: default_velocity(),
            });
        }
        kit
    }
}

impl PatternFile {
    /// Load a pattern from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read pattern file: {:?}", path.as_ref()))?;
        Self::from_yaml(&contents)
    }

    /// Parse a pattern from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse YAML pattern")
    }

    /// Serialize to a YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize pattern to YAML")
    }

    /// Save the pattern to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = self.to_yaml()?;
        fs::write(path.as_ref(), yaml)
            .with_context(|| format!("Failed to write pattern file: {:?}", path.as_ref()))
    }

    /// Check the pattern for values the engine would reject.
    pub fn validate(&self) -> Result<()> {
        let loop_length = self.pattern.loop_length_millis;
        if !(loop_length.is_finite() && loop_length > 0.0) {
            return Err(anyhow!("loop length must be positive, got {}", loop_length));
        }
        if self.pattern.look_ahead_millis <= 0.0 {
            return Err(anyhow!(
                "look-ahead must be positive, got {}",
                self.pattern.look_ahead_millis
            ));
        }
        if loop_length <= self.pattern.look_ahead_millis {
            return Err(anyhow!(
                "loop length {} must exceed look-ahead {}",
                loop_length,
                self.pattern.look_ahead_millis
            ));
        }
        for (row, track) in self.tracks.iter().enumerate() {
            if track.quantized && track.subdivisions == 0 {
                return Err(anyhow!(
                    "track {}: quantized but has zero subdivisions",
                    row
                ));
            }
            for note in &track.notes {
                if !self.kit.contains(&note.sample) {
                    return Err(anyhow!(
                        "track {}: sample {:?} is not in the kit",
                        row,
                        note.sample
                    ));
                }
                match (note.beat, note.time_millis) {
                    (None, None) => {
                        return Err(anyhow!(
                            "track {}: note {:?} needs a beat or a time",
                            row,
                            note.sample
                        ));
                    }
                    (Some(beat), _) if track.subdivisions == 0 => {
                        return Err(anyhow!(
                            "track {}: beat {} given but the track has no subdivisions",
                            row, beat
                        ));
                    }
                    (Some(beat), _) if beat >= track.subdivisions => {
                        return Err(anyhow!(
                            "track {}: beat {} out of range (subdivisions {})",
                            row, beat, track.subdivisions
                        ));
                    }
                    (_, Some(time)) if !(0.0..loop_length).contains(&time) => {
                        return Err(anyhow!(
                            "track {}: time {} outside the loop (length {})",
                            row, time, loop_length
                        ));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Build engine tracks from this pattern.
    ///
    /// Labels are assigned sequentially across the whole pattern, so every
    /// note gets a unique identity.
    pub fn build_tracks(&self) -> Result<Vec<Track>> {
        self.validate()?;
        let loop_length = self.pattern.loop_length_millis;
        let mut next_label = 0u64;
        let mut tracks = Vec::with_capacity(self.tracks.len());

        for def in &self.tracks {
            let mut track = Track::new(loop_length);
            track.set_subdivisions(def.subdivisions);
            track.set_reference_line_count(def.reference_lines);
            track.set_subdivision_offset_millis(def.subdivision_offset_millis);
            track.set_reference_offset_millis(def.reference_offset_millis);

            let beat_length = track.beat_length_millis();
            for note in &def.notes {
                let sound = self.kit.resolve(&note.sample, note.volume)?;
                let label = EventLabel(next_label);
                next_label += 1;

                let event = if def.quantized {
                    let beat = match (note.beat, note.time_millis, beat_length) {
                        (Some(beat), _, _) => beat,
                        (None, Some(time), Some(beat_length)) => {
                            (time / beat_length).round() as u32 % def.subdivisions
                        }
                        // validate() rules out the remaining shapes
                        _ => 0,
                    };
                    let beat_length = beat_length.unwrap_or(loop_length);
                    NoteEvent::new(label, beat as f64 * beat_length, sound).with_beat(beat)
                } else {
                    let time = match (note.time_millis, note.beat, beat_length) {
                        (Some(time), _, _) => time,
                        (None, Some(beat), Some(beat_length)) => beat as f64 * beat_length,
                        _ => 0.0,
                    };
                    NoteEvent::new(label, time, sound)
                };
                track.insert_event(event);
            }
            if def.quantized {
                // Tracks built from beats are quantized from the start
                track.set_quantized(true).map_err(|e| anyhow!(e))?;
            }
            tracks.push(track);
        }
        Ok(tracks)
    }

    /// Replace a sequencer's entire contents with this pattern, atomically.
    pub fn apply(&self, sequencer: &mut Sequencer) -> Result<()> {
        let tracks = self.build_tracks()?;
        sequencer
            .replace_tracks(
                self.pattern.loop_length_millis,
                self.pattern.look_ahead_millis,
                tracks,
            )
            .map_err(|e| anyhow!(e))
    }

    /// Snapshot a sequencer's current contents as a pattern.
    pub fn from_sequencer(sequencer: &Sequencer, name: impl Into<String>) -> Self {
        let mut kit = Kit::empty();
        let tracks = sequencer
            .tracks()
            .iter()
            .map(|track| TrackPattern {
                subdivisions: track.subdivisions(),
                quantized: track.quantized(),
                reference_lines: track.reference_line_count(),
                subdivision_offset_millis: track.subdivision_offset_millis(),
                reference_offset_millis: track.reference_offset_millis(),
                notes: track
                    .events()
                    .map(|event| {
                        let sound = event.sound();
                        if !kit.contains(&sound.sample) {
                            kit.insert(
                                sound.sample.clone(),
                                KitSound {
                                    note: sound.midi_note,
                                    channel: sound.midi_channel,
                                    velocity: sound.midi_velocity,
                                },
                            );
                        }
                        NotePattern {
                            sample: sound.sample.clone(),
                            beat: event.beat(),
                            time_millis: if event.beat().is_none() {
                                Some(event.priority())
                            } else {
                                None
                            },
                            volume: sound.volume,
                        }
                    })
                    .collect(),
            })
            .collect();

        Self {
            pattern: PatternConfig {
                name: name.into(),
                loop_length_millis: sequencer.loop_length_millis(),
                look_ahead_millis: sequencer.look_ahead_millis(),
            },
            tracks,
            kit,
        }
    }
}
