// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! MIDI playback backend.
//!
//! Sends note messages to an external MIDI device via midir. MIDI output
//! here is fire-when-asked: the connection cannot pre-schedule, so this
//! backend only answers immediate playback and is skipped by the
//! sequencer's look-ahead dispatch.

use std::time::Instant;

use anyhow::{anyhow, Result};
use midir::{MidiOutput, MidiOutputConnection};
use tracing::debug;

use super::PlaybackBackend;
use crate::engine::Sound;

/// MIDI message constants
pub mod messages {
    pub const NOTE_OFF: u8 = 0x80;
    pub const NOTE_ON: u8 = 0x90;
}

/// MIDI output backend connected to one port.
pub struct MidiBackend {
    connection: MidiOutputConnection,
    port_name: String,
    origin: Instant,
}

impl MidiBackend {
    /// Connect to the MIDI output port at `port_index`.
    pub fn connect(port_index: usize) -> Result<Self> {
        let output = MidiOutput::new("loopseq")
            .map_err(|e| anyhow!("Failed to create MIDI output: {}", e))?;
        let ports = output.ports();
        let port = ports.get(port_index).ok_or_else(|| {
            anyhow!(
                "MIDI port {} not found (only {} available)",
                port_index,
                ports.len()
            )
        })?;
        let port_name = output
            .port_name(port)
            .unwrap_or_else(|_| format!("Unknown {}", port_index));
        let connection = output
            .connect(port, "loopseq-out")
            .map_err(|e| anyhow!("Failed to connect to MIDI port {}: {}", port_index, e))?;

        debug!(port = %port_name, "connected MIDI output");
        Ok(Self {
            connection,
            port_name,
            origin: Instant::now(),
        })
    }

    /// Connect to the first port whose name contains `name` (case-insensitive).
    pub fn connect_by_name(name: &str) -> Result<Self> {
        let ports = list_ports()?;
        let index = ports
            .iter()
            .position(|n| n.to_lowercase().contains(&name.to_lowercase()))
            .ok_or_else(|| anyhow!("No MIDI port matching '{}' found", name))?;
        Self::connect(index)
    }

    /// Name of the connected port
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    fn send_note(&mut self, sound: &Sound) -> Result<()> {
        let velocity = scaled_velocity(sound);
        let channel = sound.midi_channel & 0x0F;
        self.connection
            .send(&[messages::NOTE_ON | channel, sound.midi_note, velocity])
            .map_err(|e| anyhow!("Failed to send MIDI message: {}", e))?;
        // Percussive one-shot: release immediately, GM drum channels ignore
        // the note length anyway
        self.connection
            .send(&[messages::NOTE_OFF | channel, sound.midi_note, 0])
            .map_err(|e| anyhow!("Failed to send MIDI message: {}", e))?;
        Ok(())
    }
}

impl PlaybackBackend for MidiBackend {
    fn current_time_millis(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    fn supports_scheduling(&self) -> bool {
        false
    }

    fn play_sound(&mut self, sound: &Sound) -> Result<()> {
        self.send_note(sound)
    }

    fn schedule_sound(&mut self, _sound: &Sound, _at_millis: f64) -> Result<()> {
        Err(anyhow!("MIDI backend cannot pre-schedule sound"))
    }
}

/// List the names of all available MIDI output ports.
pub fn list_ports() -> Result<Vec<String>> {
    let output = MidiOutput::new("loopseq")
        .map_err(|e| anyhow!("Failed to create MIDI output: {}", e))?;
    Ok(output
        .ports()
        .iter()
        .enumerate()
        .map(|(i, port)| {
            output
                .port_name(port)
                .unwrap_or_else(|_| format!("Unknown {}", i))
        })
        .collect())
}

/// Print all available MIDI output ports to stdout.
pub fn print_ports() {
    match list_ports() {
        Ok(ports) if ports.is_empty() => println!("No MIDI output ports available"),
        Ok(ports) => {
            println!("Available MIDI output ports:");
            for (i, name) in ports.iter().enumerate() {
                println!("  {}: {}", i, name);
            }
        }
        Err(e) => eprintln!("Failed to list MIDI ports: {}", e),
    }
}

/// Velocity after applying the sound's gain.
fn scaled_velocity(sound: &Sound) -> u8 {
    let scaled = (sound.midi_velocity as f64 * sound.volume).round();
    scaled.clamp(1.0, 127.0) as u8
}
