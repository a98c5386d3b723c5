// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

use std::env;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;

use loopseq::engine::Sequencer;
use loopseq::pattern::{PatternEvent, PatternFile, PatternWatcher};
use loopseq::playback::{print_ports, LogBackend, MidiBackend, PlaybackBackend};

fn print_usage() {
    println!("LOOPSEQ - Looping Multi-Track Note Scheduler");
    println!();
    println!("Usage: loopseq [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --list-midi               List available MIDI output ports");
    println!("  --test-note <N>           Send a test note to MIDI port N");
    println!("  --play <FILE> [SECONDS]   Play a pattern file (default 8 seconds)");
    println!("  --watch <FILE> [SECONDS]  Play a pattern file, hot-reloading on change");
    println!("  --help                    Show this help message");
}

fn send_test_note(port: usize) -> Result<()> {
    println!("Connecting to MIDI port {}...", port);
    let mut backend = MidiBackend::connect(port)?;
    println!("Connected to '{}'", backend.port_name());

    let kick = loopseq::Sound::new("kick", 36);
    println!("Sending test note (kick, note 36)...");
    backend.play_sound(&kick)?;
    thread::sleep(Duration::from_millis(500));

    println!("Test complete!");
    Ok(())
}

fn run_pattern(path: &str, seconds: f64, watch: bool) -> Result<()> {
    let pattern = PatternFile::load(path)?;
    pattern.validate()?;

    let mut sequencer = Sequencer::new(
        pattern.pattern.loop_length_millis,
        pattern.pattern.look_ahead_millis,
    )?;
    let backend = LogBackend::new();
    let records = backend.records();
    sequencer.add_backend(Box::new(backend));
    pattern.apply(&mut sequencer)?;

    let watcher = if watch {
        Some(PatternWatcher::new(path, None)?)
    } else {
        None
    };

    println!(
        "Playing '{}' ({} tracks, loop {:.0}ms) for {:.0}s...",
        pattern.pattern.name,
        sequencer.track_count(),
        sequencer.loop_length_millis(),
        seconds
    );

    sequencer.unpause();
    let started = Instant::now();
    let run_duration = Duration::from_secs_f64(seconds);

    while started.elapsed() < run_duration {
        sequencer.tick();

        if let Some(ref watcher) = watcher {
            match watcher.try_recv() {
                Some(PatternEvent::Reloaded(pattern)) => match pattern.apply(&mut sequencer) {
                    Ok(()) => println!("Pattern reloaded: '{}'", pattern.pattern.name),
                    Err(e) => eprintln!("Reload rejected: {}", e),
                },
                Some(PatternEvent::Error(message)) => {
                    eprintln!("Pattern file error: {}", message);
                }
                None => {}
            }
        }

        // Small sleep to prevent busy-waiting; the look-ahead window
        // comfortably exceeds this gap
        thread::sleep(Duration::from_millis(2));
    }
    sequencer.pause();

    let dispatched = records.lock().map(|r| r.len()).unwrap_or(0);
    println!("Done. Dispatched {} notes.", dispatched);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        println!("LOOPSEQ - Looping Multi-Track Note Scheduler");
        println!("Run with --help for usage information");
        return Ok(());
    }

    match args[1].as_str() {
        "--list-midi" => {
            print_ports();
        }
        "--test-note" => {
            if args.len() < 3 {
                eprintln!("Error: --test-note requires a port number");
                eprintln!("Use --list-midi to see available ports");
                std::process::exit(1);
            }
            let port: usize = args[2]
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid port number: {}", args[2]))?;
            send_test_note(port)?;
        }
        "--play" | "--watch" => {
            if args.len() < 3 {
                eprintln!("Error: {} requires a pattern file", args[1]);
                std::process::exit(1);
            }
            let seconds: f64 = if args.len() >= 4 {
                args[3].parse().unwrap_or(8.0)
            } else {
                8.0
            };
            run_pattern(&args[2], seconds, args[1] == "--watch")?;
        }
        "--help" | "-h" => {
            print_usage();
        }
        _ => {
            eprintln!("Unknown option: {}", args[1]);
            print_usage();
            std::process::exit(1);
        }
    }

    Ok(())
}
