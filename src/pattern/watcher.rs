// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! File watcher for hot-reloading patterns.
//!
//! Watches a pattern file for changes and emits reload events so a host
//! can swap the running pattern without stopping playback. Reloads are
//! debounced because editors typically produce bursts of write events.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::debug;

use super::PatternFile;

/// Events emitted by the pattern watcher
#[derive(Debug, Clone)]
pub enum PatternEvent {
    /// The pattern file changed and parsed + validated cleanly
    Reloaded(Box<PatternFile>),
    /// The pattern file changed but could not be loaded
    Error(String),
}

/// Watches one pattern file, emitting debounced reload events.
pub struct PatternWatcher {
    _watcher: RecommendedWatcher,
    events: Receiver<PatternEvent>,
    watched_path: PathBuf,
}

impl PatternWatcher {
    /// Watch `path` for modifications.
    ///
    /// `debounce_ms` is how long the file must stay quiet before a reload
    /// is attempted (default 500ms).
    pub fn new<P: AsRef<Path>>(path: P, debounce_ms: Option<u64>) -> Result<Self> {
        let watched_path = path.as_ref().to_path_buf();
        let debounce = Duration::from_millis(debounce_ms.unwrap_or(500));

        let (event_tx, event_rx): (Sender<PatternEvent>, Receiver<PatternEvent>) =
            mpsc::channel();
        let (notify_tx, notify_rx): (Sender<Event>, Receiver<Event>) = mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = notify_tx.send(event);
                }
            },
            Config::default(),
        )
        .map_err(|e| anyhow!("Failed to create file watcher: {}", e))?;

        watcher
            .watch(&watched_path, RecursiveMode::NonRecursive)
            .map_err(|e| anyhow!("Failed to watch path {:?}: {}", watched_path, e))?;

        let reload_path = watched_path.clone();
        std::thread::spawn(move || {
            let mut last_change: Option<Instant> = None;
            loop {
                match notify_rx.recv_timeout(Duration::from_millis(100)) {
                    Ok(event) => {
                        if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                            last_change = Some(Instant::now());
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        let quiet = last_change
                            .map(|at| at.elapsed() >= debounce)
                            .unwrap_or(false);
                        if quiet {
                            last_change = None;
                            debug!(path = ?reload_path, "reloading pattern");
                            let result = PatternFile::load(&reload_path)
                                .and_then(|pattern| pattern.validate().map(|_| pattern));
                            let message = match result {
                                Ok(pattern) => PatternEvent::Reloaded(Box::new(pattern)),
                                Err(e) => PatternEvent::Error(e.to_string()),
                            };
                            if event_tx.send(message).is_err() {
                                break; // watcher dropped
                            }
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            events: event_rx,
            watched_path,
        })
    }

    /// The watched path
    pub fn path(&self) -> &Path {
        &self.watched_path
    }

    /// Next pending event, if any
    pub fn try_recv(&self) -> Option<PatternEvent> {
        self.events.try_recv().ok()
    }

    /// Wait up to `timeout` for an event
    pub fn recv_timeout(&self, timeout: Duration) -> Option<PatternEvent> {
        self.events.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{Kit, PatternConfig, PatternFile};

    fn write_pattern(path: &Path, loop_length: f64) {
        let pattern = PatternFile {
            pattern: PatternConfig {
                name: "Watched".to_string(),
                loop_length_millis: loop_length,
                look_ahead_millis: 25.0,
            },
            tracks: Vec::new(),
            kit: Kit::default(),
        };
        pattern.save(path).unwrap();
    }

    #[test]
    fn test_watcher_requires_existing_path() {
        assert!(PatternWatcher::new("/nonexistent/pattern.yaml", None).is_err());
    }

    #[test]
    fn test_watcher_reports_modification() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pattern.yaml");
        write_pattern(&path, 2000.0);

        let watcher = PatternWatcher::new(&path, Some(100)).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        write_pattern(&path, 3000.0);

        let mut reloaded = None;
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(PatternEvent::Reloaded(pattern)) =
                watcher.recv_timeout(Duration::from_millis(200))
            {
                reloaded = Some(pattern);
                break;
            }
        }

        let pattern = reloaded.expect("no reload event within timeout");
        assert_eq!(pattern.pattern.loop_length_millis, 3000.0);
    }

    #[test]
    fn test_watcher_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pattern.yaml");
        write_pattern(&path, 2000.0);

        let watcher = PatternWatcher::new(&path, Some(100)).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        std::fs::write(&path, "pattern: [not: valid").unwrap();

        let mut saw_error = false;
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            match watcher.recv_timeout(Duration::from_millis(200)) {
                Some(PatternEvent::Error(_)) => {
                    saw_error = true;
                    break;
                }
                Some(PatternEvent::Reloaded(_)) => continue,
                None => continue,
            }
        }
        assert!(saw_error);
    }
}
