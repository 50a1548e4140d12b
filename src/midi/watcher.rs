// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    error::Error,
    sync::Arc,
    thread,
    time::Duration,
};

use crossbeam_channel::{RecvTimeoutError, Sender};
use tracing::{debug, info, span, warn, Level};

use super::{Access, ConnectionState, Event, MidiDevice};

/// Polls the host's port list and reports ports that appear or disappear.
pub(crate) struct Watcher {
    stop: Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

/// Compares two port snapshots and returns the hot-plug events between them.
pub(crate) fn diff(known: &[MidiDevice], current: &[MidiDevice]) -> Vec<Event> {
    let mut events = Vec::new();
    for port in current {
        if !known.iter().any(|known| known.same_port(port)) {
            events.push(Event::Connected(port.clone()));
        }
    }
    for port in known {
        if !current.iter().any(|current| current.same_port(port)) {
            let mut port = port.clone();
            port.state = ConnectionState::Disconnected;
            events.push(Event::Disconnected(port));
        }
    }
    events
}

impl Watcher {
    /// Starts polling. `known` is the snapshot the caller already acted on.
    pub(crate) fn spawn(
        access: Arc<dyn Access>,
        mut known: Vec<MidiDevice>,
        interval: Duration,
        events: Sender<Event>,
    ) -> Result<Watcher, Box<dyn Error>> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let thread = thread::Builder::new()
            .name("midi-hotplug".to_string())
            .spawn(move || {
                let span = span!(Level::INFO, "midi hotplug watcher");
                let _enter = span.enter();
                info!(interval = format!("{:?}", interval), "Watching for MIDI devices.");

                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }

                    let current = match access.ports() {
                        Ok(current) => current,
                        Err(e) => {
                            warn!(err = e.to_string(), "Unable to list MIDI ports.");
                            continue;
                        }
                    };
                    for event in diff(&known, &current) {
                        debug!(event = format!("{:?}", event), "MIDI hot-plug.");
                        if events.send(event).is_err() {
                            return;
                        }
                    }
                    known = current;
                }
                debug!("Stopped watching for MIDI devices.");
            })?;

        Ok(Watcher {
            stop: stop_tx,
            thread: Some(thread),
        })
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        let _ = self.stop.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
