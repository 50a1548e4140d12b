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
//! The device router: keeps registries of note-input and note-output devices,
//! parses what the inputs send, tracks which notes are sounding and publishes
//! note events to subscribers.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, span, warn, Level};

use crate::{
    config,
    error::Error,
    midi::{
        self,
        message::{self, Message},
        watcher::Watcher,
        Access, Direction, Event, InputConnection, MidiDevice, OutputConnection,
    },
};

mod notes;

pub use notes::ActiveNoteSet;

/// What subscribers hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteEvent {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    PitchBend { channel: u8, value: u16 },
}

struct Input {
    device: MidiDevice,
    _connection: Box<dyn InputConnection>,
}

struct Output {
    device: MidiDevice,
    connection: Box<dyn OutputConnection>,
}

pub struct DeviceRouter {
    access: Option<Arc<dyn Access>>,
    inputs: BTreeMap<String, Input>,
    outputs: BTreeMap<String, Output>,
    notes: ActiveNoteSet,
    events_tx: Sender<Event>,
    events_rx: Receiver<Event>,
    subscribers: Vec<Sender<NoteEvent>>,
    watcher: Option<Watcher>,
}

impl Default for DeviceRouter {
    fn default() -> Self {
        DeviceRouter::new()
    }
}

impl DeviceRouter {
    pub fn new() -> DeviceRouter {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        DeviceRouter {
            access: None,
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            notes: ActiveNoteSet::default(),
            events_tx,
            events_rx,
            subscribers: Vec::new(),
            watcher: None,
        }
    }

    /// Opens the configured MIDI backend. A failure here leaves the router
    /// usable for virtual notes only.
    pub fn initialize(&mut self, config: &config::Midi) -> Result<(), Error> {
        if self.access.is_some() {
            return Ok(());
        }
        let access = midi::open(config.backend())
            .map_err(|e| Error::DeviceAccessUnavailable(e.to_string()))?;
        self.initialize_with(access, Some(config.rescan_interval()?))
    }

    /// Scans the ports already present and, given an interval, keeps watching
    /// for ports that come and go.
    pub fn initialize_with(
        &mut self,
        access: Arc<dyn Access>,
        rescan_interval: Option<Duration>,
    ) -> Result<(), Error> {
        if self.access.is_some() {
            return Ok(());
        }

        let span = span!(Level::INFO, "initialize devices");
        let _enter = span.enter();

        let ports = access
            .ports()
            .map_err(|e| Error::DeviceAccessUnavailable(e.to_string()))?;
        self.access = Some(access.clone());
        for port in ports.iter() {
            self.attach(port.clone());
        }

        if let Some(interval) = rescan_interval {
            match Watcher::spawn(access, ports, interval, self.events_tx.clone()) {
                Ok(watcher) => self.watcher = Some(watcher),
                Err(e) => warn!(
                    err = e.to_string(),
                    "Unable to watch for MIDI devices, hot-plug disabled."
                ),
            }
        }

        info!(
            inputs = self.inputs.len(),
            outputs = self.outputs.len(),
            "MIDI devices initialized."
        );
        Ok(())
    }

    fn attach(&mut self, device: MidiDevice) {
        let Some(access) = self.access.clone() else {
            return;
        };

        match device.direction {
            Direction::Input => {
                self.inputs.remove(&device.id);
                match access.connect_input(&device, self.events_tx.clone()) {
                    Ok(connection) => {
                        info!(device = %device, "MIDI input connected.");
                        self.inputs.insert(
                            device.id.clone(),
                            Input {
                                device,
                                _connection: connection,
                            },
                        );
                    }
                    Err(e) => warn!(device = %device, err = e.to_string(), "Unable to open MIDI input."),
                }
            }
            Direction::Output => {
                self.outputs.remove(&device.id);
                match access.connect_output(&device) {
                    Ok(connection) => {
                        info!(device = %device, "MIDI output connected.");
                        self.outputs
                            .insert(device.id.clone(), Output { device, connection });
                    }
                    Err(e) => warn!(device = %device, err = e.to_string(), "Unable to open MIDI output."),
                }
            }
        }
    }

    fn detach(&mut self, device: &MidiDevice) {
        let removed = match device.direction {
            Direction::Input => self.inputs.remove(&device.id).is_some(),
            Direction::Output => self.outputs.remove(&device.id).is_some(),
        };
        if removed {
            info!(device = %device, "MIDI device disconnected.");
        }
    }

    /// Applies one event from the host MIDI layer.
    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Message { device, bytes } => {
                debug!(device, bytes = format!("{:02X?}", bytes), "MIDI message.");
                self.handle_message(&bytes);
            }
            Event::Connected(device) => self.attach(device),
            Event::Disconnected(device) => self.detach(&device),
        }
    }

    /// Parses and dispatches one raw message. Malformed and unknown messages
    /// are logged and ignored.
    pub fn handle_message(&mut self, bytes: &[u8]) -> Option<Message> {
        let Some(message) = message::parse(bytes) else {
            debug!(bytes = format!("{:02X?}", bytes), "Ignoring short MIDI message.");
            return None;
        };

        match message {
            Message::NoteOn { note, velocity, .. } => self.note_on(note, velocity),
            Message::NoteOff { note, .. } => self.note_off(note),
            Message::ControlChange {
                channel,
                controller,
                value,
            } => {
                debug!(channel, controller, value, "MIDI control change.");
                self.publish(NoteEvent::ControlChange {
                    channel,
                    controller,
                    value,
                });
            }
            Message::PitchBend { channel, value } => {
                debug!(channel = channel + 1, value, "MIDI pitch bend.");
                self.publish(NoteEvent::PitchBend { channel, value });
            }
            Message::Other { status } => {
                debug!(
                    status = format!("{:02X}", status),
                    bytes = format!("{:02X?}", bytes),
                    "Ignoring MIDI message."
                );
            }
        }
        Some(message)
    }

    /// Starts a note. Velocity zero stops it instead.
    pub fn note_on(&mut self, note: u8, velocity: u8) {
        if velocity == 0 {
            self.note_off(note);
            return;
        }
        let note = note.min(127);
        self.notes.insert(note);
        debug!(note, name = message::note_name(note), velocity, "Note on.");
        self.publish(NoteEvent::NoteOn {
            note,
            velocity: velocity.min(127),
        });
    }

    pub fn note_off(&mut self, note: u8) {
        let note = note.min(127);
        self.notes.remove(note);
        debug!(note, name = message::note_name(note), "Note off.");
        self.publish(NoteEvent::NoteOff { note });
    }

    /// Stops every sounding note and broadcasts all-notes-off on every channel
    /// of every output. Always safe to call. Returns the number of notes stopped.
    pub fn all_notes_off(&mut self) -> usize {
        let snapshot = self.notes.take();
        for note in snapshot.iter() {
            self.publish(NoteEvent::NoteOff { note: *note });
        }

        let messages: Vec<Vec<u8>> = (0..message::CHANNELS)
            .filter_map(|channel| match message::all_notes_off(channel) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!(channel, err = e.to_string(), "Unable to encode all notes off.");
                    None
                }
            })
            .collect();
        self.send_to_outputs(&messages);

        info!(
            notes = snapshot.len(),
            outputs = self.outputs.len(),
            "All notes off."
        );
        snapshot.len()
    }

    /// Sends a note on to every output. Returns how many outputs took it.
    pub fn send_note_on(&mut self, note: u8, velocity: u8, channel: u8) -> usize {
        match message::note_on(channel, note, velocity) {
            Ok(bytes) => self.send_to_outputs(&[bytes]),
            Err(e) => {
                warn!(note, err = e.to_string(), "Unable to encode note on.");
                0
            }
        }
    }

    /// Sends a note off to every output. Returns how many outputs took it.
    pub fn send_note_off(&mut self, note: u8, channel: u8) -> usize {
        match message::note_off(channel, note) {
            Ok(bytes) => self.send_to_outputs(&[bytes]),
            Err(e) => {
                warn!(note, err = e.to_string(), "Unable to encode note off.");
                0
            }
        }
    }

    /// Best effort: a failing output is logged and skipped.
    fn send_to_outputs(&mut self, messages: &[Vec<u8>]) -> usize {
        let mut delivered = 0;
        for output in self.outputs.values_mut() {
            let mut failures = 0;
            let mut last_error = None;
            for bytes in messages {
                if let Err(e) = output.connection.send(bytes) {
                    failures += 1;
                    last_error = Some(e.to_string());
                }
            }
            match last_error {
                Some(err) => warn!(
                    device = %output.device,
                    failures,
                    err,
                    "Unable to send to MIDI output."
                ),
                None => delivered += 1,
            }
        }
        delivered
    }

    /// Registers a new listener for note events.
    pub fn subscribe(&mut self) -> Receiver<NoteEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    fn publish(&mut self, event: NoteEvent) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event).is_ok());
    }

    /// Applies every event queued by inputs and the hot-plug watcher so far.
    /// Returns the number handled.
    pub fn pump(&mut self) -> usize {
        let pending = self.events_rx.len();
        let mut handled = 0;
        for _ in 0..pending {
            match self.events_rx.try_recv() {
                Ok(event) => {
                    self.handle_event(event);
                    handled += 1;
                }
                Err(_) => break,
            }
        }
        handled
    }

    /// The sounding notes, lowest first.
    pub fn active_notes(&self) -> Vec<u8> {
        self.notes.notes()
    }

    pub fn input_devices(&self) -> Vec<MidiDevice> {
        self.inputs.values().map(|input| input.device.clone()).collect()
    }

    pub fn output_devices(&self) -> Vec<MidiDevice> {
        self.outputs
            .values()
            .map(|output| output.device.clone())
            .collect()
    }

    pub fn is_initialized(&self) -> bool {
        self.access.is_some()
    }

    /// Stops every note, stops watching for devices and closes every port.
    pub fn dispose(&mut self) {
        self.all_notes_off();
        self.watcher.take();
        self.inputs.clear();
        self.outputs.clear();
        self.access = None;
        while self.events_rx.try_recv().is_ok() {}
        debug!("MIDI devices disposed.");
    }
}
