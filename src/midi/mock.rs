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
    collections::{HashMap, HashSet},
    error::Error,
    sync::Arc,
};

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::info;

use super::{Direction, Event, InputConnection, MidiDevice, OutputConnection};

#[derive(Default)]
struct State {
    denied: bool,
    ports: Vec<MidiDevice>,
    listeners: HashMap<String, Sender<Event>>,
    sent: HashMap<String, Vec<Vec<u8>>>,
    failing: HashSet<String>,
}

/// A mock MIDI host. Ports are plugged and unplugged by hand and input bytes
/// are injected with [Access::send_from]. Clones share the same host.
#[derive(Clone, Default)]
pub struct Access {
    state: Arc<Mutex<State>>,
}

impl Access {
    pub fn new() -> Access {
        Access::default()
    }

    /// A host that refuses MIDI access.
    pub fn denied() -> Access {
        let access = Access::new();
        access.state.lock().denied = true;
        access
    }

    /// Makes a port present.
    pub fn plug(&self, id: &str, direction: Direction) -> MidiDevice {
        let device = MidiDevice::new(id, id, direction);
        let mut state = self.state.lock();
        if !state.ports.iter().any(|port| port.same_port(&device)) {
            state.ports.push(device.clone());
        }
        device
    }

    /// Removes a port. Existing connections stay open until dropped.
    pub fn unplug(&self, id: &str, direction: Direction) {
        self.state
            .lock()
            .ports
            .retain(|port| !(port.id == id && port.direction == direction));
    }

    /// Feeds bytes into an input port. Returns false if nothing is listening.
    pub fn send_from(&self, id: &str, bytes: &[u8]) -> bool {
        let state = self.state.lock();
        match state.listeners.get(id) {
            Some(listener) => listener
                .send(Event::Message {
                    device: id.to_string(),
                    bytes: bytes.to_vec(),
                })
                .is_ok(),
            None => false,
        }
    }

    /// Returns true if an input connection to the port is open.
    pub fn is_listening(&self, id: &str) -> bool {
        self.state.lock().listeners.contains_key(id)
    }

    /// Everything sent to an output port so far.
    pub fn sent_to(&self, id: &str) -> Vec<Vec<u8>> {
        self.state.lock().sent.get(id).cloned().unwrap_or_default()
    }

    /// Makes every send to the output port fail.
    pub fn fail_output(&self, id: &str) {
        self.state.lock().failing.insert(id.to_string());
    }
}

struct Input {
    id: String,
    state: Arc<Mutex<State>>,
}

impl InputConnection for Input {}

impl Drop for Input {
    fn drop(&mut self) {
        self.state.lock().listeners.remove(&self.id);
    }
}

struct Output {
    id: String,
    state: Arc<Mutex<State>>,
}

impl OutputConnection for Output {
    fn send(&mut self, bytes: &[u8]) -> Result<(), Box<dyn Error>> {
        let mut state = self.state.lock();
        if state.failing.contains(&self.id) {
            return Err(format!("mock output {} failed", self.id).into());
        }
        state
            .sent
            .entry(self.id.clone())
            .or_default()
            .push(bytes.to_vec());
        Ok(())
    }
}

impl super::Access for Access {
    fn ports(&self) -> Result<Vec<MidiDevice>, Box<dyn Error>> {
        let state = self.state.lock();
        if state.denied {
            return Err("MIDI access denied".into());
        }
        Ok(state.ports.clone())
    }

    fn connect_input(
        &self,
        device: &MidiDevice,
        events: Sender<Event>,
    ) -> Result<Box<dyn InputConnection>, Box<dyn Error>> {
        let mut state = self.state.lock();
        if !state.ports.iter().any(|port| port.same_port(device)) {
            return Err(format!("no input port named {}", device.id).into());
        }
        state.listeners.insert(device.id.clone(), events);
        info!(device = device.id, "Listening for mock MIDI input.");
        Ok(Box::new(Input {
            id: device.id.clone(),
            state: self.state.clone(),
        }))
    }

    fn connect_output(
        &self,
        device: &MidiDevice,
    ) -> Result<Box<dyn OutputConnection>, Box<dyn Error>> {
        let state = self.state.lock();
        if !state.ports.iter().any(|port| port.same_port(device)) {
            return Err(format!("no output port named {}", device.id).into());
        }
        Ok(Box::new(Output {
            id: device.id.clone(),
            state: self.state.clone(),
        }))
    }
}
