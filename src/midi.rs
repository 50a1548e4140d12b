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
use std::{error::Error, fmt, sync::Arc};

use crossbeam_channel::Sender;

pub mod message;
pub mod midir;
pub mod mock;
pub(crate) mod watcher;

/// Which way notes flow through a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// A note-input or note-output port known to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiDevice {
    /// Unique within its direction.
    pub id: String,
    pub name: String,
    pub direction: Direction,
    pub state: ConnectionState,
}

impl MidiDevice {
    pub fn new(id: &str, name: &str, direction: Direction) -> MidiDevice {
        MidiDevice {
            id: id.to_string(),
            name: name.to_string(),
            direction,
            state: ConnectionState::Connected,
        }
    }

    /// True if `other` is the same port, ignoring connection state.
    pub fn same_port(&self, other: &MidiDevice) -> bool {
        self.id == other.id && self.direction == other.direction
    }
}

impl fmt::Display for MidiDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match self.direction {
            Direction::Input => "Input",
            Direction::Output => "Output",
        };
        write!(f, "{} ({})", self.name, direction)
    }
}

/// Something the host MIDI layer reports to the router.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Raw bytes from an input port.
    Message { device: String, bytes: Vec<u8> },
    Connected(MidiDevice),
    Disconnected(MidiDevice),
}

/// An open input. Dropping it closes the port.
pub trait InputConnection: Send {}

/// An open output.
pub trait OutputConnection: Send {
    fn send(&mut self, bytes: &[u8]) -> Result<(), Box<dyn Error>>;
}

/// Host MIDI access.
pub trait Access: Send + Sync {
    /// The ports currently present.
    fn ports(&self) -> Result<Vec<MidiDevice>, Box<dyn Error>>;

    /// Opens an input port, forwarding every message it receives to `events`.
    fn connect_input(
        &self,
        device: &MidiDevice,
        events: Sender<Event>,
    ) -> Result<Box<dyn InputConnection>, Box<dyn Error>>;

    /// Opens an output port.
    fn connect_output(
        &self,
        device: &MidiDevice,
    ) -> Result<Box<dyn OutputConnection>, Box<dyn Error>>;
}

/// Lists ports known to midir.
pub fn list_devices() -> Result<Vec<MidiDevice>, Box<dyn Error>> {
    midir::Access::new()?.ports()
}

/// Opens the given backend.
pub fn open(backend: &str) -> Result<Arc<dyn Access>, Box<dyn Error>> {
    if backend.starts_with("mock") {
        return Ok(Arc::new(mock::Access::new()));
    }

    match backend {
        "midir" => Ok(Arc::new(midir::Access::new()?)),
        other => Err(format!("unknown MIDI backend {}", other).into()),
    }
}
