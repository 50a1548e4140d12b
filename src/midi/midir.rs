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
use std::{collections::BTreeMap, error::Error};

use crossbeam_channel::Sender;
use midir::{
    MidiInput, MidiInputConnection, MidiInputPort, MidiOutput, MidiOutputConnection,
    MidiOutputPort,
};
use tracing::{debug, info, span, Level};

use super::{Direction, Event, InputConnection, MidiDevice, OutputConnection};

/// midir ports don't have stable identifiers across clients, so ports are
/// keyed by name, the same way they're shown to the user.
pub struct Access {}

impl Access {
    /// Checks that the host MIDI subsystem can be opened at all.
    pub fn new() -> Result<Access, Box<dyn Error>> {
        MidiInput::new("cartbridge access check")?;
        MidiOutput::new("cartbridge access check")?;
        Ok(Access {})
    }
}

fn find_input_port(input: &MidiInput, name: &str) -> Option<MidiInputPort> {
    input
        .ports()
        .into_iter()
        .find(|port| input.port_name(port).is_ok_and(|port_name| port_name == name))
}

fn find_output_port(output: &MidiOutput, name: &str) -> Option<MidiOutputPort> {
    output
        .ports()
        .into_iter()
        .find(|port| output.port_name(port).is_ok_and(|port_name| port_name == name))
}

struct Input {
    _connection: MidiInputConnection<()>,
}

impl InputConnection for Input {}

struct Output {
    connection: MidiOutputConnection,
}

impl OutputConnection for Output {
    fn send(&mut self, bytes: &[u8]) -> Result<(), Box<dyn Error>> {
        self.connection.send(bytes)?;
        Ok(())
    }
}

impl super::Access for Access {
    fn ports(&self) -> Result<Vec<MidiDevice>, Box<dyn Error>> {
        let input = MidiInput::new("cartbridge input listing")?;
        let output = MidiOutput::new("cartbridge output listing")?;

        let mut devices: BTreeMap<(Direction, String), MidiDevice> = BTreeMap::new();
        for port in input.ports() {
            let name = input.port_name(&port)?;
            devices
                .entry((Direction::Input, name.clone()))
                .or_insert_with(|| MidiDevice::new(&name, &name, Direction::Input));
        }
        for port in output.ports() {
            let name = output.port_name(&port)?;
            devices
                .entry((Direction::Output, name.clone()))
                .or_insert_with(|| MidiDevice::new(&name, &name, Direction::Output));
        }

        Ok(devices.into_values().collect())
    }

    fn connect_input(
        &self,
        device: &MidiDevice,
        events: Sender<Event>,
    ) -> Result<Box<dyn InputConnection>, Box<dyn Error>> {
        let span = span!(Level::INFO, "connect input (midir)");
        let _enter = span.enter();

        let input = MidiInput::new("cartbridge input")?;
        let port = find_input_port(&input, &device.id)
            .ok_or_else(|| format!("no input port named {}", device.id))?;

        let id = device.id.clone();
        let connection = input.connect(
            &port,
            "cartbridge input",
            move |_, raw, _| {
                if events
                    .send(Event::Message {
                        device: id.clone(),
                        bytes: Vec::from(raw),
                    })
                    .is_err()
                {
                    debug!(device = id, "Router gone, dropping MIDI message.");
                }
            },
            (),
        )?;

        info!(device = device.id, "Listening for MIDI input.");
        Ok(Box::new(Input {
            _connection: connection,
        }))
    }

    fn connect_output(
        &self,
        device: &MidiDevice,
    ) -> Result<Box<dyn OutputConnection>, Box<dyn Error>> {
        let output = MidiOutput::new("cartbridge output")?;
        let port = find_output_port(&output, &device.id)
            .ok_or_else(|| format!("no output port named {}", device.id))?;
        let connection = output.connect(&port, "cartbridge output")?;

        info!(device = device.id, "Opened MIDI output.");
        Ok(Box::new(Output { connection }))
    }
}
