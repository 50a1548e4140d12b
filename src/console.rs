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
use std::io;

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use crate::voice::CartridgeIdentity;

const PRESS: &str = "press";
const RELEASE: &str = "release";
const NOTE: &str = "note";
const OFF: &str = "off";
const PANIC: &str = "panic";
const LOAD: &str = "load";
const SET: &str = "set";
const VOLUME: &str = "volume";
const RESET: &str = "reset";
const START: &str = "start";
const STOP: &str = "stop";
const STATUS: &str = "status";
const QUIT: &str = "quit";

const DEFAULT_VELOCITY: u8 = 100;

/// A request typed into the console.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Key { key: char, pressed: bool },
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    AllNotesOff,
    Load(CartridgeIdentity),
    Set { parameter: String, value: f32 },
    Volume(f32),
    Reset,
    Start,
    Stop,
    Status,
    Quit,
}

/// Parses a single console line.
pub fn parse(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let verb = words
        .next()
        .ok_or_else(|| "empty command".to_string())?
        .to_lowercase();
    let args: Vec<&str> = words.collect();

    let command = match (verb.as_str(), args.as_slice()) {
        (PRESS, [key]) => Command::Key {
            key: single_char(key)?,
            pressed: true,
        },
        (RELEASE, [key]) => Command::Key {
            key: single_char(key)?,
            pressed: false,
        },
        (NOTE, [note]) => Command::NoteOn {
            note: midi_value(note)?,
            velocity: DEFAULT_VELOCITY,
        },
        (NOTE, [note, velocity]) => Command::NoteOn {
            note: midi_value(note)?,
            velocity: midi_value(velocity)?,
        },
        (OFF, [note]) => Command::NoteOff {
            note: midi_value(note)?,
        },
        (PANIC, []) => Command::AllNotesOff,
        (LOAD, [cartridge]) => Command::Load(cartridge.parse()?),
        (SET, [parameter, value]) => Command::Set {
            parameter: parameter.to_string(),
            value: number(value)?,
        },
        (VOLUME, [value]) => Command::Volume(number(value)?),
        (RESET, []) => Command::Reset,
        (START, []) => Command::Start,
        (STOP, []) => Command::Stop,
        (STATUS, []) => Command::Status,
        (QUIT, []) | ("exit", []) => Command::Quit,
        _ => return Err(format!("unrecognized command {}", line.trim())),
    };
    Ok(command)
}

fn single_char(word: &str) -> Result<char, String> {
    let mut chars = word.chars();
    match (chars.next(), chars.next()) {
        (Some(key), None) => Ok(key),
        _ => Err(format!("expected a single key, got {}", word)),
    }
}

fn midi_value(word: &str) -> Result<u8, String> {
    word.parse::<u8>()
        .ok()
        .filter(|value| *value <= 127)
        .ok_or_else(|| format!("expected a value between 0 and 127, got {}", word))
}

fn number(word: &str) -> Result<f32, String> {
    word.parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| format!("expected a number, got {}", word))
}

/// Reads commands from stdin and forwards them to the session owner.
pub struct Console {}

impl Console {
    pub fn new() -> Console {
        Console {}
    }

    /// Prompts once and forwards the parsed command. Returns false when input
    /// is exhausted or the user asked to quit.
    fn monitor_io<R, W>(
        commands_tx: &Sender<Command>,
        mut reader: R,
        mut writer: W,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(writer, "> ")?;
        writer.flush()?;
        let mut input = String::default();
        if reader.read_line(&mut input)? == 0 {
            commands_tx
                .blocking_send(Command::Quit)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            return Ok(false);
        }
        if input.trim().is_empty() {
            return Ok(true);
        }

        match parse(&input) {
            Ok(command) => {
                let quit = command == Command::Quit;
                commands_tx
                    .blocking_send(command)
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                Ok(!quit)
            }
            Err(e) => {
                warn!(input = input.trim(), err = e, "Unrecognized input");
                writeln!(writer, "{}", e)?;
                Ok(true)
            }
        }
    }

    /// Runs the console on a blocking task until quit or end of input.
    pub fn spawn(&self, commands_tx: Sender<Command>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "console");
            let _enter = span.enter();

            info!(
                "Console started. Commands: {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}",
                PRESS, RELEASE, NOTE, OFF, PANIC, LOAD, SET, VOLUME, RESET, START, STOP, STATUS, QUIT
            );

            while Self::monitor_io(&commands_tx, io::stdin().lock(), io::stdout())? {}
            Ok(())
        })
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}
