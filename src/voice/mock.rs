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
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};

use super::{CartridgeIdentity, Parameter, SampleError, VoiceSource};

/// A command received by the recorder.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    NoteOn(u8, u8),
    NoteOff(u8),
    Parameter(Parameter, f32),
    Reset,
}

/// A mock voice source. Records every command and produces a constant sample.
/// Clones share the same log, so a test can keep one while the session owns another.
#[derive(Clone)]
pub struct Recorder {
    sample: f32,
    cartridge: CartridgeIdentity,
    failing: Arc<AtomicBool>,
    pulls: Arc<AtomicU64>,
    commands: Arc<Mutex<Vec<Command>>>,
}

impl Recorder {
    /// Creates a recorder producing the given constant sample.
    pub fn new(sample: f32, cartridge: CartridgeIdentity) -> Recorder {
        Recorder {
            sample,
            cartridge,
            failing: Arc::new(AtomicBool::new(false)),
            pulls: Arc::new(AtomicU64::new(0)),
            commands: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Makes every subsequent sample pull fail.
    pub fn fail_samples(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Number of sample pulls attempted so far.
    pub fn pulls(&self) -> u64 {
        self.pulls.load(Ordering::Relaxed)
    }

    /// All commands received so far.
    pub fn commands(&self) -> Vec<Command> {
        self.commands
            .lock()
            .expect("unable to get commands lock")
            .clone()
    }

    /// Forgets every command received so far.
    pub fn clear(&self) {
        self.commands
            .lock()
            .expect("unable to get commands lock")
            .clear();
    }

    fn record(&self, command: Command) {
        self.commands
            .lock()
            .expect("unable to get commands lock")
            .push(command);
    }
}

impl VoiceSource for Recorder {
    fn generate_sample(&mut self) -> Result<f32, SampleError> {
        self.pulls.fetch_add(1, Ordering::Relaxed);
        if self.failing.load(Ordering::Relaxed) {
            return Err(SampleError("mock failure".to_string()));
        }
        Ok(self.sample)
    }

    fn note_on(&mut self, note: u8, velocity: u8) {
        self.record(Command::NoteOn(note, velocity));
    }

    fn note_off(&mut self, note: u8) {
        self.record(Command::NoteOff(note));
    }

    fn set_parameter(&mut self, parameter: Parameter, value: f32) {
        self.record(Command::Parameter(parameter, value));
    }

    fn active_cartridge(&self) -> CartridgeIdentity {
        self.cartridge
    }

    fn reset(&mut self) {
        self.record(Command::Reset);
    }
}
