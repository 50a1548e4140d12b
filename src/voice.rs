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
//! The voice source capability: an external synthesis engine that is pulled
//! for samples and pushed note and control commands.

use std::{fmt, str::FromStr, sync::Arc};

use parking_lot::Mutex;
use serde::Deserialize;

#[cfg(test)]
pub mod mock;
pub mod oscillator;

/// Number of fixed, hardware-style voices an engine exposes before notes spill
/// into the polyphonic layer.
pub const HARDWARE_VOICES: usize = 3;

/// A voice source shared between the render thread (which pulls samples) and
/// the control thread (which sends commands). The render thread only ever
/// try-locks it.
pub type SharedVoice = Arc<Mutex<Box<dyn VoiceSource>>>;

/// Wraps a voice source so it can be handed to a session.
pub fn shared<V: VoiceSource + 'static>(voice: V) -> SharedVoice {
    Arc::new(Mutex::new(Box::new(voice)))
}

/// A failed sample pull. Absorbed by the render loop as a silent slot.
#[derive(Debug, Clone, thiserror::Error)]
#[error("voice source failed to produce a sample: {0}")]
pub struct SampleError(pub String);

/// The narrow interface the core uses to talk to a synthesis engine.
pub trait VoiceSource: Send {
    /// Produces the next mono sample in [-1.0, 1.0]. Must be cheap and non-blocking.
    fn generate_sample(&mut self) -> Result<f32, SampleError>;

    /// Starts sounding the given note.
    fn note_on(&mut self, note: u8, velocity: u8);

    /// Stops sounding the given note.
    fn note_off(&mut self, note: u8);

    /// Applies a control-surface parameter. The value is already mapped into
    /// engine units (Hz, milliseconds, enum index, 0/1).
    fn set_parameter(&mut self, parameter: Parameter, value: f32);

    /// Reports the program currently loaded into the engine.
    fn active_cartridge(&self) -> CartridgeIdentity;

    /// Returns the engine to its power-on state.
    fn reset(&mut self);
}

/// The program loaded into the engine. Determines which commands apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartridgeIdentity {
    #[default]
    None,
    GameProgram,
    SynthProgram,
}

impl fmt::Display for CartridgeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CartridgeIdentity::None => "none",
            CartridgeIdentity::GameProgram => "game program",
            CartridgeIdentity::SynthProgram => "synth program",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for CartridgeIdentity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(CartridgeIdentity::None),
            "game" | "game_program" => Ok(CartridgeIdentity::GameProgram),
            "synth" | "synth_program" => Ok(CartridgeIdentity::SynthProgram),
            other => Err(format!("unknown cartridge {}", other)),
        }
    }
}

/// Oscillator shape used by a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Waveform {
    #[default]
    Pulse,
    Saw,
    Triangle,
    Sine,
    Noise,
}

impl Waveform {
    pub const ALL: [Waveform; 5] = [
        Waveform::Pulse,
        Waveform::Saw,
        Waveform::Triangle,
        Waveform::Sine,
        Waveform::Noise,
    ];

    /// Looks up a waveform by its selector index.
    pub fn from_index(index: usize) -> Option<Waveform> {
        Waveform::ALL.get(index).copied()
    }

    /// The selector index of this waveform.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// One logical sound-producing channel within an engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Voice {
    index: usize,
    note: Option<u8>,
    waveform: Waveform,
    active: bool,
}

impl Voice {
    pub fn new(index: usize, waveform: Waveform) -> Voice {
        Voice {
            index,
            note: None,
            waveform,
            active: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn note(&self) -> Option<u8> {
        self.note
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Assigns a note and marks the voice as sounding.
    pub fn assign(&mut self, note: u8, waveform: Waveform) {
        self.note = Some(note.min(127));
        self.waveform = waveform;
        self.active = true;
    }

    /// Releases the voice.
    pub fn release(&mut self) {
        self.note = None;
        self.active = false;
    }
}

/// The control-surface vocabulary understood by a voice source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    Volume,
    FilterEnabled,
    FilterType,
    FilterCutoff,
    FilterResonance,
    DelayEnabled,
    DelayTime,
    DelayFeedback,
    DelayMix,
    Waveform,
}

impl Parameter {
    pub const ALL: [Parameter; 10] = [
        Parameter::Volume,
        Parameter::FilterEnabled,
        Parameter::FilterType,
        Parameter::FilterCutoff,
        Parameter::FilterResonance,
        Parameter::DelayEnabled,
        Parameter::DelayTime,
        Parameter::DelayFeedback,
        Parameter::DelayMix,
        Parameter::Waveform,
    ];

    /// The wire name of the parameter.
    pub fn name(self) -> &'static str {
        match self {
            Parameter::Volume => "volume",
            Parameter::FilterEnabled => "filter.enabled",
            Parameter::FilterType => "filter.type",
            Parameter::FilterCutoff => "filter.cutoff",
            Parameter::FilterResonance => "filter.resonance",
            Parameter::DelayEnabled => "delay.enabled",
            Parameter::DelayTime => "delay.time",
            Parameter::DelayFeedback => "delay.feedback",
            Parameter::DelayMix => "delay.mix",
            Parameter::Waveform => "voice.waveform",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Parameter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Parameter::ALL
            .into_iter()
            .find(|parameter| parameter.name() == s)
            .ok_or_else(|| format!("unknown parameter {}", s))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parameter_names() {
        assert_eq!(
            Ok(Parameter::FilterCutoff),
            "filter.cutoff".parse::<Parameter>()
        );
        assert_eq!(Ok(Parameter::Waveform), "voice.waveform".parse::<Parameter>());
        assert!("filter.q".parse::<Parameter>().is_err());
        assert!("FILTER.CUTOFF".parse::<Parameter>().is_err());
    }

    #[test]
    fn test_cartridge_from_str() {
        assert_eq!(
            Ok(CartridgeIdentity::SynthProgram),
            "synth".parse::<CartridgeIdentity>()
        );
        assert_eq!(
            Ok(CartridgeIdentity::GameProgram),
            " Game_Program ".parse::<CartridgeIdentity>()
        );
        assert!("rom".parse::<CartridgeIdentity>().is_err());
    }

    #[test]
    fn test_voice_assignment() {
        let mut voice = Voice::new(1, Waveform::Pulse);
        assert!(!voice.is_active());

        voice.assign(200, Waveform::Saw);
        assert!(voice.is_active());
        assert_eq!(Some(127), voice.note());
        assert_eq!(Waveform::Saw, voice.waveform());

        voice.release();
        assert!(!voice.is_active());
        assert_eq!(None, voice.note());
        assert_eq!(1, voice.index());
    }

    #[test]
    fn test_waveform_index() {
        assert_eq!(Some(Waveform::Noise), Waveform::from_index(4));
        assert_eq!(None, Waveform::from_index(5));
        assert_eq!(2, Waveform::Triangle.index());
    }
}
