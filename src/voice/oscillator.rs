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
//! A small reference engine used by the binary: three hardware-style voices,
//! an unbounded polyphonic layer, a state-variable filter and a feedback delay.

use std::f32::consts::TAU;

use tracing::debug;

use super::{
    CartridgeIdentity, Parameter, SampleError, Voice, VoiceSource, Waveform, HARDWARE_VOICES,
};
use crate::control::FilterType;

/// Longest delay the engine can hold.
const MAX_DELAY_MS: f32 = 1000.0;

/// Headroom applied to the voice sum before effects.
const MIX_LEVEL: f32 = 0.25;

/// Resonance is kept just short of self-oscillation.
const MAX_RESONANCE: f32 = 0.98;

struct Slot {
    voice: Voice,
    velocity: f32,
    phase: f32,
    increment: f32,
}

impl Slot {
    fn new(index: usize) -> Slot {
        Slot {
            voice: Voice::new(index, Waveform::default()),
            velocity: 0.0,
            phase: 0.0,
            increment: 0.0,
        }
    }
}

/// Topology-preserving state-variable filter.
struct Filter {
    enabled: bool,
    kind: FilterType,
    cutoff_hz: f32,
    resonance: f32,
    g: f32,
    k: f32,
    ic1eq: f32,
    ic2eq: f32,
}

impl Filter {
    fn new(sample_rate: f32) -> Filter {
        let mut filter = Filter {
            enabled: false,
            kind: FilterType::Lowpass,
            cutoff_hz: 1000.0,
            resonance: 0.0,
            g: 0.0,
            k: 2.0,
            ic1eq: 0.0,
            ic2eq: 0.0,
        };
        filter.update(sample_rate);
        filter
    }

    fn update(&mut self, sample_rate: f32) {
        let nyquist = sample_rate * 0.49;
        let cutoff = self.cutoff_hz.clamp(10.0, nyquist);
        self.g = (TAU * cutoff / (2.0 * sample_rate)).tan();
        self.k = 2.0 - 2.0 * self.resonance.clamp(0.0, MAX_RESONANCE);
    }

    fn process(&mut self, sample: f32) -> f32 {
        if !self.enabled {
            return sample;
        }
        let h = 1.0 / (1.0 + self.g * (self.g + self.k));
        let v3 = sample - self.ic2eq;
        let v1 = h * (self.ic1eq + self.g * v3);
        let v2 = self.ic2eq + self.g * v1;
        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;

        match self.kind {
            FilterType::Lowpass => v2,
            FilterType::Highpass => sample - self.k * v1 - v2,
            FilterType::Bandpass => v1,
            FilterType::Notch => sample - self.k * v1,
        }
    }

    fn clear(&mut self) {
        self.ic1eq = 0.0;
        self.ic2eq = 0.0;
    }
}

/// Feedback delay line with a fixed maximum length.
struct Delay {
    enabled: bool,
    line: Vec<f32>,
    write: usize,
    length: usize,
    feedback: f32,
    mix: f32,
}

impl Delay {
    fn new(sample_rate: f32) -> Delay {
        let capacity = (sample_rate * MAX_DELAY_MS / 1000.0) as usize + 1;
        Delay {
            enabled: false,
            line: vec![0.0; capacity],
            write: 0,
            length: capacity / 4,
            feedback: 0.0,
            mix: 0.0,
        }
    }

    fn set_time(&mut self, sample_rate: f32, millis: f32) {
        let samples = (sample_rate * millis.clamp(0.0, MAX_DELAY_MS) / 1000.0) as usize;
        self.length = samples.clamp(1, self.line.len() - 1);
    }

    fn process(&mut self, sample: f32) -> f32 {
        if !self.enabled {
            return sample;
        }
        let capacity = self.line.len();
        let read = (self.write + capacity - self.length) % capacity;
        let delayed = self.line[read];
        self.line[self.write] = sample + delayed * self.feedback;
        self.write = (self.write + 1) % capacity;
        sample * (1.0 - self.mix) + delayed * self.mix
    }

    fn clear(&mut self) {
        self.line.fill(0.0);
        self.write = 0;
    }
}

/// Reference voice source.
pub struct Oscillator {
    sample_rate: f32,
    cartridge: CartridgeIdentity,
    hardware: Vec<Slot>,
    layer: Vec<Slot>,
    waveform: Waveform,
    master: f32,
    noise: u16,
    filter: Filter,
    delay: Delay,
}

impl Oscillator {
    /// Creates an engine rendering at the given sample rate with the given program loaded.
    pub fn new(sample_rate: u32, cartridge: CartridgeIdentity) -> Oscillator {
        let sample_rate = sample_rate.max(1) as f32;
        Oscillator {
            sample_rate,
            cartridge,
            hardware: (0..HARDWARE_VOICES).map(Slot::new).collect(),
            layer: Vec::new(),
            waveform: Waveform::default(),
            master: 1.0,
            noise: 1,
            filter: Filter::new(sample_rate),
            delay: Delay::new(sample_rate),
        }
    }

    /// All voices, hardware voices first.
    pub fn voices(&self) -> impl Iterator<Item = &Voice> {
        self.hardware
            .iter()
            .chain(self.layer.iter())
            .map(|slot| &slot.voice)
    }

    fn slots_mut(&mut self) -> impl Iterator<Item = &mut Slot> {
        self.hardware.iter_mut().chain(self.layer.iter_mut())
    }

    fn frequency(note: u8) -> f32 {
        440.0 * 2f32.powf((note as f32 - 69.0) / 12.0)
    }

    fn next_noise(&mut self) -> f32 {
        let feedback = ((self.noise & 1) ^ ((self.noise >> 1) & 1)) != 0;
        self.noise >>= 1;
        if feedback {
            self.noise |= 0x4000;
        }
        if self.noise & 1 != 0 {
            1.0
        } else {
            -1.0
        }
    }
}

impl VoiceSource for Oscillator {
    fn generate_sample(&mut self) -> Result<f32, SampleError> {
        let noise = self.next_noise();
        let mut sum = 0.0;
        for slot in self.slots_mut() {
            if !slot.voice.is_active() {
                continue;
            }
            let phase = slot.phase;
            let amplitude = match slot.voice.waveform() {
                Waveform::Pulse => {
                    if phase < 0.5 {
                        1.0
                    } else {
                        -1.0
                    }
                }
                Waveform::Saw => 2.0 * phase - 1.0,
                Waveform::Triangle => {
                    if phase < 0.5 {
                        4.0 * phase - 1.0
                    } else {
                        3.0 - 4.0 * phase
                    }
                }
                Waveform::Sine => (TAU * phase).sin(),
                Waveform::Noise => noise,
            };
            slot.phase += slot.increment;
            if slot.phase >= 1.0 {
                slot.phase -= 1.0;
            }
            sum += amplitude * slot.velocity;
        }

        let sample = self.filter.process(sum * MIX_LEVEL);
        let sample = self.delay.process(sample);
        Ok((sample * self.master).clamp(-1.0, 1.0))
    }

    fn note_on(&mut self, note: u8, velocity: u8) {
        let waveform = self.waveform;
        let increment = Self::frequency(note) / self.sample_rate;
        let velocity = velocity.min(127) as f32 / 127.0;

        let existing = self
            .hardware
            .iter()
            .chain(self.layer.iter())
            .position(|slot| slot.voice.note() == Some(note));
        let free = || {
            self.hardware
                .iter()
                .chain(self.layer.iter())
                .position(|slot| !slot.voice.is_active())
        };
        let position = match existing.or_else(free) {
            Some(position) => position,
            None => {
                self.layer.push(Slot::new(HARDWARE_VOICES + self.layer.len()));
                HARDWARE_VOICES + self.layer.len() - 1
            }
        };

        let slot = if position < HARDWARE_VOICES {
            &mut self.hardware[position]
        } else {
            &mut self.layer[position - HARDWARE_VOICES]
        };
        slot.voice.assign(note, waveform);
        slot.velocity = velocity;
        slot.increment = increment;
        slot.phase = 0.0;
        debug!(note, voice = slot.voice.index(), "Voice assigned.");
    }

    fn note_off(&mut self, note: u8) {
        for slot in self.slots_mut() {
            if slot.voice.note() == Some(note) {
                slot.voice.release();
            }
        }
    }

    fn set_parameter(&mut self, parameter: Parameter, value: f32) {
        match parameter {
            Parameter::Volume => self.master = value.clamp(0.0, 1.0),
            Parameter::FilterEnabled => self.filter.enabled = value >= 0.5,
            Parameter::FilterType => {
                if let Some(kind) = FilterType::from_index(value.round().max(0.0) as usize) {
                    self.filter.kind = kind;
                }
            }
            Parameter::FilterCutoff => {
                self.filter.cutoff_hz = value;
                self.filter.update(self.sample_rate);
            }
            Parameter::FilterResonance => {
                self.filter.resonance = value;
                self.filter.update(self.sample_rate);
            }
            Parameter::DelayEnabled => self.delay.enabled = value >= 0.5,
            Parameter::DelayTime => self.delay.set_time(self.sample_rate, value),
            Parameter::DelayFeedback => self.delay.feedback = value.clamp(0.0, 0.95),
            Parameter::DelayMix => self.delay.mix = value.clamp(0.0, 1.0),
            Parameter::Waveform => {
                if let Some(waveform) = Waveform::from_index(value.round().max(0.0) as usize) {
                    self.waveform = waveform;
                }
            }
        }
    }

    fn active_cartridge(&self) -> CartridgeIdentity {
        self.cartridge
    }

    fn reset(&mut self) {
        for slot in self.slots_mut() {
            slot.voice.release();
            slot.phase = 0.0;
        }
        self.layer.clear();
        self.filter.clear();
        self.delay.clear();
        self.noise = 1;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn peak(oscillator: &mut Oscillator, samples: usize) -> f32 {
        (0..samples)
            .map(|_| oscillator.generate_sample().unwrap_or(0.0).abs())
            .fold(0.0, f32::max)
    }

    #[test]
    fn test_silent_until_note_on() {
        let mut oscillator = Oscillator::new(44100, CartridgeIdentity::SynthProgram);
        assert_eq!(0.0, peak(&mut oscillator, 512));

        oscillator.note_on(69, 127);
        assert!(peak(&mut oscillator, 512) > 0.1);

        oscillator.note_off(69);
        assert_eq!(0.0, peak(&mut oscillator, 512));
    }

    #[test]
    fn test_notes_spill_into_layer() {
        let mut oscillator = Oscillator::new(44100, CartridgeIdentity::SynthProgram);
        for note in 60..66 {
            oscillator.note_on(note, 100);
        }
        let active: Vec<usize> = oscillator
            .voices()
            .filter(|voice| voice.is_active())
            .map(|voice| voice.index())
            .collect();
        assert_eq!(vec![0, 1, 2, 3, 4, 5], active);

        // Retriggering an active note reuses its voice.
        oscillator.note_on(61, 100);
        assert_eq!(6, oscillator.voices().filter(|v| v.is_active()).count());

        // Freed hardware voices are taken before the layer grows.
        oscillator.note_off(60);
        oscillator.note_on(70, 100);
        assert_eq!(6, oscillator.voices().count());
        assert_eq!(Some(70), oscillator.voices().next().and_then(|v| v.note()));
    }

    #[test]
    fn test_waveform_select() {
        let mut oscillator = Oscillator::new(44100, CartridgeIdentity::SynthProgram);
        oscillator.set_parameter(Parameter::Waveform, 3.0);
        oscillator.note_on(60, 100);
        assert_eq!(
            Some(Waveform::Sine),
            oscillator
                .voices()
                .find(|voice| voice.is_active())
                .map(|voice| voice.waveform())
        );
    }

    #[test]
    fn test_delay_echo() {
        let mut oscillator = Oscillator::new(1000, CartridgeIdentity::SynthProgram);
        oscillator.set_parameter(Parameter::DelayEnabled, 1.0);
        oscillator.set_parameter(Parameter::DelayTime, 100.0);
        oscillator.set_parameter(Parameter::DelayMix, 1.0);
        oscillator.note_on(60, 127);

        // With a fully wet mix, nothing is heard until the first echo arrives.
        assert_eq!(0.0, peak(&mut oscillator, 100));
        assert!(peak(&mut oscillator, 50) > 0.0);
    }

    #[test]
    fn test_reset() {
        let mut oscillator = Oscillator::new(44100, CartridgeIdentity::GameProgram);
        for note in 40..50 {
            oscillator.note_on(note, 100);
        }
        oscillator.reset();
        assert_eq!(HARDWARE_VOICES, oscillator.voices().count());
        assert_eq!(0.0, peak(&mut oscillator, 256));
        assert_eq!(CartridgeIdentity::GameProgram, oscillator.active_cartridge());
    }
}
