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
//! The cartridge-gated control surface. Parameter requests that don't apply to
//! the loaded program are routine (generic UI code sends them all the time) and
//! are dropped without touching any state.

use std::fmt;

use tracing::{debug, info};

use crate::voice::{CartridgeIdentity, Parameter, VoiceSource, Waveform};

/// Lower bound of the filter cutoff mapping.
pub const CUTOFF_MIN_HZ: f32 = 30.0;
/// Upper bound of the filter cutoff mapping.
pub const CUTOFF_MAX_HZ: f32 = 20_000.0;
/// Delay time at a normalized value of 1.0.
pub const DELAY_MAX_MS: f32 = 1000.0;

/// Response of the engine filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterType {
    #[default]
    Lowpass,
    Highpass,
    Bandpass,
    Notch,
}

impl FilterType {
    pub const ALL: [FilterType; 4] = [
        FilterType::Lowpass,
        FilterType::Highpass,
        FilterType::Bandpass,
        FilterType::Notch,
    ];

    pub fn from_index(index: usize) -> Option<FilterType> {
        FilterType::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Filter and delay settings, all continuous values normalized to [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct EffectState {
    pub filter_enabled: bool,
    pub filter_type: FilterType,
    pub filter_cutoff: f32,
    pub filter_resonance: f32,
    pub delay_enabled: bool,
    pub delay_time: f32,
    pub delay_feedback: f32,
    pub delay_mix: f32,
}

impl Default for EffectState {
    fn default() -> Self {
        EffectState {
            filter_enabled: false,
            filter_type: FilterType::Lowpass,
            filter_cutoff: 1.0,
            filter_resonance: 0.0,
            delay_enabled: false,
            delay_time: 0.25,
            delay_feedback: 0.3,
            delay_mix: 0.25,
        }
    }
}

impl EffectState {
    /// The effect parameters and their current normalized values.
    fn parameters(&self) -> [(Parameter, f32); 8] {
        [
            (Parameter::FilterEnabled, bool_value(self.filter_enabled)),
            (Parameter::FilterType, self.filter_type.index() as f32),
            (Parameter::FilterCutoff, self.filter_cutoff),
            (Parameter::FilterResonance, self.filter_resonance),
            (Parameter::DelayEnabled, bool_value(self.delay_enabled)),
            (Parameter::DelayTime, self.delay_time),
            (Parameter::DelayFeedback, self.delay_feedback),
            (Parameter::DelayMix, self.delay_mix),
        ]
    }
}

fn bool_value(value: bool) -> f32 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// The result of a parameter request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// The change was accepted. `value` is the mapped engine value.
    Applied { parameter: Parameter, value: f32 },
    /// The parameter exists but the loaded cartridge doesn't support it.
    Unsupported(Parameter),
    /// The parameter name or value isn't recognized.
    Unknown,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Applied { parameter, value } => write!(f, "{} = {:.3}", parameter, value),
            Outcome::Unsupported(parameter) => {
                write!(f, "{} not supported by the loaded cartridge", parameter)
            }
            Outcome::Unknown => write!(f, "unknown parameter"),
        }
    }
}

/// Returns whether the given cartridge accepts the given parameter.
pub fn supports(cartridge: CartridgeIdentity, parameter: Parameter) -> bool {
    match parameter {
        Parameter::Volume => true,
        _ => cartridge == CartridgeIdentity::SynthProgram,
    }
}

/// The declared domain of a parameter's control value.
pub fn domain(parameter: Parameter) -> (f32, f32) {
    match parameter {
        Parameter::FilterType => (0.0, (FilterType::ALL.len() - 1) as f32),
        Parameter::Waveform => (0.0, (Waveform::ALL.len() - 1) as f32),
        _ => (0.0, 1.0),
    }
}

/// Spreads a normalized [0, 1] controller position across a parameter's domain.
pub fn scale(parameter: Parameter, position: f32) -> f32 {
    let (min, max) = domain(parameter);
    min + position.clamp(0.0, 1.0) * (max - min)
}

/// Maps a clamped control value into the units the engine expects.
pub fn map(parameter: Parameter, value: f32) -> f32 {
    match parameter {
        Parameter::FilterCutoff => CUTOFF_MIN_HZ * (CUTOFF_MAX_HZ / CUTOFF_MIN_HZ).powf(value),
        Parameter::DelayTime => value * DELAY_MAX_MS,
        Parameter::FilterEnabled | Parameter::DelayEnabled => bool_value(value >= 0.5),
        Parameter::FilterType | Parameter::Waveform => value.round(),
        _ => value,
    }
}

/// Tracks the loaded cartridge and the effect state, and gates parameter
/// requests against the cartridge before forwarding them to the voice source.
pub struct ControlSurface {
    cartridge: CartridgeIdentity,
    effects: EffectState,
    waveform: Waveform,
    volume: f32,
}

impl Default for ControlSurface {
    fn default() -> Self {
        ControlSurface::new()
    }
}

impl ControlSurface {
    pub fn new() -> ControlSurface {
        ControlSurface {
            cartridge: CartridgeIdentity::None,
            effects: EffectState::default(),
            waveform: Waveform::default(),
            volume: 1.0,
        }
    }

    pub fn cartridge(&self) -> CartridgeIdentity {
        self.cartridge
    }

    pub fn effects(&self) -> &EffectState {
        &self.effects
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    /// The last accepted volume request.
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Replaces the loaded cartridge and resets the effect state to its
    /// defaults. The defaults are mirrored into the voice source when the new
    /// cartridge supports them. Only the session calls this, after draining
    /// the active notes.
    pub(crate) fn load_cartridge(
        &mut self,
        cartridge: CartridgeIdentity,
        voice: &mut dyn VoiceSource,
    ) {
        info!(from = %self.cartridge, to = %cartridge, "Loading cartridge.");
        self.cartridge = cartridge;
        self.effects = EffectState::default();
        self.waveform = Waveform::default();

        for (parameter, value) in self.effects.parameters() {
            if supports(cartridge, parameter) {
                voice.set_parameter(parameter, map(parameter, value));
            }
        }
        if supports(cartridge, Parameter::Waveform) {
            voice.set_parameter(Parameter::Waveform, self.waveform.index() as f32);
        }
    }

    /// Forgets the loaded cartridge without sending anything to the voice source.
    pub fn clear(&mut self) {
        self.cartridge = CartridgeIdentity::None;
        self.effects = EffectState::default();
        self.waveform = Waveform::default();
    }

    /// Applies a parameter by name. Unknown names and parameters the loaded
    /// cartridge doesn't support leave all state untouched.
    pub fn set_parameter(
        &mut self,
        name: &str,
        value: f32,
        voice: &mut dyn VoiceSource,
    ) -> Outcome {
        match name.parse::<Parameter>() {
            Ok(parameter) => self.apply(parameter, value, voice),
            Err(e) => {
                debug!(err = e, "Ignoring parameter.");
                Outcome::Unknown
            }
        }
    }

    /// Applies a typed parameter.
    pub fn apply(
        &mut self,
        parameter: Parameter,
        value: f32,
        voice: &mut dyn VoiceSource,
    ) -> Outcome {
        if !supports(self.cartridge, parameter) {
            debug!(
                parameter = %parameter,
                cartridge = %self.cartridge,
                "Parameter not supported by cartridge."
            );
            return Outcome::Unsupported(parameter);
        }
        if value.is_nan() {
            debug!(parameter = %parameter, "Ignoring NaN parameter value.");
            return Outcome::Unknown;
        }

        let (min, max) = domain(parameter);
        let value = value.clamp(min, max);
        let mapped = map(parameter, value);

        match parameter {
            // Volume is owned by the audio bridge's ramp rather than the engine.
            Parameter::Volume => {
                self.volume = value;
                return Outcome::Applied {
                    parameter,
                    value: mapped,
                };
            }
            Parameter::FilterEnabled => self.effects.filter_enabled = mapped >= 0.5,
            Parameter::FilterType => {
                self.effects.filter_type =
                    FilterType::from_index(mapped as usize).unwrap_or_default()
            }
            Parameter::FilterCutoff => self.effects.filter_cutoff = value,
            Parameter::FilterResonance => self.effects.filter_resonance = value,
            Parameter::DelayEnabled => self.effects.delay_enabled = mapped >= 0.5,
            Parameter::DelayTime => self.effects.delay_time = value,
            Parameter::DelayFeedback => self.effects.delay_feedback = value,
            Parameter::DelayMix => self.effects.delay_mix = value,
            Parameter::Waveform => {
                self.waveform = Waveform::from_index(mapped as usize).unwrap_or_default()
            }
        }

        voice.set_parameter(parameter, mapped);
        debug!(parameter = %parameter, value, mapped, "Parameter applied.");
        Outcome::Applied {
            parameter,
            value: mapped,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::voice::mock::{Command, Recorder};

    fn loaded(cartridge: CartridgeIdentity) -> (ControlSurface, Recorder) {
        let mut voice = Recorder::new(0.0, cartridge);
        let mut control = ControlSurface::new();
        control.load_cartridge(cartridge, &mut voice);
        voice.clear();
        (control, voice)
    }

    #[test]
    fn test_filter_ignored_for_game_program() {
        let (mut control, mut voice) = loaded(CartridgeIdentity::GameProgram);
        let before = control.effects().clone();

        let outcome = control.set_parameter("filter.cutoff", 0.5, &mut voice);

        assert_eq!(Outcome::Unsupported(Parameter::FilterCutoff), outcome);
        assert_eq!(&before, control.effects());
        assert!(voice.commands().is_empty());
    }

    #[test]
    fn test_filter_cutoff_for_synth_program() {
        let (mut control, mut voice) = loaded(CartridgeIdentity::SynthProgram);

        let outcome = control.set_parameter("filter.cutoff", 0.5, &mut voice);

        let expected = 30.0 * (20000.0f32 / 30.0).powf(0.5);
        assert_eq!(0.5, control.effects().filter_cutoff);
        assert!((expected - 774.6).abs() < 0.5);
        match outcome {
            Outcome::Applied { parameter, value } => {
                assert_eq!(Parameter::FilterCutoff, parameter);
                assert!((value - expected).abs() < 1e-3);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        match voice.commands().as_slice() {
            [Command::Parameter(Parameter::FilterCutoff, value)] => {
                assert!((value - expected).abs() < 1e-3)
            }
            other => panic!("unexpected commands {:?}", other),
        }
    }

    #[test]
    fn test_values_are_clamped() {
        let (mut control, mut voice) = loaded(CartridgeIdentity::SynthProgram);

        control.set_parameter("delay.time", 2.0, &mut voice);
        control.set_parameter("delay.mix", -1.0, &mut voice);
        control.set_parameter("filter.type", 2.0, &mut voice);
        control.set_parameter("voice.waveform", 9.0, &mut voice);

        assert_eq!(1.0, control.effects().delay_time);
        assert_eq!(0.0, control.effects().delay_mix);
        assert_eq!(FilterType::Bandpass, control.effects().filter_type);
        assert_eq!(Waveform::Noise, control.waveform());
        assert_eq!(
            vec![
                Command::Parameter(Parameter::DelayTime, 1000.0),
                Command::Parameter(Parameter::DelayMix, 0.0),
                Command::Parameter(Parameter::FilterType, 2.0),
                Command::Parameter(Parameter::Waveform, 4.0),
            ],
            voice.commands()
        );
    }

    #[test]
    fn test_unknown_parameter_is_a_no_op() {
        let (mut control, mut voice) = loaded(CartridgeIdentity::SynthProgram);
        let before = control.effects().clone();

        assert_eq!(
            Outcome::Unknown,
            control.set_parameter("filter.drive", 0.3, &mut voice)
        );
        assert_eq!(
            Outcome::Unknown,
            control.set_parameter("delay.mix", f32::NAN, &mut voice)
        );
        assert_eq!(&before, control.effects());
        assert!(voice.commands().is_empty());
    }

    #[test]
    fn test_volume_accepted_for_every_cartridge() {
        for cartridge in [
            CartridgeIdentity::None,
            CartridgeIdentity::GameProgram,
            CartridgeIdentity::SynthProgram,
        ] {
            let (mut control, mut voice) = loaded(cartridge);
            assert_eq!(
                Outcome::Applied {
                    parameter: Parameter::Volume,
                    value: 1.0
                },
                control.set_parameter("volume", 1.5, &mut voice)
            );
            assert_eq!(1.0, control.volume());
            assert!(voice.commands().is_empty());
        }
    }

    #[test]
    fn test_load_cartridge_resets_effects() {
        let (mut control, mut voice) = loaded(CartridgeIdentity::SynthProgram);
        control.set_parameter("filter.enabled", 1.0, &mut voice);
        control.set_parameter("filter.resonance", 0.8, &mut voice);
        voice.clear();

        control.load_cartridge(CartridgeIdentity::SynthProgram, &mut voice);
        assert_eq!(&EffectState::default(), control.effects());
        // Every effect parameter plus the waveform selector is mirrored.
        assert_eq!(9, voice.commands().len());
        assert!(voice.commands().iter().any(|command| matches!(
            command,
            Command::Parameter(Parameter::FilterCutoff, hz) if (hz - CUTOFF_MAX_HZ).abs() < 0.1
        )));

        voice.clear();
        control.load_cartridge(CartridgeIdentity::GameProgram, &mut voice);
        assert_eq!(CartridgeIdentity::GameProgram, control.cartridge());
        assert!(voice.commands().is_empty());
    }

    #[test]
    fn test_scale() {
        assert_eq!(0.0, scale(Parameter::FilterType, 0.0));
        assert_eq!(3.0, scale(Parameter::FilterType, 1.0));
        assert_eq!(4.0, scale(Parameter::Waveform, 1.0));
        assert_eq!(0.5, scale(Parameter::FilterCutoff, 0.5));
        assert_eq!(1.0, scale(Parameter::DelayMix, 7.0));
    }
}
