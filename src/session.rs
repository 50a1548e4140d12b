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
use std::{collections::HashMap, sync::Arc, time::Duration};

use crossbeam_channel::Receiver;
use tracing::{debug, info, span, warn, Level};

use crate::{
    audio::{self, AudioBridge, Pull},
    config,
    control::{self, ControlSurface, EffectState, Outcome},
    error::Error,
    keyboard::{KeyAction, Keymap},
    midi::{self, message::ALL_NOTES_OFF},
    router::{DeviceRouter, NoteEvent},
    voice::{CartridgeIdentity, Parameter, SharedVoice},
};

/// Owns the audio bridge, the device router and the control surface, and
/// wires them to a single voice source.
pub struct CartridgeSession {
    audio: AudioBridge,
    router: DeviceRouter,
    control: ControlSurface,
    voice: SharedVoice,
    keymap: Keymap,
    midi: config::Midi,
    controls: HashMap<u8, Parameter>,
    events: Receiver<NoteEvent>,
    configured_cartridge: CartridgeIdentity,
}

impl CartridgeSession {
    pub fn new(config: &config::Session, voice: SharedVoice) -> CartridgeSession {
        let mut router = DeviceRouter::new();
        let events = router.subscribe();
        let midi = config.midi();
        let controls = midi
            .controls()
            .into_iter()
            .filter_map(|control| match control.parameter() {
                Ok(parameter) => Some((control.controller(), parameter)),
                Err(e) => {
                    warn!(err = e, "Skipping control mapping.");
                    None
                }
            })
            .collect();

        CartridgeSession {
            audio: AudioBridge::new(config.audio().clone()),
            router,
            control: ControlSurface::new(),
            voice,
            keymap: Keymap::new(&config.keyboard()),
            midi,
            controls,
            events,
            configured_cartridge: config.cartridge(),
        }
    }

    /// Opens the configured audio output and binds it to the voice source.
    pub fn initialize_audio(&mut self) -> Result<Pull, Error> {
        self.audio.initialize()?;
        self.audio.connect(self.voice.clone())
    }

    pub fn initialize_audio_with(&mut self, output: Box<dyn audio::Output>) -> Result<Pull, Error> {
        self.audio.initialize_with(output)?;
        self.audio.connect(self.voice.clone())
    }

    /// Opens the configured MIDI backend and starts watching for devices.
    pub fn initialize_devices(&mut self) -> Result<(), Error> {
        self.router.initialize(&self.midi)
    }

    pub fn initialize_devices_with(
        &mut self,
        access: Arc<dyn midi::Access>,
        rescan_interval: Option<Duration>,
    ) -> Result<(), Error> {
        self.router.initialize_with(access, rescan_interval)
    }

    /// Starts audio output. Audio must be initialized first.
    pub fn start(&mut self) -> Result<(), Error> {
        self.audio.start()
    }

    pub fn stop(&mut self) -> Result<(), Error> {
        self.audio.stop()
    }

    /// Returns to a clean slate: notes drained and cartridge forgotten, then the
    /// voice source reset, then the audio output left connected but stopped.
    pub fn reset(&mut self) -> Result<(), Error> {
        let span = span!(Level::INFO, "reset session");
        let _enter = span.enter();

        self.all_notes_off();
        self.control.clear();
        self.voice.lock().reset();
        if matches!(
            self.audio.state(),
            audio::State::Initialized | audio::State::Running | audio::State::Stopped
        ) {
            self.audio.stop()?;
        }
        info!("Session reset.");
        Ok(())
    }

    /// Switches programs. Every sounding note is stopped before the control
    /// surface takes on the new cartridge's defaults.
    pub fn load_cartridge(&mut self, cartridge: CartridgeIdentity) {
        self.all_notes_off();
        let mut voice = self.voice.lock();
        self.control.load_cartridge(cartridge, &mut **voice);
    }

    /// Loads whatever program the voice source says it is running, if that
    /// differs from the loaded one.
    pub fn sync_cartridge(&mut self) -> CartridgeIdentity {
        let reported = self.voice.lock().active_cartridge();
        if reported != self.control.cartridge() {
            self.load_cartridge(reported);
        }
        reported
    }

    /// Applies a named parameter. Volume goes to the audio bridge's ramp,
    /// everything else to the voice source, both gated by the loaded cartridge.
    pub fn set_parameter(&mut self, name: &str, value: f32) -> Outcome {
        let outcome = {
            let mut voice = self.voice.lock();
            self.control.set_parameter(name, value, &mut **voice)
        };
        self.route_volume(outcome)
    }

    fn apply(&mut self, parameter: Parameter, value: f32) -> Outcome {
        let outcome = {
            let mut voice = self.voice.lock();
            self.control.apply(parameter, value, &mut **voice)
        };
        self.route_volume(outcome)
    }

    fn route_volume(&self, outcome: Outcome) -> Outcome {
        if let Outcome::Applied {
            parameter: Parameter::Volume,
            value,
        } = outcome
        {
            if let Err(e) = self.audio.set_volume(value) {
                debug!(err = %e, "Volume not applied to audio output.");
            }
        }
        outcome
    }

    pub fn note_on(&mut self, note: u8, velocity: u8) {
        self.router.note_on(note, velocity);
        self.dispatch();
    }

    pub fn note_off(&mut self, note: u8) {
        self.router.note_off(note);
        self.dispatch();
    }

    /// Feeds a virtual keyboard key through the same path as device notes.
    pub fn key(&mut self, key: char, pressed: bool) -> KeyAction {
        let action = if pressed {
            self.keymap.press(key)
        } else {
            self.keymap.release(key)
        };
        match action {
            KeyAction::NoteOn { note, velocity } => self.note_on(note, velocity),
            KeyAction::NoteOff { note } => self.note_off(note),
            KeyAction::Octave(octave) => info!(octave, "Keyboard octave changed."),
            KeyAction::Ignored => {}
        }
        action
    }

    /// Stops every sounding note. Always safe to call.
    pub fn all_notes_off(&mut self) -> usize {
        let stopped = self.router.all_notes_off();
        self.dispatch();
        stopped
    }

    /// Handles everything devices and hot-plug have queued since the last call.
    pub fn pump(&mut self) -> usize {
        let handled = self.router.pump();
        self.dispatch();
        handled
    }

    fn dispatch(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                NoteEvent::NoteOn { note, velocity } => self.voice.lock().note_on(note, velocity),
                NoteEvent::NoteOff { note } => self.voice.lock().note_off(note),
                NoteEvent::ControlChange {
                    controller: ALL_NOTES_OFF,
                    ..
                } => {
                    // The resulting note offs land back on this queue.
                    self.router.all_notes_off();
                }
                NoteEvent::ControlChange {
                    controller, value, ..
                } => {
                    if let Some(parameter) = self.controls.get(&controller).copied() {
                        let position = f32::from(value) / 127.0;
                        let outcome = self.apply(parameter, control::scale(parameter, position));
                        debug!(controller, value, outcome = %outcome, "Control change routed.");
                    }
                }
                NoteEvent::PitchBend { .. } => {}
            }
        }
    }

    /// Releases devices and the audio output.
    pub fn dispose(&mut self) {
        self.router.dispose();
        self.dispatch();
        self.audio.dispose();
        info!("Session disposed.");
    }

    pub fn audio(&self) -> &AudioBridge {
        &self.audio
    }

    pub fn router(&self) -> &DeviceRouter {
        &self.router
    }

    pub fn cartridge(&self) -> CartridgeIdentity {
        self.control.cartridge()
    }

    /// The cartridge named in the session config.
    pub fn configured_cartridge(&self) -> CartridgeIdentity {
        self.configured_cartridge
    }

    pub fn effects(&self) -> &EffectState {
        self.control.effects()
    }

    pub fn active_notes(&self) -> Vec<u8> {
        self.router.active_notes()
    }
}
