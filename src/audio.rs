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
//! The audio bridge: owns an output stream whose render callback pulls one
//! sample per frame from the connected voice source, applies a ramped volume,
//! and falls back to a test tone when the voice source can't be pulled.

use std::{
    error::Error as StdError,
    fmt,
    sync::{atomic::Ordering, Arc},
    time::Duration,
};

use tracing::{debug, info, span, warn, Level};

use crate::{config, error::Error, voice::SharedVoice};

pub mod cpal;
pub mod mock;
mod ramp;
mod render;
pub mod thread_priority;
mod tone;

pub use ramp::EPSILON;
pub use render::Renderer;

use render::{Shared, Source};

/// An audio output the bridge can render into.
pub trait Output: fmt::Display + Send {
    /// The format the output will run at once opened.
    fn format(&self) -> Result<Format, Box<dyn StdError>>;

    /// Starts the output, calling the renderer from its own thread.
    fn open(&mut self, renderer: Renderer) -> Result<(), Box<dyn StdError>>;

    /// Stops the output and drops the renderer.
    fn close(&mut self);
}

/// The negotiated output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Format {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames per render callback.
    pub buffer_size: usize,
}

impl Format {
    /// The delay contributed by one buffer.
    pub fn latency(&self) -> Duration {
        Duration::from_secs_f64(self.buffer_size as f64 / f64::from(self.sample_rate.max(1)))
    }
}

/// Lists the audio outputs known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Output>>, Box<dyn StdError>> {
    cpal::Output::list()
}

/// Gets the configured output.
pub fn get_output(config: &config::Audio) -> Result<Box<dyn Output>, Box<dyn StdError>> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Box::new(mock::Output::with_format(
            device,
            Format {
                sample_rate: config.sample_rate(),
                channels: 1,
                buffer_size: config.buffer_size(),
            },
        )));
    }

    Ok(Box::new(cpal::Output::get(config)?))
}

/// Lifecycle of an [AudioBridge].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Uninitialized,
    Initialized,
    Running,
    Stopped,
    Disposed,
}

/// What the render loop ended up bound to after [AudioBridge::connect].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    Voice,
    TestTone,
}

pub struct AudioBridge {
    config: config::Audio,
    state: State,
    output: Option<Box<dyn Output>>,
    format: Option<Format>,
    pull: Option<Pull>,
    shared: Arc<Shared>,
}

impl AudioBridge {
    pub fn new(config: config::Audio) -> AudioBridge {
        AudioBridge {
            shared: Arc::new(Shared::new(config.volume())),
            config,
            state: State::Uninitialized,
            output: None,
            format: None,
            pull: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// The negotiated format, once initialized.
    pub fn format(&self) -> Option<Format> {
        self.format
    }

    /// What the render loop is pulling from, once connected.
    pub fn pull(&self) -> Option<Pull> {
        self.pull
    }

    /// Samples the voice source failed to produce and that were rendered as silence.
    pub fn failed_samples(&self) -> u64 {
        self.shared.failed_samples.load(Ordering::Relaxed)
    }

    /// The output gain currently reached by the render loop.
    pub fn volume(&self) -> f32 {
        self.shared.volume.current()
    }

    fn require(&self, operation: &'static str) -> Result<(), Error> {
        match self.state {
            State::Initialized | State::Running | State::Stopped => Ok(()),
            State::Uninitialized | State::Disposed => Err(Error::NotInitialized(operation)),
        }
    }

    /// Acquires the configured output. Repeated calls are no-ops.
    pub fn initialize(&mut self) -> Result<(), Error> {
        match self.state {
            State::Uninitialized => {}
            State::Disposed => return Err(Error::NotInitialized("initialize")),
            _ => return Ok(()),
        }

        let output =
            get_output(&self.config).map_err(|e| Error::AudioUnavailable(e.to_string()))?;
        self.initialize_with(output)
    }

    /// Initializes with an already acquired output.
    pub fn initialize_with(&mut self, mut output: Box<dyn Output>) -> Result<(), Error> {
        match self.state {
            State::Uninitialized => {}
            State::Disposed => return Err(Error::NotInitialized("initialize")),
            _ => return Ok(()),
        }

        let span = span!(Level::INFO, "initialize audio");
        let _enter = span.enter();

        let format = output
            .format()
            .map_err(|e| Error::AudioUnavailable(e.to_string()))?;
        self.shared.volume.reset(self.config.volume());
        let renderer = Renderer::new(self.shared.clone(), &format, self.config.volume_ramp()?);
        output
            .open(renderer)
            .map_err(|e| Error::AudioUnavailable(e.to_string()))?;

        info!(
            device = %output,
            sample_rate = format.sample_rate,
            channels = format.channels,
            buffer_size = format.buffer_size,
            latency_ms = format.latency().as_secs_f64() * 1000.0,
            "Audio output initialized."
        );
        self.output = Some(output);
        self.format = Some(format);
        self.state = State::Initialized;
        Ok(())
    }

    /// Binds the render loop to the voice source. One sample is probed first;
    /// if that fails the render loop plays the test tone instead.
    pub fn connect(&mut self, voice: SharedVoice) -> Result<Pull, Error> {
        self.require("connect")?;

        let probe = voice.lock().generate_sample();
        let (source, pull) = match probe {
            Ok(sample) => {
                debug!(sample, "Voice source probe succeeded.");
                (Source::Voice(voice), Pull::Voice)
            }
            Err(e) => {
                warn!(err = %e, "Voice source unusable, falling back to test tone.");
                (Source::TestTone, Pull::TestTone)
            }
        };
        *self.shared.source.lock() = source;
        self.pull = Some(pull);
        Ok(pull)
    }

    pub fn start(&mut self) -> Result<(), Error> {
        self.require("start")?;
        if self.state == State::Running {
            return Ok(());
        }
        self.shared.running.store(true, Ordering::Release);
        self.state = State::Running;
        info!("Audio output started.");
        Ok(())
    }

    /// Silences the output and freezes the volume where the ramp currently is.
    pub fn stop(&mut self) -> Result<(), Error> {
        self.require("stop")?;
        self.shared.running.store(false, Ordering::Release);
        self.shared.volume.halt();
        self.state = State::Stopped;
        info!("Audio output stopped.");
        Ok(())
    }

    /// Ramps the output gain to `volume`, clamped to [EPSILON, 1]. Returns the
    /// applied target.
    pub fn set_volume(&self, volume: f32) -> Result<f32, Error> {
        self.require("set_volume")?;
        let target = self.shared.volume.set_target(volume);
        debug!(requested = volume, target, "Volume ramp scheduled.");
        Ok(target)
    }

    /// Releases the output. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.state == State::Disposed {
            return;
        }
        self.shared.running.store(false, Ordering::Release);
        *self.shared.source.lock() = Source::Silent;
        if let Some(mut output) = self.output.take() {
            output.close();
        }
        self.format = None;
        self.pull = None;
        self.state = State::Disposed;
        info!("Audio output disposed.");
    }
}

impl Drop for AudioBridge {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod test {
    use std::error::Error as StdError;

    use super::*;
    use crate::voice::{self, mock::Recorder, CartridgeIdentity};

    fn bridge() -> (AudioBridge, mock::Output) {
        let output = mock::Output::get("mock-output");
        let mut bridge = AudioBridge::new(config::Audio::new("mock-output"));
        assert!(bridge.initialize_with(Box::new(output.clone())).is_ok());
        (bridge, output)
    }

    #[test]
    fn test_lifecycle() -> Result<(), Box<dyn StdError>> {
        let mut bridge = AudioBridge::new(config::Audio::new("mock-output"));
        assert_eq!(State::Uninitialized, bridge.state());
        assert!(matches!(bridge.start(), Err(Error::NotInitialized("start"))));
        assert!(matches!(
            bridge.set_volume(0.5),
            Err(Error::NotInitialized(_))
        ));

        let output = mock::Output::get("mock-output");
        bridge.initialize_with(Box::new(output.clone()))?;
        assert_eq!(State::Initialized, bridge.state());
        assert!(output.is_open());

        // Idempotent.
        bridge.initialize()?;
        bridge.initialize_with(Box::new(mock::Output::unavailable("other")))?;
        assert_eq!(State::Initialized, bridge.state());

        bridge.start()?;
        assert_eq!(State::Running, bridge.state());
        bridge.stop()?;
        assert_eq!(State::Stopped, bridge.state());

        bridge.dispose();
        bridge.dispose();
        assert_eq!(State::Disposed, bridge.state());
        assert!(!output.is_open());
        assert!(matches!(bridge.start(), Err(Error::NotInitialized("start"))));
        assert!(matches!(
            bridge.initialize(),
            Err(Error::NotInitialized(_))
        ));
        Ok(())
    }

    #[test]
    fn test_initialize_from_config() -> Result<(), Box<dyn StdError>> {
        let mut bridge = AudioBridge::new(config::Audio::new("mock-output"));
        bridge.initialize()?;
        let format = bridge.format().ok_or("no format")?;
        assert_eq!(44100, format.sample_rate);
        assert_eq!(1024, format.buffer_size);
        assert!((format.latency().as_secs_f64() - 1024.0 / 44100.0).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_unavailable_output() {
        let mut bridge = AudioBridge::new(config::Audio::new("mock-output"));
        assert!(matches!(
            bridge.initialize_with(Box::new(mock::Output::unavailable("mock-output"))),
            Err(Error::AudioUnavailable(_))
        ));
        assert_eq!(State::Uninitialized, bridge.state());
    }

    #[test]
    fn test_one_pull_per_slot() -> Result<(), Box<dyn StdError>> {
        let (mut bridge, output) = bridge();
        let recorder = Recorder::new(0.5, CartridgeIdentity::SynthProgram);
        assert_eq!(Pull::Voice, bridge.connect(voice::shared(recorder.clone()))?);
        assert_eq!(1, recorder.pulls());

        // Not started: silence, and the voice isn't touched.
        assert!(output.render(128).iter().all(|s| *s == 0.0));
        assert_eq!(1, recorder.pulls());

        bridge.start()?;
        let buffer = output.render(256);
        assert_eq!(257, recorder.pulls());
        assert!(buffer.iter().all(|s| *s == 0.5 * 0.3));
        Ok(())
    }

    #[test]
    fn test_channels_get_the_same_sample() -> Result<(), Box<dyn StdError>> {
        let output = mock::Output::with_format(
            "mock-stereo",
            Format {
                sample_rate: 48000,
                channels: 2,
                buffer_size: 64,
            },
        );
        let mut bridge = AudioBridge::new(config::Audio::new("mock-stereo"));
        bridge.initialize_with(Box::new(output.clone()))?;
        let recorder = Recorder::new(0.25, CartridgeIdentity::None);
        bridge.connect(voice::shared(recorder.clone()))?;
        bridge.start()?;

        let buffer = output.render(64);
        assert_eq!(128, buffer.len());
        assert_eq!(65, recorder.pulls());
        for frame in buffer.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
        Ok(())
    }

    #[test]
    fn test_failed_probe_falls_back_to_tone() -> Result<(), Box<dyn StdError>> {
        let (mut bridge, output) = bridge();
        let recorder = Recorder::new(0.5, CartridgeIdentity::SynthProgram);
        recorder.fail_samples(true);
        assert_eq!(
            Pull::TestTone,
            bridge.connect(voice::shared(recorder.clone()))?
        );
        bridge.start()?;

        let buffer = output.render(512);
        assert_eq!(1, recorder.pulls());
        assert!(buffer.iter().any(|s| *s != 0.0));
        assert!(buffer.iter().all(|s| s.abs() <= 0.1 * 0.3 + 1e-6));
        Ok(())
    }

    #[test]
    fn test_sample_failures_render_silence() -> Result<(), Box<dyn StdError>> {
        let (mut bridge, output) = bridge();
        let recorder = Recorder::new(0.5, CartridgeIdentity::SynthProgram);
        bridge.connect(voice::shared(recorder.clone()))?;
        bridge.start()?;

        recorder.fail_samples(true);
        let buffer = output.render(64);
        assert!(buffer.iter().all(|s| *s == 0.0));
        assert_eq!(64, bridge.failed_samples());
        assert_eq!(State::Running, bridge.state());

        recorder.fail_samples(false);
        assert!(output.render(64).iter().all(|s| *s != 0.0));
        assert_eq!(64, bridge.failed_samples());
        Ok(())
    }

    #[test]
    fn test_contended_voice_renders_silence() -> Result<(), Box<dyn StdError>> {
        let (mut bridge, output) = bridge();
        let recorder = Recorder::new(0.5, CartridgeIdentity::SynthProgram);
        let voice = voice::shared(recorder.clone());
        bridge.connect(voice.clone())?;
        bridge.start()?;

        let guard = voice.lock();
        assert!(output.render(32).iter().all(|s| *s == 0.0));
        drop(guard);
        assert_eq!(1, recorder.pulls());
        Ok(())
    }

    #[test]
    fn test_volume_ramp_converges() -> Result<(), Box<dyn StdError>> {
        let (mut bridge, output) = bridge();
        bridge.connect(voice::shared(Recorder::new(
            1.0,
            CartridgeIdentity::SynthProgram,
        )))?;
        bridge.start()?;
        assert_eq!(0.3, bridge.volume());

        // 100ms at 44.1 kHz is 4410 samples.
        for (requested, expected) in [(0.8, 0.8), (0.0, EPSILON), (2.0, 1.0), (-1.0, EPSILON)] {
            assert_eq!(expected, bridge.set_volume(requested)?);
            output.render(4000);
            assert_ne!(expected, bridge.volume());
            output.render(410);
            assert_eq!(expected, bridge.volume());
        }

        let buffer = output.render(16);
        assert!(buffer.iter().all(|s| *s == EPSILON));
        Ok(())
    }

    #[test]
    fn test_stop_freezes_volume() -> Result<(), Box<dyn StdError>> {
        let (mut bridge, output) = bridge();
        bridge.connect(voice::shared(Recorder::new(
            1.0,
            CartridgeIdentity::SynthProgram,
        )))?;
        bridge.start()?;

        bridge.set_volume(1.0)?;
        output.render(1000);
        bridge.stop()?;
        let frozen = bridge.volume();
        assert!(frozen > 0.3 && frozen < 1.0);
        assert!(output.render(64).iter().all(|s| *s == 0.0));

        bridge.start()?;
        output.render(5000);
        assert_eq!(frozen, bridge.volume());
        Ok(())
    }

    #[test]
    fn test_volume_ramps_while_silent() -> Result<(), Box<dyn StdError>> {
        let (mut bridge, output) = bridge();
        bridge.connect(voice::shared(Recorder::new(
            1.0,
            CartridgeIdentity::SynthProgram,
        )))?;

        // Not started yet.
        bridge.set_volume(0.8)?;
        for _ in 0..10 {
            assert!(output.render(1024).iter().all(|s| *s == 0.0));
        }
        assert_eq!(0.8, bridge.volume());

        bridge.start()?;
        bridge.stop()?;
        bridge.set_volume(0.0)?;
        for _ in 0..10 {
            assert!(output.render(1024).iter().all(|s| *s == 0.0));
        }
        assert_eq!(EPSILON, bridge.volume());

        // Output resumes at the gain chosen while stopped.
        bridge.start()?;
        assert!(output.render(16).iter().all(|s| *s == EPSILON));
        Ok(())
    }
}
