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
use std::{error::Error, fmt, thread};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info, span, Level};

use crate::{
    audio::{thread_priority, Format, Output as AudioOutput, Renderer},
    config,
};

/// A cpal output device.
pub struct Output {
    /// The name of the device.
    name: String,
    /// The host the device belongs to.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// The requested output configuration.
    config: config::Audio,
    /// The running stream, if open.
    stream: Option<StreamHandle>,
}

/// cpal streams aren't Send, so each lives on its own thread until told to stop.
struct StreamHandle {
    shutdown: crossbeam_channel::Sender<()>,
    thread: thread::JoinHandle<()>,
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.host_id.name())
    }
}

fn build_typed<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut renderer: Renderer,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = usize::from(config.channels);
    let priority = thread_priority::callback_thread_priority();
    let rt_audio = thread_priority::rt_audio_enabled();
    let mut priority_set = false;
    let mut scratch: Vec<f32> = Vec::new();

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            thread_priority::configure_audio_thread_priority(
                priority,
                rt_audio,
                &mut priority_set,
            );
            if scratch.len() < data.len() {
                scratch.resize(data.len(), 0.0);
            }
            let scratch = &mut scratch[..data.len()];
            renderer.render(scratch, channels);
            for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(src);
            }
        },
        |err| error!(err = %err, "cpal output stream error"),
        None,
    )
}

fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    renderer: Renderer,
) -> Result<cpal::Stream, Box<dyn Error>> {
    Ok(match sample_format {
        cpal::SampleFormat::F32 => build_typed::<f32>(device, config, renderer)?,
        cpal::SampleFormat::I16 => build_typed::<i16>(device, config, renderer)?,
        cpal::SampleFormat::I32 => build_typed::<i32>(device, config, renderer)?,
        cpal::SampleFormat::U16 => build_typed::<u16>(device, config, renderer)?,
        other => return Err(format!("unsupported sample format {:?}", other).into()),
    })
}

impl Output {
    /// Lists cpal devices and produces the Output trait.
    pub fn list() -> Result<Vec<Box<dyn AudioOutput>>, Box<dyn Error>> {
        Ok(Output::list_cpal_devices()?
            .into_iter()
            .map(|output| {
                let output: Box<dyn AudioOutput> = Box::new(output);
                output
            })
            .collect())
    }

    /// Lists cpal devices that can play something.
    fn list_cpal_devices() -> Result<Vec<Output>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut outputs: Vec<Output> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let playable = match device.supported_output_configs() {
                    Ok(mut configs) => configs.any(|config| config.channels() > 0),
                    Err(_) => false,
                };
                if !playable {
                    continue;
                }

                let name = device.name()?;
                outputs.push(Output {
                    config: config::Audio::new(&name),
                    name,
                    host_id,
                    device,
                    stream: None,
                });
            }
        }

        outputs.sort_by_key(|output| output.name.to_string());
        Ok(outputs)
    }

    /// Gets the configured cpal device. "default" is the default host's default output.
    pub fn get(config: &config::Audio) -> Result<Output, Box<dyn Error>> {
        let name = config.device();
        if name == "default" {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or("no default audio output device")?;
            return Ok(Output {
                name: device.name()?,
                host_id: host.id(),
                device,
                config: config.clone(),
                stream: None,
            });
        }

        match Output::list_cpal_devices()?
            .into_iter()
            .find(|output| output.name.trim() == name)
        {
            Some(mut output) => {
                output.config = config.clone();
                Ok(output)
            }
            None => Err(format!("no device found with name {}", name).into()),
        }
    }

    /// Picks the stream config: the configured sample rate when the device's
    /// default channel layout supports it, the device default otherwise.
    fn negotiate(&self) -> Result<(cpal::SupportedStreamConfig, Format), Box<dyn Error>> {
        let default = self.device.default_output_config()?;
        let rate = self.config.sample_rate();
        let supported = self
            .device
            .supported_output_configs()?
            .find(|range| {
                range.channels() == default.channels()
                    && range.sample_format() == default.sample_format()
                    && range.min_sample_rate() <= rate
                    && rate <= range.max_sample_rate()
            })
            .map(|range| range.with_sample_rate(rate))
            .unwrap_or(default);

        let format = Format {
            sample_rate: supported.sample_rate(),
            channels: supported.channels(),
            buffer_size: self.config.buffer_size(),
        };
        Ok((supported, format))
    }
}

impl AudioOutput for Output {
    fn format(&self) -> Result<Format, Box<dyn Error>> {
        Ok(self.negotiate()?.1)
    }

    fn open(&mut self, renderer: Renderer) -> Result<(), Box<dyn Error>> {
        self.close();

        let (supported, format) = self.negotiate()?;
        let requested = u32::try_from(format.buffer_size)?;
        let buffer_size = match supported.buffer_size() {
            cpal::SupportedBufferSize::Range { min, max } if (*min..=*max).contains(&requested) => {
                cpal::BufferSize::Fixed(requested)
            }
            _ => cpal::BufferSize::Default,
        };
        let stream_config = cpal::StreamConfig {
            channels: format.channels,
            sample_rate: supported.sample_rate(),
            buffer_size,
        };
        let sample_format = supported.sample_format();
        let device = self.device.clone();
        let name = self.name.clone();

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let thread = thread::spawn(move || {
            let span = span!(Level::INFO, "audio output", device = name);
            let _enter = span.enter();

            let stream = match build_stream(&device, &stream_config, sample_format, renderer) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(e.to_string()));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            // Hold the stream until the output is closed or dropped.
            let _ = shutdown_rx.recv();
            drop(stream);
            info!("cpal output stream closed");
        });

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!(
                    device = self.name,
                    sample_rate = format.sample_rate,
                    channels = format.channels,
                    "cpal output stream started"
                );
                self.stream = Some(StreamHandle {
                    shutdown: shutdown_tx,
                    thread,
                });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e.into())
            }
            Err(_) => {
                let _ = thread.join();
                Err("audio output thread exited before the stream started".into())
            }
        }
    }

    fn close(&mut self) {
        if let Some(handle) = self.stream.take() {
            let _ = handle.shutdown.send(());
            let _ = handle.thread.join();
        }
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        self.close();
    }
}
