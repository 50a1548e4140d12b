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
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;
use tracing::warn;

use crate::voice::SharedVoice;

use super::{
    ramp::{Ramp, VolumeRamp},
    tone::TestTone,
    Format,
};

/// What the render loop pulls from.
#[derive(Clone)]
pub(super) enum Source {
    Silent,
    Voice(SharedVoice),
    TestTone,
}

/// State shared between the bridge and its render callback.
pub(super) struct Shared {
    pub(super) running: AtomicBool,
    pub(super) source: Mutex<Source>,
    pub(super) volume: VolumeRamp,
    pub(super) failed_samples: AtomicU64,
}

impl Shared {
    pub(super) fn new(volume: f32) -> Shared {
        Shared {
            running: AtomicBool::new(false),
            source: Mutex::new(Source::Silent),
            volume: VolumeRamp::new(volume),
            failed_samples: AtomicU64::new(0),
        }
    }
}

/// The render callback handed to an output. The output calls [Renderer::render]
/// from its real-time thread; nothing in here blocks.
pub struct Renderer {
    shared: Arc<Shared>,
    ramp: Ramp,
    tone: TestTone,
    scratch: Vec<f32>,
}

impl Renderer {
    pub(super) fn new(shared: Arc<Shared>, format: &Format, ramp: Duration) -> Renderer {
        let ramp_samples = (ramp.as_secs_f64() * f64::from(format.sample_rate)).round() as usize;
        Renderer {
            ramp: Ramp::new(shared.volume.current(), ramp_samples),
            shared,
            tone: TestTone::new(format.sample_rate),
            scratch: vec![0.0; format.buffer_size],
        }
    }

    /// Fills an interleaved buffer. Each frame gets one sample from the
    /// source, scaled by the ramped gain and copied to every channel.
    pub fn render(&mut self, output: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let frames = output.len() / channels;
        self.ramp.retarget(self.shared.volume.target());

        // The ramp advances even while silent.
        if !self.shared.running.load(Ordering::Acquire) {
            output.fill(0.0);
            for _ in 0..frames {
                self.ramp.next();
            }
            self.shared.volume.publish(self.ramp.gain());
            return;
        }

        if self.scratch.len() < frames {
            // Only when the host hands us more than it negotiated.
            self.scratch.resize(frames, 0.0);
        }
        self.pull(frames);

        for (frame, sample) in output.chunks_mut(channels).zip(self.scratch.iter()) {
            frame.fill(sample * self.ramp.next());
        }
        for leftover in output[frames * channels..].iter_mut() {
            *leftover = 0.0;
        }
        self.shared.volume.publish(self.ramp.gain());
    }

    fn pull(&mut self, frames: usize) {
        let scratch = &mut self.scratch[..frames];
        let source = match self.shared.source.try_lock() {
            Some(source) => source.clone(),
            None => {
                scratch.fill(0.0);
                return;
            }
        };

        match source {
            Source::Silent => scratch.fill(0.0),
            Source::TestTone => self.tone.fill(scratch),
            Source::Voice(voice) => {
                // A command in flight on the control thread costs one silent buffer.
                let Some(mut voice) = voice.try_lock() else {
                    scratch.fill(0.0);
                    return;
                };

                let mut failed = 0u64;
                let mut first_error = None;
                for slot in scratch.iter_mut() {
                    *slot = match voice.generate_sample() {
                        Ok(sample) => sample.clamp(-1.0, 1.0),
                        Err(e) => {
                            failed += 1;
                            first_error.get_or_insert(e);
                            0.0
                        }
                    };
                }

                if let Some(e) = first_error {
                    self.shared
                        .failed_samples
                        .fetch_add(failed, Ordering::Relaxed);
                    warn!(
                        failed,
                        frames,
                        err = %e,
                        "Voice source failed to produce samples, substituted silence."
                    );
                }
            }
        }
    }
}
