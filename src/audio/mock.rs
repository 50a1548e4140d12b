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
use std::{error::Error, fmt, sync::Arc};

use parking_lot::Mutex;
use tracing::info;

use super::{Format, Renderer};

/// A mock output. Nothing is played; callers drive the render callback by hand.
/// Clones share the same callback, so a test can keep one while the bridge owns another.
#[derive(Clone)]
pub struct Output {
    name: String,
    format: Format,
    available: bool,
    renderer: Arc<Mutex<Option<Renderer>>>,
}

impl Output {
    /// Gets the given mock output with a mono 44.1 kHz format.
    pub fn get(name: &str) -> Output {
        Output::with_format(
            name,
            Format {
                sample_rate: 44100,
                channels: 1,
                buffer_size: 1024,
            },
        )
    }

    /// Gets a mock output with the given format.
    pub fn with_format(name: &str, format: Format) -> Output {
        Output {
            name: name.to_string(),
            format,
            available: true,
            renderer: Arc::new(Mutex::new(None)),
        }
    }

    /// Gets a mock output that refuses to open, like a host without audio.
    pub fn unavailable(name: &str) -> Output {
        Output {
            available: false,
            ..Output::get(name)
        }
    }

    /// Runs the render callback for the given number of frames and returns the
    /// interleaved result. Returns silence if the output isn't open.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let channels = usize::from(self.format.channels);
        let mut buffer = vec![0.0; frames * channels];
        if let Some(renderer) = self.renderer.lock().as_mut() {
            renderer.render(&mut buffer, channels);
        }
        buffer
    }

    /// Returns true if a render callback is installed.
    pub fn is_open(&self) -> bool {
        self.renderer.lock().is_some()
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

impl super::Output for Output {
    fn format(&self) -> Result<Format, Box<dyn Error>> {
        if !self.available {
            return Err(format!("audio output {} is not available", self.name).into());
        }
        Ok(self.format)
    }

    fn open(&mut self, renderer: Renderer) -> Result<(), Box<dyn Error>> {
        self.format()?;
        info!(device = self.name, "Opening mock output.");
        *self.renderer.lock() = Some(renderer);
        Ok(())
    }

    fn close(&mut self) {
        self.renderer.lock().take();
    }
}
