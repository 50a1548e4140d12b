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
use crate::config::ConfigError;

/// Errors surfaced by the session API. Steady-state failures (bad samples,
/// malformed wire messages, commands that don't apply to the loaded cartridge)
/// are absorbed where they happen and never show up here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The operation needs an initialized (and not yet disposed) audio session.
    #[error("{0} requires an initialized audio session")]
    NotInitialized(&'static str),

    /// The host denied or lacks an audio output. The session keeps running silently.
    #[error("audio output unavailable: {0}")]
    AudioUnavailable(String),

    /// The host denied or lacks MIDI access. The session keeps running keyboard-only.
    #[error("MIDI device access unavailable: {0}")]
    DeviceAccessUnavailable(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
