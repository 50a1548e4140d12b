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
use serde::Deserialize;

const DEFAULT_BASE_NOTE: u8 = 60;
const DEFAULT_VELOCITY: u8 = 100;

/// A YAML representation of the virtual keyboard.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Keyboard {
    /// The note played by the first key of the row.
    base_note: Option<u8>,

    /// The velocity of every key press.
    velocity: Option<u8>,
}

impl Keyboard {
    pub fn new(base_note: u8, velocity: u8) -> Keyboard {
        Keyboard {
            base_note: Some(base_note),
            velocity: Some(velocity),
        }
    }

    pub fn base_note(&self) -> u8 {
        self.base_note.unwrap_or(DEFAULT_BASE_NOTE).min(127)
    }

    pub fn velocity(&self) -> u8 {
        self.velocity.unwrap_or(DEFAULT_VELOCITY).clamp(1, 127)
    }
}
