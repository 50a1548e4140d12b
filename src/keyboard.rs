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
use std::collections::HashMap;

use crate::config;

/// One octave laid out like a piano on a QWERTY home row: white keys on
/// `a s d f g h j k`, black keys on `w e t y u`.
const KEYS: [char; 13] = [
    'a', 'w', 's', 'e', 'd', 'f', 't', 'g', 'y', 'h', 'u', 'j', 'k',
];
const OCTAVE_DOWN: char = 'z';
const OCTAVE_UP: char = 'x';
const MAX_OCTAVE_SHIFT: i8 = 4;

/// What a key press or release turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    Octave(i8),
    Ignored,
}

/// Maps computer keys to notes. Remembers which note each held key started so
/// an octave change while a key is down can't strand a note.
pub struct Keymap {
    base_note: u8,
    velocity: u8,
    octave: i8,
    held: HashMap<char, u8>,
}

impl Keymap {
    pub fn new(config: &config::Keyboard) -> Keymap {
        Keymap {
            base_note: config.base_note(),
            velocity: config.velocity(),
            octave: 0,
            held: HashMap::new(),
        }
    }

    pub fn octave(&self) -> i8 {
        self.octave
    }

    /// The note a key plays at the current octave, if it plays one.
    pub fn note_for(&self, key: char) -> Option<u8> {
        let key = key.to_ascii_lowercase();
        let offset = KEYS.iter().position(|k| *k == key)?;
        let note = i16::from(self.base_note) + i16::from(self.octave) * 12 + offset as i16;
        u8::try_from(note).ok().filter(|note| *note <= 127)
    }

    pub fn press(&mut self, key: char) -> KeyAction {
        let key = key.to_ascii_lowercase();
        match key {
            OCTAVE_DOWN => self.shift(-1),
            OCTAVE_UP => self.shift(1),
            _ => {
                if self.held.contains_key(&key) {
                    // Auto-repeat.
                    return KeyAction::Ignored;
                }
                match self.note_for(key) {
                    Some(note) => {
                        self.held.insert(key, note);
                        KeyAction::NoteOn {
                            note,
                            velocity: self.velocity,
                        }
                    }
                    None => KeyAction::Ignored,
                }
            }
        }
    }

    pub fn release(&mut self, key: char) -> KeyAction {
        match self.held.remove(&key.to_ascii_lowercase()) {
            Some(note) => KeyAction::NoteOff { note },
            None => KeyAction::Ignored,
        }
    }

    fn shift(&mut self, delta: i8) -> KeyAction {
        self.octave = (self.octave + delta).clamp(-MAX_OCTAVE_SHIFT, MAX_OCTAVE_SHIFT);
        KeyAction::Octave(self.octave)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn keymap() -> Keymap {
        Keymap::new(&config::Keyboard::default())
    }

    #[test]
    fn test_note_for() {
        let keymap = keymap();
        assert_eq!(Some(60), keymap.note_for('a'));
        assert_eq!(Some(61), keymap.note_for('w'));
        assert_eq!(Some(72), keymap.note_for('K'));
        assert_eq!(None, keymap.note_for('q'));
    }

    #[test]
    fn test_press_and_release() {
        let mut keymap = keymap();
        assert_eq!(
            KeyAction::NoteOn {
                note: 64,
                velocity: 100
            },
            keymap.press('d')
        );
        assert_eq!(KeyAction::Ignored, keymap.press('d'));
        assert_eq!(KeyAction::NoteOff { note: 64 }, keymap.release('d'));
        assert_eq!(KeyAction::Ignored, keymap.release('d'));
    }

    #[test]
    fn test_octave_shift_keeps_held_note() {
        let mut keymap = keymap();
        keymap.press('a');
        assert_eq!(KeyAction::Octave(1), keymap.press('x'));
        assert_eq!(Some(72), keymap.note_for('a'));
        assert_eq!(KeyAction::NoteOff { note: 60 }, keymap.release('a'));

        for _ in 0..10 {
            keymap.press('z');
        }
        assert_eq!(-4, keymap.octave());
        assert_eq!(Some(12), keymap.note_for('a'));
    }

    #[test]
    fn test_out_of_range() {
        let mut keymap = Keymap::new(&config::Keyboard::new(120, 127));
        assert_eq!(Some(127), keymap.note_for('g'));
        assert_eq!(None, keymap.note_for('y'));
        assert_eq!(KeyAction::Ignored, keymap.press('k'));
    }
}
