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
use std::error::Error;

use midly::{
    live::LiveEvent,
    num::{u4, u7},
    MidiMessage,
};

/// Controller number of the channel mode message that silences every note.
pub const ALL_NOTES_OFF: u8 = 123;

/// Number of MIDI channels.
pub const CHANNELS: u8 = 16;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A parsed channel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    PitchBend { channel: u8, value: u16 },
    /// Any other status. Reported and ignored.
    Other { status: u8 },
}

/// Parses a raw `[status, data1, data2]` message. Returns None if a message
/// that needs data bytes is too short.
pub fn parse(bytes: &[u8]) -> Option<Message> {
    let (&status, data) = bytes.split_first()?;
    let channel = status & 0x0F;
    let data1 = data.first().map(|byte| byte & 0x7F);
    let data2 = data.get(1).map(|byte| byte & 0x7F);

    Some(match status >> 4 {
        0x9 => {
            let (note, velocity) = (data1?, data2?);
            if velocity > 0 {
                Message::NoteOn {
                    channel,
                    note,
                    velocity,
                }
            } else {
                Message::NoteOff { channel, note }
            }
        }
        0x8 => Message::NoteOff {
            channel,
            note: data1?,
        },
        0xB => Message::ControlChange {
            channel,
            controller: data1?,
            value: data2?,
        },
        0xE => Message::PitchBend {
            channel,
            value: (u16::from(data2?) << 7) | u16::from(data1?),
        },
        _ => Message::Other { status },
    })
}

fn encode(channel: u8, message: MidiMessage) -> Result<Vec<u8>, Box<dyn Error>> {
    let event = LiveEvent::Midi {
        channel: u4::from(channel),
        message,
    };
    let mut buf: Vec<u8> = Vec::with_capacity(3);
    event.write(&mut buf)?;
    Ok(buf)
}

pub fn note_on(channel: u8, note: u8, velocity: u8) -> Result<Vec<u8>, Box<dyn Error>> {
    encode(
        channel,
        MidiMessage::NoteOn {
            key: u7::from(note),
            vel: u7::from(velocity),
        },
    )
}

pub fn note_off(channel: u8, note: u8) -> Result<Vec<u8>, Box<dyn Error>> {
    encode(
        channel,
        MidiMessage::NoteOff {
            key: u7::from(note),
            vel: u7::from(0),
        },
    )
}

/// The all-notes-off channel mode message for one channel.
pub fn all_notes_off(channel: u8) -> Result<Vec<u8>, Box<dyn Error>> {
    encode(
        channel,
        MidiMessage::Controller {
            controller: u7::from(ALL_NOTES_OFF),
            value: u7::from(0),
        },
    )
}

/// Scientific pitch name of a note number, e.g. 60 is C4.
pub fn note_name(note: u8) -> String {
    let octave = i32::from(note / 12) - 1;
    format!("{}{}", NOTE_NAMES[usize::from(note % 12)], octave)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(
            Some(Message::NoteOn {
                channel: 2,
                note: 60,
                velocity: 100
            }),
            parse(&[0x92, 60, 100])
        );
        assert_eq!(
            Some(Message::NoteOff {
                channel: 0,
                note: 60
            }),
            parse(&[0x90, 60, 0])
        );
        assert_eq!(
            Some(Message::NoteOff {
                channel: 15,
                note: 64
            }),
            parse(&[0x8F, 64, 40])
        );
        assert_eq!(
            Some(Message::ControlChange {
                channel: 0,
                controller: 74,
                value: 127
            }),
            parse(&[0xB0, 74, 127])
        );
        assert_eq!(
            Some(Message::PitchBend {
                channel: 1,
                value: 8192
            }),
            parse(&[0xE1, 0x00, 0x40])
        );
        assert_eq!(Some(Message::Other { status: 0xC3 }), parse(&[0xC3, 5]));
        assert_eq!(Some(Message::Other { status: 0xF8 }), parse(&[0xF8]));
    }

    #[test]
    fn test_parse_short_messages() {
        assert_eq!(None, parse(&[]));
        assert_eq!(None, parse(&[0x90, 60]));
        assert_eq!(None, parse(&[0xB0]));
    }

    #[test]
    fn test_encode() {
        assert_eq!(vec![0xB0, 123, 0], all_notes_off(0).unwrap());
        assert_eq!(vec![0xBF, 123, 0], all_notes_off(15).unwrap());
        assert_eq!(vec![0x92, 60, 100], note_on(2, 60, 100).unwrap());
        assert_eq!(vec![0x80, 64, 0], note_off(0, 64).unwrap());
    }

    #[test]
    fn test_note_name() {
        assert_eq!("C4", note_name(60));
        assert_eq!("A4", note_name(69));
        assert_eq!("C-1", note_name(0));
        assert_eq!("G9", note_name(127));
    }
}
