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
use std::f32::consts::TAU;

pub const TONE_FREQUENCY: f32 = 440.0;
pub const TONE_LEVEL: f32 = 0.1;

/// The fallback source rendered when no voice source can be pulled.
pub struct TestTone {
    phase: f32,
    increment: f32,
}

impl TestTone {
    pub fn new(sample_rate: u32) -> TestTone {
        TestTone {
            phase: 0.0,
            increment: TONE_FREQUENCY / sample_rate.max(1) as f32,
        }
    }

    #[inline]
    pub fn next(&mut self) -> f32 {
        let sample = (self.phase * TAU).sin() * TONE_LEVEL;
        self.phase = (self.phase + self.increment).fract();
        sample
    }

    pub fn fill(&mut self, buffer: &mut [f32]) {
        for slot in buffer.iter_mut() {
            *slot = self.next();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_tone() {
        // 440 Hz at 44 kHz is exactly 100 samples per cycle.
        let mut tone = TestTone::new(44000);
        let mut buffer = vec![0.0; 200];
        tone.fill(&mut buffer);

        assert_eq!(0.0, buffer[0]);
        assert!((buffer[25] - TONE_LEVEL).abs() < 1e-4);
        assert!((buffer[75] + TONE_LEVEL).abs() < 1e-4);
        assert!((buffer[125] - buffer[25]).abs() < 1e-4);
        assert!(buffer.iter().all(|s| s.abs() <= TONE_LEVEL + 1e-6));
    }
}
