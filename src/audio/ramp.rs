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
use std::sync::atomic::{AtomicU32, Ordering};

/// Exponential ramps can't reach zero, so silence is approximated by this gain.
pub const EPSILON: f32 = 0.001;

/// Clamps a requested volume into the range the ramp can target.
pub fn floor(volume: f32) -> f32 {
    volume.clamp(0.0, 1.0).max(EPSILON)
}

/// An f32 stored as its bit pattern.
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> AtomicF32 {
        AtomicF32(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    #[inline]
    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Release)
    }
}

/// The shared half of the output volume. The control thread writes the target,
/// the render thread publishes the gain it actually reached.
pub struct VolumeRamp {
    target: AtomicF32,
    current: AtomicF32,
}

impl VolumeRamp {
    pub fn new(initial: f32) -> VolumeRamp {
        let initial = floor(initial);
        VolumeRamp {
            target: AtomicF32::new(initial),
            current: AtomicF32::new(initial),
        }
    }

    /// Jumps both target and current gain. Only valid while nothing is rendering.
    pub fn reset(&self, volume: f32) {
        let volume = floor(volume);
        self.target.store(volume);
        self.current.store(volume);
    }

    /// Sets a new target and returns it after clamping.
    pub fn set_target(&self, volume: f32) -> f32 {
        let target = floor(volume);
        self.target.store(target);
        target
    }

    #[inline]
    pub fn target(&self) -> f32 {
        self.target.load()
    }

    /// The gain most recently reached by the render thread.
    pub fn current(&self) -> f32 {
        self.current.load()
    }

    /// Abandons a ramp in progress, holding the gain where it is.
    pub fn halt(&self) {
        self.target.store(self.current.load());
    }

    #[inline]
    pub(super) fn publish(&self, gain: f32) {
        self.current.store(gain);
    }
}

/// The render thread's half of the ramp, advanced once per sample.
pub struct Ramp {
    gain: f32,
    target: f32,
    step: f32,
    remaining: usize,
    length: usize,
}

impl Ramp {
    /// Creates a ramp resting at `initial` whose transitions take `length` samples.
    pub fn new(initial: f32, length: usize) -> Ramp {
        let initial = floor(initial);
        Ramp {
            gain: initial,
            target: initial,
            step: 1.0,
            remaining: 0,
            length: length.max(1),
        }
    }

    /// Starts a new exponential transition if the target moved.
    #[inline]
    pub fn retarget(&mut self, target: f32) {
        if target == self.target {
            return;
        }
        self.target = target;
        self.remaining = self.length;
        self.step = (target / self.gain).powf(1.0 / self.length as f32);
    }

    /// Returns the gain for the next sample.
    #[inline]
    pub fn next(&mut self) -> f32 {
        if self.remaining > 0 {
            self.remaining -= 1;
            self.gain = if self.remaining == 0 {
                self.target
            } else {
                self.gain * self.step
            };
        }
        self.gain
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_floor() {
        assert_eq!(EPSILON, floor(0.0));
        assert_eq!(EPSILON, floor(-3.0));
        assert_eq!(EPSILON, floor(f32::NAN));
        assert_eq!(1.0, floor(7.0));
        assert_eq!(0.5, floor(0.5));
    }

    #[test]
    fn test_ramp_is_exponential_and_lands_on_target() {
        let mut ramp = Ramp::new(1.0, 100);
        ramp.retarget(0.01);

        let mut previous = ramp.gain();
        for _ in 0..50 {
            let gain = ramp.next();
            assert!(gain < previous);
            previous = gain;
        }
        // Halfway through an exponential ramp sits at the geometric mean.
        assert!((ramp.gain() - 0.1).abs() < 1e-3);

        for _ in 0..50 {
            ramp.next();
        }
        assert_eq!(0.01, ramp.gain());
        assert_eq!(0.01, ramp.next());
    }

    #[test]
    fn test_retarget_mid_ramp() {
        let mut ramp = Ramp::new(0.5, 10);
        ramp.retarget(1.0);
        for _ in 0..5 {
            ramp.next();
        }
        ramp.retarget(0.25);
        for _ in 0..9 {
            assert!(ramp.next() > 0.25);
        }
        assert_eq!(0.25, ramp.next());
    }

    #[test]
    fn test_halt_holds_current_gain() {
        let volume = VolumeRamp::new(0.3);
        assert_eq!(0.3, volume.target());

        volume.set_target(0.9);
        volume.publish(0.42);
        volume.halt();
        assert_eq!(0.42, volume.target());
        assert_eq!(0.42, volume.current());
    }
}
