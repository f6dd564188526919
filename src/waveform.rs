//! Periodic shapes built from one quarter period.
//!
//! Each shape is defined over `x` in `[0, 1]` for the first quarter of the
//! cycle. The second quarter plays it backwards, and the second half repeats
//! the first half negated.

use core::f32::consts::TAU;

use crate::SRATE;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Waveform {
    #[default]
    Sine,
    Saw,
    Square,
}

impl Waveform {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sine" => Some(Waveform::Sine),
            "saw" => Some(Waveform::Saw),
            "square" => Some(Waveform::Square),
            _ => None,
        }
    }

    /// Shape selector used by the `shape` event: 0 sine, 1 saw, 2 square.
    pub fn from_index(v: f32) -> Option<Self> {
        match v as i32 {
            0 => Some(Waveform::Sine),
            1 => Some(Waveform::Saw),
            2 => Some(Waveform::Square),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Saw => "saw",
            Waveform::Square => "square",
        }
    }

    fn quarter(self, x: f32) -> f32 {
        match self {
            Waveform::Sine => (TAU * x / 4.0).sin(),
            Waveform::Saw => x,
            Waveform::Square => 1.0,
        }
    }

    /// Value at `phase` (in cycles). Always within `[-1, 1]`.
    pub fn at(self, phase: f32) -> f32 {
        let p = phase.rem_euclid(1.0);
        if p <= 0.25 {
            self.quarter(4.0 * p)
        } else if p <= 0.5 {
            self.quarter(1.0 - 4.0 * (p - 0.25))
        } else if p <= 0.75 {
            -self.quarter(4.0 * (p - 0.5))
        } else {
            -self.quarter(1.0 - 4.0 * (p - 0.75))
        }
    }
}

/// Phase accumulator in `[0, 1)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Phase(f32);

impl Phase {
    pub fn get(self) -> f32 {
        self.0
    }

    /// Step forward by one sample at `hz`, wrapping at 1.
    #[inline]
    pub fn advance(&mut self, hz: f32) {
        let next = (self.0 + hz / SRATE as f32).rem_euclid(1.0);
        // rem_euclid can round up to exactly 1.0 for tiny negatives
        self.0 = if next >= 1.0 { 0.0 } else { next };
    }
}
