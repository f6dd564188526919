//! Buffer-granular delay lines.
//!
//! Both effects hold `depth = floor(seconds * SRATE / BUFSZ)` whole buffers.
//! While the line fills they emit silence, so exactly `depth` silent buffers
//! precede the first delayed one. Changing `delay` empties the line and starts
//! the pre-roll over. Lines are capped at [`MAX_DELAY`] seconds and grow as
//! they fill.

use std::collections::VecDeque;
use std::mem;

use tracing::{debug, trace, warn};

use crate::buffer::AudioBuffer;
use crate::event::{Event, EventKind};
use crate::node::{Ancestry, AudioNode, Context, ProcessContext};
use crate::{BUFSZ, SRATE};

pub const DEFAULT_DELAY: f32 = 1.0;

/// Longest delay a line will hold, in seconds.
pub const MAX_DELAY: f32 = 60.0;

/// Fixed-depth FIFO of buffers.
#[derive(Debug)]
pub struct DelayLine {
    ring: VecDeque<AudioBuffer>,
    depth: usize,
    seconds: f32,
}

impl DelayLine {
    /// A line `seconds` long, clamped to `0..=MAX_DELAY`. NaN gives an empty line.
    pub fn new(seconds: f32) -> Self {
        let seconds = if seconds.is_nan() { 0.0 } else { seconds.clamp(0.0, MAX_DELAY) };
        let depth = (seconds * SRATE as f32 / BUFSZ as f32).floor() as usize;
        Self { ring: VecDeque::new(), depth, seconds }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn seconds(&self) -> f32 {
        self.seconds
    }

    pub fn is_full(&self) -> bool {
        self.ring.len() >= self.depth
    }

    /// Push `input`; once the line is full, get back the buffer `depth` pulls old.
    pub fn cycle(&mut self, input: AudioBuffer) -> Option<AudioBuffer> {
        if self.depth == 0 {
            return Some(input);
        }
        if !self.is_full() {
            self.ring.push_back(input);
            return None;
        }
        let oldest = self.ring.pop_front();
        self.ring.push_back(input);
        oldest
    }
}

fn retime(line: &mut DelayLine, node: &str, value: f32) {
    if value.is_nan() || value < 0.0 {
        trace!(node, value, "ignoring negative delay");
        return;
    }
    if value > MAX_DELAY {
        warn!(node, value, "delay capped at {}s", MAX_DELAY);
    }
    *line = DelayLine::new(value);
    debug!(node, seconds = value, depth = line.depth(), "delay line reset");
}

/// Pure delay: audio comes out `depth` buffers late.
pub struct Delay {
    line: DelayLine,
}

impl Delay {
    pub fn new(seconds: f32) -> Self {
        Self { line: DelayLine::new(seconds) }
    }

    pub fn depth(&self) -> usize {
        self.line.depth()
    }
}

impl Default for Delay {
    fn default() -> Self {
        Self::new(DEFAULT_DELAY)
    }
}

impl AudioNode for Delay {
    fn kind(&self) -> &'static str {
        "delay"
    }

    fn ancestry(&self) -> Ancestry {
        Ancestry::CHAIN
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn process(&mut self, _ctx: &ProcessContext, buf: &mut AudioBuffer) {
        let input = mem::take(buf);
        *buf = self.line.cycle(input).unwrap_or_default();
    }

    fn handle(&mut self, cx: &Context<'_>, ev: Event) {
        match ev.kind {
            EventKind::Delay => retime(&mut self.line, cx.name(), ev.value),
            _ => trace!(node = cx.name(), "ignoring {}", ev.kind),
        }
    }

    fn describe(&self) -> String {
        format!("delay={:.3}s depth={}", self.line.seconds(), self.line.depth())
    }
}

/// Delay mixed with the live signal: `wet * new + (1 - wet) * old`.
pub struct Echo {
    line: DelayLine,
    wet: f32,
}

impl Echo {
    pub const DEFAULT_WET: f32 = 0.5;

    pub fn new(seconds: f32) -> Self {
        Self { line: DelayLine::new(seconds), wet: Self::DEFAULT_WET }
    }

    pub fn with_wet(mut self, wet: f32) -> Self {
        self.wet = wet.clamp(0.0, 1.0);
        self
    }

    pub fn wet(&self) -> f32 {
        self.wet
    }
}

impl Default for Echo {
    fn default() -> Self {
        Self::new(DEFAULT_DELAY)
    }
}

impl AudioNode for Echo {
    fn kind(&self) -> &'static str {
        "echo"
    }

    fn ancestry(&self) -> Ancestry {
        Ancestry::CHAIN
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn process(&mut self, _ctx: &ProcessContext, buf: &mut AudioBuffer) {
        match self.line.cycle(buf.clone()) {
            Some(old) => {
                let wet = self.wet;
                for (s, o) in buf.iter_mut().zip(old.iter()) {
                    *s = wet * *s + (1.0 - wet) * o;
                }
            }
            None => buf.fill(0.0),
        }
    }

    fn handle(&mut self, cx: &Context<'_>, ev: Event) {
        match ev.kind {
            EventKind::Delay => retime(&mut self.line, cx.name(), ev.value),
            EventKind::Wet => self.wet = ev.value.clamp(0.0, 1.0),
            _ => trace!(node = cx.name(), "ignoring {}", ev.kind),
        }
    }

    fn describe(&self) -> String {
        format!("delay={:.3}s depth={} wet={:.2}", self.line.seconds(), self.line.depth(), self.wet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn numbered(n: usize) -> AudioBuffer {
        AudioBuffer::from_fn(|_| n as f32 + 1.0)
    }

    #[test]
    fn depth_from_seconds() {
        assert_eq!(Delay::new(0.05).depth(), 1);
        assert_eq!(Delay::new(1.0).depth(), 21);
        assert_eq!(Delay::new(0.01).depth(), 0);
    }

    #[test]
    fn delay_round_trip() {
        let ctx = ProcessContext::default();
        let mut d = Delay::new(3.0 * BUFSZ as f32 / SRATE as f32 + 1e-4);
        let depth = d.depth();
        assert_eq!(depth, 3);

        let out: Vec<AudioBuffer> = (0..8)
            .map(|i| {
                let mut buf = numbered(i);
                d.process(&ctx, &mut buf);
                buf
            })
            .collect();

        for buf in &out[..depth] {
            assert!(buf.is_silent());
        }
        for (i, buf) in out[depth..].iter().enumerate() {
            assert_eq!(*buf, numbered(i));
        }
    }

    #[test]
    fn zero_depth_passes_through() {
        let mut d = Delay::new(0.0);
        let mut buf = numbered(4);
        d.process(&ProcessContext::default(), &mut buf);
        assert_eq!(buf, numbered(4));
    }

    #[test]
    fn echo_is_silent_while_filling_then_mixes() {
        let ctx = ProcessContext::default();
        let mut e = Echo::new(0.05).with_wet(0.25);

        let mut first = AudioBuffer::from_fn(|_| 1.0);
        e.process(&ctx, &mut first);
        assert!(first.is_silent());

        let mut second = AudioBuffer::from_fn(|_| 0.5);
        e.process(&ctx, &mut second);
        assert_abs_diff_eq!(second[0], 0.25 * 0.5 + 0.75 * 1.0);
        assert_abs_diff_eq!(second[BUFSZ - 1], 0.875);
    }

    #[test]
    fn wet_is_clamped() {
        assert_eq!(Echo::new(1.0).with_wet(3.0).wet(), 1.0);
        assert_eq!(Echo::new(1.0).with_wet(-1.0).wet(), 0.0);
    }

    #[test]
    fn long_delays_are_capped() {
        let max = DelayLine::new(MAX_DELAY).depth();
        assert_eq!(Delay::new(f32::INFINITY).depth(), max);
        assert_eq!(Delay::new(1e30).depth(), max);
        assert_eq!(Delay::new(f32::NAN).depth(), 0);

        let mut line = DelayLine::new(0.05);
        retime(&mut line, "d", f32::INFINITY);
        assert_eq!(line.depth(), max);
        assert_eq!(line.seconds(), MAX_DELAY);
        retime(&mut line, "d", f32::NAN);
        assert_eq!(line.depth(), max);
    }

    #[test]
    fn retiming_restarts_the_pre_roll() {
        let mut line = DelayLine::new(0.05);
        assert!(line.cycle(numbered(0)).is_none());
        assert_eq!(line.cycle(numbered(1)), Some(numbered(0)));

        retime(&mut line, "d", 0.05);
        assert!(line.cycle(numbered(2)).is_none());
        assert_eq!(line.cycle(numbered(3)), Some(numbered(2)));
    }
}
