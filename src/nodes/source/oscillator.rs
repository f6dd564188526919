use tracing::trace;

use crate::buffer::AudioBuffer;
use crate::event::{Event, EventKind};
use crate::node::{Ancestry, AudioNode, Context, ProcessContext};
use crate::waveform::{Phase, Waveform};

/// A periodic voice.
///
/// Events: `hz`, `gain`, `keydown` (sets `hz` and opens the gate), `keyup`
/// (closes the gate, so the voice outputs silence until the next `keydown`).
pub struct Oscillator {
    waveform: Waveform,
    hz: f32,
    gain: f32,
    gate: bool,
    phase: Phase,
}

impl Oscillator {
    pub const DEFAULT_HZ: f32 = 440.0;
    pub const DEFAULT_GAIN: f32 = 0.5;

    pub fn new(waveform: Waveform) -> Self {
        Self {
            waveform,
            hz: Self::DEFAULT_HZ,
            gain: Self::DEFAULT_GAIN,
            gate: true,
            phase: Phase::default(),
        }
    }

    pub fn sine() -> Self {
        Self::new(Waveform::Sine)
    }

    pub fn square() -> Self {
        Self::new(Waveform::Square)
    }

    pub fn saw() -> Self {
        Self::new(Waveform::Saw)
    }

    pub fn with_hz(mut self, hz: f32) -> Self {
        self.hz = hz;
        self
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }
}

impl AudioNode for Oscillator {
    fn kind(&self) -> &'static str {
        self.waveform.name()
    }

    fn ancestry(&self) -> Ancestry {
        Ancestry::CHAIN
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn process(&mut self, _ctx: &ProcessContext, buf: &mut AudioBuffer) {
        if !self.gate {
            buf.fill(0.0);
            return;
        }
        for sample in buf.iter_mut() {
            *sample = self.waveform.at(self.phase.get()) * self.gain;
            self.phase.advance(self.hz);
        }
    }

    fn handle(&mut self, cx: &Context<'_>, ev: Event) {
        match ev.kind {
            EventKind::Hz => self.hz = ev.value.max(0.0),
            EventKind::Gain => self.gain = ev.value,
            EventKind::KeyDown => {
                self.hz = ev.value.max(0.0);
                self.gate = true;
            }
            EventKind::KeyUp => self.gate = false,
            _ => trace!(node = cx.name(), "ignoring {}", ev.kind),
        }
    }

    fn describe(&self) -> String {
        format!("hz={:.2} gain={:.2}{}", self.hz, self.gain, if self.gate { "" } else { " (off)" })
    }
}
