use tracing::{trace, warn};

use crate::buffer::AudioBuffer;
use crate::event::{Event, EventKind};
use crate::node::{Ancestry, AudioNode, Context, ProcessContext};
use crate::waveform::{Phase, Waveform};

/// Amplitude modulation.
///
/// Each sample is scaled by `min + (max - min) * (w + 1) / 2`, where `w` is the
/// modulating waveform at the current phase. Events: `min`, `max`, `hz`,
/// `shape` (0 sine, 1 saw, 2 square).
pub struct GainLfo {
    waveform: Waveform,
    hz: f32,
    min: f32,
    max: f32,
    phase: Phase,
}

impl GainLfo {
    pub fn new() -> Self {
        Self { waveform: Waveform::Sine, hz: 1.0, min: 0.0, max: 1.0, phase: Phase::default() }
    }

    pub fn with_hz(mut self, hz: f32) -> Self {
        self.hz = hz;
        self
    }

    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_waveform(mut self, waveform: Waveform) -> Self {
        self.waveform = waveform;
        self
    }

    /// Gain applied to the next sample.
    #[inline]
    pub fn multiplier(&self) -> f32 {
        let w = self.waveform.at(self.phase.get());
        self.min + (self.max - self.min) * (w + 1.0) / 2.0
    }
}

impl Default for GainLfo {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioNode for GainLfo {
    fn kind(&self) -> &'static str {
        "gain-lfo"
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
        for sample in buf.iter_mut() {
            *sample *= self.multiplier();
            self.phase.advance(self.hz);
        }
    }

    fn handle(&mut self, cx: &Context<'_>, ev: Event) {
        match ev.kind {
            EventKind::Min => self.min = ev.value,
            EventKind::Max => self.max = ev.value,
            EventKind::Hz => self.hz = ev.value,
            EventKind::Shape => match Waveform::from_index(ev.value) {
                Some(w) => self.waveform = w,
                None => warn!(node = cx.name(), value = ev.value, "unknown shape"),
            },
            _ => trace!(node = cx.name(), "ignoring {}", ev.kind),
        }
    }

    fn describe(&self) -> String {
        format!(
            "{} hz={:.2} min={:.2} max={:.2}",
            self.waveform.name(),
            self.hz,
            self.min,
            self.max
        )
    }
}
