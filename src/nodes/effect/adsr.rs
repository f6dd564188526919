//! Signal-triggered ADSR envelope.
//!
//! The envelope listens to the signal it shapes: a zero sample during
//! Sustain is a note-off, and a non-zero sample during Release is a retrigger.
//! Each stage tracks `percent` in `[0, 1)` and advances it by
//! `(1 / SRATE) / stage_duration` per sample.

use std::time::Duration;

use tracing::{trace, warn};

use crate::buffer::AudioBuffer;
use crate::event::{Event, EventKind};
use crate::node::{Ancestry, AudioNode, Context, ProcessContext};
use crate::SRATE;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Attack,
    Decay,
    Sustain,
    Release,
}

pub struct Adsr {
    stage: Stage,
    percent: f32,
    attack: Duration,
    decay: Duration,
    sustain: f32,
    release: Duration,
}

impl Adsr {
    pub fn new() -> Self {
        Self {
            stage: Stage::Attack,
            percent: 0.0,
            attack: Duration::from_millis(50),
            decay: Duration::from_millis(50),
            sustain: 0.8,
            release: Duration::from_millis(100),
        }
    }

    pub fn with_stages(mut self, attack: Duration, decay: Duration, sustain: f32, release: Duration) -> Self {
        self.attack = attack;
        self.decay = decay;
        self.sustain = sustain.clamp(0.0, 1.0);
        self.release = release;
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn percent(&self) -> f32 {
        self.percent
    }

    fn increment(stage: Duration) -> f32 {
        let secs = stage.as_secs_f32();
        if secs <= 0.0 {
            // a zero-length stage completes on its first sample
            1.0
        } else {
            1.0 / (SRATE as f32 * secs)
        }
    }

    fn advance(&mut self, duration: Duration, next: Stage) {
        self.percent += Self::increment(duration);
        if self.percent >= 1.0 {
            self.percent = 0.0;
            self.stage = next;
        }
    }

    /// Run one sample through the envelope.
    pub fn step(&mut self, x: f32) -> f32 {
        match self.stage {
            Stage::Attack => {
                let out = self.percent * x;
                self.advance(self.attack, Stage::Decay);
                out
            }
            Stage::Decay => {
                let out = x * (1.0 - self.percent * (1.0 - self.sustain));
                self.advance(self.decay, Stage::Sustain);
                out
            }
            Stage::Sustain if x != 0.0 => x * self.sustain,
            Stage::Sustain => {
                self.percent = 0.0;
                self.stage = Stage::Release;
                self.release_step(x)
            }
            Stage::Release => self.release_step(x),
        }
    }

    fn release_step(&mut self, x: f32) -> f32 {
        if x != 0.0 {
            // retrigger: this sample is the start of a fresh attack
            self.stage = Stage::Attack;
            self.percent = 0.0;
            return 0.0;
        }
        let out = x * (1.0 - self.percent * self.sustain);
        self.advance(self.release, Stage::Attack);
        out
    }

    fn set_duration(slot: &mut Duration, node: &str, ev: &Event) {
        match Duration::try_from_secs_f32(ev.value) {
            Ok(d) if !d.is_zero() => *slot = d,
            _ => warn!(node, value = ev.value, "{} needs a positive number of seconds", ev.kind),
        }
    }
}

impl Default for Adsr {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioNode for Adsr {
    fn kind(&self) -> &'static str {
        "adsr"
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
            *sample = self.step(*sample);
        }
    }

    fn handle(&mut self, cx: &Context<'_>, ev: Event) {
        match ev.kind {
            EventKind::Attack => Self::set_duration(&mut self.attack, cx.name(), &ev),
            EventKind::Decay => Self::set_duration(&mut self.decay, cx.name(), &ev),
            EventKind::Release => Self::set_duration(&mut self.release, cx.name(), &ev),
            EventKind::Sustain => self.sustain = ev.value.clamp(0.0, 1.0),
            _ => trace!(node = cx.name(), "ignoring {}", ev.kind),
        }
    }

    fn describe(&self) -> String {
        format!(
            "{:?} {:.0}% a={}ms d={}ms s={:.2} r={}ms",
            self.stage,
            self.percent * 100.0,
            self.attack.as_millis(),
            self.decay.as_millis(),
            self.sustain,
            self.release.as_millis()
        )
    }
}
