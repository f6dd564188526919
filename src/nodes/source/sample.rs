use std::sync::Arc;

use tracing::trace;

use crate::buffer::AudioBuffer;
use crate::decode::SampleData;
use crate::event::{Event, EventKind};
use crate::node::{Ancestry, AudioNode, Context, ProcessContext};

/// Loops a decoded sample table forever.
///
/// The table is shared, so any number of players can read one decoded file.
/// Events: `gain`, and `keydown` to restart from the top.
pub struct Sample {
    data: Arc<[f32]>,
    pos: usize,
    gain: f32,
}

impl Sample {
    pub fn new(data: &SampleData) -> Self {
        Self::from_samples(data.samples())
    }

    pub fn from_samples(data: Arc<[f32]>) -> Self {
        Self { data, pos: 0, gain: 1.0 }
    }
}

impl AudioNode for Sample {
    fn kind(&self) -> &'static str {
        "sample"
    }

    fn ancestry(&self) -> Ancestry {
        Ancestry::CHAIN
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn process(&mut self, _ctx: &ProcessContext, buf: &mut AudioBuffer) {
        if self.data.is_empty() {
            buf.fill(0.0);
            return;
        }
        for sample in buf.iter_mut() {
            *sample = self.data[self.pos] * self.gain;
            self.pos = (self.pos + 1) % self.data.len();
        }
    }

    fn handle(&mut self, cx: &Context<'_>, ev: Event) {
        match ev.kind {
            EventKind::Gain => self.gain = ev.value,
            EventKind::KeyDown => self.pos = 0,
            _ => trace!(node = cx.name(), "ignoring {}", ev.kind),
        }
    }

    fn describe(&self) -> String {
        format!("len={} pos={} gain={:.2}", self.data.len(), self.pos, self.gain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_around_the_table() {
        let mut s = Sample::from_samples(Arc::from(vec![1.0, 2.0, 3.0]));
        let mut buf = AudioBuffer::silence();
        s.process(&ProcessContext::default(), &mut buf);
        assert_eq!(&buf[..7], &[1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn empty_table_is_silence() {
        let mut s = Sample::from_samples(Arc::from(Vec::<f32>::new()));
        let mut buf = AudioBuffer::from_fn(|_| 1.0);
        s.process(&ProcessContext::default(), &mut buf);
        assert!(buf.is_silent());
    }
}
