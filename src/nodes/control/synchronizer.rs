use std::mem;

use tracing::{debug, warn};

use crate::event::{Event, EventKind};
use crate::node::{Ancestry, AudioNode, Context};

/// Holds events back until the beat.
///
/// Anything that is not a `tick` or `mod` is queued. A `tick` whose index is a
/// multiple of `mod` (1 to 100, default 1) sends the queue to the child in
/// arrival order and empties it, child or not.
pub struct Synchronizer {
    modulo: u32,
    pending: Vec<Event>,
}

impl Synchronizer {
    pub fn new() -> Self {
        Self { modulo: 1, pending: Vec::new() }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioNode for Synchronizer {
    fn kind(&self) -> &'static str {
        "synchronizer"
    }

    fn ancestry(&self) -> Ancestry {
        Ancestry::CHAIN
    }

    fn handle(&mut self, cx: &Context<'_>, ev: Event) {
        match ev.kind {
            EventKind::Tick => {
                let index = ev.index();
                if index % self.modulo as u64 != 0 {
                    return;
                }
                let release = mem::take(&mut self.pending);
                if !release.is_empty() {
                    debug!(node = cx.name(), tick = index, count = release.len(), "release");
                }
                for queued in &release {
                    cx.send_children(queued);
                }
            }
            EventKind::Mod => {
                let v = ev.value;
                if v.fract() == 0.0 && (1.0..=100.0).contains(&v) {
                    self.modulo = v as u32;
                } else {
                    warn!(node = cx.name(), value = v, "mod must be a whole number in 1..=100");
                }
            }
            _ => self.pending.push(ev),
        }
    }

    fn describe(&self) -> String {
        format!("mod={} pending={}", self.modulo, self.pending.len())
    }
}
