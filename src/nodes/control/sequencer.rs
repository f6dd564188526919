use tracing::{trace, warn};

use crate::event::{Arg, Event, EventKind, Inbox};
use crate::node::{Ancestry, Arity, AudioNode, Context};

/// Steps through slots of events, one slot per `tick`.
///
/// Each tick offers every event of the current slot to all registered
/// receivers and all children, then moves on, wrapping at the end. Slots are
/// managed with `push` (a slot payload), `pop` and `clear`.
pub struct Sequencer {
    slots: Vec<Vec<Event>>,
    pos: usize,
    receivers: Vec<Inbox>,
}

impl Sequencer {
    pub fn new() -> Self {
        Self { slots: Vec::new(), pos: 0, receivers: Vec::new() }
    }

    fn fire(&mut self, cx: &Context<'_>) {
        let Some(slot) = self.slots.get(self.pos) else { return };
        for ev in slot {
            self.receivers.retain(|r| match r.try_send(ev.clone()) {
                Ok(()) => true,
                Err(e) => {
                    trace!(node = cx.name(), full = e.is_full(), "dropped {}", ev.kind);
                    e.is_full()
                }
            });
            cx.offer_children(ev);
        }
        self.pos = (self.pos + 1) % self.slots.len();
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioNode for Sequencer {
    fn kind(&self) -> &'static str {
        "sequencer"
    }

    fn ancestry(&self) -> Ancestry {
        Ancestry::new(Arity::One, Arity::Many)
    }

    fn handle(&mut self, cx: &Context<'_>, ev: Event) {
        match ev.kind {
            EventKind::Tick => self.fire(cx),
            EventKind::Push => match ev.arg {
                Arg::Slot(slot) => self.slots.push(slot),
                _ => warn!(node = cx.name(), "push without a slot"),
            },
            EventKind::Pop => {
                self.slots.pop();
                if self.pos >= self.slots.len() {
                    self.pos = 0;
                }
            }
            EventKind::Clear => {
                self.slots.clear();
                self.pos = 0;
            }
            EventKind::Register => match ev.receiver() {
                Some(inbox) if !self.receivers.iter().any(|r| r.same(inbox)) => {
                    self.receivers.push(inbox.clone())
                }
                Some(_) => {}
                None => warn!(node = cx.name(), "register without a receiver"),
            },
            EventKind::Unregister => match ev.receiver() {
                Some(inbox) => self.receivers.retain(|r| !r.same(inbox)),
                None => warn!(node = cx.name(), "unregister without a receiver"),
            },
            _ => trace!(node = cx.name(), "ignoring {}", ev.kind),
        }
    }

    fn describe(&self) -> String {
        format!("slots={} pos={} receivers={}", self.slots.len(), self.pos, self.receivers.len())
    }
}
