//! The tempo source.
//!
//! Every `60 / bpm` seconds the clock offers a `tick` carrying a running index
//! to each registered receiver and each child, then flushes whatever was parked
//! on its deferred queue. Every delivery is best-effort: a full inbox misses
//! that tick, so one stalled listener cannot hold back the others.

use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, trace, warn};

use crate::event::{Event, EventKind, Inbox};
use crate::field::Deferred;
use crate::node::{Ancestry, Arity, AudioNode, Context};
use crate::DEFERRED_CAPACITY;

pub const DEFAULT_BPM: f32 = 60.0;

/// Longest tick spacing accepted, one beat a minute.
const MAX_PERIOD: Duration = Duration::from_secs(60);

pub struct Clock {
    bpm: f32,
    period: Duration,
    index: u64,
    next: Instant,
    receivers: Vec<Inbox>,
    deferred: Receiver<Deferred>,
}

impl Clock {
    /// A clock at `bpm`, plus the sending half of its deferred queue. A tempo
    /// with no usable period falls back to [`DEFAULT_BPM`].
    pub fn new(bpm: f32) -> (Self, Sender<Deferred>) {
        let (bpm, period) = match Self::period_of(bpm) {
            Some(period) => (bpm, period),
            None => {
                warn!(bpm, "unusable tempo, using {}", DEFAULT_BPM);
                (DEFAULT_BPM, Duration::from_secs(1))
            }
        };
        let (tx, rx) = bounded(DEFERRED_CAPACITY);
        let clock = Self {
            bpm,
            period,
            index: 0,
            next: Instant::now() + period,
            receivers: Vec::new(),
            deferred: rx,
        };
        (clock, tx)
    }

    /// Tick spacing at `bpm`, if it is a positive span a `Duration` can hold.
    fn period_of(bpm: f32) -> Option<Duration> {
        if bpm.is_nan() || bpm <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f32(60.0 / bpm)
            .ok()
            .filter(|p| !p.is_zero() && *p <= MAX_PERIOD)
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    fn tick(&mut self, cx: &Context<'_>) {
        let ev = Event::tick(self.index);

        self.receivers.retain(|inbox| match inbox.try_send(ev.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                trace!(index = self.index, "tick dropped, receiver busy");
                true
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("receiver gone, unregistering");
                false
            }
        });
        cx.offer_children(&ev);
        self.index += 1;

        for parked in self.deferred.try_iter() {
            if let Err(e) = parked.target.try_send(parked.event) {
                warn!(kind = %e.into_inner().kind, "deferred event dropped");
            }
        }
    }
}

impl AudioNode for Clock {
    fn kind(&self) -> &'static str {
        "clock"
    }

    fn ancestry(&self) -> Ancestry {
        Ancestry::new(Arity::Zero, Arity::Many)
    }

    fn handle(&mut self, cx: &Context<'_>, ev: Event) {
        match ev.kind {
            EventKind::Bpm => match Self::period_of(ev.value) {
                Some(period) => {
                    // keep the phase of the last tick, only the spacing changes
                    let last = self.next.checked_sub(self.period).unwrap_or(self.next);
                    self.bpm = ev.value;
                    self.period = period;
                    self.next = last + period;
                    debug!(node = cx.name(), bpm = self.bpm, "tempo");
                }
                None => warn!(node = cx.name(), value = ev.value, "ignoring bpm"),
            },
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

    fn deadline(&self) -> Option<Instant> {
        Some(self.next)
    }

    fn elapsed(&mut self, cx: &Context<'_>) {
        self.tick(cx);

        let period = self.period();
        self.next += period;
        let now = Instant::now();
        if self.next + period < now {
            // fell more than a period behind; resume from now rather than burst
            self.next = now + period;
        }
    }

    fn describe(&self) -> String {
        format!("bpm={:.1} tick={} receivers={}", self.bpm, self.index, self.receivers.len())
    }
}
