//! Control-plane messages.
//!
//! An [`Event`] is a kind tag, a numeric value and an optional payload. Every
//! node reads events from its [`Inbox`], a bounded many-producer channel.

use core::fmt;
use core::str::FromStr;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::node::NodeRef;
use crate::INBOX_CAPACITY;

/// What an event asks its receiver to do.
///
/// Parameter names a node does not know fall through to [`EventKind::Custom`],
/// so user-defined nodes can take their own parameters.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connect,
    Disconnect,
    Connection,
    Disconnection,
    Kill,
    Tick,
    Bpm,
    Gain,
    Hz,
    KeyDown,
    KeyUp,
    Min,
    Max,
    Shape,
    Delay,
    Wet,
    Mod,
    Attack,
    Decay,
    Sustain,
    Release,
    Register,
    Unregister,
    Push,
    Pop,
    Clear,
    Custom(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Connect => "connect",
            EventKind::Disconnect => "disconnect",
            EventKind::Connection => "connection",
            EventKind::Disconnection => "disconnection",
            EventKind::Kill => "kill",
            EventKind::Tick => "tick",
            EventKind::Bpm => "bpm",
            EventKind::Gain => "gain",
            EventKind::Hz => "hz",
            EventKind::KeyDown => "keydown",
            EventKind::KeyUp => "keyup",
            EventKind::Min => "min",
            EventKind::Max => "max",
            EventKind::Shape => "shape",
            EventKind::Delay => "delay",
            EventKind::Wet => "wet",
            EventKind::Mod => "mod",
            EventKind::Attack => "attack",
            EventKind::Decay => "decay",
            EventKind::Sustain => "sustain",
            EventKind::Release => "release",
            EventKind::Register => "register",
            EventKind::Unregister => "unregister",
            EventKind::Push => "push",
            EventKind::Pop => "pop",
            EventKind::Clear => "clear",
            EventKind::Custom(name) => name,
        }
    }

    /// Kinds the worker applies itself before a node sees anything.
    pub fn is_topology(&self) -> bool {
        matches!(
            self,
            EventKind::Connect
                | EventKind::Disconnect
                | EventKind::Connection
                | EventKind::Disconnection
                | EventKind::Kill
        )
    }
}

impl FromStr for EventKind {
    type Err = core::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Ok(match lower.as_str() {
            "connect" => EventKind::Connect,
            "disconnect" => EventKind::Disconnect,
            "connection" => EventKind::Connection,
            "disconnection" => EventKind::Disconnection,
            "kill" => EventKind::Kill,
            "tick" => EventKind::Tick,
            "bpm" => EventKind::Bpm,
            "gain" => EventKind::Gain,
            "hz" => EventKind::Hz,
            "keydown" => EventKind::KeyDown,
            "keyup" => EventKind::KeyUp,
            "min" => EventKind::Min,
            "max" => EventKind::Max,
            "shape" => EventKind::Shape,
            "delay" => EventKind::Delay,
            "wet" => EventKind::Wet,
            "mod" => EventKind::Mod,
            "attack" => EventKind::Attack,
            "decay" => EventKind::Decay,
            "sustain" => EventKind::Sustain,
            "release" => EventKind::Release,
            "register" => EventKind::Register,
            "unregister" => EventKind::Unregister,
            "push" => EventKind::Push,
            "pop" => EventKind::Pop,
            "clear" => EventKind::Clear,
            _ => EventKind::Custom(lower),
        })
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional payload of an [`Event`]. The required shape depends on the kind.
#[derive(Clone)]
pub enum Arg {
    None,
    Node(NodeRef),
    Receiver(Inbox),
    Slot(Vec<Event>),
    /// A tick index, kept exact past the range `f32` can count.
    Index(u64),
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::None => f.write_str("None"),
            Arg::Node(node) => write!(f, "Node({})", node.name()),
            Arg::Receiver(_) => f.write_str("Receiver"),
            Arg::Slot(events) => f.debug_tuple("Slot").field(events).finish(),
            Arg::Index(i) => write!(f, "Index({})", i),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Event {
    pub kind: EventKind,
    pub value: f32,
    pub arg: Arg,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self { kind, value: 0.0, arg: Arg::None }
    }

    pub fn with_value(kind: EventKind, value: f32) -> Self {
        Self { kind, value, arg: Arg::None }
    }

    pub fn connect(child: &NodeRef) -> Self {
        Self { kind: EventKind::Connect, value: 0.0, arg: Arg::Node(child.clone()) }
    }

    pub fn disconnect(child: &NodeRef) -> Self {
        Self { kind: EventKind::Disconnect, value: 0.0, arg: Arg::Node(child.clone()) }
    }

    pub fn connection(parent: &NodeRef) -> Self {
        Self { kind: EventKind::Connection, value: 0.0, arg: Arg::Node(parent.clone()) }
    }

    pub fn disconnection(parent: &NodeRef) -> Self {
        Self { kind: EventKind::Disconnection, value: 0.0, arg: Arg::Node(parent.clone()) }
    }

    pub fn kill() -> Self {
        Self::new(EventKind::Kill)
    }

    /// `value` carries the index rounded to `f32` for display; read the exact
    /// one with [`index`](Self::index).
    pub fn tick(index: u64) -> Self {
        Self { kind: EventKind::Tick, value: index as f32, arg: Arg::Index(index) }
    }

    pub fn register(inbox: &Inbox) -> Self {
        Self { kind: EventKind::Register, value: 0.0, arg: Arg::Receiver(inbox.clone()) }
    }

    pub fn unregister(inbox: &Inbox) -> Self {
        Self { kind: EventKind::Unregister, value: 0.0, arg: Arg::Receiver(inbox.clone()) }
    }

    pub fn push(slot: Vec<Event>) -> Self {
        Self { kind: EventKind::Push, value: 0.0, arg: Arg::Slot(slot) }
    }

    pub fn node(&self) -> Option<&NodeRef> {
        match &self.arg {
            Arg::Node(node) => Some(node),
            _ => None,
        }
    }

    /// The exact tick index, falling back to `value` for hand-built ticks.
    pub fn index(&self) -> u64 {
        match self.arg {
            Arg::Index(i) => i,
            _ => self.value.max(0.0) as u64,
        }
    }

    pub fn receiver(&self) -> Option<&Inbox> {
        match &self.arg {
            Arg::Receiver(inbox) => Some(inbox),
            _ => None,
        }
    }
}

/// Sending half of a node's event channel.
///
/// Inboxes compare by channel identity, which is how the clock and the
/// sequencer find a receiver again on `unregister`.
#[derive(Clone)]
pub struct Inbox(Sender<Event>);

impl Inbox {
    /// A fresh bounded inbox and the receiving end a worker drains.
    pub fn channel() -> (Inbox, Receiver<Event>) {
        let (tx, rx) = bounded(INBOX_CAPACITY);
        (Inbox(tx), rx)
    }

    /// Blocking delivery. Returns the event if the receiver is gone.
    pub fn send(&self, ev: Event) -> Result<(), Event> {
        self.0.send(ev).map_err(|e| e.into_inner())
    }

    /// Best-effort delivery; never blocks.
    pub fn try_send(&self, ev: Event) -> Result<(), TrySendError<Event>> {
        self.0.try_send(ev)
    }

    pub fn same(&self, other: &Inbox) -> bool {
        self.0.same_channel(&other.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.0.is_full()
    }
}

impl fmt::Debug for Inbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Inbox({}/{})", self.0.len(), INBOX_CAPACITY)
    }
}
