//! Core node trait and the shared handle every other part of the graph holds.

use core::fmt;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, TrySendError};
use parking_lot::RwLock;

use crate::buffer::AudioBuffer;
use crate::error::{Error, Result};
use crate::event::{Event, Inbox};
use crate::{BUFSZ, SRATE};

/// Information available during audio processing.
///
/// Passed to every [`AudioNode::process`] call.
#[derive(Clone, Copy, Debug)]
pub struct ProcessContext {
    /// Sample rate of the graph in Hz
    pub sample_rate: u32,
    /// Number of samples per buffer
    pub buffer_size: usize,
}

impl Default for ProcessContext {
    fn default() -> Self {
        Self { sample_rate: SRATE, buffer_size: BUFSZ }
    }
}

/// How many edges a node accepts on one side.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Arity {
    Zero,
    One,
    Many,
}

impl Arity {
    pub fn accepts(self) -> bool {
        self != Arity::Zero
    }
}

/// Parent and child arity of a node kind.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Ancestry {
    pub parents: Arity,
    pub children: Arity,
}

impl Ancestry {
    pub const fn new(parents: Arity, children: Arity) -> Self {
        Self { parents, children }
    }

    /// One parent, one child: generators, effects, the synchronizer.
    pub const CHAIN: Ancestry = Ancestry::new(Arity::One, Arity::One);
}

/// Parent and child lists as last published by a node's worker.
#[derive(Clone, Default, Debug)]
pub struct Edges {
    pub parents: Vec<NodeRef>,
    pub children: Vec<NodeRef>,
}

/// What a node sees of itself while handling an event or a timer.
pub struct Context<'a> {
    pub(crate) name: &'a str,
    pub(crate) process: &'a ProcessContext,
    pub(crate) edges: &'a Edges,
}

impl<'a> Context<'a> {
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn process(&self) -> &ProcessContext {
        self.process
    }

    pub fn parents(&self) -> &[NodeRef] {
        &self.edges.parents
    }

    pub fn children(&self) -> &[NodeRef] {
        &self.edges.children
    }

    /// Blocking delivery to every child. Children whose worker has exited are
    /// skipped.
    pub fn send_children(&self, ev: &Event) {
        for child in self.children() {
            if child.send(ev.clone()).is_err() {
                tracing::debug!(node = self.name, child = child.name(), "child inbox closed");
            }
        }
    }

    /// Best-effort delivery to every child. Returns how many were dropped.
    pub fn offer_children(&self, ev: &Event) -> usize {
        let mut dropped = 0;
        for child in self.children() {
            if let Err(e) = child.try_send(ev.clone()) {
                tracing::trace!(node = self.name, child = child.name(), full = e.is_full(), "dropped {}", ev.kind);
                dropped += 1;
            }
        }
        dropped
    }
}

/// The trait every unit in the patch bay implements.
///
/// A node never runs on its own: [`worker::spawn`](crate::worker::spawn) moves it
/// onto a dedicated thread that owns its edges and ports, applies topology
/// events, and calls back into these hooks.
///
/// - **Generators** have no audio input and one output. The worker calls
///   [`process`](Self::process) with a silent buffer to fill whenever the
///   previous buffer was delivered.
/// - **Effects** have one input and one output. `process` transforms each
///   pulled buffer in place.
/// - **Control nodes** (clock, synchronizer, sequencer) have no audio at all
///   and only react to events and timers.
///
/// ```
/// use klangfeld::{Ancestry, AudioBuffer, AudioNode, Context, Event, EventKind, ProcessContext};
///
/// struct Fuzz { drive: f32 }
///
/// impl AudioNode for Fuzz {
///     fn kind(&self) -> &'static str { "fuzz" }
///     fn ancestry(&self) -> Ancestry { Ancestry::CHAIN }
///     fn num_inputs(&self) -> usize { 1 }
///     fn num_outputs(&self) -> usize { 1 }
///
///     fn process(&mut self, _ctx: &ProcessContext, buf: &mut AudioBuffer) {
///         for s in buf.iter_mut() {
///             *s = (*s * self.drive).tanh();
///         }
///     }
///
///     fn handle(&mut self, _cx: &Context<'_>, ev: Event) {
///         if ev.kind == EventKind::Gain {
///             self.drive = ev.value;
///         }
///     }
/// }
/// ```
pub trait AudioNode: Send + 'static {
    /// Short kind name, as used by the factory and in diagnostics.
    fn kind(&self) -> &'static str;

    fn ancestry(&self) -> Ancestry;

    /// Audio inputs the worker pulls for this node (0 or 1).
    ///
    /// Sinks that pull on another thread, like the mixer, report 0 and pick up
    /// their producers in [`connected`](Self::connected).
    fn num_inputs(&self) -> usize {
        0
    }

    /// Audio outputs (0 or 1).
    fn num_outputs(&self) -> usize {
        0
    }

    /// Fill (generators) or transform (effects) one buffer.
    fn process(&mut self, _ctx: &ProcessContext, _buf: &mut AudioBuffer) {}

    /// Any event that is not a topology event.
    fn handle(&mut self, cx: &Context<'_>, ev: Event);

    /// A parent edge was accepted.
    fn connected(&mut self, _cx: &Context<'_>, _parent: &NodeRef) {}

    /// A parent edge was removed.
    fn disconnected(&mut self, _cx: &Context<'_>, _parent: &NodeRef) {}

    /// Next moment [`elapsed`](Self::elapsed) should run, if any.
    fn deadline(&self) -> Option<Instant> {
        None
    }

    fn elapsed(&mut self, _cx: &Context<'_>) {}

    /// Last call before the worker exits.
    fn killed(&mut self) {}

    /// One-line parameter summary for `info`.
    fn describe(&self) -> String {
        String::new()
    }
}

pub(crate) struct NodeShared {
    name: String,
    kind: &'static str,
    ancestry: Ancestry,
    inbox: Inbox,
    pub(crate) edges: RwLock<Edges>,
    pub(crate) port: RwLock<Option<Receiver<AudioBuffer>>>,
    pub(crate) summary: RwLock<String>,
}

/// Shared handle to a running node.
///
/// Cloning is cheap. Two handles are equal when they point at the same node.
#[derive(Clone)]
pub struct NodeRef(Arc<NodeShared>);

impl NodeRef {
    pub(crate) fn new(
        name: String,
        kind: &'static str,
        ancestry: Ancestry,
        inbox: Inbox,
        port: Option<Receiver<AudioBuffer>>,
        summary: String,
    ) -> Self {
        Self(Arc::new(NodeShared {
            name,
            kind,
            ancestry,
            inbox,
            edges: RwLock::new(Edges::default()),
            port: RwLock::new(port),
            summary: RwLock::new(summary),
        }))
    }

    pub(crate) fn shared(&self) -> &NodeShared {
        &self.0
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn kind(&self) -> &'static str {
        self.0.kind
    }

    pub fn ancestry(&self) -> Ancestry {
        self.0.ancestry
    }

    pub fn inbox(&self) -> &Inbox {
        &self.0.inbox
    }

    /// Blocking delivery to this node's inbox.
    pub fn send(&self, ev: Event) -> Result<()> {
        self.0
            .inbox
            .send(ev)
            .map_err(|_| Error::Dropped { node: self.0.name.clone() })
    }

    /// Best-effort delivery to this node's inbox.
    pub fn try_send(&self, ev: Event) -> core::result::Result<(), TrySendError<Event>> {
        self.0.inbox.try_send(ev)
    }

    /// Whether this node exposes an audio output port.
    pub fn is_source(&self) -> bool {
        self.0.port.read().is_some()
    }

    /// Current audio output port. Replaced whenever the node resets it.
    pub fn port(&self) -> Option<Receiver<AudioBuffer>> {
        self.0.port.read().clone()
    }

    pub fn parents(&self) -> Vec<NodeRef> {
        self.0.edges.read().parents.clone()
    }

    pub fn children(&self) -> Vec<NodeRef> {
        self.0.edges.read().children.clone()
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.0.edges.read().children.iter().any(|c| c.name() == name)
    }

    pub fn has_parent(&self, name: &str) -> bool {
        self.0.edges.read().parents.iter().any(|p| p.name() == name)
    }

    pub fn describe(&self) -> String {
        self.0.summary.read().clone()
    }

    pub fn ptr_eq(&self, other: &NodeRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for NodeRef {}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.0.kind, self.0.name)
    }
}
