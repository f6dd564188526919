//! The per-node worker thread.
//!
//! Each iteration the worker blocks on whichever of these can make progress:
//!
//! 1. deliver its one undelivered buffer downstream,
//! 2. pull one buffer from upstream (only while the slot is empty),
//! 3. take the next event from the inbox,
//! 4. fire the node's timer.
//!
//! Generators refill the slot before blocking. A producer therefore never holds
//! more than one buffer, and a stalled consumer stalls the whole chain above it
//! while every worker in that chain still answers events.

use std::thread;

use crossbeam_channel::{bounded, Receiver, RecvError, Select, Sender};
use tracing::{debug, trace, warn};

use crate::buffer::AudioBuffer;
use crate::error::{Error, Result};
use crate::event::{Arg, Event, EventKind, Inbox};
use crate::node::{Arity, AudioNode, Context, Edges, NodeRef, ProcessContext};

/// Start `node` on its own thread and return the handle to it.
pub fn spawn<N: AudioNode>(name: impl Into<String>, node: N) -> Result<NodeRef> {
    let name = name.into();
    let (inbox, events) = Inbox::channel();
    let (output, port) = if node.num_outputs() > 0 {
        let (tx, rx) = bounded(0);
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };

    let me = NodeRef::new(name.clone(), node.kind(), node.ancestry(), inbox, port, node.describe());
    let worker = Worker {
        me: me.clone(),
        node,
        events,
        output,
        input: None,
        slot: None,
        reset: false,
        edges: Edges::default(),
        ctx: ProcessContext::default(),
    };

    thread::Builder::new()
        .name(format!("node:{}", name))
        .spawn(move || worker.run())?;

    debug!(node = %name, kind = me.kind(), "spawned");
    Ok(me)
}

enum Flow {
    Continue,
    Exit,
}

enum Step {
    Delivered,
    Pulled(core::result::Result<AudioBuffer, RecvError>),
    Event(core::result::Result<Event, RecvError>),
    Timer,
}

struct Upstream {
    parent: NodeRef,
    port: Receiver<AudioBuffer>,
}

struct Worker<N> {
    me: NodeRef,
    node: N,
    events: Receiver<Event>,
    output: Option<Sender<AudioBuffer>>,
    input: Option<Upstream>,
    slot: Option<AudioBuffer>,
    /// The output port is replaced on the next publish.
    reset: bool,
    edges: Edges,
    ctx: ProcessContext,
}

impl<N: AudioNode> Worker<N> {
    fn run(mut self) {
        let generator = self.node.num_inputs() == 0 && self.output.is_some();

        loop {
            if generator && self.slot.is_none() {
                let mut buf = AudioBuffer::silence();
                self.node.process(&self.ctx, &mut buf);
                self.slot = Some(buf);
            }

            let step = self.wait();
            let flow = match step {
                Step::Delivered => Flow::Continue,
                Step::Pulled(Ok(mut buf)) => {
                    self.node.process(&self.ctx, &mut buf);
                    self.slot = Some(buf);
                    Flow::Continue
                }
                Step::Pulled(Err(_)) => {
                    self.upstream_ended();
                    Flow::Continue
                }
                Step::Event(Ok(ev)) => self.apply(ev),
                Step::Event(Err(_)) => Flow::Exit,
                Step::Timer => {
                    let cx = Context { name: self.me.name(), process: &self.ctx, edges: &self.edges };
                    self.node.elapsed(&cx);
                    Flow::Continue
                }
            };

            if let Flow::Exit = flow {
                break;
            }
        }

        debug!(node = self.me.name(), "worker exited");
    }

    fn wait(&mut self) -> Step {
        let timer = self.node.deadline().map(crossbeam_channel::at);

        let mut sel = Select::new();
        let send_idx = match (&self.output, &self.slot) {
            (Some(tx), Some(_)) => Some(sel.send(tx)),
            _ => None,
        };
        let recv_idx = match (&self.input, &self.slot) {
            (Some(up), None) => Some(sel.recv(&up.port)),
            _ => None,
        };
        let event_idx = sel.recv(&self.events);
        let timer_idx = timer.as_ref().map(|t| sel.recv(t));

        let oper = sel.select();
        let index = oper.index();

        if Some(index) == send_idx {
            // both are Some, or send_idx would be None
            match (&self.output, self.slot.take()) {
                (Some(tx), Some(buf)) => {
                    if oper.send(tx, buf).is_err() {
                        trace!(node = self.me.name(), "output port closed, buffer dropped");
                    }
                }
                _ => unreachable!("send selected without a buffered output"),
            }
            Step::Delivered
        } else if Some(index) == recv_idx {
            match &self.input {
                Some(up) => Step::Pulled(oper.recv(&up.port)),
                None => unreachable!("pull selected without an upstream"),
            }
        } else if index == event_idx {
            Step::Event(oper.recv(&self.events))
        } else if Some(index) == timer_idx {
            match &timer {
                Some(t) => {
                    let _ = oper.recv(t);
                }
                None => unreachable!("timer selected without a deadline"),
            }
            Step::Timer
        } else {
            unreachable!("select returned an unregistered operation")
        }
    }

    /// The upstream port closed. If the parent still feeds us and has published
    /// a fresh port, follow it; otherwise audio is disconnected.
    fn upstream_ended(&mut self) {
        let Some(up) = self.input.take() else { return };
        let still_parent = self.edges.parents.iter().any(|p| p.ptr_eq(&up.parent))
            && up.parent.has_child(self.me.name());
        match up.parent.port() {
            Some(fresh) if still_parent && !fresh.same_channel(&up.port) => {
                trace!(node = self.me.name(), parent = up.parent.name(), "following reset port");
                self.input = Some(Upstream { parent: up.parent, port: fresh });
            }
            _ => {
                debug!(node = self.me.name(), parent = up.parent.name(), "upstream ended");
            }
        }
    }

    fn apply(&mut self, ev: Event) -> Flow {
        if ev.kind.is_topology() {
            if ev.kind == EventKind::Kill {
                self.teardown();
                return Flow::Exit;
            }
            let Arg::Node(other) = &ev.arg else {
                self.malformed(&ev);
                return Flow::Continue;
            };
            let other = other.clone();
            match ev.kind {
                EventKind::Connect => self.add_child(other),
                EventKind::Disconnect => self.remove_child(&other),
                EventKind::Connection => self.add_parent(other),
                EventKind::Disconnection => self.remove_parent(&other),
                _ => {}
            }
        } else {
            let cx = Context { name: self.me.name(), process: &self.ctx, edges: &self.edges };
            self.node.handle(&cx, ev);
        }

        self.publish();
        Flow::Continue
    }

    fn add_child(&mut self, child: NodeRef) {
        match self.me.ancestry().children {
            Arity::Zero => {
                warn!(node = self.me.name(), child = child.name(), "node takes no children");
            }
            Arity::One => {
                if self.edges.children.iter().any(|c| c.ptr_eq(&child)) {
                    return;
                }
                let replaced = !self.edges.children.is_empty();
                self.edges.children = vec![child];
                if replaced {
                    self.reset_port();
                }
            }
            Arity::Many => {
                if !self.edges.children.iter().any(|c| c.ptr_eq(&child)) {
                    self.edges.children.push(child);
                }
            }
        }
    }

    fn remove_child(&mut self, child: &NodeRef) {
        self.edges.children.retain(|c| !c.ptr_eq(child));
        self.reset_port();
    }

    fn add_parent(&mut self, parent: NodeRef) {
        match self.me.ancestry().parents {
            Arity::Zero => {
                warn!(node = self.me.name(), parent = parent.name(), "node takes no parents");
                return;
            }
            Arity::One => self.edges.parents = vec![parent.clone()],
            Arity::Many => {
                if !self.edges.parents.iter().any(|p| p.ptr_eq(&parent)) {
                    self.edges.parents.push(parent.clone());
                }
            }
        }

        if self.node.num_inputs() > 0 {
            self.input = parent
                .port()
                .map(|port| Upstream { parent: parent.clone(), port });
        }

        let cx = Context { name: self.me.name(), process: &self.ctx, edges: &self.edges };
        self.node.connected(&cx, &parent);
    }

    fn remove_parent(&mut self, parent: &NodeRef) {
        self.edges.parents.retain(|p| !p.ptr_eq(parent));
        if self.input.as_ref().is_some_and(|up| up.parent.ptr_eq(parent)) {
            self.input = None;
        }

        let cx = Context { name: self.me.name(), process: &self.ctx, edges: &self.edges };
        self.node.disconnected(&cx, parent);
    }

    /// Replace the output port once the new edges are published. Whoever
    /// still reads the old one sees end-of-stream instead of a slow producer.
    fn reset_port(&mut self) {
        self.reset = self.output.is_some();
    }

    fn teardown(&mut self) {
        self.edges = Edges::default();
        self.input = None;
        self.slot = None;
        self.reset = false;
        self.node.killed();
        self.publish();

        self.output = None;
        *self.me.shared().port.write() = None;
        debug!(node = self.me.name(), "killed");
    }

    /// Edges go out before a port swap, so a consumer that sees its port
    /// close can already tell whether it was dropped.
    fn publish(&mut self) {
        *self.me.shared().edges.write() = self.edges.clone();
        *self.me.shared().summary.write() = self.node.describe();

        if std::mem::take(&mut self.reset) {
            let (tx, rx) = bounded(0);
            *self.me.shared().port.write() = Some(rx);
            self.output = Some(tx);
            trace!(node = self.me.name(), "output port reset");
        }
    }

    fn malformed(&self, ev: &Event) {
        let err = Error::MalformedEvent { node: self.me.name().to_string(), kind: ev.kind.to_string() };
        warn!(payload = ?ev.arg, "{}", err);
    }
}
