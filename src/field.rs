//! The name registry and the topology rules of the patch bay.
//!
//! The field owns the name table and a ledger of the edges it has asked for.
//! The edges a node reports live inside the two nodes it joins and are written
//! only by their workers, so an edit here turns into a pair of events and
//! becomes visible on the nodes once both workers have applied them. The
//! ledger changes before any event is sent, and validation (names, arity,
//! acyclicity, `NotConnected`) runs against it, so back-to-back edits see each
//! other.

use crossbeam_channel::{Sender, TrySendError};
use hashbrown::{HashMap, HashSet};
use itertools::Itertools;
use parking_lot::{Mutex, RwLock};
use petgraph::dot::{Config, Dot};
use petgraph::graph::DiGraph;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::event::{Event, Inbox};
use crate::node::{Arity, NodeRef};

/// When a fired event should be delivered.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum When {
    /// Straight into the target's inbox.
    Immediate,
    /// With the next clock tick.
    Deferred,
}

/// An event parked on the clock until its next tick.
pub struct Deferred {
    pub target: Inbox,
    pub event: Event,
}

/// Requested `(parent, child)` edges by name.
#[derive(Default, Debug)]
struct Links(HashSet<(String, String)>);

impl Links {
    fn insert(&mut self, src: &str, dst: &str) {
        self.0.insert((src.to_string(), dst.to_string()));
    }

    fn remove(&mut self, src: &str, dst: &str) -> bool {
        self.0.remove(&(src.to_string(), dst.to_string()))
    }

    fn children(&self, src: &str) -> Vec<String> {
        self.0.iter().filter(|(a, _)| a == src).map(|(_, b)| b.clone()).sorted().collect()
    }

    fn parents(&self, dst: &str) -> Vec<String> {
        self.0.iter().filter(|(_, b)| b == dst).map(|(a, _)| a.clone()).sorted().collect()
    }

    /// Drop every edge touching `name`.
    fn forget(&mut self, name: &str) {
        self.0.retain(|(a, b)| a != name && b != name);
    }

    /// Whether `to` can be reached from `from` along child edges.
    fn reachable(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }
        let mut graph = DiGraph::<&str, ()>::new();
        let mut index = HashMap::new();
        for (a, b) in &self.0 {
            let ia = *index.entry(a.as_str()).or_insert_with(|| graph.add_node(a.as_str()));
            let ib = *index.entry(b.as_str()).or_insert_with(|| graph.add_node(b.as_str()));
            graph.add_edge(ia, ib, ());
        }
        match (index.get(from), index.get(to)) {
            (Some(&a), Some(&b)) => petgraph::algo::has_path_connecting(&graph, a, b, None),
            _ => false,
        }
    }
}

#[derive(Default)]
pub struct Field {
    nodes: RwLock<HashMap<String, NodeRef>>,
    /// Taken before `nodes` whenever both are needed.
    links: Mutex<Links>,
    deferred: RwLock<Option<Sender<Deferred>>>,
}

impl Field {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route [`When::Deferred`] events through `queue`, usually a clock's.
    pub fn attach_deferred(&self, queue: Sender<Deferred>) {
        *self.deferred.write() = Some(queue);
    }

    pub fn add(&self, node: NodeRef) -> Result<()> {
        let mut nodes = self.nodes.write();
        if nodes.contains_key(node.name()) {
            return Err(Error::AlreadyExists(node.name().to_string()));
        }
        debug!(node = node.name(), kind = node.kind(), "added");
        nodes.insert(node.name().to_string(), node);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<NodeRef> {
        self.nodes
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.read().contains_key(name)
    }

    /// Unhook `name` from all of its neighbours, kill it, and forget it.
    pub fn delete(&self, name: &str) -> Result<()> {
        let mut links = self.links.lock();
        let node = self.get(name)?;

        for parent in links.parents(name) {
            if let Ok(parent) = self.get(&parent) {
                Self::unlink(&parent, &node);
            }
        }
        for child in links.children(name) {
            if let Ok(child) = self.get(&child) {
                Self::unlink(&node, &child);
            }
        }
        links.forget(name);

        if node.send(Event::kill()).is_err() {
            trace!(node = name, "already dead");
        }
        self.nodes.write().remove(name);
        debug!(node = name, "deleted");
        Ok(())
    }

    /// Make `dst` the child of `src`.
    ///
    /// Fails if either name is unknown, if the kinds cannot be joined, or if
    /// `src` is already reachable from `dst`. A single-child `src` or a
    /// single-parent `dst` gives up its previous partner first.
    pub fn connect(&self, src: &str, dst: &str) -> Result<()> {
        let from = self.get(src)?;
        let to = self.get(dst)?;

        if !from.ancestry().children.accepts() || !to.ancestry().parents.accepts() {
            return Err(Error::Incompatible { src: src.to_string(), dst: dst.to_string() });
        }
        let mut links = self.links.lock();
        if links.reachable(dst, src) {
            return Err(Error::CycleDetected { src: src.to_string(), dst: dst.to_string() });
        }

        // the displaced partner's own worker replaces the edge on our side
        if from.ancestry().children == Arity::One {
            for old in links.children(src).into_iter().filter(|c| c != dst) {
                links.remove(src, &old);
                if let Ok(old) = self.get(&old) {
                    Self::deliver(&old, Event::disconnection(&from));
                }
            }
        }
        if to.ancestry().parents == Arity::One {
            for old in links.parents(dst).into_iter().filter(|p| p != src) {
                links.remove(&old, dst);
                if let Ok(old) = self.get(&old) {
                    Self::deliver(&old, Event::disconnect(&to));
                }
            }
        }

        links.insert(src, dst);
        Self::deliver(&from, Event::connect(&to));
        Self::deliver(&to, Event::connection(&from));
        debug!(src, dst, "connect");
        Ok(())
    }

    /// Remove the edge `src -> dst`, including one whose `connect` the
    /// workers have not applied yet.
    pub fn disconnect(&self, src: &str, dst: &str) -> Result<()> {
        let mut links = self.links.lock();
        let from = self.get(src)?;
        if !links.remove(src, dst) {
            return Err(Error::NotConnected { src: src.to_string(), dst: dst.to_string() });
        }
        let to = self.get(dst)?;

        Self::unlink(&from, &to);
        debug!(src, dst, "disconnect");
        Ok(())
    }

    pub fn disconnect_all(&self, src: &str) -> Result<()> {
        let mut links = self.links.lock();
        let from = self.get(src)?;
        for child in links.children(src) {
            links.remove(src, &child);
            if let Ok(child) = self.get(&child) {
                Self::unlink(&from, &child);
            }
        }
        Ok(())
    }

    /// Whether `src -> dst` has been requested and not removed since. The
    /// nodes report it once their workers catch up.
    pub fn is_linked(&self, src: &str, dst: &str) -> bool {
        self.links.lock().0.contains(&(src.to_string(), dst.to_string()))
    }

    pub fn fire(&self, name: &str, event: Event, when: When) -> Result<()> {
        let node = self.get(name)?;
        match when {
            When::Immediate => node.send(event),
            When::Deferred => {
                let queue = self.deferred.read();
                let queue = queue.as_ref().ok_or(Error::NoClock)?;
                let parked = Deferred { target: node.inbox().clone(), event };
                queue.try_send(parked).map_err(|e| {
                    if let TrySendError::Full(d) = &e {
                        warn!(node = name, kind = %d.event.kind, "deferred queue full");
                    }
                    Error::Dropped { node: name.to_string() }
                })
            }
        }
    }

    /// Deliver `event` to every registered node.
    pub fn broadcast(&self, event: &Event) {
        for node in self.snapshot() {
            Self::deliver(&node, event.clone());
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.nodes.read().keys().cloned().sorted().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// One line per node: kind, name, children, parameters.
    pub fn describe(&self) -> String {
        self.snapshot()
            .into_iter()
            .sorted_by(|a, b| a.name().cmp(b.name()))
            .map(|n| {
                let children = n.children().iter().map(|c| c.name().to_string()).join(",");
                format!("{:<12} {:<12} -> [{}] {}", n.kind(), n.name(), children, n.describe())
            })
            .join("\n")
    }

    /// Graphviz rendering of the registry and every published child edge.
    pub fn dot(&self) -> String {
        let graph = self.graph(|n| format!("{} '{}'", n.kind(), n.name()));
        format!("{}", Dot::with_config(&graph, &[Config::EdgeNoLabel]))
    }

    fn graph<W>(&self, weight: impl Fn(&NodeRef) -> W) -> DiGraph<W, &'static str> {
        let nodes = self.snapshot();
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for node in nodes.iter().sorted_by(|a, b| a.name().cmp(b.name())) {
            index.insert(node.name().to_string(), graph.add_node(weight(node)));
        }
        for node in &nodes {
            let a = index[node.name()];
            for child in node.children() {
                if let Some(&b) = index.get(child.name()) {
                    graph.add_edge(a, b, "");
                }
            }
        }
        graph
    }

    fn snapshot(&self) -> Vec<NodeRef> {
        self.nodes.read().values().cloned().collect()
    }

    fn unlink(parent: &NodeRef, child: &NodeRef) {
        Self::deliver(parent, Event::disconnect(child));
        Self::deliver(child, Event::disconnection(parent));
    }

    fn deliver(node: &NodeRef, event: Event) {
        if let Err(e) = node.send(event) {
            trace!("{}", e);
        }
    }
}

impl Drop for Field {
    fn drop(&mut self) {
        for node in self.nodes.get_mut().values() {
            let _ = node.try_send(Event::kill());
        }
    }
}
