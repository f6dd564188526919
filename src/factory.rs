//! Kind names to running nodes.

use std::sync::Arc;

use hashbrown::HashMap;
use itertools::Itertools;

use crate::error::{Error, Result};
use crate::node::NodeRef;
use crate::nodes::control::DEFAULT_BPM;
use crate::nodes::{Adsr, Clock, Delay, Echo, GainLfo, Oscillator, Sequencer, Synchronizer};
use crate::worker;

type Constructor = Arc<dyn Fn(&str) -> Result<NodeRef> + Send + Sync>;

/// Maps kind strings (`"sine"`, `"echo"`, ...) to constructors that spawn a
/// node under a given name.
///
/// The mixer and sample players, which need a shared mixer or a decoded
/// file, are created by the [`Patchbay`](crate::Patchbay) instead.
pub struct Factory {
    kinds: HashMap<String, Constructor>,
}

impl Factory {
    pub fn empty() -> Self {
        Self { kinds: HashMap::new() }
    }

    /// All built-in kinds.
    pub fn new() -> Self {
        let mut f = Self::empty();
        f.register("sine", |name| worker::spawn(name, Oscillator::sine()));
        f.alias("sine-generator", "sine");
        f.register("square", |name| worker::spawn(name, Oscillator::square()));
        f.register("saw", |name| worker::spawn(name, Oscillator::saw()));
        f.register("delay", |name| worker::spawn(name, Delay::default()));
        f.register("echo", |name| worker::spawn(name, Echo::default()));
        f.register("gain-lfo", |name| worker::spawn(name, GainLfo::new()));
        f.alias("gainlfo", "gain-lfo");
        f.alias("lfo", "gain-lfo");
        f.register("adsr", |name| worker::spawn(name, Adsr::new()));
        f.register("synchronizer", |name| worker::spawn(name, Synchronizer::new()));
        f.alias("sync", "synchronizer");
        f.register("sequencer", |name| worker::spawn(name, Sequencer::new()));
        // a free-standing clock; only the patch bay's own clock takes deferred events
        f.register("clock", |name| worker::spawn(name, Clock::new(DEFAULT_BPM).0));
        f
    }

    pub fn register<F>(&mut self, kind: &str, constructor: F)
    where
        F: Fn(&str) -> Result<NodeRef> + Send + Sync + 'static,
    {
        self.kinds.insert(kind.to_ascii_lowercase(), Arc::new(constructor));
    }

    fn alias(&mut self, alias: &str, kind: &str) {
        if let Some(constructor) = self.kinds.get(kind).cloned() {
            self.kinds.insert(alias.to_string(), constructor);
        }
    }

    pub fn create(&self, kind: &str, name: &str) -> Result<NodeRef> {
        let constructor = self
            .kinds
            .get(kind.to_ascii_lowercase().as_str())
            .ok_or_else(|| Error::UnknownKind(kind.to_string()))?;
        constructor(name)
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.kinds.keys().map(String::as_str).sorted().collect()
    }
}

impl Default for Factory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kind() {
        let f = Factory::new();
        assert!(matches!(f.create("theremin", "t"), Err(Error::UnknownKind(k)) if k == "theremin"));
    }

    #[test]
    fn aliases_build_the_same_kind() {
        let f = Factory::new();
        let a = f.create("LFO", "a").unwrap();
        let b = f.create("gain-lfo", "b").unwrap();
        assert_eq!(a.kind(), b.kind());
        assert_eq!(f.create("sync", "c").unwrap().kind(), "synchronizer");
    }

    #[test]
    fn builtins_are_listed() {
        let f = Factory::new();
        let kinds = f.kinds();
        for k in ["adsr", "delay", "echo", "saw", "sequencer", "sine", "square", "synchronizer"] {
            assert!(kinds.contains(&k), "{} missing", k);
        }
    }
}
