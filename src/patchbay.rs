//! The top-level handle: a [`Field`] with a mixer and a clock already in it.

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use delegate::delegate;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::command::{parse_line, Command};
use crate::decode::SampleData;
use crate::device::AudioDevice;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::factory::Factory;
use crate::field::{Field, When};
use crate::node::{AudioNode, NodeRef};
use crate::nodes::control::DEFAULT_BPM;
use crate::nodes::sink::DEFAULT_GAIN;
use crate::nodes::{Clock, Mixer, MixerNode, Sample};
use crate::worker;

/// Name of the built-in mixer node.
pub const MIXER: &str = "mixer";
/// Name of the built-in clock node, which also carries deferred events.
pub const CLOCK: &str = "clock";

/// A running patch bay.
///
/// Creating one spawns two nodes, [`MIXER`] and [`CLOCK`]. Everything else is
/// added by kind through the [`Factory`] and wired by name. Dropping the bay
/// kills every node.
pub struct Patchbay {
    field: Field,
    factory: RwLock<Factory>,
    mixer: Arc<Mixer>,
    player: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl Patchbay {
    pub fn new() -> Result<Self> {
        Self::with_settings(DEFAULT_BPM, DEFAULT_GAIN)
    }

    pub fn with_settings(bpm: f32, gain: f32) -> Result<Self> {
        let field = Field::new();
        let mixer = Mixer::with_gain(gain);
        field.add(worker::spawn(MIXER, MixerNode::new(Arc::clone(&mixer)))?)?;

        let (clock, deferred) = Clock::new(bpm);
        field.add(worker::spawn(CLOCK, clock)?)?;
        field.attach_deferred(deferred);

        info!(bpm, gain, "patch bay ready");
        Ok(Self {
            field,
            factory: RwLock::new(Factory::new()),
            mixer,
            player: Mutex::new(None),
        })
    }

    /// Spawn a node of `kind` under `name`.
    pub fn add(&self, kind: &str, name: &str) -> Result<NodeRef> {
        if self.field.contains(name) {
            return Err(Error::AlreadyExists(name.to_string()));
        }
        let node = self.factory.read().create(kind, name)?;
        self.insert(node)
    }

    /// Spawn a custom node under `name`.
    pub fn add_node<N: AudioNode>(&self, name: &str, node: N) -> Result<NodeRef> {
        if self.field.contains(name) {
            return Err(Error::AlreadyExists(name.to_string()));
        }
        self.insert(worker::spawn(name, node)?)
    }

    /// Decode `path` and spawn a looping sample player for it.
    pub fn add_sample(&self, name: &str, path: impl AsRef<Path>) -> Result<NodeRef> {
        let data = SampleData::open(path)?;
        self.add_node(name, Sample::new(&data))
    }

    /// Make `kind` available to [`add`](Self::add).
    pub fn register_kind<F>(&self, kind: &str, constructor: F)
    where
        F: Fn(&str) -> Result<NodeRef> + Send + Sync + 'static,
    {
        self.factory.write().register(kind, constructor);
    }

    pub fn kinds(&self) -> Vec<String> {
        self.factory.read().kinds().into_iter().map(String::from).collect()
    }

    fn insert(&self, node: NodeRef) -> Result<NodeRef> {
        match self.field.add(node.clone()) {
            Ok(()) => Ok(node),
            Err(e) => {
                // lost a race for the name; the spawned worker has no owner
                let _ = node.try_send(Event::kill());
                Err(e)
            }
        }
    }

    delegate! {
        to self.field {
            pub fn get(&self, name: &str) -> Result<NodeRef>;
            pub fn contains(&self, name: &str) -> bool;
            pub fn delete(&self, name: &str) -> Result<()>;
            pub fn connect(&self, src: &str, dst: &str) -> Result<()>;
            pub fn disconnect(&self, src: &str, dst: &str) -> Result<()>;
            pub fn disconnect_all(&self, src: &str) -> Result<()>;
            pub fn fire(&self, name: &str, event: Event, when: When) -> Result<()>;
            pub fn names(&self) -> Vec<String>;
            pub fn describe(&self) -> String;
            pub fn dot(&self) -> String;
        }
    }

    /// Run one command. `info` and `dot` return their text; `quit` is left to
    /// the caller.
    pub fn execute(&self, cmd: &Command) -> Result<Option<String>> {
        debug!(?cmd, "execute");
        match cmd {
            Command::Add { kind, name } => self.add(kind, name).map(|_| None),
            Command::AddSample { name, path } => self.add_sample(name, path).map(|_| None),
            Command::Delete { name } => self.delete(name).map(|_| None),
            Command::Connect { src, dst } => self.connect(src, dst).map(|_| None),
            Command::Disconnect { src, dst: Some(dst) } => self.disconnect(src, dst).map(|_| None),
            Command::Disconnect { src, dst: None } => self.disconnect_all(src).map(|_| None),
            Command::Fire { name, kind, value, when } => self
                .fire(name, Event::with_value(kind.clone(), *value), *when)
                .map(|_| None),
            Command::Sleep(d) => {
                thread::sleep(*d);
                Ok(None)
            }
            Command::Info => Ok(Some(self.describe())),
            Command::Dot => Ok(Some(self.dot())),
            Command::Quit => Ok(None),
        }
    }

    /// Execute every line of `input` until it ends or says `quit`.
    ///
    /// Bad lines and failed commands are reported to `out` and skipped.
    pub fn run_script(&self, input: impl BufRead, out: impl Write) -> Result<()> {
        self.run_script_with(input, out, |_, _| {})
    }

    /// [`run_script`](Self::run_script), calling `after` once each command
    /// has succeeded.
    pub fn run_script_with<F>(&self, input: impl BufRead, mut out: impl Write, mut after: F) -> Result<()>
    where
        F: FnMut(&Self, &Command),
    {
        for (i, line) in input.lines().enumerate() {
            let commands = match parse_line(&line?) {
                Ok(c) => c,
                Err(e) => {
                    warn!(line = i + 1, "{}", e);
                    writeln!(out, "line {}: {}", i + 1, e)?;
                    continue;
                }
            };
            for cmd in &commands {
                if *cmd == Command::Quit {
                    return Ok(());
                }
                match self.execute(cmd) {
                    Ok(text) => {
                        if let Some(text) = text {
                            writeln!(out, "{}", text)?;
                        }
                        after(self, cmd);
                    }
                    Err(e) => {
                        warn!(line = i + 1, "{}", e);
                        writeln!(out, "line {}: {}", i + 1, e)?;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    pub fn mixer(&self) -> &Arc<Mixer> {
        &self.mixer
    }

    /// Start playback on `device` from a background thread.
    pub fn play<D>(&self, device: D) -> Result<()>
    where
        D: AudioDevice + Send + 'static,
    {
        self.play_with(move || Ok(device))
    }

    /// Like [`play`](Self::play), for devices that must be built on the
    /// thread that drives them.
    pub fn play_with<F, D>(&self, make: F) -> Result<()>
    where
        F: FnOnce() -> Result<D> + Send + 'static,
        D: AudioDevice,
    {
        let mut player = self.player.lock();
        if player.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(Error::Device("already playing".into()));
        }
        let mixer = Arc::clone(&self.mixer);
        let handle = thread::Builder::new()
            .name("transport".into())
            .spawn(move || {
                let mut device = make()?;
                mixer.play(&mut device)
            })?;
        *player = Some(handle);
        Ok(())
    }

    pub fn stop(&self) {
        self.mixer.stop();
    }

    /// Wait for playback to end and return how it ended.
    pub fn join(&self) -> Result<()> {
        let Some(handle) = self.player.lock().take() else {
            return Ok(());
        };
        let result = handle
            .join()
            .map_err(|_| Error::Device("transport thread panicked".into()))
            .and_then(|r| r);
        if let Err(e) = &result {
            error!("playback ended: {}", e);
        }
        result
    }
}

impl Drop for Patchbay {
    fn drop(&mut self) {
        self.mixer.stop();
    }
}
