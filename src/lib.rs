//! # klangfeld
//!
//! A patch-bay synthesizer. Named nodes (oscillators, effects, a clock, a
//! mixer) run on their own worker threads and are wired into a directed graph
//! at runtime. Audio is pulled through the graph one [`AudioBuffer`] at a time
//! by the [`Mixer`], while control [`Event`]s retune parameters and rewire the
//! topology concurrently.
//!
//! ## Quick Start
//!
//! ```no_run
//! use klangfeld::{Patchbay, RingDevice};
//!
//! let bay = Patchbay::new().unwrap();
//! bay.add("sine", "a").unwrap();
//! bay.add("echo", "b").unwrap();
//! bay.connect("a", "b").unwrap();
//! bay.connect("b", "mixer").unwrap();
//!
//! let (device, mut speakers) = RingDevice::realtime(1 << 16);
//! bay.play(device).unwrap();
//! // ... drain `speakers` somewhere ...
//! # let _ = speakers.pop();
//! bay.stop();
//! bay.join().unwrap();
//! ```
//!
//! ## Threads and channels
//!
//! Every node owns a bounded event inbox and, when it produces audio, a
//! rendezvous output port. A producer holds at most one undelivered buffer, so
//! a slow consumer stalls its upstream chain instead of queueing audio. The
//! [`Clock`](nodes::Clock) is the exception: it never blocks on receivers.

pub mod buffer;
pub mod command;
pub mod decode;
pub mod device;
pub mod error;
pub mod event;
pub mod factory;
pub mod field;
pub mod node;
pub mod nodes;
pub mod note;
pub mod patchbay;
pub mod waveform;
pub mod worker;

pub use buffer::AudioBuffer;
pub use decode::SampleData;
pub use device::{AudioDevice, RingDevice};
#[cfg(feature = "cpal_sink")]
pub use device::CpalDevice;
pub use error::{Error, Result};
pub use event::{Arg, Event, EventKind, Inbox};
pub use factory::Factory;
pub use field::{Deferred, Field, When};
pub use node::{Ancestry, Arity, AudioNode, Context, NodeRef, ProcessContext};
pub use nodes::Mixer;
pub use patchbay::Patchbay;
pub use waveform::Waveform;

/// Sample rate of every stream in the graph, in Hz.
pub const SRATE: u32 = 44100;

/// Number of samples in one [`AudioBuffer`].
pub const BUFSZ: usize = 2048;

/// Capacity of each node's event inbox.
pub const INBOX_CAPACITY: usize = 10;

/// Capacity of the clock's deferred-event queue.
pub const DEFERRED_CAPACITY: usize = 10 * INBOX_CAPACITY;
