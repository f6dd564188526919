//! Built-in nodes.
//!
//! Nodes are organized into four categories:
//!
//! ## Sources ([`source`])
//!
//! Produce audio with no audio input:
//! - [`Oscillator`] - Sine, square and saw voices with `hz`/`gain`/`keydown`/`keyup`
//! - [`Sample`] - Loop a decoded sample table
//!
//! ## Effects ([`effect`])
//!
//! One audio stream in, one out:
//! - [`Delay`] / [`Echo`] - Buffer-granular delay line, dry or mixed
//! - [`GainLfo`] - Amplitude modulation between `min` and `max`
//! - [`Adsr`] - Signal-triggered envelope
//!
//! ## Control ([`control`])
//!
//! No audio, only events:
//! - [`Clock`] - Periodic best-effort ticks and the deferred-event queue
//! - [`Synchronizer`] - Holds events back until a matching tick
//! - [`Sequencer`] - Steps through slots of events, one per tick
//!
//! ## Sinks ([`sink`])
//!
//! - [`Mixer`] / [`MixerNode`] - Sums every producer into the device buffer

pub mod control;
pub mod effect;
pub mod sink;
pub mod source;

pub use control::{Clock, Sequencer, Synchronizer};
pub use effect::{Adsr, Delay, Echo, GainLfo, Stage};
pub use sink::{Mixer, MixerNode};
pub use source::{Oscillator, Sample};
