mod clock;
mod sequencer;
mod synchronizer;

pub use clock::*;
pub use sequencer::*;
pub use synchronizer::*;
