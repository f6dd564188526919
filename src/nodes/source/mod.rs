mod oscillator;
mod sample;

pub use oscillator::*;
pub use sample::*;
