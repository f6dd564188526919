mod adsr;
mod delay;
mod gain_lfo;

pub use adsr::*;
pub use delay::*;
pub use gain_lfo::*;
