mod mixer;

pub use mixer::*;
