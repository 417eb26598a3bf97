//! Bundle manifest parsing

mod manifest;

pub use manifest::*;
