//! Domain rows and partial-row change sets.

mod types;

pub use types::*;
