//! Process-wide `tracing` subscriber whose filter can be swapped once the
//! settings file has been read.

mod logger;
pub use logger::*;

pub use tracing::{debug, error, info, trace, warn};
