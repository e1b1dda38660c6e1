//! Two-tier cache: a process-local [`LocalCache`] in front of a shared
//! [`DistributedCache`](crate::domain_port::DistributedCache).
//!
//! Every value here is a derived copy of something an origin store owns, so
//! callers must be able to rebuild it after any miss.

mod keys;
mod local;
mod multi_tier;
mod stats;
mod typed;

pub use keys::*;
pub use local::*;
pub use multi_tier::*;
pub use stats::*;
pub use typed::*;
