//! In-process backends for every port. Selected with the `memory` backend
//! settings and used as fakes by the tests.

mod blacklist_repo_memory;
mod distributed_cache_memory;
mod session_repo_memory;
mod user_repo_memory;

pub use blacklist_repo_memory::*;
pub use distributed_cache_memory::*;
pub use session_repo_memory::*;
pub use user_repo_memory::*;

mod util;
