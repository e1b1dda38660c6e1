// cache

mod distributed_cache;

pub use distributed_cache::*;

// repo

mod blacklist_repo;
mod session_repo;
mod user_repo;

pub use blacklist_repo::*;
pub use session_repo::*;
pub use user_repo::*;
