mod distributed_cache_redis;
pub use distributed_cache_redis::*;
