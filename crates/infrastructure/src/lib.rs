//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_kv_backend;
mod redis_kv_backend;


pub use in_memory_kv_backend::{InMemoryKvBackend, KvFault};
pub use redis_kv_backend::RedisKvBackend;
