//! Data layer
//!
//! - `store`: session records (in-memory or Redis)

mod store;

pub use store::{
    MemorySessionStore, RedisSessionStore, SessionStore, connect_session_store,
};
