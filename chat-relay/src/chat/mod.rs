//! Chat domain: users, messages and the services around them

mod model;
mod redis_store;
mod service;
mod store;

pub use model::{Message, User};
pub use redis_store::{RedisStore, DEFAULT_KEY_PREFIX, MESSAGE_TTL};
pub use service::{MessageService, UserService};
pub use store::{MemoryStore, Store, DEFAULT_MAX_MESSAGES};
