//! SQLite persistence layer.

pub mod message;
pub mod pool;
pub mod session;

pub use message::SqliteMessageRepository;
pub use pool::DatabasePool;
pub use session::SqliteSessionRepository;
