//! In-memory state storage modules.
//!
//! Stores manage runtime state that doesn't belong in the database:
//! - `SessionStore` - open sessions by player identity
//! - `PendingWriteQueue` - writes waiting for the database to come back

pub mod pending_writes;
pub mod session;

pub use pending_writes::{
    PendingWrite, PendingWriteQueue, QueuedWrite, DEFAULT_PENDING_CAPACITY, MAX_PENDING_AGE_SECS,
};
pub use session::SessionStore;
