//! Use cases - event orchestration.
//!
//! Use cases combine the in-memory stores with the persistence port to turn
//! host events into durable playtime records.

pub mod schema;
pub mod tracking;

pub use schema::{InitializeSchema, RetryConfig};
pub use tracking::{LeaveOutcome, TrackError, TrackingUseCases};
