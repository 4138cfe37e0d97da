//! Playtime Tracker engine library.
//!
//! Correlates host join/leave/role-change events into session records and
//! persists them to SQLite or MySQL.
//!
//! ## Structure
//!
//! - `stores/` - In-memory runtime state (open sessions, deferred writes)
//! - `use_cases/` - Event orchestration across stores and persistence
//! - `infrastructure/` - External dependency implementations (ports + adapters)
//! - `app` - Tracker composition and lifecycle

pub mod app;
pub mod infrastructure;
pub mod stores;
pub mod use_cases;

pub use app::PlaytimeTracker;
