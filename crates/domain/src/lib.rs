//! Playtime Tracker domain.
//!
//! Pure types shared by the engine: validated player identities, session and
//! role-change entities, and the host events the tracker consumes.

pub mod entities;
pub mod error;
pub mod events;
pub mod ids;

pub use entities::{
    CompletedSession, PlayerMeta, PlayerStats, RoleChange, RoleChangeRecord, SessionRecord,
    TotalDrift,
};

pub use error::DomainError;

pub use events::{HostEvent, HostEventKind, PlayerLeft, PlayerVerified, RoleChanging};

pub use ids::PlayerId;
