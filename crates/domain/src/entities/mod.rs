//! Domain entities - Core business objects with identity

mod player_stats;
mod role_change;
mod session;

pub use player_stats::{PlayerMeta, PlayerStats, TotalDrift};
pub use role_change::{RoleChange, RoleChangeRecord};
pub use session::{CompletedSession, SessionRecord};
