//! Database repositories
//!
//! Repository pattern for database access, separating data access logic
//! from business logic. Functions taking `&mut PgConnection` are meant to run
//! inside a transaction opened by the caller.

pub mod categories;
pub mod channels;
pub mod playlists;
pub mod programmes;
pub mod staged_flags;
