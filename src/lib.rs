//! Meeting governance engine.
//!
//! Schedules meetings with conflict-free room booking, runs the minutes
//! approval and voting lifecycle, enforces role-based visibility, and
//! freezes completed meetings into long-retention archives. Persistence is
//! a single SQLite database; identity, file storage, and notification
//! delivery are external collaborators.

pub mod context;
pub mod db;
pub mod engine;
pub mod error;
pub mod migrations;
pub mod notify;
pub mod services;
pub mod types;

pub use context::OpCtx;
pub use engine::{Engine, NewArchive, NewMeeting, NewMinutes, NewRoom, SweepReport};
pub use error::GovernError;
pub use notify::{LogTransport, NotificationTransport};
pub use types::{Page, Principal, Role};
