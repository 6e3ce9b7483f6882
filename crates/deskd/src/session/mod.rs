//! Session records and persistence.

pub mod models;
pub mod repository;
pub mod store;

pub use models::{DayWindow, OsFamily, Session, SessionState, WeekSchedule, MINUTES_PER_DAY};
pub use repository::SessionRepository;
pub use store::SessionStore;
