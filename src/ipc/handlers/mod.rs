pub mod attendance;
pub mod core;
pub mod import_history;
pub mod notes;
pub mod reports;
pub mod roster;
