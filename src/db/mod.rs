//! Database layer (SQLite).

pub mod sqlite;

pub use sqlite::{ChatClosure, Database, NewChat, TurnCommit};
