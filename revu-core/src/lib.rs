//! Shared review state for revu.
//!
//! The [`session::Session`] aggregate holds every tracked file and its
//! comments; [`round`] drives review rounds, [`watcher`] feeds it disk edits,
//! [`broadcast`] fans events out to viewers and [`rendezvous`] hands the
//! finish prompt to a waiting agent. Persistence is split between the
//! agent-facing [`review_file`] and the SQLite session metadata in [`db`].

pub mod broadcast;
pub mod db;
pub mod diff;
pub mod error;
pub mod persist;
pub mod rendezvous;
pub mod review_file;
pub mod round;
pub mod schema;
pub mod session;
pub mod types;
pub mod watcher;

pub use error::{Result, ReviewError};
pub use session::{Session, SessionOptions};
