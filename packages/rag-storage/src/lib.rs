//! Postgres holds note text, Qdrant holds one vector per note keyed by the note id.

pub mod db;
pub mod models;
pub mod qdrant;
pub mod queries;
pub mod schema;

mod error;

pub use error::{Error, Result};
