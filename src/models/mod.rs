//! Core data models for the artifact store.
//!
//! These entities represent buckets, artifacts and log chunks. They map
//! to database tables via `sqlx::FromRow` and (for buckets and
//! artifacts) serialize as JSON via `serde`.

pub mod artifact;
pub mod bucket;
pub mod logchunk;
