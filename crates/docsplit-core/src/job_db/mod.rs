//! Job registry (SQLite via sqlx).
//!
//! One row per job with its current phase, status and run metadata, plus one
//! row per phase attempt (`job_steps`) for history. Admission decisions are
//! single conditional statements against the `jobs` table.

mod db;
mod jobs;
mod steps;
mod types;

pub use db::JobDb;
pub(crate) use db::unix_millis;
pub use types::*;

#[cfg(test)]
pub(crate) use db::open_memory;

#[cfg(test)]
mod tests;
