pub mod config;
pub mod logging;

pub mod admission;
pub mod aggregate;
pub mod collab;
pub mod engine;
pub mod error;
pub mod job_db;
pub mod manifest;
pub mod page_ranges;
pub mod phase;
pub mod preflight;
pub mod queue;
pub mod retry;
pub mod state_store;
pub mod worker;
