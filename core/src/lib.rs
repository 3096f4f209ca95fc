//! Pachislot parlor ranking engine.
//!
//! The pipeline runs in three stages over one SQLite database:
//!
//! 1. [`ingest`] sniffs an uploaded CSV's dialect, normalizes its rows
//!    (store profiles, machine and event masters, daily production data)
//!    and writes the survivors.
//! 2. [`analysis`] scores each store for a date from its stored history
//!    and the day's event and weather context.
//! 3. [`ranking`] turns the stored analyses into the published ranking.
//!
//! All scoring is deterministic: the same database state and config
//! always produce the same ranking.

pub mod analysis;
pub mod commentary;
pub mod config;
pub mod csv;
pub mod decode;
pub mod error;
pub mod ingest;
pub mod normalize;
pub mod perf;
pub mod ranking;
pub mod scoring;
pub mod store;
pub mod types;

pub use error::{RankError, RankResult};
