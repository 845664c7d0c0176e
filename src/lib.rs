//! Relationship health scoring.
//!
//! Turns a snapshot of interaction signals about one tracked relationship
//! into a bounded health score, a coarse state, a hysteresis-guarded
//! neglected flag and a short list of recommendations. Everything outside
//! [`db`] is pure: the caller supplies `now` and persists the resulting
//! [`models::Transition`].

pub mod db;
pub mod engine;
pub mod models;
pub mod recommend;
pub mod report;
pub mod score;
pub mod signals;
pub mod state;
