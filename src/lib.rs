//! Coaching Engine — seeded simulation of a multi-week coaching relationship.
//!
//! Advances a client's biomarkers week by week under stochastic adherence,
//! travel and noise, schedules the care team's recurring and ad-hoc events,
//! and renders them as a chronologically ordered chat log with
//! non-repetitive phrasing and near-duplicate removal.

pub mod core;
pub mod schema;
