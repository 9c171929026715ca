//! Hierarchy, attribute and weighted-ranking core for radar-chart tier lists.
//!
//! A [`Hierarchy`](hierarchy::Hierarchy) holds one owner's groups and ranked
//! entities in memory and mirrors every change into a
//! [`TierStore`](store::TierStore). Rankings are computed on demand by
//! [`ranking`]. The [`api`] module exposes it all over HTTP.

pub mod api;
pub mod autosave;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod models;
pub mod ranking;
pub mod render;
pub mod store;

pub use error::{Error, Result};
