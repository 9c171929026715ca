//! Domain models for polytier.
//!
//! # Core Concepts
//!
//! - [`RankedEntity`]: A rankable item (a "poly list") carrying one value per
//!   tracked attribute, drawn as a radar chart.
//! - [`Group`]: A named container of ranked entities. Groups live at the root
//!   and do not nest.
//! - [`Node`]: A root-level member, either a group or a loose entity.
//! - [`Attribute`]: A named score in `[0, 10]`. Names are shared positionally
//!   across every entity in a hierarchy.
//!
//! Positions are dense per sibling set: the root sequence has its own run of
//! `0..n`, and each group's items have theirs.

mod attribute;
mod entity;
mod group;
mod node;

pub use attribute::*;
pub use entity::*;
pub use group::*;
pub use node::*;
