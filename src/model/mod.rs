//! # Network Model
//!
//! Plain data describing a road network as the caller supplies it.
//! These types feed the graph compiler and come back out of path queries.
//!
//! This module is pure data: no I/O, no state, no algorithms.

pub mod node;
pub mod link;
pub mod path;

pub use node::NodeId;
pub use link::{Direction, FieldValue, Link, LinkId};
pub use path::Path;
