//! Shared types for the Plexus property graph database.
//!
//! This crate carries everything the storage engine and the query processor
//! agree on: the [`Value`] union, the canonical property codec, temporal
//! kinds, graph entity types and the error taxonomy.

mod codec;
mod error;
mod graph;
pub mod temporal;
mod value;

pub use codec::{decode_properties, decode_value, encode_properties, encode_value};
pub use error::{Error, Result};
pub use graph::{
    ConstraintDescriptor, ConstraintKind, Direction, IndexDescriptor, IndexKind, Node, PathValue,
    Relationship, is_valid_symbol,
};
pub use temporal::CalendarDuration;
pub use value::{Value, ValueKind};

/// Dense identifier assigned to nodes. Never reused within a database lifetime.
pub type NodeId = u64;

/// Dense identifier assigned to relationships.
pub type RelationshipId = u64;

/// Surrogate for an interned label name.
pub type LabelId = i64;

/// Surrogate for an interned relationship-type name.
pub type RelTypeId = i64;
