//! The relationship graph: edge storage, the mutation handlers and the collection diff engine.
//!
//! # Module Organization
//!
//! - [`edge`]: the per-(resource, field) state ([Edge] and its variants)
//! - [`diff`]: pure collection diffing
//! - `base`: [RelationshipGraph] registry, dispatch, transactions, reads and the integrity check
//! - `replace`, `membership`, `payload`, `merge`: the operation handlers
//! - `lifecycle`: deleting, unloading and forgetting resources
//!
//! ```rust
//! use tether_core::graph::{Operation, RelationshipGraph};
//! ```

mod base;
pub mod diff;
pub mod edge;
mod lifecycle;
mod merge;
mod membership;
mod payload;
mod replace;


use std::fmt::{Display, Formatter};

pub use base::{KeySubGraph, RelationshipGraph};
pub use diff::{diff_collection, diff_edge, CollectionDiff};
pub use payload::is_stale_transaction;
pub use edge::{CollectionEdge, Edge, EdgeFlag, EdgeFlags, ImplicitEdge, SingleEdge};

use crate::{document::RelationshipDocument, identity::ResourceKey};

/// A mutation submitted to [RelationshipGraph::update] or queued with [RelationshipGraph::push].
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Set a single-valued field.
    ReplaceRelatedRecord {
        record: ResourceKey,
        field: String,
        value: Option<ResourceKey>,
    },
    /// Set the whole sequence of a collection field.
    ReplaceRelatedRecords {
        record: ResourceKey,
        field: String,
        value: Vec<ResourceKey>,
    },
    AddToRelatedRecords {
        record: ResourceKey,
        field: String,
        value: Vec<ResourceKey>,
        index: Option<usize>,
    },
    RemoveFromRelatedRecords {
        record: ResourceKey,
        field: String,
        value: Vec<ResourceKey>,
        index: Option<usize>,
    },
    /// Apply a relationship document received from the wire. Always treated as remote.
    UpdateRelationship {
        record: ResourceKey,
        field: String,
        value: RelationshipDocument,
    },
    /// `record` and `value` denote the same resource; every reference to `record` becomes
    /// `value`.
    MergeIdentifier {
        record: ResourceKey,
        value: ResourceKey,
    },
    DeleteRecord {
        record: ResourceKey,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::ReplaceRelatedRecord { .. } => "replaceRelatedRecord",
            Operation::ReplaceRelatedRecords { .. } => "replaceRelatedRecords",
            Operation::AddToRelatedRecords { .. } => "addToRelatedRecords",
            Operation::RemoveFromRelatedRecords { .. } => "removeFromRelatedRecords",
            Operation::UpdateRelationship { .. } => "updateRelationship",
            Operation::MergeIdentifier { .. } => "mergeIdentifier",
            Operation::DeleteRecord { .. } => "deleteRecord",
        }
    }

    pub fn record(&self) -> &ResourceKey {
        match self {
            Operation::ReplaceRelatedRecord { record, .. }
            | Operation::ReplaceRelatedRecords { record, .. }
            | Operation::AddToRelatedRecords { record, .. }
            | Operation::RemoveFromRelatedRecords { record, .. }
            | Operation::UpdateRelationship { record, .. }
            | Operation::MergeIdentifier { record, .. }
            | Operation::DeleteRecord { record } => record,
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            Operation::ReplaceRelatedRecord { field, .. }
            | Operation::ReplaceRelatedRecords { field, .. }
            | Operation::AddToRelatedRecords { field, .. }
            | Operation::RemoveFromRelatedRecords { field, .. }
            | Operation::UpdateRelationship { field, .. } => Some(field),
            Operation::MergeIdentifier { .. } | Operation::DeleteRecord { .. } => None,
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self.field() {
            Some(field) => write!(f, "{}(<{}>.{})", self.name(), self.record(), field),
            None => write!(f, "{}({})", self.name(), self.record()),
        }
    }
}

/// How a field's local view differs from its remote view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipChange {
    Resource {
        local: Option<ResourceKey>,
        remote: Option<ResourceKey>,
    },
    Collection {
        additions: Vec<ResourceKey>,
        removals: Vec<ResourceKey>,
        local: Vec<ResourceKey>,
        remote: Vec<ResourceKey>,
        /// Shared members appear in a different order locally.
        reordered: bool,
    },
}
