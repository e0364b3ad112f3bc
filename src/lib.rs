//! # tether-core
//!
//! A client-side relationship graph that keeps both ends of every bidirectional relationship
//! between cached resources in sync.
//!
//! ## Overview
//!
//! tether-core sits between a data store and whatever materializes records for an application.
//! For every `(resource, field)` pair it tracks two views of the relationship:
//!
//! - the **remote** view: the last canonical state received from a server
//! - the **local** view: what the application currently sees, which may carry optimistic,
//!   unsaved changes
//!
//! Every mutation, local or remote, is mirrored onto the inverse side of the relationship in the
//! same view, so `post.comments` containing a comment always means `comment.post` is that post.
//!
//! ### Key Features
//!
//! - **Symmetric propagation**: local and remote transitions are applied to inverses separately
//! - **Local state survives remote updates**: pending additions, removals and unsaved records are
//!   rebased on top of the new remote state
//! - **Minimal diffs**: collection updates touch only the keys that were actually added or removed
//! - **Identity merges**: when two keys turn out to denote one resource, every edge is rewritten
//! - **Batched notifications**: each changed field is reported once per operation
//! - **Transactions**: a flush of queued remote operations suppresses redundant staleness signals
//!
//! ## Architecture
//!
//! - **[`graph`]**: the [`graph::RelationshipGraph`] registry, its [`graph::Edge`] variants and the
//!   operation handlers
//! - **[`schema`]**: field definitions, the [`schema::SchemaSource`] trait and a registry
//! - **[`identity`]**: stable [`identity::ResourceKey`] handles and the [`identity::KeyCache`]
//!   resolver
//! - **[`document`]**: the `{data, links, meta}` relationship document
//! - **[`event`]**: operation origins, graph events and notifiers
//! - **[`config`]**: [`config::GraphConfig`] and its TOML provider
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::mpsc::channel;
//! use tether_core::{
//!     config::GraphConfig,
//!     event::EventOrigin,
//!     graph::{Operation, RelationshipGraph},
//!     identity::{IdentityResolver, KeyCache, ResourceRef},
//!     schema::{FieldSchema, SchemaDefinition, SchemaRegistry},
//! };
//!
//! # fn main() -> Result<(), tether_core::TetherError> {
//! let schema = SchemaRegistry::create();
//! schema.register(
//!     "post",
//!     SchemaDefinition::new(vec![
//!         FieldSchema::collection("comments", "comment").inverse("post"),
//!     ]),
//! );
//! schema.register(
//!     "comment",
//!     SchemaDefinition::new(vec![FieldSchema::single("post", "post").inverse("comments")]),
//! );
//!
//! let keys = KeyCache::new();
//! let (tx, rx) = channel();
//! let mut graph = RelationshipGraph::new(schema, keys.clone(), tx, GraphConfig::default());
//!
//! let post = keys.resolve_or_create(&ResourceRef::new("post", "1"))?;
//! let comment = keys.resolve_or_create(&ResourceRef::new("comment", "1"))?;
//! graph.update(
//!     Operation::ReplaceRelatedRecord {
//!         record: comment.clone(),
//!         field: "post".to_string(),
//!         value: Some(post.clone()),
//!     },
//!     EventOrigin::Local,
//! )?;
//!
//! // The inverse moved with it
//! let comments = graph.get_data(&post, "comments")?;
//! assert!(comments.data.is_some_and(|data| !data.is_empty()));
//! assert!(rx.try_iter().count() >= 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Guide
//!
//! Start with [`graph::RelationshipGraph::update`] and [`graph::Operation`], then see
//! [`graph::RelationshipGraph::built_in_test`] for the invariants the graph maintains.

pub mod config;
pub mod document;
pub mod error;
pub mod event;
pub mod graph;
pub mod identity;
pub mod schema;

pub use error::*;
