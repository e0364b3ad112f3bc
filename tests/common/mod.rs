//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::sync::mpsc::{channel, Receiver};
use tether_core::{
    config::GraphConfig,
    event::GraphEvent,
    graph::{Edge, Operation, RelationshipGraph},
    identity::{IdentityResolver, KeyCache, ResourceKey, ResourceRef},
    schema::{FieldSchema, SchemaDefinition, SchemaRegistry},
};

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// A small blog schema covering every relationship shape:
///
/// - `post.comments` <-> `comment.post`: one-to-many, both sync
/// - `post.author` <-> `user.posts`: many-to-one, the collection side async
/// - `user.profile` <-> `profile.user`: one-to-one
/// - `post.tags`: no inverse, tracked implicitly on `tag`
/// - `post.attachment` <-> `media.owner`: polymorphic
#[allow(dead_code)]
pub fn blog_schema() -> SchemaRegistry {
    let registry = SchemaRegistry::create();
    registry.register(
        "post",
        SchemaDefinition::new(vec![
            FieldSchema::collection("comments", "comment").inverse("post"),
            FieldSchema::single("author", "user").inverse("posts"),
            FieldSchema::collection("tags", "tag"),
            FieldSchema::single("attachment", "media")
                .inverse("owner")
                .polymorphic(),
        ]),
    );
    registry.register(
        "comment",
        SchemaDefinition::new(vec![FieldSchema::single("post", "post").inverse("comments")]),
    );
    registry.register(
        "user",
        SchemaDefinition::new(vec![
            FieldSchema::collection("posts", "post")
                .inverse("author")
                .asynchronous(),
            FieldSchema::single("profile", "profile").inverse("user"),
        ]),
    );
    registry.register(
        "profile",
        SchemaDefinition::new(vec![FieldSchema::single("user", "user").inverse("profile")]),
    );
    registry.register(
        "media",
        SchemaDefinition::new(vec![FieldSchema::single("owner", "post")
            .inverse("attachment")
            .polymorphic()]),
    );
    registry
}

/// A graph over [blog_schema] wired to an in-memory key cache and a channel notifier.
#[allow(dead_code)]
pub struct TestGraph {
    pub graph: RelationshipGraph,
    pub keys: KeyCache,
    pub events: Receiver<GraphEvent>,
}

#[allow(dead_code)]
impl TestGraph {
    pub fn new() -> Self {
        TestGraph::with_config(GraphConfig {
            strict_polymorphism: true,
            ..Default::default()
        })
    }

    pub fn with_config(config: GraphConfig) -> Self {
        init_logging();
        let (tx, events) = channel();
        let keys = KeyCache::new();
        let graph = RelationshipGraph::new(blog_schema(), keys.clone(), tx, config);
        TestGraph {
            graph,
            keys,
            events,
        }
    }

    pub fn key(&self, resource_type: &str, id: &str) -> ResourceKey {
        self.keys
            .resolve_or_create(&ResourceRef::new(resource_type, id))
            .expect("reference with an id resolves")
    }

    pub fn local(&self, key: &ResourceKey, field: &str) -> Vec<ResourceKey> {
        self.graph
            .edge(key, field)
            .map(Edge::local_related)
            .unwrap_or_default()
    }

    pub fn remote(&self, key: &ResourceKey, field: &str) -> Vec<ResourceKey> {
        self.graph
            .edge(key, field)
            .map(Edge::remote_related)
            .unwrap_or_default()
    }

    /// Drain the `(key, field)` pairs reported as changed so far.
    pub fn changed(&self) -> Vec<(ResourceKey, String)> {
        self.events
            .try_iter()
            .filter_map(|event| match event {
                GraphEvent::RelationshipChanged { key, field } => Some((key, field)),
                GraphEvent::IdentityMerged { .. } => None,
            })
            .collect()
    }

    pub fn assert_consistent(&self) {
        let errors = self.graph.built_in_test();
        assert!(errors.is_empty(), "graph is inconsistent: {errors:#?}");
    }
}

#[allow(dead_code)]
pub fn set_one(record: &ResourceKey, field: &str, value: Option<&ResourceKey>) -> Operation {
    Operation::ReplaceRelatedRecord {
        record: record.clone(),
        field: field.to_string(),
        value: value.cloned(),
    }
}

#[allow(dead_code)]
pub fn set_many(record: &ResourceKey, field: &str, value: &[&ResourceKey]) -> Operation {
    Operation::ReplaceRelatedRecords {
        record: record.clone(),
        field: field.to_string(),
        value: value.iter().map(|k| (*k).clone()).collect(),
    }
}

#[allow(dead_code)]
pub fn add(record: &ResourceKey, field: &str, value: &[&ResourceKey]) -> Operation {
    Operation::AddToRelatedRecords {
        record: record.clone(),
        field: field.to_string(),
        value: value.iter().map(|k| (*k).clone()).collect(),
        index: None,
    }
}

#[allow(dead_code)]
pub fn remove(record: &ResourceKey, field: &str, value: &[&ResourceKey]) -> Operation {
    Operation::RemoveFromRelatedRecords {
        record: record.clone(),
        field: field.to_string(),
        value: value.iter().map(|k| (*k).clone()).collect(),
        index: None,
    }
}
