//! RelationshipGraph: the registry of edges and the entry point for every operation.
//!
//! This module owns edge creation (including inverse-definition resolution), operation dispatch,
//! transaction scoping, the remote queue, notification batching and the read API. The handlers
//! themselves live in the sibling modules.

use petgraph::{graphmap::GraphMap, Directed};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
    sync::Arc,
};

use super::{
    edge::{CollectionEdge, Edge, EdgeFlag, SingleEdge},
    Operation, RelationshipChange,
};
use crate::{
    config::{ConfigProvider, GraphConfig},
    document::{RelationshipData, RelationshipDocument},
    error::TetherError,
    event::{EventOrigin, GraphEvent, Notifier},
    identity::{IdentityResolver, Lid, ResourceKey},
    schema::{parse_implicit_key, EdgeDefinition, EdgeKind, SchemaSource},
};

/// Projection of one state category (local or remote) of the graph. Each edge carries the
/// `(field, inverse field)` pairs linking its endpoints.
pub type KeySubGraph = GraphMap<Lid, BTreeSet<(String, String)>, Directed>;

#[derive(Debug, Default)]
pub(super) struct RemoteQueue {
    deletions: Vec<Operation>,
    collections: Vec<Operation>,
    singles: Vec<Operation>,
}

impl RemoteQueue {
    fn is_empty(&self) -> bool {
        self.deletions.is_empty() && self.collections.is_empty() && self.singles.is_empty()
    }

    fn len(&self) -> usize {
        self.deletions.len() + self.collections.len() + self.singles.len()
    }
}

pub struct RelationshipGraph {
    pub(super) schema: Box<dyn SchemaSource>,
    pub(super) identity: Box<dyn IdentityResolver>,
    notifier: Box<dyn Notifier>,
    pub(super) config: GraphConfig,
    definitions: HashMap<(String, String), Arc<EdgeDefinition>>,
    pub(super) edges: BTreeMap<ResourceKey, BTreeMap<String, Edge>>,
    polymorphic_types: BTreeMap<String, BTreeSet<String>>,
    pub(super) transaction: Option<u64>,
    transaction_count: u64,
    queue: RemoteQueue,
    pub(super) pending: BTreeSet<(ResourceKey, String)>,
    pub(super) pending_events: Vec<GraphEvent>,
    pub(super) removing: Option<ResourceKey>,
}

impl fmt::Display for RelationshipGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RelationshipGraph({} resources, {} edges)",
            self.edges.len(),
            self.edges.values().map(BTreeMap::len).sum::<usize>()
        )
    }
}

impl fmt::Debug for RelationshipGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationshipGraph")
            .field("config", &self.config)
            .field("edges", &self.edges)
            .field("transaction", &self.transaction)
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl RelationshipGraph {
    pub fn new<S, I, N>(schema: S, identity: I, notifier: N, config: GraphConfig) -> Self
    where
        S: SchemaSource + 'static,
        I: IdentityResolver + 'static,
        N: Notifier + 'static,
    {
        RelationshipGraph {
            schema: Box::new(schema),
            identity: Box::new(identity),
            notifier: Box::new(notifier),
            config,
            definitions: HashMap::new(),
            edges: BTreeMap::new(),
            polymorphic_types: BTreeMap::new(),
            transaction: None,
            transaction_count: 0,
            queue: RemoteQueue::default(),
            pending: BTreeSet::new(),
            pending_events: Vec::new(),
            removing: None,
        }
    }

    /// Build a graph whose [GraphConfig] is read from `provider`.
    pub fn from_provider<S, I, N>(
        schema: S,
        identity: I,
        notifier: N,
        provider: &dyn ConfigProvider,
    ) -> Result<Self, TetherError>
    where
        S: SchemaSource + 'static,
        I: IdentityResolver + 'static,
        N: Notifier + 'static,
    {
        Ok(RelationshipGraph::new(
            schema,
            identity,
            notifier,
            provider.get_graph_config()?,
        ))
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Replace the configuration. Cached definitions are dropped since they bake in
    /// `reset_on_remote_update`.
    pub fn set_config(&mut self, config: GraphConfig) {
        self.definitions.clear();
        self.config = config;
    }

    /// The definition of `resource_type.field`, upgraded and cached on first use.
    ///
    /// `declared_type` is consulted when `resource_type` has no such field, which happens when a
    /// polymorphic relationship points at a subtype the schema only describes through its
    /// declared supertype.
    pub(super) fn definition(
        &mut self,
        resource_type: &str,
        field: &str,
        declared_type: Option<&str>,
    ) -> Result<Arc<EdgeDefinition>, TetherError> {
        let cache_key = (resource_type.to_string(), field.to_string());
        if let Some(definition) = self.definitions.get(&cache_key) {
            return Ok(definition.clone());
        }

        let definition = if parse_implicit_key(field).is_some() {
            EdgeDefinition::implicit(resource_type, field)
                .ok_or_else(|| TetherError::schema_missing(resource_type, field))?
        } else {
            match self.schema.relationship_definition(resource_type, field) {
                Some(schema) => {
                    let inverse = schema.inverse.as_ref().and_then(|inverse| {
                        self.schema
                            .relationship_definition(&schema.resource_type, inverse)
                    });
                    EdgeDefinition::upgrade(resource_type, &schema, inverse.as_ref(), &self.config)?
                }
                None => match declared_type.filter(|declared| *declared != resource_type) {
                    Some(declared) => {
                        let definition = self.definition(declared, field, None)?;
                        self.definitions.insert(cache_key, definition.clone());
                        return Ok(definition);
                    }
                    None => return Err(TetherError::schema_missing(resource_type, field)),
                },
            }
        };

        let definition = Arc::new(definition);
        self.definitions.insert(cache_key, definition.clone());
        Ok(definition)
    }

    /// Resolve the definition for a public operation, failing before any state is touched when
    /// the field is implicit or of the wrong kind.
    pub(super) fn checked_definition(
        &mut self,
        op: &str,
        record: &ResourceKey,
        field: &str,
        expected: EdgeKind,
    ) -> Result<Arc<EdgeDefinition>, TetherError> {
        self.reject_implicit(record, field)?;
        let definition = self.definition(record.resource_type(), field, None)?;
        if definition.kind != expected {
            return Err(TetherError::KindMismatch {
                op: op.to_string(),
                resource_type: record.resource_type().to_string(),
                field: field.to_string(),
                expected,
                actual: definition.kind,
            });
        }
        Ok(definition)
    }

    pub(super) fn reject_implicit(
        &self,
        record: &ResourceKey,
        field: &str,
    ) -> Result<(), TetherError> {
        match parse_implicit_key(field) {
            Some(_) => Err(TetherError::ImplicitUpdate {
                resource_type: record.resource_type().to_string(),
                field: field.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// The edge for (key, field), created from its definition on first access.
    pub(super) fn edge_entry(
        &mut self,
        key: &ResourceKey,
        field: &str,
        declared_type: Option<&str>,
    ) -> Result<&mut Edge, TetherError> {
        let exists = self
            .edges
            .get(key)
            .is_some_and(|fields| fields.contains_key(field));
        if !exists {
            let definition = self.definition(key.resource_type(), field, declared_type)?;
            self.edges
                .entry(key.clone())
                .or_default()
                .insert(field.to_string(), Edge::new(key.clone(), definition));
        }
        self.edges
            .get_mut(key)
            .and_then(|fields| fields.get_mut(field))
            .ok_or_else(|| TetherError::NotFound(format!("<{key}>.{field}")))
    }

    pub(super) fn existing_edge_mut(&mut self, key: &ResourceKey, field: &str) -> Option<&mut Edge> {
        self.edges.get_mut(key).and_then(|fields| fields.get_mut(field))
    }

    pub(super) fn single_mut(
        &mut self,
        key: &ResourceKey,
        field: &str,
    ) -> Result<&mut SingleEdge, TetherError> {
        match self.edge_entry(key, field, None)? {
            Edge::Single(edge) => Ok(edge),
            other => Err(TetherError::KindMismatch {
                op: "single".to_string(),
                resource_type: key.resource_type().to_string(),
                field: field.to_string(),
                expected: EdgeKind::Single,
                actual: other.kind(),
            }),
        }
    }

    pub(super) fn collection_mut(
        &mut self,
        key: &ResourceKey,
        field: &str,
    ) -> Result<&mut CollectionEdge, TetherError> {
        match self.edge_entry(key, field, None)? {
            Edge::Collection(edge) => Ok(edge),
            other => Err(TetherError::KindMismatch {
                op: "collection".to_string(),
                resource_type: key.resource_type().to_string(),
                field: field.to_string(),
                expected: EdgeKind::Collection,
                actual: other.kind(),
            }),
        }
    }

    /// Get the edge for (key, field), creating it from schema metadata if needed.
    pub fn get(&mut self, key: &ResourceKey, field: &str) -> Result<&Edge, TetherError> {
        self.edge_entry(key, field, None).map(|edge| &*edge)
    }

    /// Read-only inspection; never creates.
    pub fn edge(&self, key: &ResourceKey, field: &str) -> Option<&Edge> {
        self.edges.get(key).and_then(|fields| fields.get(field))
    }

    pub fn has(&self, key: &ResourceKey, field: &str) -> bool {
        self.edge(key, field).is_some()
    }

    /// Every edge held for `key`, implicit ones included.
    pub fn edges_of(&self, key: &ResourceKey) -> impl Iterator<Item = (&String, &Edge)> {
        self.edges.get(key).into_iter().flat_map(|fields| fields.iter())
    }

    pub fn resources(&self) -> impl Iterator<Item = &ResourceKey> {
        self.edges.keys()
    }

    /// Apply one operation and deliver the resulting notifications.
    pub fn update(&mut self, operation: Operation, origin: EventOrigin) -> Result<(), TetherError> {
        let result = self.apply(operation, origin);
        self.deliver_notifications();
        result
    }

    pub(super) fn apply(
        &mut self,
        operation: Operation,
        origin: EventOrigin,
    ) -> Result<(), TetherError> {
        if self.config.trace_operations {
            tracing::debug!(
                "[RelationshipGraph::update] {} ({:?}, transaction {:?})",
                operation,
                origin,
                self.transaction
            );
        }
        match operation {
            Operation::ReplaceRelatedRecord {
                record,
                field,
                value,
            } => self.replace_related_record(&record, &field, value, origin),
            Operation::ReplaceRelatedRecords {
                record,
                field,
                value,
            } => self.replace_related_records(&record, &field, value, origin),
            Operation::AddToRelatedRecords {
                record,
                field,
                value,
                index,
            } => self.add_to_related_records(&record, &field, value, index, origin),
            Operation::RemoveFromRelatedRecords {
                record,
                field,
                value,
                index,
            } => self.remove_from_related_records(&record, &field, value, index, origin),
            Operation::UpdateRelationship {
                record,
                field,
                value,
            } => self.update_relationship(&record, &field, value),
            Operation::MergeIdentifier { record, value } => self.merge_identifier(&record, &value),
            Operation::DeleteRecord { record } => {
                self.delete_record(&record);
                Ok(())
            }
        }
    }

    /// Queue a canonical operation for the next [RelationshipGraph::flush_remote_queue].
    pub fn push(&mut self, operation: Operation) -> Result<(), TetherError> {
        let kind = match operation.field() {
            Some(field) => {
                self.reject_implicit(operation.record(), field)?;
                Some(
                    self.definition(operation.record().resource_type(), field, None)?
                        .kind,
                )
            }
            None => None,
        };
        match kind {
            None => self.queue.deletions.push(operation),
            Some(EdgeKind::Collection) => self.queue.collections.push(operation),
            Some(_) => self.queue.singles.push(operation),
        }
        Ok(())
    }

    /// Apply every queued operation as remote inside one transaction: deletions and merges first,
    /// then collection fields, then single fields.
    ///
    /// A failing operation is logged and skipped; the first failure is returned once the queue is
    /// drained and the transaction closed.
    pub fn flush_remote_queue(&mut self) -> Result<(), TetherError> {
        if self.queue.is_empty() {
            return Ok(());
        }
        let queue = std::mem::take(&mut self.queue);
        let transaction = self.begin_transaction();
        tracing::debug!(
            "[RelationshipGraph::flush_remote_queue] applying {} operations in transaction {}",
            queue.len(),
            transaction
        );
        let mut first_error = None;
        for operation in queue
            .deletions
            .into_iter()
            .chain(queue.collections)
            .chain(queue.singles)
        {
            if let Err(e) = self.apply(operation, EventOrigin::Remote) {
                tracing::warn!("[RelationshipGraph::flush_remote_queue] {e}");
                first_error.get_or_insert(e);
            }
        }
        self.end_transaction();
        self.deliver_notifications();
        first_error.map_or(Ok(()), Err)
    }

    pub fn begin_transaction(&mut self) -> u64 {
        self.transaction_count += 1;
        self.transaction = Some(self.transaction_count);
        tracing::debug!(
            "[RelationshipGraph] begin transaction {}",
            self.transaction_count
        );
        self.transaction_count
    }

    pub fn current_transaction(&self) -> Option<u64> {
        self.transaction
    }

    /// Stamp (key, field) with the active transaction, if any.
    pub fn add_to_transaction(&mut self, key: &ResourceKey, field: &str) {
        if let Some(transaction) = self.transaction {
            if let Some(edge) = self.existing_edge_mut(key, field) {
                edge.set_transaction_ref(transaction);
            }
        }
    }

    pub fn end_transaction(&mut self) {
        if let Some(transaction) = self.transaction.take() {
            tracing::debug!("[RelationshipGraph] end transaction {}", transaction);
        }
    }

    /// Record that `actual` resources are acceptable where `declared` ones are expected.
    pub fn register_polymorphic_type(&mut self, declared: &str, actual: &str) {
        if self
            .polymorphic_types
            .entry(declared.to_string())
            .or_default()
            .insert(actual.to_string())
        {
            tracing::debug!(
                "[RelationshipGraph] registered '{}' as a polymorphic form of '{}'",
                actual,
                declared
            );
        }
    }

    pub fn polymorphic_types(&self, declared: &str) -> Option<&BTreeSet<String>> {
        self.polymorphic_types.get(declared)
    }

    pub(super) fn check_polymorphism(
        &mut self,
        definition: &EdgeDefinition,
        value: &ResourceKey,
    ) -> Result<(), TetherError> {
        let declared = definition.resource_type.as_str();
        let actual = value.resource_type();
        if declared == actual {
            return Ok(());
        }
        let registered = self
            .polymorphic_types
            .get(declared)
            .is_some_and(|types| types.contains(actual));
        if !definition.is_polymorphic && !registered {
            if self.config.strict_polymorphism {
                return Err(TetherError::PolymorphismViolation {
                    resource_type: definition.owner_type.clone(),
                    field: definition.key.clone(),
                    expected: declared.to_string(),
                    received: actual.to_string(),
                });
            }
            tracing::warn!(
                "[RelationshipGraph] <{}>.{} expects '{}' but received '{}'; accepting it as polymorphic",
                definition.owner_type,
                definition.key,
                declared,
                actual
            );
        }
        self.register_polymorphic_type(declared, actual);
        Ok(())
    }

    /// Validate `value` against `definition` and make sure its inverse edge can be built, so a
    /// handler can fail before mutating anything.
    pub(super) fn prepare_value(
        &mut self,
        definition: &EdgeDefinition,
        value: &ResourceKey,
    ) -> Result<(), TetherError> {
        self.check_polymorphism(definition, value)?;
        self.edge_entry(
            value,
            definition.inverse_field(),
            Some(&definition.resource_type),
        )?;
        Ok(())
    }

    pub(super) fn notify_change(&mut self, key: &ResourceKey, field: &str) {
        if parse_implicit_key(field).is_some() || self.removing.as_ref() == Some(key) {
            return;
        }
        self.pending.insert((key.clone(), field.to_string()));
    }

    pub(super) fn deliver_notifications(&mut self) {
        let events = std::mem::take(&mut self.pending_events);
        let changed = std::mem::take(&mut self.pending);
        for event in events.into_iter().chain(
            changed
                .into_iter()
                .map(|(key, field)| GraphEvent::RelationshipChanged { key, field }),
        ) {
            if let Err(e) = self.notifier.notify(event) {
                tracing::warn!("[RelationshipGraph] failed to deliver graph event: {e}");
            }
        }
    }

    /// The local view of (key, field) as a relationship document. Reading a collection marks it
    /// accessed, so later remote changes notify.
    pub fn get_data(
        &mut self,
        key: &ResourceKey,
        field: &str,
    ) -> Result<RelationshipDocument<ResourceKey>, TetherError> {
        self.reject_implicit(key, field)?;
        let edge = self.edge_entry(key, field, None)?;
        if let Edge::Collection(edge) = edge {
            edge.accessed = true;
            edge.is_dirty = false;
        }
        Ok(document_for(edge, false))
    }

    pub fn get_remote_data(
        &mut self,
        key: &ResourceKey,
        field: &str,
    ) -> Result<RelationshipDocument<ResourceKey>, TetherError> {
        self.reject_implicit(key, field)?;
        let edge = self.edge_entry(key, field, None)?;
        Ok(document_for(edge, true))
    }

    /// Every public field of `key` whose local view differs from its remote view.
    pub fn changed_relationships(&self, key: &ResourceKey) -> BTreeMap<String, RelationshipChange> {
        self.edges_of(key)
            .filter_map(|(field, edge)| edge_change(edge).map(|change| (field.clone(), change)))
            .collect()
    }

    pub fn has_changed(&self, key: &ResourceKey, field: &str) -> bool {
        self.edge(key, field).and_then(edge_change).is_some()
    }

    /// Restore every changed field of `key` to its remote state. Returns the fields rolled back.
    pub fn rollback_relationships(&mut self, key: &ResourceKey) -> Result<Vec<String>, TetherError> {
        let result = self.rollback_fields(key);
        self.deliver_notifications();
        result
    }

    fn rollback_fields(&mut self, key: &ResourceKey) -> Result<Vec<String>, TetherError> {
        let mut rolled_back = Vec::new();
        for (field, change) in self.changed_relationships(key) {
            match change {
                RelationshipChange::Resource { remote, .. } => {
                    self.replace_related_record(key, &field, remote, EventOrigin::Local)?
                }
                RelationshipChange::Collection { remote, .. } => {
                    self.replace_related_records(key, &field, remote, EventOrigin::Local)?
                }
            }
            rolled_back.push(field);
        }
        Ok(rolled_back)
    }

    /// False while any edge of `key` has an async inverse, since that inverse may still need to
    /// refer to it.
    pub fn is_releasable(&self, key: &ResourceKey) -> bool {
        !self
            .edges_of(key)
            .any(|(_, edge)| edge.definition().inverse_is_async)
    }

    /// Flag (key, field) as having failed to load. Cleared by the next relationship update.
    pub fn mark_failed_load_attempt(&mut self, key: &ResourceKey, field: &str) -> Result<(), TetherError> {
        self.reject_implicit(key, field)?;
        self.edge_entry(key, field, None)?
            .set_flag(EdgeFlag::HasFailedLoadAttempt, true);
        Ok(())
    }

    /// Ask for (key, field) to be reloaded regardless of staleness. Cleared when data arrives.
    pub fn force_reload(&mut self, key: &ResourceKey, field: &str) -> Result<(), TetherError> {
        self.reject_implicit(key, field)?;
        self.edge_entry(key, field, None)?
            .set_flag(EdgeFlag::ShouldForceReload, true);
        Ok(())
    }

    pub fn as_subgraph(&self, remote: bool) -> KeySubGraph {
        let mut graph = KeySubGraph::new();
        for (key, fields) in self.edges.iter() {
            for (field, edge) in fields.iter() {
                let related = if remote {
                    edge.remote_related()
                } else {
                    edge.local_related()
                };
                let pair = (
                    field.clone(),
                    edge.definition().inverse_field().to_string(),
                );
                for other in related {
                    match graph.edge_weight_mut(key.lid(), other.lid()) {
                        Some(weight) => {
                            weight.insert(pair.clone());
                        }
                        None => {
                            graph.add_edge(key.lid(), other.lid(), BTreeSet::from([pair.clone()]));
                        }
                    }
                }
            }
        }
        graph
    }

    /// Check the graph invariants. Returns one message per violation; empty means consistent.
    pub fn built_in_test(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let names: BTreeMap<Lid, &ResourceKey> =
            self.edges.keys().map(|key| (key.lid(), key)).collect();
        let dematerialized: BTreeSet<(Lid, String)> = self
            .edges
            .iter()
            .flat_map(|(key, fields)| {
                fields
                    .iter()
                    .filter(|(_, edge)| edge.has_flag(EdgeFlag::HasDematerializedInverse))
                    .map(move |(field, _)| (key.lid(), field.clone()))
            })
            .collect();

        // every reference is mirrored by its inverse in the same category
        for (category, graph) in [("local", self.as_subgraph(false)), ("remote", self.as_subgraph(true))] {
            for (source, sink, weight) in graph.all_edges() {
                // forgotten resources are not checked
                let Some(sink_key) = names.get(&sink) else {
                    continue;
                };
                for (field, inverse) in weight.iter() {
                    if dematerialized.contains(&(source, field.clone())) {
                        continue;
                    }
                    let mirrored = graph
                        .edge_weight(sink, source)
                        .is_some_and(|back| back.contains(&(inverse.clone(), field.clone())));
                    if !mirrored {
                        errors.push(format!(
                            "[RelationshipGraph::built_in_test symmetry] {category} <{}>.{} \
                            references {} but <{}>.{} does not reference it back",
                            names.get(&source).map(|k| k.to_string()).unwrap_or_default(),
                            field,
                            sink_key,
                            sink_key,
                            inverse
                        ));
                    }
                }
            }
        }

        for (key, fields) in self.edges.iter() {
            for (field, edge) in fields.iter() {
                let Edge::Collection(edge) = edge else {
                    continue;
                };
                if let (Some(additions), Some(removals)) = (&edge.additions, &edge.removals) {
                    if additions.intersection(removals).next().is_some() {
                        errors.push(format!(
                            "[RelationshipGraph::built_in_test deltas] <{key}>.{field} \
                            additions and removals overlap"
                        ));
                    }
                }
                let remote_set: BTreeSet<&ResourceKey> = edge.remote_state.iter().collect();
                if remote_set.len() != edge.remote_state.len()
                    || remote_set != edge.remote_members.iter().collect::<BTreeSet<_>>()
                {
                    errors.push(format!(
                        "[RelationshipGraph::built_in_test members] <{key}>.{field} \
                        remote members do not match remote state"
                    ));
                }
            }
        }
        errors
    }
}

fn document_for(edge: &Edge, remote: bool) -> RelationshipDocument<ResourceKey> {
    let received = edge.has_flag(EdgeFlag::HasReceivedData);
    let data = match edge {
        Edge::Single(edge) => {
            let state = if remote {
                &edge.remote_state
            } else {
                &edge.local_state
            };
            match state {
                Some(key) => Some(RelationshipData::One(key.clone())),
                None if received => Some(RelationshipData::Null),
                None => None,
            }
        }
        Edge::Collection(edge) => {
            let state = if remote {
                &edge.remote_state
            } else {
                &edge.local_state
            };
            (received || !state.is_empty()).then(|| RelationshipData::Many(state.clone()))
        }
        Edge::Implicit(_) => None,
    };
    RelationshipDocument {
        data,
        links: edge.links().cloned(),
        meta: edge.meta().cloned(),
    }
}

fn edge_change(edge: &Edge) -> Option<RelationshipChange> {
    match edge {
        Edge::Single(edge) => (edge.local_state != edge.remote_state).then(|| {
            RelationshipChange::Resource {
                local: edge.local_state.clone(),
                remote: edge.remote_state.clone(),
            }
        }),
        Edge::Collection(edge) => {
            let local_set: BTreeSet<&ResourceKey> = edge.local_state.iter().collect();
            let shared_local: Vec<&ResourceKey> = edge
                .local_state
                .iter()
                .filter(|key| edge.remote_members.contains(*key))
                .collect();
            let shared_remote: Vec<&ResourceKey> = edge
                .remote_state
                .iter()
                .filter(|key| local_set.contains(key))
                .collect();
            let reordered = shared_local != shared_remote;
            let additions: Vec<ResourceKey> =
                edge.additions.iter().flatten().cloned().collect();
            let removals: Vec<ResourceKey> = edge.removals.iter().flatten().cloned().collect();
            (reordered || !additions.is_empty() || !removals.is_empty()).then(|| {
                RelationshipChange::Collection {
                    additions,
                    removals,
                    local: edge.local_state.clone(),
                    remote: edge.remote_state.clone(),
                    reordered,
                }
            })
        }
        Edge::Implicit(_) => None,
    }
}
