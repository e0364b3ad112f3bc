//! Deleting, unloading and forgetting resources.
//!
//! Unloading tells every inverse the resource is gone from memory. Sync inverses drop it outright;
//! async inverses keep the reference and remember that it points at a dematerialized resource,
//! so it can be fetched again.

use std::sync::Arc;

use super::{
    base::RelationshipGraph,
    edge::{Edge, EdgeFlag, EmptyFlag},
};
use crate::{identity::ResourceKey, schema::EdgeDefinition};

impl RelationshipGraph {
    /// Drop every edge of a locally deleted record and scrub it from all inverses.
    pub(super) fn delete_record(&mut self, record: &ResourceKey) {
        let Some(fields) = self.edges.remove(record) else {
            return;
        };
        tracing::debug!(
            "[RelationshipGraph::delete_record] removing {} edges of {}",
            fields.len(),
            record
        );
        for (field, edge) in fields {
            let definition = edge.definition().clone();
            for related in edge.related() {
                self.remove_identifier_completely(
                    &related,
                    definition.inverse_field(),
                    record,
                    false,
                );
            }
            if !definition.is_async && !definition.is_implicit() && !edge.local_related().is_empty()
            {
                self.notify_change(record, &field);
            }
        }
    }

    /// Dematerialize `key`: its inverses are told it left memory, but its own edges are kept
    /// where an async inverse may still need them.
    pub fn unload(&mut self, key: &ResourceKey) {
        self.dematerialize(key);
        self.deliver_notifications();
    }

    /// Unload `key`, then forget its edges entirely. Nothing is reported for `key` itself.
    pub fn remove(&mut self, key: &ResourceKey) {
        self.removing = Some(key.clone());
        self.dematerialize(key);
        self.edges.remove(key);
        self.pending.retain(|(pending, _)| pending != key);
        self.removing = None;
        self.deliver_notifications();
    }

    fn dematerialize(&mut self, key: &ResourceKey) {
        let snapshot: Vec<(String, Arc<EdgeDefinition>, Vec<ResourceKey>)> = self
            .edges_of(key)
            .map(|(field, edge)| {
                (
                    field.clone(),
                    edge.definition().clone(),
                    edge.related().into_iter().collect(),
                )
            })
            .collect();
        let releasable = self.is_releasable(key);

        for (field, definition, related) in snapshot {
            if definition.is_implicit() {
                if releasable {
                    for holder in related.iter() {
                        self.remove_identifier_completely(
                            holder,
                            definition.inverse_field(),
                            key,
                            false,
                        );
                    }
                    if let Some(edge) = self.existing_edge_mut(key, &field) {
                        edge.clear();
                    }
                }
                continue;
            }
            if definition.inverse_is_implicit() {
                continue;
            }
            for holder in related.iter() {
                self.notify_inverse_of_dematerialization(holder, definition.inverse_field(), key);
            }
            if !definition.inverse_is_async || key.is_new() {
                if let Some(edge) = self.existing_edge_mut(key, &field) {
                    edge.clear();
                    edge.set_flag(EdgeFlag::IsStale, true);
                }
                if definition.is_async {
                    self.notify_change(key, &field);
                }
            }
        }
    }

    fn notify_inverse_of_dematerialization(
        &mut self,
        holder: &ResourceKey,
        field: &str,
        value: &ResourceKey,
    ) {
        let Some(edge) = self.existing_edge_mut(holder, field) else {
            return;
        };
        let drops = !edge.definition().is_async || value.is_new();
        if !drops {
            edge.set_flag(EdgeFlag::HasDematerializedInverse, true);
            self.notify_change(holder, field);
            return;
        }
        self.remove_dematerialized_inverse(holder, field, value);
    }

    fn remove_dematerialized_inverse(
        &mut self,
        holder: &ResourceKey,
        field: &str,
        value: &ResourceKey,
    ) {
        let Some(edge) = self.existing_edge_mut(holder, field) else {
            return;
        };
        match edge {
            Edge::Single(edge) => {
                if edge.local_state.as_ref() == Some(value) {
                    edge.local_state = None;
                    edge.flags.insert(EdgeFlag::IsEmpty);
                }
                if edge.remote_state.as_ref() == Some(value) {
                    edge.remote_state = None;
                    edge.flags.insert(EdgeFlag::HasReceivedData);
                }
            }
            Edge::Collection(_) | Edge::Implicit(_) => {
                self.remove_identifier_completely(holder, field, value, false);
                return;
            }
        }
        self.notify_change(holder, field);
    }

    /// Scrub `value` from both views of (holder, field). Returns whether the local view changed.
    pub(super) fn remove_identifier_completely(
        &mut self,
        holder: &ResourceKey,
        field: &str,
        value: &ResourceKey,
        silence: bool,
    ) -> bool {
        let Some(edge) = self.existing_edge_mut(holder, field) else {
            return false;
        };
        let changed = match edge {
            Edge::Single(edge) => {
                if edge.remote_state.as_ref() == Some(value) {
                    edge.remote_state = None;
                }
                let changed = edge.local_state.as_ref() == Some(value);
                if changed {
                    edge.local_state = None;
                    edge.flags.insert(EdgeFlag::IsEmpty);
                }
                changed
            }
            Edge::Collection(edge) => {
                if edge.remote_members.remove(value) {
                    edge.remote_state.retain(|key| key != value);
                }
                let before = edge.local_state.len();
                edge.local_state.retain(|key| key != value);
                edge.refresh_deltas();
                edge.flags.set_empty(edge.local_state.is_empty());
                edge.local_state.len() != before
            }
            Edge::Implicit(edge) => {
                edge.local_members.remove(value);
                edge.remote_members.remove(value);
                false
            }
        };
        if changed && !silence {
            self.notify_change(holder, field);
        }
        changed
    }
}
