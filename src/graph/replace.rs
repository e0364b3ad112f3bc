//! Replace handlers and the inverse-propagation primitives every handler builds on.
//!
//! Each handler computes how its own edge moves in the remote view and in the local view, then
//! propagates the two transitions separately: a remote transition only ever moves the remote view
//! of an inverse edge, a local transition only its local view. That keeps both views symmetric
//! on their own.

use std::{collections::BTreeSet, sync::Arc};

use super::{
    base::RelationshipGraph,
    diff::{diff_collection, diff_edge},
    edge::{Edge, EdgeFlag, EmptyFlag},
};
use crate::{
    error::TetherError,
    event::EventOrigin,
    identity::ResourceKey,
    schema::{EdgeDefinition, EdgeKind},
};

impl RelationshipGraph {
    pub(super) fn replace_related_record(
        &mut self,
        record: &ResourceKey,
        field: &str,
        value: Option<ResourceKey>,
        origin: EventOrigin,
    ) -> Result<(), TetherError> {
        let definition =
            self.checked_definition("replaceRelatedRecord", record, field, EdgeKind::Single)?;
        if let Some(value) = &value {
            self.prepare_value(&definition, value)?;
        }

        let edge = self.single_mut(record, field)?;
        let existing = if origin.is_remote() {
            edge.remote_state.clone()
        } else {
            edge.local_state.clone()
        };

        if existing == value {
            edge.flags.insert(EdgeFlag::HasReceivedData);
            if !origin.is_remote() {
                return Ok(());
            }
            let local = edge.local_state.clone();
            self.add_to_transaction(record, field);
            if local.as_ref().is_some_and(ResourceKey::is_new) {
                return Ok(());
            }
            if local == existing {
                if let Some(existing) = &existing {
                    self.notify_inverse_of_potential_materialization(
                        existing,
                        definition.inverse_field(),
                        record,
                    );
                }
            } else if definition.reset_on_remote_update {
                tracing::warn!(
                    "[RelationshipGraph] resetting diverged local state of <{}>.{} to the remote state",
                    record,
                    field
                );
                self.set_local_single(record, field, &definition, existing)?;
            }
            return Ok(());
        }

        edge.flags.insert(EdgeFlag::HasReceivedData);
        edge.flags.remove(EdgeFlag::IsStale);
        edge.flags.remove(EdgeFlag::HasFailedLoadAttempt);

        if !origin.is_remote() {
            edge.local_state = value.clone();
            edge.flags.set_empty(value.is_none());
            self.propagate_single(record, &definition, existing, value, EventOrigin::Local)?;
            self.notify_change(record, field);
            return Ok(());
        }

        let old_local = edge.local_state.clone();
        let keep_new_local = old_local.as_ref().is_some_and(ResourceKey::is_new);
        let new_local = if keep_new_local {
            old_local.clone()
        } else if old_local == existing {
            value.clone()
        } else if definition.reset_on_remote_update {
            tracing::warn!(
                "[RelationshipGraph] remote update of <{}>.{} overwrites a pending local change",
                record,
                field
            );
            value.clone()
        } else {
            old_local.clone()
        };
        edge.remote_state = value.clone();
        edge.local_state = new_local.clone();
        edge.flags.set_empty(new_local.is_none());

        self.add_to_transaction(record, field);
        self.propagate_single(record, &definition, existing, value, EventOrigin::Remote)?;
        if new_local != old_local {
            self.propagate_single(
                record,
                &definition,
                old_local,
                new_local,
                EventOrigin::Local,
            )?;
            self.notify_change(record, field);
        }
        Ok(())
    }

    fn set_local_single(
        &mut self,
        record: &ResourceKey,
        field: &str,
        definition: &Arc<EdgeDefinition>,
        value: Option<ResourceKey>,
    ) -> Result<(), TetherError> {
        let edge = self.single_mut(record, field)?;
        let old_local = std::mem::replace(&mut edge.local_state, value.clone());
        edge.flags.set_empty(value.is_none());
        self.propagate_single(record, definition, old_local, value, EventOrigin::Local)?;
        self.notify_change(record, field);
        Ok(())
    }

    /// Move the inverse of a single-valued transition `from -> to` in the given view.
    fn propagate_single(
        &mut self,
        record: &ResourceKey,
        definition: &EdgeDefinition,
        from: Option<ResourceKey>,
        to: Option<ResourceKey>,
        origin: EventOrigin,
    ) -> Result<(), TetherError> {
        if from == to {
            return Ok(());
        }
        if let Some(from) = from {
            self.remove_from_inverse(&from, definition.inverse_field(), record, origin);
        }
        if let Some(to) = to {
            self.add_to_inverse(
                &to,
                definition.inverse_field(),
                record,
                origin,
                &definition.resource_type,
            )?;
        }
        Ok(())
    }

    /// Tell a collection that already holds `value` remotely that `value` may have come back.
    fn notify_inverse_of_potential_materialization(
        &mut self,
        holder: &ResourceKey,
        field: &str,
        value: &ResourceKey,
    ) {
        let Some(Edge::Collection(edge)) = self.existing_edge_mut(holder, field) else {
            return;
        };
        if edge.remote_members.contains(value)
            && edge.flags.contains(EdgeFlag::HasDematerializedInverse)
        {
            edge.flags.remove(EdgeFlag::HasDematerializedInverse);
            self.notify_change(holder, field);
        }
    }

    pub(super) fn replace_related_records(
        &mut self,
        record: &ResourceKey,
        field: &str,
        value: Vec<ResourceKey>,
        origin: EventOrigin,
    ) -> Result<(), TetherError> {
        let definition = self.checked_definition(
            "replaceRelatedRecords",
            record,
            field,
            EdgeKind::Collection,
        )?;
        for key in value.iter() {
            self.prepare_value(&definition, key)?;
        }
        if origin.is_remote() {
            self.replace_remote_collection(record, field, &definition, value)
        } else {
            self.replace_local_collection(record, field, &definition, value)
        }
    }

    fn replace_local_collection(
        &mut self,
        record: &ResourceKey,
        field: &str,
        definition: &EdgeDefinition,
        value: Vec<ResourceKey>,
    ) -> Result<(), TetherError> {
        let edge = self.collection_mut(record, field)?;
        let was_dirty = edge.is_dirty;
        let old_local = std::mem::take(&mut edge.local_state);
        let old_local_set: BTreeSet<ResourceKey> = old_local.iter().cloned().collect();

        let against_remote = diff_edge(&value, edge, |_| {}, |_| {});
        edge.additions = (!against_remote.add.is_empty()).then_some(against_remote.add);
        edge.removals = (!against_remote.del.is_empty()).then_some(against_remote.del);
        edge.local_state = against_remote.final_state;
        edge.is_dirty = false;
        edge.flags.set_empty(edge.local_state.is_empty());

        let mut added = Vec::new();
        let mut removed = Vec::new();
        let transition = diff_collection(
            &edge.local_state,
            &old_local,
            &old_local_set,
            |key| added.push(key.clone()),
            |key| removed.push(key.clone()),
        );

        self.propagate_collection(record, definition, &added, &removed, EventOrigin::Local)?;
        if transition.changed && !was_dirty {
            self.notify_change(record, field);
        }
        Ok(())
    }

    fn replace_remote_collection(
        &mut self,
        record: &ResourceKey,
        field: &str,
        definition: &EdgeDefinition,
        value: Vec<ResourceKey>,
    ) -> Result<(), TetherError> {
        let edge = self.collection_mut(record, field)?;
        edge.flags.insert(EdgeFlag::HasReceivedData);

        let mut remote_added = Vec::new();
        let mut remote_removed = Vec::new();
        let diff = diff_edge(
            &value,
            edge,
            |key| remote_added.push(key.clone()),
            |key| remote_removed.push(key.clone()),
        );

        let old_local = edge.local_state.clone();
        let old_local_set: BTreeSet<ResourceKey> = old_local.iter().cloned().collect();

        // Pending deltas the new remote state confirms are resolved
        let mut removals = edge.removals.clone().unwrap_or_default();
        removals.retain(|key| diff.final_set.contains(key));
        let mut additions = edge.additions.clone().unwrap_or_default();
        additions.retain(|key| !diff.final_set.contains(key));
        for key in diff.del.iter() {
            if key.is_new() && old_local_set.contains(key) {
                additions.insert(key.clone());
            }
        }

        let resets = definition.reset_on_remote_update
            && (!removals.is_empty() || additions.iter().any(|key| !key.is_new()));
        if !diff.changed && !resets {
            self.add_to_transaction(record, field);
            return Ok(());
        }
        if resets {
            tracing::warn!(
                "[RelationshipGraph] remote update of <{}>.{} discards pending local changes",
                record,
                field
            );
            removals.clear();
            additions.retain(ResourceKey::is_new);
        }

        let new_local = edge.rebase_local(&diff.final_state, &removals, &additions);
        edge.set_remote(diff.final_state);
        edge.local_state = new_local;
        edge.refresh_deltas();
        edge.flags.set_empty(edge.local_state.is_empty());

        let mut local_added = Vec::new();
        let mut local_removed = Vec::new();
        let transition = diff_collection(
            &edge.local_state,
            &old_local,
            &old_local_set,
            |key| local_added.push(key.clone()),
            |key| local_removed.push(key.clone()),
        );
        let notify = transition.changed && edge.accessed;
        if transition.changed && !edge.accessed {
            edge.is_dirty = true;
        }

        self.add_to_transaction(record, field);
        self.propagate_collection(
            record,
            definition,
            &remote_added,
            &remote_removed,
            EventOrigin::Remote,
        )?;
        self.propagate_collection(
            record,
            definition,
            &local_added,
            &local_removed,
            EventOrigin::Local,
        )?;
        if notify {
            self.notify_change(record, field);
        }
        Ok(())
    }

    fn propagate_collection(
        &mut self,
        record: &ResourceKey,
        definition: &EdgeDefinition,
        added: &[ResourceKey],
        removed: &[ResourceKey],
        origin: EventOrigin,
    ) -> Result<(), TetherError> {
        for key in removed {
            self.remove_from_inverse(key, definition.inverse_field(), record, origin);
        }
        for key in added {
            self.add_to_inverse(
                key,
                definition.inverse_field(),
                record,
                origin,
                &definition.resource_type,
            )?;
        }
        Ok(())
    }

    /// Make (holder, field) reference `value` in the view `origin` names, displacing whatever a
    /// single-valued inverse pointed at before.
    pub(super) fn add_to_inverse(
        &mut self,
        holder: &ResourceKey,
        field: &str,
        value: &ResourceKey,
        origin: EventOrigin,
        declared_type: &str,
    ) -> Result<(), TetherError> {
        let edge = self.edge_entry(holder, field, Some(declared_type))?;
        let definition = edge.definition().clone();
        let mut displaced = None;
        let mut changed = false;
        match edge {
            Edge::Single(edge) => {
                edge.flags.insert(EdgeFlag::HasReceivedData);
                if origin.is_remote() {
                    if edge.remote_state.as_ref() != Some(value) {
                        displaced = edge.remote_state.replace(value.clone());
                    }
                } else if edge.local_state.as_ref() != Some(value) {
                    displaced = edge.local_state.replace(value.clone());
                    edge.flags.remove(EdgeFlag::IsEmpty);
                    changed = true;
                }
            }
            Edge::Collection(edge) => {
                if origin.is_remote() {
                    if edge.remote_members.insert(value.clone()) {
                        edge.remote_state.push(value.clone());
                        edge.flags.insert(EdgeFlag::HasReceivedData);
                        edge.refresh_deltas();
                    }
                } else if !edge.local_contains(value) {
                    edge.local_state.push(value.clone());
                    edge.flags.remove(EdgeFlag::IsEmpty);
                    edge.refresh_deltas();
                    changed = true;
                }
            }
            Edge::Implicit(edge) => {
                if origin.is_remote() {
                    edge.remote_members.insert(value.clone());
                } else {
                    edge.local_members.insert(value.clone());
                }
            }
        }

        if definition.resource_type != value.resource_type() {
            self.register_polymorphic_type(&definition.resource_type, value.resource_type());
        }
        if origin.is_remote() {
            self.add_to_transaction(holder, field);
        }
        if let Some(displaced) = displaced {
            self.remove_from_inverse(&displaced, definition.inverse_field(), holder, origin);
        }
        if changed {
            self.notify_change(holder, field);
        }
        Ok(())
    }

    /// Make (holder, field) stop referencing `value` in the view `origin` names. Never creates
    /// an edge.
    pub(super) fn remove_from_inverse(
        &mut self,
        holder: &ResourceKey,
        field: &str,
        value: &ResourceKey,
        origin: EventOrigin,
    ) {
        let Some(edge) = self.existing_edge_mut(holder, field) else {
            return;
        };
        let mut changed = false;
        match edge {
            Edge::Single(edge) => {
                if origin.is_remote() {
                    if edge.remote_state.as_ref() == Some(value) {
                        edge.remote_state = None;
                    }
                } else if edge.local_state.as_ref() == Some(value) {
                    edge.local_state = None;
                    edge.flags.insert(EdgeFlag::IsEmpty);
                    changed = true;
                }
            }
            Edge::Collection(edge) => {
                if origin.is_remote() {
                    if edge.remote_members.remove(value) {
                        edge.remote_state.retain(|key| key != value);
                        edge.refresh_deltas();
                    }
                } else if let Some(index) = edge.local_state.iter().position(|key| key == value) {
                    edge.local_state.remove(index);
                    edge.flags.set_empty(edge.local_state.is_empty());
                    edge.refresh_deltas();
                    changed = true;
                }
            }
            Edge::Implicit(edge) => {
                if origin.is_remote() {
                    edge.remote_members.remove(value);
                } else {
                    edge.local_members.remove(value);
                }
            }
        }
        if origin.is_remote() {
            self.add_to_transaction(holder, field);
        }
        if changed {
            self.notify_change(holder, field);
        }
    }
}
