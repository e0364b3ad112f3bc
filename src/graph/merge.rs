use std::collections::BTreeSet;

use super::{base::RelationshipGraph, edge::Edge};
use crate::{
    error::TetherError,
    event::{EventOrigin, GraphEvent},
    identity::ResourceKey,
};

impl RelationshipGraph {
    /// Refuse merges that cannot denote one resource. Nothing is mutated.
    pub(super) fn check_merge(
        &self,
        from: &ResourceKey,
        into: &ResourceKey,
    ) -> Result<(), TetherError> {
        if from.resource_type() != into.resource_type() {
            return Err(TetherError::MergeConflict {
                from: from.to_string(),
                into: into.to_string(),
                reason: format!(
                    "a '{}' resource cannot become a '{}' resource",
                    from.resource_type(),
                    into.resource_type()
                ),
            });
        }
        Ok(())
    }

    /// Fold every edge of `from` into `into` and rewrite each inverse holder that referenced
    /// `from`.
    ///
    /// When both keys hold data for the same field the two edges are folded: `into` keeps its
    /// remote state, members only `from` held are appended and `from`'s local changes carry
    /// over. The inverses of a folded field are then brought in line with the folded edge.
    pub(super) fn merge_identifier(
        &mut self,
        from: &ResourceKey,
        into: &ResourceKey,
    ) -> Result<(), TetherError> {
        if from == into {
            return Ok(());
        }
        self.check_merge(from, into)?;
        tracing::debug!("[RelationshipGraph::merge_identifier] {} -> {}", from, into);

        let moved = self.edges.remove(from).unwrap_or_default();
        let mut holders: BTreeSet<(ResourceKey, String)> = BTreeSet::new();
        let mut changed_fields = Vec::new();
        let mut folded: Vec<(String, BTreeSet<ResourceKey>)> = Vec::new();
        for (field, mut edge) in moved {
            let inverse = edge.definition().inverse_field().to_string();
            for related in edge.related() {
                let holder = if related == *from {
                    into.clone()
                } else {
                    related
                };
                holders.insert((holder, inverse.clone()));
            }
            edge.set_identifier(into.clone());
            edge.replace_key(from, into);
            let implicit = edge.definition().is_implicit();

            let fields = self.edges.entry(into.clone()).or_default();
            match fields.get(&field).map(Edge::holds_data) {
                Some(true) => {
                    let Some(kept) = fields.get_mut(&field) else {
                        continue;
                    };
                    if !edge.holds_data() {
                        continue;
                    }
                    let mut related = kept.related();
                    related.extend(edge.related());
                    if kept.absorb(edge) && !implicit {
                        changed_fields.push(field.clone());
                    }
                    if !implicit {
                        folded.push((field, related));
                    }
                }
                Some(false) if !edge.holds_data() => {}
                _ => {
                    if edge.holds_data() && !implicit {
                        changed_fields.push(field.clone());
                    }
                    fields.insert(field, edge);
                }
            }
        }

        for (holder, field) in holders {
            let Some(edge) = self.existing_edge_mut(&holder, &field) else {
                continue;
            };
            let local_moved = matches!(
                &*edge,
                Edge::Single(single) if single.local_state.as_ref() == Some(from)
            );
            let changed = edge.replace_key(from, into);
            let notify = match edge {
                Edge::Single(_) => local_moved,
                Edge::Collection(collection) => {
                    collection.is_dirty |= changed;
                    changed
                }
                Edge::Implicit(_) => false,
            };
            if notify {
                self.notify_change(&holder, &field);
            }
        }
        for (field, related) in folded {
            self.reconcile_folded_inverses(into, &field, related)?;
        }
        for field in changed_fields {
            self.notify_change(into, &field);
        }

        let pending: Vec<String> = self
            .pending
            .iter()
            .filter(|(key, _)| key == from)
            .map(|(_, field)| field.clone())
            .collect();
        for field in pending {
            self.pending.remove(&(from.clone(), field.clone()));
            self.pending.insert((into.clone(), field));
        }
        self.pending_events.push(GraphEvent::IdentityMerged {
            from: from.clone(),
            into: into.clone(),
        });
        Ok(())
    }

    /// After a fold, each key the two edges referenced must hold `owner` in exactly the views
    /// the folded edge holds it.
    fn reconcile_folded_inverses(
        &mut self,
        owner: &ResourceKey,
        field: &str,
        related: BTreeSet<ResourceKey>,
    ) -> Result<(), TetherError> {
        let Some(edge) = self.edge(owner, field) else {
            return Ok(());
        };
        let definition = edge.definition().clone();
        let local = edge.local_related();
        let remote = edge.remote_related();
        let inverse = definition.inverse_field();
        for key in related {
            for (origin, wanted) in [
                (EventOrigin::Remote, remote.contains(&key)),
                (EventOrigin::Local, local.contains(&key)),
            ] {
                let held = self.edge(&key, inverse).is_some_and(|edge| {
                    match origin {
                        EventOrigin::Remote => edge.remote_related(),
                        EventOrigin::Local => edge.local_related(),
                    }
                    .contains(owner)
                });
                if wanted && !held {
                    self.add_to_inverse(&key, inverse, owner, origin, &definition.resource_type)?;
                } else if held && !wanted {
                    self.remove_from_inverse(&key, inverse, owner, origin);
                }
            }
        }
        Ok(())
    }
}
