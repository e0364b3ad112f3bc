use super::{base::RelationshipGraph, edge::Edge};
use crate::{error::TetherError, event::EventOrigin, identity::ResourceKey, schema::EdgeKind};

impl RelationshipGraph {
    /// Insert `value` into a collection, at `index` when given, skipping keys already present.
    pub(super) fn add_to_related_records(
        &mut self,
        record: &ResourceKey,
        field: &str,
        value: Vec<ResourceKey>,
        index: Option<usize>,
        origin: EventOrigin,
    ) -> Result<(), TetherError> {
        self.checked_definition("addToRelatedRecords", record, field, EdgeKind::Collection)?;
        let edge = self.collection_mut(record, field)?;
        let current = if origin.is_remote() {
            &edge.remote_state
        } else {
            &edge.local_state
        };

        let mut next = current.clone();
        let mut position = index.map(|index| index.min(next.len()));
        for key in value {
            if next.contains(&key) {
                continue;
            }
            match position.as_mut() {
                Some(at) => {
                    next.insert(*at, key);
                    *at += 1;
                }
                None => next.push(key),
            }
        }
        if next.len() == current.len() {
            return Ok(());
        }
        self.replace_related_records(record, field, next, origin)
    }

    /// Remove `value` from a collection. On a single-valued field this is only legal as a remote
    /// operation naming the current remote value, which it clears.
    pub(super) fn remove_from_related_records(
        &mut self,
        record: &ResourceKey,
        field: &str,
        value: Vec<ResourceKey>,
        index: Option<usize>,
        origin: EventOrigin,
    ) -> Result<(), TetherError> {
        self.reject_implicit(record, field)?;
        let definition = self.definition(record.resource_type(), field, None)?;
        if definition.kind == EdgeKind::Single {
            return self.remove_single(record, field, value, origin);
        }

        let edge = self.collection_mut(record, field)?;
        let current = if origin.is_remote() {
            &edge.remote_state
        } else {
            &edge.local_state
        };

        let mut next = current.clone();
        for key in value.iter() {
            let hinted = index.filter(|at| next.get(*at) == Some(key));
            if let Some(at) = hinted.or_else(|| next.iter().position(|k| k == key)) {
                next.remove(at);
            }
        }
        if next.len() == current.len() {
            return Ok(());
        }
        self.replace_related_records(record, field, next, origin)
    }

    fn remove_single(
        &mut self,
        record: &ResourceKey,
        field: &str,
        value: Vec<ResourceKey>,
        origin: EventOrigin,
    ) -> Result<(), TetherError> {
        let invalid = |value: String, reason: &str| TetherError::InvalidRemoval {
            resource_type: record.resource_type().to_string(),
            field: field.to_string(),
            value,
            reason: reason.to_string(),
        };
        let [key] = value.as_slice() else {
            return Err(invalid(
                format!("{} keys", value.len()),
                "a single-valued relationship holds exactly one key",
            ));
        };
        if !origin.is_remote() {
            return Err(invalid(
                key.to_string(),
                "local removal from a single-valued relationship is not supported; \
                replace it with null instead",
            ));
        }
        let remote = match self.edge(record, field) {
            Some(Edge::Single(edge)) => edge.remote_state.clone(),
            _ => None,
        };
        if remote.as_ref() != Some(key) {
            return Err(invalid(key.to_string(), "it is not the current remote value"));
        }
        self.replace_related_record(record, field, None, origin)
    }
}
