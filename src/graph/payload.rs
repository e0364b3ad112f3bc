use super::{base::RelationshipGraph, edge::EdgeFlag};
use crate::{
    document::{RelationshipData, RelationshipDocument},
    error::TetherError,
    event::EventOrigin,
    identity::ResourceKey,
};

/// True when a link change on an edge stamped `edge_ref` makes it stale: the edge has never been
/// part of a transaction, no transaction is running, or the edge was last touched by an earlier
/// one.
pub fn is_stale_transaction(edge_ref: u64, graph_ref: Option<u64>) -> bool {
    match graph_ref {
        None => true,
        Some(graph_ref) => edge_ref == 0 || edge_ref < graph_ref,
    }
}

enum ResolvedData {
    One(Option<ResourceKey>),
    Many(Vec<ResourceKey>),
}

impl ResolvedData {
    fn is_empty(&self) -> bool {
        match self {
            ResolvedData::One(value) => value.is_none(),
            ResolvedData::Many(values) => values.is_empty(),
        }
    }
}

impl RelationshipGraph {
    pub(super) fn update_relationship(
        &mut self,
        record: &ResourceKey,
        field: &str,
        document: RelationshipDocument,
    ) -> Result<(), TetherError> {
        self.reject_implicit(record, field)?;
        let definition = self.definition(record.resource_type(), field, None)?;
        let RelationshipDocument { data, links, meta } = document;

        let invalid = |reason: &str| TetherError::InvalidPayload {
            resource_type: record.resource_type().to_string(),
            field: field.to_string(),
            reason: reason.to_string(),
        };
        let resolved = match data {
            None => None,
            Some(RelationshipData::Null) if definition.is_collection => {
                tracing::warn!(
                    "[RelationshipGraph::update_relationship] <{}>.{} received null data for a \
                    collection; treating it as an empty collection",
                    record,
                    field
                );
                Some(ResolvedData::Many(Vec::new()))
            }
            Some(RelationshipData::Null) => Some(ResolvedData::One(None)),
            Some(RelationshipData::Many(refs)) if definition.is_collection => {
                let mut keys = Vec::with_capacity(refs.len());
                for reference in refs.iter() {
                    keys.push(self.identity.resolve_or_create(reference)?);
                }
                Some(ResolvedData::Many(keys))
            }
            Some(RelationshipData::One(reference)) if !definition.is_collection => Some(
                ResolvedData::One(Some(self.identity.resolve_or_create(&reference)?)),
            ),
            Some(RelationshipData::Many(_)) => {
                return Err(invalid("expected a single resource reference or null"));
            }
            Some(RelationshipData::One(_)) => {
                return Err(invalid("expected an array of resource references"));
            }
        };

        let merges = self.identity.drain_merges();
        if let Err(e) = merges
            .iter()
            .try_for_each(|merge| self.check_merge(&merge.from, &merge.into))
        {
            self.identity.requeue_merges(merges);
            return Err(e);
        }
        let mut record = record.clone();
        let mut merges = merges.into_iter();
        while let Some(merge) = merges.next() {
            if let Err(e) = self.merge_identifier(&merge.from, &merge.into) {
                tracing::warn!(
                    "[RelationshipGraph::update_relationship] merging {} into {} failed: {e}",
                    merge.from,
                    merge.into
                );
                self.identity.requeue_merges(merges.collect());
                return Err(e);
            }
            if merge.from == record {
                record = merge.into;
            }
        }
        let record = &record;

        if let Some(meta) = meta {
            self.edge_entry(record, field, None)?.set_meta(meta);
        }

        let has_received_data = self
            .edge_entry(record, field, None)?
            .has_flag(EdgeFlag::HasReceivedData);
        let resolved = match resolved {
            None if !definition.is_async && !has_received_data => Some(if definition.is_collection {
                ResolvedData::Many(Vec::new())
            } else {
                ResolvedData::One(None)
            }),
            other => other,
        };

        let mut data_is_empty = None;
        if let Some(resolved) = resolved {
            data_is_empty = Some(resolved.is_empty());
            match resolved {
                ResolvedData::One(value) => {
                    self.replace_related_record(record, field, value, EventOrigin::Remote)?
                }
                ResolvedData::Many(values) => {
                    self.replace_related_records(record, field, values, EventOrigin::Remote)?
                }
            }
        }

        let mut has_updated_link = false;
        if let Some(links) = links {
            let next = links.related.as_ref().map(|l| l.href().to_string());
            let previous = self.edge_entry(record, field, None)?.set_links(links);
            let current = previous
                .as_ref()
                .and_then(|l| l.related.as_ref())
                .map(|l| l.href().to_string());
            if next.is_some() && next != current {
                has_updated_link = true;
            }
        }

        let transaction = self.transaction;
        let edge = self.edge_entry(record, field, None)?;
        edge.set_flag(EdgeFlag::HasFailedLoadAttempt, false);
        if let Some(is_empty) = data_is_empty {
            edge.set_flag(EdgeFlag::HasReceivedData, true);
            edge.set_flag(EdgeFlag::IsStale, false);
            edge.set_flag(EdgeFlag::HasDematerializedInverse, false);
            edge.set_flag(EdgeFlag::ShouldForceReload, false);
            edge.set_flag(EdgeFlag::IsEmpty, is_empty);
        } else if has_updated_link {
            // Data already received within this batch stays authoritative for singles
            let stale = definition.is_collection
                || !edge.has_flag(EdgeFlag::HasReceivedData)
                || is_stale_transaction(edge.transaction_ref(), transaction);
            edge.set_flag(EdgeFlag::IsStale, stale);
            if stale {
                self.notify_change(record, field);
            }
        }
        Ok(())
    }
}
