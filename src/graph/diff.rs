use std::collections::BTreeSet;

use super::edge::CollectionEdge;
use crate::identity::ResourceKey;

/// The minimal set of membership changes between two collection states.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionDiff {
    pub add: BTreeSet<ResourceKey>,
    pub del: BTreeSet<ResourceKey>,
    /// The new sequence with duplicates dropped.
    pub final_state: Vec<ResourceKey>,
    pub final_set: BTreeSet<ResourceKey>,
    /// Membership or order differs from the prior state.
    pub changed: bool,
}

/// Diff `new_state` against a prior state.
///
/// `on_add` fires, in sequence order, for every key missing from `prior_set`; `on_remove` fires
/// for every prior key missing from the result. Duplicate keys in `new_state` keep their first
/// occurrence.
pub fn diff_collection<A, R>(
    new_state: &[ResourceKey],
    prior_state: &[ResourceKey],
    prior_set: &BTreeSet<ResourceKey>,
    mut on_add: A,
    mut on_remove: R,
) -> CollectionDiff
where
    A: FnMut(&ResourceKey),
    R: FnMut(&ResourceKey),
{
    let mut diff = CollectionDiff {
        final_state: Vec::with_capacity(new_state.len()),
        ..Default::default()
    };

    for key in new_state.iter() {
        if !diff.final_set.insert(key.clone()) {
            tracing::warn!(
                "[diff_collection] Dropping duplicate {} from relationship state",
                key
            );
            continue;
        }
        diff.final_state.push(key.clone());
        if !prior_set.contains(key) {
            diff.add.insert(key.clone());
            on_add(key);
        }
    }

    for key in prior_state.iter() {
        if !diff.final_set.contains(key) && diff.del.insert(key.clone()) {
            on_remove(key);
        }
    }

    diff.changed = diff.final_state.as_slice() != prior_state;
    diff
}

/// [diff_collection] against the remote state of `edge`.
pub fn diff_edge<A, R>(
    new_state: &[ResourceKey],
    edge: &CollectionEdge,
    on_add: A,
    on_remove: R,
) -> CollectionDiff
where
    A: FnMut(&ResourceKey),
    R: FnMut(&ResourceKey),
{
    diff_collection(
        new_state,
        &edge.remote_state,
        &edge.remote_members,
        on_add,
        on_remove,
    )
}
