//! The per-(resource, field) relationship state the graph owns.
//!
//! Handlers mutate edges through the `pub(crate)` fields; everything outside the crate only gets
//! the read accessors.
use enumset::{EnumSet, EnumSetType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::BTreeSet, sync::Arc};

use crate::{
    document::Links,
    identity::ResourceKey,
    schema::{EdgeDefinition, EdgeKind},
};

#[derive(EnumSetType, Debug, Serialize, Deserialize)]
#[enumset(serialize_repr = "list")]
pub enum EdgeFlag {
    HasReceivedData,
    IsEmpty,
    IsStale,
    HasDematerializedInverse,
    HasFailedLoadAttempt,
    ShouldForceReload,
}

pub type EdgeFlags = EnumSet<EdgeFlag>;

pub(crate) trait EmptyFlag {
    fn set_empty(&mut self, empty: bool);
}

impl EmptyFlag for EdgeFlags {
    fn set_empty(&mut self, empty: bool) {
        if empty {
            self.insert(EdgeFlag::IsEmpty);
        } else {
            self.remove(EdgeFlag::IsEmpty);
        }
    }
}

#[derive(Debug, Clone)]
pub struct SingleEdge {
    pub(crate) identifier: ResourceKey,
    pub(crate) definition: Arc<EdgeDefinition>,
    pub(crate) meta: Option<Value>,
    pub(crate) links: Option<Links>,
    pub(crate) flags: EdgeFlags,
    pub(crate) transaction_ref: u64,
    pub(crate) local_state: Option<ResourceKey>,
    pub(crate) remote_state: Option<ResourceKey>,
}

impl SingleEdge {
    pub fn local_state(&self) -> Option<&ResourceKey> {
        self.local_state.as_ref()
    }

    pub fn remote_state(&self) -> Option<&ResourceKey> {
        self.remote_state.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct CollectionEdge {
    pub(crate) identifier: ResourceKey,
    pub(crate) definition: Arc<EdgeDefinition>,
    pub(crate) meta: Option<Value>,
    pub(crate) links: Option<Links>,
    pub(crate) flags: EdgeFlags,
    pub(crate) transaction_ref: u64,
    pub(crate) local_state: Vec<ResourceKey>,
    pub(crate) remote_state: Vec<ResourceKey>,
    pub(crate) remote_members: BTreeSet<ResourceKey>,
    pub(crate) additions: Option<BTreeSet<ResourceKey>>,
    pub(crate) removals: Option<BTreeSet<ResourceKey>>,
    /// The local state changed while nobody had read it, so no notification went out.
    pub(crate) is_dirty: bool,
    pub(crate) accessed: bool,
}

impl CollectionEdge {
    pub fn local_state(&self) -> &[ResourceKey] {
        &self.local_state
    }

    pub fn remote_state(&self) -> &[ResourceKey] {
        &self.remote_state
    }

    pub fn remote_members(&self) -> &BTreeSet<ResourceKey> {
        &self.remote_members
    }

    /// Locally added keys the remote state does not hold yet.
    pub fn additions(&self) -> Option<&BTreeSet<ResourceKey>> {
        self.additions.as_ref()
    }

    /// Remote keys that were locally removed.
    pub fn removals(&self) -> Option<&BTreeSet<ResourceKey>> {
        self.removals.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn accessed(&self) -> bool {
        self.accessed
    }

    pub(crate) fn local_contains(&self, key: &ResourceKey) -> bool {
        self.local_state.contains(key)
    }

    /// Derive the pending deltas from the two views. Keeps them disjoint and relative to the
    /// current remote state no matter which side last moved.
    pub(crate) fn refresh_deltas(&mut self) {
        let local: BTreeSet<ResourceKey> = self.local_state.iter().cloned().collect();
        let additions: BTreeSet<ResourceKey> =
            local.difference(&self.remote_members).cloned().collect();
        let removals: BTreeSet<ResourceKey> =
            self.remote_members.difference(&local).cloned().collect();
        self.additions = (!additions.is_empty()).then_some(additions);
        self.removals = (!removals.is_empty()).then_some(removals);
    }

    pub(crate) fn set_remote(&mut self, remote_state: Vec<ResourceKey>) {
        self.remote_members = remote_state.iter().cloned().collect();
        self.remote_state = remote_state;
    }

    /// The local view rebuilt on top of `remote_state`: remote order minus pending removals, then
    /// pending additions in the order they held locally.
    pub(crate) fn rebase_local(
        &self,
        remote_state: &[ResourceKey],
        removals: &BTreeSet<ResourceKey>,
        additions: &BTreeSet<ResourceKey>,
    ) -> Vec<ResourceKey> {
        let mut state: Vec<ResourceKey> = remote_state
            .iter()
            .filter(|key| !removals.contains(*key))
            .cloned()
            .collect();
        let mut seen: BTreeSet<ResourceKey> = state.iter().cloned().collect();
        for key in self.local_state.iter().chain(additions.iter()) {
            if additions.contains(key) && seen.insert(key.clone()) {
                state.push(key.clone());
            }
        }
        state
    }
}

/// Bookkeeping for a field that declares no inverse: the set of resources pointing at this one.
#[derive(Debug, Clone)]
pub struct ImplicitEdge {
    pub(crate) identifier: ResourceKey,
    pub(crate) definition: Arc<EdgeDefinition>,
    pub(crate) local_members: BTreeSet<ResourceKey>,
    pub(crate) remote_members: BTreeSet<ResourceKey>,
}

impl ImplicitEdge {
    pub fn local_members(&self) -> &BTreeSet<ResourceKey> {
        &self.local_members
    }

    pub fn remote_members(&self) -> &BTreeSet<ResourceKey> {
        &self.remote_members
    }
}

#[derive(Debug, Clone)]
pub enum Edge {
    Single(SingleEdge),
    Collection(CollectionEdge),
    Implicit(ImplicitEdge),
}

impl Edge {
    pub(crate) fn new(identifier: ResourceKey, definition: Arc<EdgeDefinition>) -> Edge {
        match definition.kind {
            EdgeKind::Single => Edge::Single(SingleEdge {
                identifier,
                definition,
                meta: None,
                links: None,
                flags: EdgeFlag::IsEmpty.into(),
                transaction_ref: 0,
                local_state: None,
                remote_state: None,
            }),
            EdgeKind::Collection => Edge::Collection(CollectionEdge {
                identifier,
                definition,
                meta: None,
                links: None,
                flags: EdgeFlag::IsEmpty.into(),
                transaction_ref: 0,
                local_state: Vec::new(),
                remote_state: Vec::new(),
                remote_members: BTreeSet::new(),
                additions: None,
                removals: None,
                is_dirty: false,
                accessed: false,
            }),
            EdgeKind::Implicit => Edge::Implicit(ImplicitEdge {
                identifier,
                definition,
                local_members: BTreeSet::new(),
                remote_members: BTreeSet::new(),
            }),
        }
    }

    pub fn identifier(&self) -> &ResourceKey {
        match self {
            Edge::Single(edge) => &edge.identifier,
            Edge::Collection(edge) => &edge.identifier,
            Edge::Implicit(edge) => &edge.identifier,
        }
    }

    pub(crate) fn set_identifier(&mut self, identifier: ResourceKey) {
        match self {
            Edge::Single(edge) => edge.identifier = identifier,
            Edge::Collection(edge) => edge.identifier = identifier,
            Edge::Implicit(edge) => edge.identifier = identifier,
        }
    }

    pub fn definition(&self) -> &Arc<EdgeDefinition> {
        match self {
            Edge::Single(edge) => &edge.definition,
            Edge::Collection(edge) => &edge.definition,
            Edge::Implicit(edge) => &edge.definition,
        }
    }

    pub fn kind(&self) -> EdgeKind {
        match self {
            Edge::Single(_) => EdgeKind::Single,
            Edge::Collection(_) => EdgeKind::Collection,
            Edge::Implicit(_) => EdgeKind::Implicit,
        }
    }

    /// Implicit edges carry no flags; they report the empty set.
    pub fn flags(&self) -> EdgeFlags {
        match self {
            Edge::Single(edge) => edge.flags,
            Edge::Collection(edge) => edge.flags,
            Edge::Implicit(_) => EdgeFlags::empty(),
        }
    }

    pub fn has_flag(&self, flag: EdgeFlag) -> bool {
        self.flags().contains(flag)
    }

    pub(crate) fn flags_mut(&mut self) -> Option<&mut EdgeFlags> {
        match self {
            Edge::Single(edge) => Some(&mut edge.flags),
            Edge::Collection(edge) => Some(&mut edge.flags),
            Edge::Implicit(_) => None,
        }
    }

    pub(crate) fn set_meta(&mut self, meta: Value) {
        match self {
            Edge::Single(edge) => edge.meta = Some(meta),
            Edge::Collection(edge) => edge.meta = Some(meta),
            Edge::Implicit(_) => {}
        }
    }

    /// Store new links, returning the previous ones.
    pub(crate) fn set_links(&mut self, links: Links) -> Option<Links> {
        match self {
            Edge::Single(edge) => edge.links.replace(links),
            Edge::Collection(edge) => edge.links.replace(links),
            Edge::Implicit(_) => None,
        }
    }

    pub(crate) fn set_flag(&mut self, flag: EdgeFlag, on: bool) {
        if let Some(flags) = self.flags_mut() {
            if on {
                flags.insert(flag);
            } else {
                flags.remove(flag);
            }
        }
    }

    pub fn meta(&self) -> Option<&Value> {
        match self {
            Edge::Single(edge) => edge.meta.as_ref(),
            Edge::Collection(edge) => edge.meta.as_ref(),
            Edge::Implicit(_) => None,
        }
    }

    pub fn links(&self) -> Option<&Links> {
        match self {
            Edge::Single(edge) => edge.links.as_ref(),
            Edge::Collection(edge) => edge.links.as_ref(),
            Edge::Implicit(_) => None,
        }
    }

    pub fn transaction_ref(&self) -> u64 {
        match self {
            Edge::Single(edge) => edge.transaction_ref,
            Edge::Collection(edge) => edge.transaction_ref,
            Edge::Implicit(_) => 0,
        }
    }

    pub(crate) fn set_transaction_ref(&mut self, transaction: u64) {
        match self {
            Edge::Single(edge) => edge.transaction_ref = transaction,
            Edge::Collection(edge) => edge.transaction_ref = transaction,
            Edge::Implicit(_) => {}
        }
    }

    /// Every key this edge references in either view.
    pub fn related(&self) -> BTreeSet<ResourceKey> {
        let mut related = BTreeSet::new();
        match self {
            Edge::Single(edge) => {
                related.extend(edge.local_state.iter().cloned());
                related.extend(edge.remote_state.iter().cloned());
            }
            Edge::Collection(edge) => {
                related.extend(edge.local_state.iter().cloned());
                related.extend(edge.remote_members.iter().cloned());
            }
            Edge::Implicit(edge) => {
                related.extend(edge.local_members.iter().cloned());
                related.extend(edge.remote_members.iter().cloned());
            }
        }
        related
    }

    pub fn local_related(&self) -> Vec<ResourceKey> {
        match self {
            Edge::Single(edge) => edge.local_state.iter().cloned().collect(),
            Edge::Collection(edge) => edge.local_state.clone(),
            Edge::Implicit(edge) => edge.local_members.iter().cloned().collect(),
        }
    }

    pub fn remote_related(&self) -> Vec<ResourceKey> {
        match self {
            Edge::Single(edge) => edge.remote_state.iter().cloned().collect(),
            Edge::Collection(edge) => edge.remote_state.clone(),
            Edge::Implicit(edge) => edge.remote_members.iter().cloned().collect(),
        }
    }

    /// True when either view references anything.
    pub fn holds_data(&self) -> bool {
        match self {
            Edge::Single(edge) => edge.local_state.is_some() || edge.remote_state.is_some(),
            Edge::Collection(edge) => {
                !edge.local_state.is_empty() || !edge.remote_state.is_empty()
            }
            Edge::Implicit(edge) => {
                !edge.local_members.is_empty() || !edge.remote_members.is_empty()
            }
        }
    }

    /// Reset both views, as when a resource's data is thrown away.
    pub(crate) fn clear(&mut self) {
        match self {
            Edge::Single(edge) => {
                edge.local_state = None;
                edge.remote_state = None;
                edge.flags.remove(EdgeFlag::HasReceivedData);
                edge.flags.insert(EdgeFlag::IsEmpty);
            }
            Edge::Collection(edge) => {
                edge.local_state.clear();
                edge.remote_state.clear();
                edge.remote_members.clear();
                edge.additions = None;
                edge.removals = None;
                edge.is_dirty = false;
                edge.flags.remove(EdgeFlag::HasReceivedData);
                edge.flags.insert(EdgeFlag::IsEmpty);
            }
            Edge::Implicit(edge) => {
                edge.local_members.clear();
                edge.remote_members.clear();
            }
        }
    }

    pub(crate) fn replace_key(&mut self, from: &ResourceKey, into: &ResourceKey) -> bool {
        fn swap_seq(seq: &mut Vec<ResourceKey>, from: &ResourceKey, into: &ResourceKey) -> bool {
            let Some(index) = seq.iter().position(|k| k == from) else {
                return false;
            };
            if seq.contains(into) {
                seq.remove(index);
            } else {
                seq[index] = into.clone();
            }
            true
        }
        fn swap_set(set: &mut BTreeSet<ResourceKey>, from: &ResourceKey, into: &ResourceKey) -> bool {
            if set.remove(from) {
                set.insert(into.clone());
                true
            } else {
                false
            }
        }
        match self {
            Edge::Single(edge) => {
                let mut changed = false;
                if edge.remote_state.as_ref() == Some(from) {
                    edge.remote_state = Some(into.clone());
                    changed = true;
                }
                if edge.local_state.as_ref() == Some(from) {
                    edge.local_state = Some(into.clone());
                    changed = true;
                }
                changed
            }
            Edge::Collection(edge) => {
                let remote = swap_seq(&mut edge.remote_state, from, into);
                if remote {
                    edge.remote_members = edge.remote_state.iter().cloned().collect();
                }
                let local = swap_seq(&mut edge.local_state, from, into);
                edge.refresh_deltas();
                remote || local
            }
            Edge::Implicit(edge) => {
                let local = swap_set(&mut edge.local_members, from, into);
                let remote = swap_set(&mut edge.remote_members, from, into);
                local || remote
            }
        }
    }

    /// Fold the edge of a merged-away key into this one. The kept remote state wins, the moved
    /// edge's members are appended where they are missing and its local changes are carried over.
    /// Returns true when the local view changed.
    pub(crate) fn absorb(&mut self, moved: Edge) -> bool {
        match (self, moved) {
            (Edge::Single(kept), Edge::Single(moved)) => {
                let old_local = kept.local_state.clone();
                let kept_diverged = kept.local_state != kept.remote_state;
                let moved_diverged = moved.local_state != moved.remote_state;
                let remote = kept.remote_state.take().or(moved.remote_state);
                kept.local_state = if moved_diverged {
                    moved.local_state
                } else if kept_diverged {
                    kept.local_state.take()
                } else {
                    remote.clone()
                };
                kept.remote_state = remote;
                kept.flags |= moved.flags & EdgeFlag::HasReceivedData;
                kept.flags.set_empty(kept.local_state.is_none());
                kept.meta = kept.meta.take().or(moved.meta);
                kept.links = kept.links.take().or(moved.links);
                kept.local_state != old_local
            }
            (Edge::Collection(kept), Edge::Collection(moved)) => {
                let old_local = kept.local_state.clone();
                let mut remote_state = kept.remote_state.clone();
                for key in moved.remote_state.iter() {
                    if !kept.remote_members.contains(key) && !remote_state.contains(key) {
                        remote_state.push(key.clone());
                    }
                }
                let mut additions = kept.additions.clone().unwrap_or_default();
                additions.extend(moved.additions.iter().flatten().cloned());
                let mut removals = kept.removals.clone().unwrap_or_default();
                removals.extend(moved.removals.iter().flatten().cloned());

                let local_state = kept.rebase_local(&remote_state, &removals, &additions);
                kept.set_remote(remote_state);
                kept.local_state = local_state;
                kept.refresh_deltas();
                kept.is_dirty |= moved.is_dirty;
                kept.accessed |= moved.accessed;
                kept.flags |= moved.flags & EdgeFlag::HasReceivedData;
                kept.flags.set_empty(kept.local_state.is_empty());
                kept.meta = kept.meta.take().or(moved.meta);
                kept.links = kept.links.take().or(moved.links);
                kept.local_state != old_local
            }
            (Edge::Implicit(kept), Edge::Implicit(moved)) => {
                kept.local_members.extend(moved.local_members);
                kept.remote_members.extend(moved.remote_members);
                false
            }
            _ => false,
        }
    }
}
