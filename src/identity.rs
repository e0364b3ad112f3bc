//! [crate::identity] contains the stable identity handles edges are keyed by, and an in-memory
//! [IdentityResolver] that allocates them and detects when two of them turn out to denote the
//! same resource.
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
    fmt::{self, Debug, Display, Formatter},
    hash::{Hash, Hasher},
    sync::Arc,
};
use uuid::Uuid;

use crate::error::TetherError;

/// Node bytes mixed into every [Lid]. Lids only need to be unique within one process, the
/// timestamp and clock sequence carry that uniqueness.
const LID_NODE: [u8; 6] = *b"tether";

/// Local ID
///
/// A v6 UUID allocated for every [ResourceKey]. Because v6 UUIDs sort by generation time, keys
/// order by allocation, which keeps set iteration deterministic within a process.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Lid(Uuid);

impl Lid {
    pub fn new() -> Self {
        Lid(Uuid::now_v6(&LID_NODE))
    }
}

impl Default for Lid {
    fn default() -> Self {
        Lid::new()
    }
}

impl TryFrom<&str> for Lid {
    type Error = TetherError;

    fn try_from(string: &str) -> Result<Self, Self::Error> {
        Ok(Lid(Uuid::parse_str(string)?))
    }
}

impl Display for Lid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.0.hyphenated().encode_lower(&mut Uuid::encode_buffer())
        )
    }
}

struct KeyRecord {
    lid: Lid,
    resource_type: String,
    id: RwLock<Option<String>>,
}

/// Opaque, stable identity of one logical resource.
///
/// Equality is identity equality: two keys allocated separately are different even when they
/// carry the same type and id, until an [IdentityMerge] folds one into the other. Cloning is an
/// `Arc` clone.
#[derive(Clone)]
pub struct ResourceKey(Arc<KeyRecord>);

impl ResourceKey {
    pub fn new<T: Into<String>>(resource_type: T, id: Option<String>) -> Self {
        ResourceKey(Arc::new(KeyRecord {
            lid: Lid::new(),
            resource_type: resource_type.into(),
            id: RwLock::new(id),
        }))
    }

    pub fn lid(&self) -> Lid {
        self.0.lid
    }

    pub fn resource_type(&self) -> &str {
        &self.0.resource_type
    }

    pub fn id(&self) -> Option<String> {
        self.0.id.read().clone()
    }

    /// A key without an id has never been persisted.
    pub fn is_new(&self) -> bool {
        self.0.id.read().is_none()
    }

    /// Record the id a persisted resource was assigned. Assigning the same id twice is a no-op,
    /// re-assigning a different one is an error.
    pub fn assign_id<S: Into<String>>(&self, id: S) -> Result<(), TetherError> {
        let id = id.into();
        let mut current = self.0.id.write();
        match current.as_ref() {
            Some(existing) if *existing != id => Err(TetherError::InvalidPayload {
                resource_type: self.0.resource_type.clone(),
                field: "id".to_string(),
                reason: format!("resource {} already has id '{existing}'", self.0.lid),
            }),
            _ => {
                *current = Some(id);
                Ok(())
            }
        }
    }

    pub fn to_ref(&self) -> ResourceRef {
        ResourceRef {
            resource_type: self.0.resource_type.clone(),
            id: self.id(),
            lid: Some(self.0.lid.to_string()),
        }
    }
}

impl PartialEq for ResourceKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.lid == other.0.lid
    }
}

impl Eq for ResourceKey {}

impl Hash for ResourceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.lid.hash(state);
    }
}

impl PartialOrd for ResourceKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ResourceKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.lid.cmp(&other.0.lid)
    }
}

impl Debug for ResourceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceKey")
            .field("type", &self.0.resource_type)
            .field("id", &self.id())
            .field("lid", &self.0.lid)
            .finish()
    }
}

impl Display for ResourceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.id() {
            Some(id) => write!(f, "{}:{}", self.0.resource_type, id),
            None => write!(f, "{}:@{}", self.0.resource_type, self.0.lid),
        }
    }
}

/// A raw reference to a resource as it appears in a relationship payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lid: Option<String>,
}

impl ResourceRef {
    pub fn new<T: Into<String>, I: Into<String>>(resource_type: T, id: I) -> Self {
        ResourceRef {
            resource_type: resource_type.into(),
            id: Some(id.into()),
            lid: None,
        }
    }
}

/// Two keys found to denote one resource. `from` is abandoned, `into` is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityMerge {
    pub from: ResourceKey,
    pub into: ResourceKey,
}

/// Allocates stable keys for raw references.
pub trait IdentityResolver {
    fn resolve_or_create(&self, reference: &ResourceRef) -> Result<ResourceKey, TetherError>;

    /// Merges detected since the last call. The graph drains these after resolving payload
    /// references and applies each one as a merge operation.
    fn drain_merges(&self) -> Vec<IdentityMerge> {
        Vec::new()
    }

    /// Hand back drained merges the graph could not apply. They come first in the next drain.
    fn requeue_merges(&self, _merges: Vec<IdentityMerge>) {}
}

#[derive(Default)]
struct KeyCacheInner {
    by_lid: HashMap<String, ResourceKey>,
    by_id: HashMap<(String, String), ResourceKey>,
    materialized: HashSet<Lid>,
    pending_merges: Vec<IdentityMerge>,
}

/// In-memory [IdentityResolver].
///
/// Cheap to clone; all clones share one cache, so a host can keep a handle while the graph holds
/// another.
#[derive(Clone, Default)]
pub struct KeyCache(Arc<RwLock<KeyCacheInner>>);

impl KeyCache {
    pub fn new() -> Self {
        KeyCache::default()
    }

    /// Allocate a key for a resource created on the client, which has no id yet.
    pub fn create_local<T: Into<String>>(&self, resource_type: T) -> ResourceKey {
        let key = ResourceKey::new(resource_type, None);
        self.0
            .write()
            .by_lid
            .insert(key.lid().to_string(), key.clone());
        key
    }

    /// Look up a reference without allocating.
    pub fn peek(&self, reference: &ResourceRef) -> Option<ResourceKey> {
        let inner = self.0.read();
        if let Some(key) = reference.lid.as_ref().and_then(|lid| inner.by_lid.get(lid)) {
            return Some(key.clone());
        }
        reference.id.as_ref().and_then(|id| {
            inner
                .by_id
                .get(&(reference.resource_type.clone(), id.clone()))
                .cloned()
        })
    }

    /// Mark a key as backing a live consumer (a materialized record). Merging two materialized
    /// keys is refused.
    pub fn mark_materialized(&self, key: &ResourceKey) {
        self.0.write().materialized.insert(key.lid());
    }

    pub fn is_materialized(&self, key: &ResourceKey) -> bool {
        self.0.read().materialized.contains(&key.lid())
    }

    /// Assign the persisted id to `key`. If another key already owns that id, the two are merged
    /// and the merge is both returned and queued for [IdentityResolver::drain_merges].
    pub fn update_id<S: Into<String>>(
        &self,
        key: &ResourceKey,
        id: S,
    ) -> Result<Option<IdentityMerge>, TetherError> {
        let id = id.into();
        let mut inner = self.0.write();
        let index = (key.resource_type().to_string(), id.clone());
        let existing = inner.by_id.get(&index).cloned();
        match existing {
            Some(existing) if existing != *key => {
                let merge = merge_keys(&mut inner, key, &existing, &id)?;
                inner.pending_merges.push(merge.clone());
                Ok(Some(merge))
            }
            _ => {
                key.assign_id(id)?;
                inner.by_id.insert(index, key.clone());
                inner.by_lid.insert(key.lid().to_string(), key.clone());
                Ok(None)
            }
        }
    }

    /// Drop every index entry pointing at `key`.
    pub fn forget(&self, key: &ResourceKey) {
        let mut inner = self.0.write();
        inner.by_lid.retain(|_, k| k != key);
        inner.by_id.retain(|_, k| k != key);
        inner.materialized.remove(&key.lid());
    }

    pub fn len(&self) -> usize {
        let inner = self.0.read();
        inner.by_lid.values().collect::<HashSet<_>>().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decide which of two colliding keys survives. The key that already owns the id is kept unless
/// only the other one is materialized.
fn merge_keys(
    inner: &mut KeyCacheInner,
    candidate: &ResourceKey,
    owner: &ResourceKey,
    id: &str,
) -> Result<IdentityMerge, TetherError> {
    let candidate_live = inner.materialized.contains(&candidate.lid());
    let owner_live = inner.materialized.contains(&owner.lid());
    if candidate_live && owner_live {
        return Err(TetherError::MergeConflict {
            from: candidate.to_string(),
            into: owner.to_string(),
            reason: "both resources are materialized".to_string(),
        });
    }
    let (from, into) = if candidate_live {
        (owner.clone(), candidate.clone())
    } else {
        (candidate.clone(), owner.clone())
    };
    into.assign_id(id)?;
    tracing::debug!("[KeyCache] merging {} into {}", from, into);
    for alias in inner.by_lid.values_mut() {
        if *alias == from {
            *alias = into.clone();
        }
    }
    inner
        .by_id
        .insert((into.resource_type().to_string(), id.to_string()), into.clone());
    inner.materialized.remove(&from.lid());
    Ok(IdentityMerge { from, into })
}

impl IdentityResolver for KeyCache {
    fn resolve_or_create(&self, reference: &ResourceRef) -> Result<ResourceKey, TetherError> {
        if reference.id.is_none() && reference.lid.is_none() {
            return Err(TetherError::InvalidPayload {
                resource_type: reference.resource_type.clone(),
                field: "data".to_string(),
                reason: "a resource reference needs an id or a lid".to_string(),
            });
        }

        if let Some(key) = reference
            .lid
            .as_ref()
            .and_then(|lid| self.0.read().by_lid.get(lid).cloned())
        {
            if let Some(id) = &reference.id {
                if key.id().as_deref() != Some(id.as_str()) {
                    let merge = self.update_id(&key, id.clone())?;
                    return Ok(merge.map(|m| m.into).unwrap_or(key));
                }
            }
            return Ok(key);
        }

        if let Some(key) = self.peek(reference) {
            if let Some(lid) = &reference.lid {
                self.0.write().by_lid.insert(lid.clone(), key.clone());
            }
            return Ok(key);
        }

        let key = ResourceKey::new(reference.resource_type.clone(), reference.id.clone());
        let mut inner = self.0.write();
        inner.by_lid.insert(key.lid().to_string(), key.clone());
        if let Some(lid) = &reference.lid {
            inner.by_lid.insert(lid.clone(), key.clone());
        }
        if let Some(id) = &reference.id {
            inner
                .by_id
                .insert((reference.resource_type.clone(), id.clone()), key.clone());
        }
        Ok(key)
    }

    fn drain_merges(&self) -> Vec<IdentityMerge> {
        std::mem::take(&mut self.0.write().pending_merges)
    }

    fn requeue_merges(&self, mut merges: Vec<IdentityMerge>) {
        let mut inner = self.0.write();
        merges.append(&mut inner.pending_merges);
        inner.pending_merges = merges;
    }
}
