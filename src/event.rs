use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    sync::mpsc::Sender,
};

use crate::{error::TetherError, identity::ResourceKey};

/// Indicates whether an operation carries a local (optimistic, not yet persisted) mutation or a
/// remote (canonical, server-confirmed) update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EventOrigin {
    /// A client-side mutation. Only `local_state` is changed.
    #[default]
    Local,

    /// Canonical truth from an external source. `remote_state` is changed and `local_state`
    /// follows it unless a local mutation is pending.
    Remote,
}

impl EventOrigin {
    pub fn is_remote(&self) -> bool {
        matches!(self, EventOrigin::Remote)
    }
}

impl From<bool> for EventOrigin {
    fn from(is_remote: bool) -> Self {
        if is_remote {
            EventOrigin::Remote
        } else {
            EventOrigin::Local
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    /// The observable value of (resource, field) changed.
    RelationshipChanged { key: ResourceKey, field: String },
    /// `from` was merged into `into`; every edge referencing `from` now references `into`.
    IdentityMerged { from: ResourceKey, into: ResourceKey },
}

impl GraphEvent {
    pub fn key(&self) -> &ResourceKey {
        match self {
            GraphEvent::RelationshipChanged { key, .. } => key,
            GraphEvent::IdentityMerged { into, .. } => into,
        }
    }
}

impl Display for GraphEvent {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            GraphEvent::RelationshipChanged { key, field } => {
                write!(f, "RelationshipChanged({key}.{field})")
            }
            GraphEvent::IdentityMerged { from, into } => {
                write!(f, "IdentityMerged({from} -> {into})")
            }
        }
    }
}

/// The hook the graph calls once per net-changed field per operation.
pub trait Notifier {
    fn notify(&self, event: GraphEvent) -> Result<(), TetherError>;
}

impl Notifier for Sender<GraphEvent> {
    fn notify(&self, event: GraphEvent) -> Result<(), TetherError> {
        Ok(self.send(event)?)
    }
}

/// Adapts a closure into a [Notifier].
pub struct FnNotifier<F>(pub F);

impl<F> Notifier for FnNotifier<F>
where
    F: Fn(&GraphEvent),
{
    fn notify(&self, event: GraphEvent) -> Result<(), TetherError> {
        (self.0)(&event);
        Ok(())
    }
}

/// Discards every event. Useful when nothing observes the graph (benchmarks, bulk loads).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: GraphEvent) -> Result<(), TetherError> {
        Ok(())
    }
}
