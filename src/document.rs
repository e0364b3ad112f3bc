//! The relationship document: the `{data?, links?, meta?}` shape a relationship is pushed in and
//! read out as.
//!
//! `data` distinguishes "absent" from "null": an absent member deserializes to `None`, an explicit
//! `null` to `Some(RelationshipData::Null)`.
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::identity::{ResourceKey, ResourceRef};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipData<T = ResourceRef> {
    Many(Vec<T>),
    One(T),
    Null,
}

impl<T> RelationshipData<T> {
    pub fn is_empty(&self) -> bool {
        match self {
            RelationshipData::Many(items) => items.is_empty(),
            RelationshipData::One(_) => false,
            RelationshipData::Null => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LinkValue {
    Href(String),
    Object {
        href: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<Value>,
    },
}

impl LinkValue {
    pub fn href(&self) -> &str {
        match self {
            LinkValue::Href(href) => href,
            LinkValue::Object { href, .. } => href,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<LinkValue>,
    #[serde(default, rename = "self", skip_serializing_if = "Option::is_none")]
    pub self_link: Option<LinkValue>,
}

impl Links {
    pub fn related<S: Into<String>>(href: S) -> Self {
        Links {
            related: Some(LinkValue::Href(href.into())),
            self_link: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize",
    deserialize = "T: Deserialize<'de>"
))]
pub struct RelationshipDocument<T = ResourceRef> {
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<RelationshipData<T>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl<T> Default for RelationshipDocument<T> {
    fn default() -> Self {
        RelationshipDocument {
            data: None,
            links: None,
            meta: None,
        }
    }
}

impl<T> RelationshipDocument<T> {
    pub fn with_data(data: RelationshipData<T>) -> Self {
        RelationshipDocument {
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn with_links(links: Links) -> Self {
        RelationshipDocument {
            links: Some(links),
            ..Default::default()
        }
    }
}

impl RelationshipDocument<ResourceKey> {
    /// The wire form of a document read out of the graph.
    pub fn to_refs(&self) -> RelationshipDocument<ResourceRef> {
        RelationshipDocument {
            data: self.data.as_ref().map(|data| match data {
                RelationshipData::Many(keys) => {
                    RelationshipData::Many(keys.iter().map(ResourceKey::to_ref).collect())
                }
                RelationshipData::One(key) => RelationshipData::One(key.to_ref()),
                RelationshipData::Null => RelationshipData::Null,
            }),
            links: self.links.clone(),
            meta: self.meta.clone(),
        }
    }
}

/// Wraps any present value, `null` included, in `Some`. Paired with `#[serde(default)]` so an
/// absent member stays `None`.
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}
