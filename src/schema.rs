// Schema registry for relationship field definitions
//
// The graph never reads schema metadata directly; it asks a [SchemaSource] once per
// (resource type, field) and caches the resulting [EdgeDefinition].

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt::{Display, Formatter},
    sync::Arc,
};

use crate::{config::GraphConfig, error::TetherError};

/// Prefix of the synthetic field name used on a target type to track references from a field that
/// declares no inverse.
pub const IMPLICIT_KEY_PREFIX: &str = "__implicit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Holds at most one related resource (belongs-to-like).
    Single,
    /// Holds an ordered sequence of related resources (has-many-like).
    Collection,
    /// Bookkeeping-only inverse of a field that declares no inverse.
    Implicit,
}

impl Display for EdgeKind {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            EdgeKind::Single => write!(f, "single"),
            EdgeKind::Collection => write!(f, "collection"),
            EdgeKind::Implicit => write!(f, "implicit"),
        }
    }
}

/// A relationship field as declared by the schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub kind: EdgeKind,
    /// The declared type of the related resource(s).
    pub resource_type: String,
    /// The field on `resource_type` pointing back at us, if any.
    pub inverse: Option<String>,
    #[serde(default)]
    pub is_async: bool,
    #[serde(default)]
    pub is_polymorphic: bool,
    /// Overrides [GraphConfig::reset_on_remote_update] for this field.
    #[serde(default)]
    pub reset_on_remote_update: Option<bool>,
}

impl FieldSchema {
    pub fn single<N: Into<String>, T: Into<String>>(name: N, resource_type: T) -> Self {
        FieldSchema {
            name: name.into(),
            kind: EdgeKind::Single,
            resource_type: resource_type.into(),
            inverse: None,
            is_async: false,
            is_polymorphic: false,
            reset_on_remote_update: None,
        }
    }

    pub fn collection<N: Into<String>, T: Into<String>>(name: N, resource_type: T) -> Self {
        FieldSchema {
            kind: EdgeKind::Collection,
            ..FieldSchema::single(name, resource_type)
        }
    }

    pub fn inverse<I: Into<String>>(mut self, inverse: I) -> Self {
        self.inverse = Some(inverse.into());
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }

    pub fn polymorphic(mut self) -> Self {
        self.is_polymorphic = true;
        self
    }

    pub fn reset_on_remote_update(mut self, reset: bool) -> Self {
        self.reset_on_remote_update = Some(reset);
        self
    }
}

/// All relationship fields of one resource type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub fields: Vec<FieldSchema>,
}

impl SchemaDefinition {
    pub fn new(fields: Vec<FieldSchema>) -> Self {
        SchemaDefinition { fields }
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Supplies relationship field definitions to the graph.
pub trait SchemaSource {
    fn relationship_definition(&self, resource_type: &str, field: &str) -> Option<FieldSchema>;
}

/// Thread-safe registry for schema definitions
///
/// Maps resource types to their relationship fields. Cheap to clone; every clone shares the same
/// table.
pub struct SchemaRegistry(Arc<RwLock<HashMap<String, Arc<SchemaDefinition>>>>);

impl Clone for SchemaRegistry {
    fn clone(&self) -> Self {
        SchemaRegistry(self.0.clone())
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        SchemaRegistry::create()
    }
}

impl SchemaRegistry {
    pub fn create() -> Self {
        SchemaRegistry(Arc::new(RwLock::new(HashMap::new())))
    }

    /// Register a schema definition
    ///
    /// If a schema for this type already exists, it will be overwritten and a log message emitted.
    pub fn register<T: Into<String>>(&self, resource_type: T, definition: SchemaDefinition) {
        let resource_type = resource_type.into();
        let mut writer = self.0.write();

        if writer.contains_key(&resource_type) {
            tracing::info!(
                "[SchemaRegistry::register] Overwriting existing schema: {}",
                resource_type
            );
        }

        writer.insert(resource_type, Arc::new(definition));
    }

    /// Retrieve a schema definition by resource type
    ///
    /// Returns a cheap Arc clone if the schema exists.
    pub fn get(&self, resource_type: &str) -> Option<Arc<SchemaDefinition>> {
        self.0.read().get(resource_type).cloned()
    }

    /// List all registered resource types
    pub fn list_schemas(&self) -> Vec<String> {
        let reader = self.0.read();
        reader.keys().cloned().collect()
    }
}

impl SchemaSource for SchemaRegistry {
    fn relationship_definition(&self, resource_type: &str, field: &str) -> Option<FieldSchema> {
        self.get(resource_type)
            .and_then(|definition| definition.field(field).cloned())
    }
}

/// The graph-side view of a relationship field, shared by every edge of the same shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDefinition {
    /// The field name on `owner_type`.
    pub key: String,
    pub kind: EdgeKind,
    pub owner_type: String,
    /// The declared type of the related resource(s).
    pub resource_type: String,
    /// The declared inverse field, `None` when the inverse is implicit.
    pub inverse_key: Option<String>,
    /// The field name used on the related resource when `inverse_key` is `None`.
    pub implicit_key: String,
    pub inverse_kind: EdgeKind,
    pub inverse_is_async: bool,
    pub is_async: bool,
    pub is_polymorphic: bool,
    pub is_collection: bool,
    pub reset_on_remote_update: bool,
}

impl EdgeDefinition {
    /// The field on the related resource that mirrors this one.
    pub fn inverse_field(&self) -> &str {
        self.inverse_key.as_deref().unwrap_or(&self.implicit_key)
    }

    pub fn inverse_is_implicit(&self) -> bool {
        self.inverse_key.is_none()
    }

    pub fn is_implicit(&self) -> bool {
        self.kind == EdgeKind::Implicit
    }

    /// Combine a declared field with its (optional) declared inverse.
    pub fn upgrade(
        owner_type: &str,
        field: &FieldSchema,
        inverse: Option<&FieldSchema>,
        config: &GraphConfig,
    ) -> Result<EdgeDefinition, TetherError> {
        if field.kind == EdgeKind::Implicit {
            return Err(TetherError::SchemaMismatch {
                resource_type: owner_type.to_string(),
                field: field.name.clone(),
                reason: "implicit relationships cannot be declared".to_string(),
            });
        }
        let (inverse_kind, inverse_is_async) = match (&field.inverse, inverse) {
            (None, _) => (EdgeKind::Implicit, false),
            (Some(inverse_name), None) => {
                return Err(TetherError::schema_missing(
                    field.resource_type.clone(),
                    inverse_name.clone(),
                ));
            }
            (Some(_), Some(inverse)) => {
                if inverse.inverse.as_deref() != Some(field.name.as_str()) {
                    return Err(TetherError::SchemaMismatch {
                        resource_type: owner_type.to_string(),
                        field: field.name.clone(),
                        reason: format!(
                            "inverse <{}>.{} points back at {:?}",
                            field.resource_type, inverse.name, inverse.inverse
                        ),
                    });
                }
                if !field.is_polymorphic && !inverse.is_polymorphic {
                    if inverse.resource_type != owner_type {
                        return Err(TetherError::SchemaMismatch {
                            resource_type: owner_type.to_string(),
                            field: field.name.clone(),
                            reason: format!(
                                "inverse <{}>.{} expects '{}' resources",
                                field.resource_type, inverse.name, inverse.resource_type
                            ),
                        });
                    }
                }
                (inverse.kind, inverse.is_async)
            }
        };
        Ok(EdgeDefinition {
            key: field.name.clone(),
            kind: field.kind,
            owner_type: owner_type.to_string(),
            resource_type: field.resource_type.clone(),
            inverse_key: field.inverse.clone(),
            implicit_key: implicit_key(owner_type, &field.name),
            inverse_kind,
            inverse_is_async,
            is_async: field.is_async,
            is_polymorphic: field.is_polymorphic,
            is_collection: field.kind == EdgeKind::Collection,
            reset_on_remote_update: field
                .reset_on_remote_update
                .unwrap_or(config.reset_on_remote_update),
        })
    }

    /// The definition of the bookkeeping edge a holder type keeps for `field_owner.field`.
    pub fn implicit(holder_type: &str, key: &str) -> Option<EdgeDefinition> {
        let (field_owner, field) = parse_implicit_key(key)?;
        Some(EdgeDefinition {
            key: key.to_string(),
            kind: EdgeKind::Implicit,
            owner_type: holder_type.to_string(),
            resource_type: field_owner.to_string(),
            inverse_key: Some(field.to_string()),
            implicit_key: key.to_string(),
            inverse_kind: EdgeKind::Single,
            inverse_is_async: false,
            is_async: false,
            is_polymorphic: true,
            is_collection: true,
            reset_on_remote_update: false,
        })
    }
}

pub fn implicit_key(owner_type: &str, field: &str) -> String {
    format!("{IMPLICIT_KEY_PREFIX}:{owner_type}:{field}")
}

/// Split an implicit key into the (type, field) whose references it tracks.
pub fn parse_implicit_key(key: &str) -> Option<(&str, &str)> {
    let rest = key.strip_prefix(IMPLICIT_KEY_PREFIX)?.strip_prefix(':')?;
    rest.split_once(':')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blog_registry() -> SchemaRegistry {
        let registry = SchemaRegistry::create();
        registry.register(
            "post",
            SchemaDefinition::new(vec![
                FieldSchema::collection("comments", "comment").inverse("post"),
                FieldSchema::single("author", "user"),
            ]),
        );
        registry.register(
            "comment",
            SchemaDefinition::new(vec![FieldSchema::single("post", "post").inverse("comments")]),
        );
        registry
    }

    #[test]
    fn test_schema_registration() {
        let registry = blog_registry();
        assert!(registry.get("post").is_some());
        assert!(registry.get("user").is_none());
        assert_eq!(
            registry
                .relationship_definition("comment", "post")
                .map(|f| f.kind),
            Some(EdgeKind::Single)
        );
        assert!(registry.relationship_definition("comment", "author").is_none());
    }

    #[test]
    fn test_schema_overwrite() {
        let registry = blog_registry();
        registry.register(
            "post",
            SchemaDefinition::new(vec![FieldSchema::single("author", "user")]),
        );
        let retrieved = registry.get("post").unwrap();
        assert_eq!(retrieved.fields.len(), 1);
        assert!(registry.relationship_definition("post", "comments").is_none());
    }

    #[test]
    fn test_arc_clone_cheap() {
        let registry = blog_registry();
        let schema1 = registry.get("post").unwrap();
        let schema2 = registry.clone().get("post").unwrap();
        assert!(Arc::ptr_eq(&schema1, &schema2));
        let mut schemas = registry.list_schemas();
        schemas.sort();
        assert_eq!(schemas, vec!["comment".to_string(), "post".to_string()]);
    }

    #[test]
    fn test_upgrade_with_declared_inverse() {
        let registry = blog_registry();
        let field = registry.relationship_definition("post", "comments").unwrap();
        let inverse = registry.relationship_definition("comment", "post");
        let def =
            EdgeDefinition::upgrade("post", &field, inverse.as_ref(), &GraphConfig::default())
                .unwrap();
        assert_eq!(def.kind, EdgeKind::Collection);
        assert!(def.is_collection);
        assert_eq!(def.inverse_field(), "post");
        assert_eq!(def.inverse_kind, EdgeKind::Single);
        assert!(!def.inverse_is_implicit());
    }

    #[test]
    fn test_upgrade_without_inverse_is_implicit() {
        let field = FieldSchema::single("author", "user");
        let def = EdgeDefinition::upgrade("post", &field, None, &GraphConfig::default()).unwrap();
        assert!(def.inverse_is_implicit());
        assert_eq!(def.inverse_kind, EdgeKind::Implicit);
        assert_eq!(def.inverse_field(), "__implicit:post:author");

        let implicit = EdgeDefinition::implicit("user", def.inverse_field()).unwrap();
        assert_eq!(implicit.kind, EdgeKind::Implicit);
        assert_eq!(implicit.resource_type, "post");
        assert_eq!(implicit.inverse_field(), "author");
    }

    #[test]
    fn test_upgrade_rejects_mismatched_inverse() {
        let field = FieldSchema::single("post", "post").inverse("comments");
        let wrong = FieldSchema::collection("comments", "comment").inverse("parent");
        let err = EdgeDefinition::upgrade("comment", &field, Some(&wrong), &GraphConfig::default())
            .unwrap_err();
        assert!(matches!(err, TetherError::SchemaMismatch { .. }));

        let err =
            EdgeDefinition::upgrade("comment", &field, None, &GraphConfig::default()).unwrap_err();
        assert!(matches!(err, TetherError::SchemaMissing { .. }));
    }

    #[test]
    fn test_reset_on_remote_update_defaults_from_config() {
        let field = FieldSchema::single("author", "user");
        let config = GraphConfig {
            reset_on_remote_update: true,
            ..GraphConfig::default()
        };
        assert!(
            EdgeDefinition::upgrade("post", &field, None, &config)
                .unwrap()
                .reset_on_remote_update
        );
        let pinned = field.reset_on_remote_update(false);
        assert!(
            !EdgeDefinition::upgrade("post", &pinned, None, &config)
                .unwrap()
                .reset_on_remote_update
        );
    }

    #[test]
    fn test_parse_implicit_key() {
        assert_eq!(
            parse_implicit_key("__implicit:post:author"),
            Some(("post", "author"))
        );
        assert_eq!(parse_implicit_key("author"), None);
    }

    #[test]
    fn test_registry_is_shared_across_threads() {
        let registry = SchemaRegistry::create();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let resource_type = format!("type{i}");
                    registry.register(
                        resource_type.clone(),
                        SchemaDefinition::new(vec![FieldSchema::single("owner", "post")]),
                    );
                    registry.get(&resource_type).is_some()
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        let mut types = registry.list_schemas();
        types.sort();
        assert_eq!(types, vec!["type0", "type1", "type2", "type3"]);
    }
}
