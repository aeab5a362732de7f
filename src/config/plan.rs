//! Clone plans: which tables exist and how they are copied, reconciled and deduplicated

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use crate::engine::{AssociationDescriptor, CollectionSpec, Engine, ForeignKeyRef, LookupSpec};
use crate::error::ConfigurationError;
use crate::repository::{EntityKind, RepositoryRegistry, TableSchema};
use crate::transaction::TransactionCoordinator;

/// A complete description of one entity graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClonePlan {
    pub root: TableSchema,
    #[serde(default)]
    pub tables: Vec<TableSchema>,
    /// Clone order; disassociation walks it backwards
    pub associations: Vec<AssociationDescriptor>,
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionSpec>,
    #[serde(default)]
    pub lookups: BTreeMap<String, LookupSpec>,
}

impl ClonePlan {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let plan: ClonePlan = toml::from_str(raw).context("Failed to parse clone plan")?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn load(path: &Path) -> Result<Self> {
        log::debug!("Loading clone plan from: {:?}", path);
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read clone plan: {:?}", path))?;
        Self::from_toml_str(&raw).with_context(|| format!("Invalid clone plan: {:?}", path))
    }

    pub fn root_kind(&self) -> &EntityKind {
        &self.root.kind
    }

    fn schema(&self, kind: &EntityKind) -> Option<&TableSchema> {
        std::iter::once(&self.root)
            .chain(&self.tables)
            .find(|schema| &schema.kind == kind)
    }

    fn require_column(&self, kind: &EntityKind, column: &str) -> Result<()> {
        let schema = self
            .schema(kind)
            .with_context(|| format!("Table '{}' is not declared in the plan", kind))?;
        if !schema.has_column(column) {
            anyhow::bail!("Table '{}' has no column '{}'", kind, column);
        }
        Ok(())
    }

    fn validate_lookup(&self, lookup: &LookupSpec) -> Result<()> {
        self.require_column(&lookup.kind, &lookup.name_field)?;
        self.require_column(&lookup.kind, &lookup.scope_field)
    }

    fn validate_collection(&self, spec: &CollectionSpec) -> Result<()> {
        if self.schema(&spec.parent_kind).is_none() {
            anyhow::bail!("Table '{}' is not declared in the plan", spec.parent_kind);
        }
        self.require_column(&spec.child_kind, &spec.parent_key)?;
        self.require_column(&spec.child_kind, &spec.order_field)?;
        for field in &spec.inherit {
            self.require_column(&spec.parent_kind, field)?;
            self.require_column(&spec.child_kind, field)?;
        }
        if let Some(nested) = spec.nested.as_deref() {
            if nested.parent_kind != spec.child_kind {
                anyhow::bail!(
                    "Nested collection of '{}' must have '{}' as its parent, not '{}'",
                    spec.child_kind,
                    spec.child_kind,
                    nested.parent_kind
                );
            }
            self.validate_collection(nested)?;
        }
        Ok(())
    }

    /// Every name in the plan must refer to a declared table and column
    pub fn validate(&self) -> Result<()> {
        let mut kinds = HashSet::new();
        for schema in std::iter::once(&self.root).chain(&self.tables) {
            schema.validate()?;
            if !kinds.insert(&schema.kind) {
                anyhow::bail!("Table '{}' is declared more than once", schema.kind);
            }
        }

        if self.associations.is_empty() {
            return Err(ConfigurationError::EmptyDescriptors.into());
        }

        for descriptor in &self.associations {
            let kind = descriptor.kind();
            match descriptor {
                AssociationDescriptor::PolymorphicAttachment {
                    owner_kind,
                    owner_id_field,
                    owner_type_field,
                    ..
                } => {
                    self.require_column(kind, owner_id_field)?;
                    self.require_column(kind, owner_type_field)?;
                    if self.schema(owner_kind).is_none() {
                        anyhow::bail!("Attachment owner '{}' is not declared in the plan", owner_kind);
                    }
                }
                AssociationDescriptor::SelfReferencing { parent_key, self_key, .. } => {
                    self.require_column(kind, parent_key)?;
                    self.require_column(kind, self_key)?;
                }
                AssociationDescriptor::Flat { parent_key, .. } | AssociationDescriptor::Special { parent_key, .. } => {
                    self.require_column(kind, parent_key)?;
                }
            }

            for reference in descriptor.references() {
                self.require_column(kind, reference.field())?;
                if let ForeignKeyRef::SharedLookup { lookup, .. } = reference {
                    self.validate_lookup(lookup)?;
                }
            }
        }

        for spec in self.collections.values() {
            self.validate_collection(spec)?;
        }
        for lookup in self.lookups.values() {
            self.validate_lookup(lookup)?;
        }

        Ok(())
    }

    /// SQLite repositories for the root and every declared table
    pub fn registry(&self) -> Result<RepositoryRegistry> {
        let mut registry = RepositoryRegistry::new();
        for schema in std::iter::once(&self.root).chain(&self.tables) {
            registry
                .register_table(schema.clone())
                .with_context(|| format!("Failed to register table '{}'", schema.kind))?;
        }
        Ok(registry)
    }

    pub fn build_engine(&self, coordinator: TransactionCoordinator) -> Result<Engine> {
        Ok(Engine::new(
            Arc::new(self.registry()?),
            coordinator,
            self.root.kind.clone(),
        ))
    }

    pub fn collection(&self, name: &str) -> Result<&CollectionSpec, ConfigurationError> {
        self.collections
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownCollection(name.to_string()))
    }

    pub fn lookup(&self, name: &str) -> Result<&LookupSpec, ConfigurationError> {
        self.lookups
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownLookup(name.to_string()))
    }

    /// Built-in plan for the schema shipped in migration 001
    pub fn event_configuration() -> Self {
        let categories = LookupSpec {
            kind: kind("categories"),
            name_field: "name".to_string(),
            scope_field: "event_id".to_string(),
        };

        // Categories are not copied wholesale: guides resolve them by name in the destination
        let associations = vec![
            AssociationDescriptor::SelfReferencing {
                kind: kind("zones"),
                parent_key: "event_id".to_string(),
                self_key: "parent_zone_id".to_string(),
                references: vec![],
            },
            flat("cameras", vec![]),
            flat(
                "camera_zones",
                vec![remapped("camera_id", "cameras"), remapped("zone_id", "zones")],
            ),
            flat(
                "reference_guides",
                vec![ForeignKeyRef::SharedLookup {
                    field: "category_id".to_string(),
                    lookup: categories.clone(),
                }],
            ),
            attachments("reference_guides", "ReferenceGuide"),
            attachments("events", "Event"),
            AssociationDescriptor::Special {
                kind: kind("priority_guides"),
                parent_key: "event_id".to_string(),
                force_replace: true,
                references: vec![],
            },
            flat("objectives", vec![]),
            flat("sub_objectives", vec![remapped("objective_id", "objectives")]),
        ];

        let objectives = CollectionSpec {
            parent_kind: kind("events"),
            child_kind: kind("objectives"),
            parent_key: "event_id".to_string(),
            order_field: "sort_order".to_string(),
            inherit: vec![],
            nested: Some(Box::new(CollectionSpec {
                parent_kind: kind("objectives"),
                child_kind: kind("sub_objectives"),
                parent_key: "objective_id".to_string(),
                order_field: "sort_order".to_string(),
                inherit: vec!["event_id".to_string()],
                nested: None,
            })),
        };

        Self {
            root: table("events", &["name", "starts_at"]),
            tables: vec![
                table("zones", &["event_id", "parent_zone_id", "name", "capacity"]),
                table("cameras", &["event_id", "label", "stream_url"]),
                table("camera_zones", &["event_id", "camera_id", "zone_id"]),
                table("categories", &["event_id", "name"]),
                table("reference_guides", &["event_id", "category_id", "title", "body"]),
                table("attachments", &["imageable_id", "imageable_type", "file_name", "url"]),
                table("priority_guides", &["event_id", "content"]),
                table("objectives", &["event_id", "title", "sort_order"]),
                table("sub_objectives", &["event_id", "objective_id", "title", "sort_order"]),
            ],
            associations,
            collections: BTreeMap::from([("objectives".to_string(), objectives)]),
            lookups: BTreeMap::from([("categories".to_string(), categories)]),
        }
    }
}

fn kind(name: &str) -> EntityKind {
    EntityKind::new(name)
}

// Built-in names are known-good identifiers, so the schema is assembled without re-validating
fn table(name: &str, columns: &[&str]) -> TableSchema {
    TableSchema {
        kind: kind(name),
        id_column: "id".to_string(),
        columns: columns.iter().map(|c| c.to_string()).collect(),
    }
}

fn flat(name: &str, references: Vec<ForeignKeyRef>) -> AssociationDescriptor {
    AssociationDescriptor::Flat {
        kind: kind(name),
        parent_key: "event_id".to_string(),
        references,
    }
}

fn remapped(field: &str, target: &str) -> ForeignKeyRef {
    ForeignKeyRef::Remapped {
        field: field.to_string(),
        target: kind(target),
    }
}

fn attachments(owner: &str, imageable_type: &str) -> AssociationDescriptor {
    AssociationDescriptor::PolymorphicAttachment {
        kind: kind("attachments"),
        owner_kind: kind(owner),
        owner_id_field: "imageable_id".to_string(),
        owner_type_field: "imageable_type".to_string(),
        imageable_type: imageable_type.to_string(),
    }
}
