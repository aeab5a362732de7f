//! Declarative description of the edges to clone or tear down

use super::dedup::LookupSpec;
use crate::repository::EntityKind;
use serde::{Deserialize, Serialize};

/// How an extra foreign key on a cloned row is rewritten
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resolve", rename_all = "snake_case")]
pub enum ForeignKeyRef {
    /// Points at a row cloned earlier in the same operation
    Remapped { field: String, target: EntityKind },
    /// Points at a scoped lookup row; resolved by name in the destination scope
    SharedLookup { field: String, lookup: LookupSpec },
}

impl ForeignKeyRef {
    pub fn field(&self) -> &str {
        match self {
            ForeignKeyRef::Remapped { field, .. } | ForeignKeyRef::SharedLookup { field, .. } => field,
        }
    }
}

/// One parent -> child edge, tagged by the strategy that clones it.
///
/// Foreign keys not listed in `references` are copied verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum AssociationDescriptor {
    Flat {
        kind: EntityKind,
        parent_key: String,
        #[serde(default)]
        references: Vec<ForeignKeyRef>,
    },
    SelfReferencing {
        kind: EntityKind,
        parent_key: String,
        self_key: String,
        #[serde(default)]
        references: Vec<ForeignKeyRef>,
    },
    PolymorphicAttachment {
        kind: EntityKind,
        owner_kind: EntityKind,
        owner_id_field: String,
        owner_type_field: String,
        imageable_type: String,
    },
    /// Singleton-per-root data that must not be appended twice
    Special {
        kind: EntityKind,
        parent_key: String,
        #[serde(default)]
        force_replace: bool,
        #[serde(default)]
        references: Vec<ForeignKeyRef>,
    },
}

impl AssociationDescriptor {
    pub fn kind(&self) -> &EntityKind {
        match self {
            AssociationDescriptor::Flat { kind, .. }
            | AssociationDescriptor::SelfReferencing { kind, .. }
            | AssociationDescriptor::PolymorphicAttachment { kind, .. }
            | AssociationDescriptor::Special { kind, .. } => kind,
        }
    }

    /// Foreign key pointing at the root; attachments have none
    pub fn parent_key(&self) -> Option<&str> {
        match self {
            AssociationDescriptor::Flat { parent_key, .. }
            | AssociationDescriptor::SelfReferencing { parent_key, .. }
            | AssociationDescriptor::Special { parent_key, .. } => Some(parent_key),
            AssociationDescriptor::PolymorphicAttachment { .. } => None,
        }
    }

    pub fn references(&self) -> &[ForeignKeyRef] {
        match self {
            AssociationDescriptor::Flat { references, .. }
            | AssociationDescriptor::SelfReferencing { references, .. }
            | AssociationDescriptor::Special { references, .. } => references,
            AssociationDescriptor::PolymorphicAttachment { .. } => &[],
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        match self {
            AssociationDescriptor::Flat { .. } => "flat",
            AssociationDescriptor::SelfReferencing { .. } => "self_referencing",
            AssociationDescriptor::PolymorphicAttachment { .. } => "polymorphic_attachment",
            AssociationDescriptor::Special { .. } => "special",
        }
    }

    /// Unique name of this edge within a descriptor list
    pub fn label(&self) -> String {
        match self {
            AssociationDescriptor::PolymorphicAttachment { kind, imageable_type, .. } => {
                format!("{}[{}]", kind, imageable_type)
            }
            other => other.kind().to_string(),
        }
    }

    /// Kinds whose remap entries must exist before this edge can be cloned
    pub fn dependencies(&self) -> Vec<&EntityKind> {
        match self {
            AssociationDescriptor::PolymorphicAttachment { owner_kind, .. } => vec![owner_kind],
            other => other
                .references()
                .iter()
                .filter_map(|reference| match reference {
                    ForeignKeyRef::Remapped { target, .. } => Some(target),
                    ForeignKeyRef::SharedLookup { .. } => None,
                })
                .collect(),
        }
    }
}
