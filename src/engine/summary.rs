//! Per-association row counts reported by clone and disassociate

use crate::repository::{EntityKind, RowId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationCount {
    pub descriptor: String,
    pub kind: EntityKind,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneSummary {
    pub source_root_id: RowId,
    pub destination_root_id: RowId,
    pub associations: Vec<AssociationCount>,
    /// Remap entries created, including the root pair
    pub remapped: usize,
}

impl CloneSummary {
    pub fn new(source_root_id: RowId, destination_root_id: RowId) -> Self {
        Self {
            source_root_id,
            destination_root_id,
            ..Self::default()
        }
    }

    pub fn record(&mut self, descriptor: String, kind: EntityKind, count: usize) {
        self.associations.push(AssociationCount { descriptor, kind, count });
    }

    /// Rows cloned across every association
    pub fn total(&self) -> usize {
        self.associations.iter().map(|a| a.count).sum()
    }

    /// Rows cloned for one entity kind (summed over descriptors sharing it)
    pub fn count_for(&self, kind: &str) -> usize {
        self.associations
            .iter()
            .filter(|a| a.kind.as_str() == kind)
            .map(|a| a.count)
            .sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedSummary {
    pub root_id: RowId,
    pub associations: Vec<AssociationCount>,
}

impl DeletedSummary {
    pub fn new(root_id: RowId) -> Self {
        Self {
            root_id,
            associations: Vec::new(),
        }
    }

    pub fn record(&mut self, descriptor: String, kind: EntityKind, count: usize) {
        self.associations.push(AssociationCount { descriptor, kind, count });
    }

    pub fn total(&self) -> usize {
        self.associations.iter().map(|a| a.count).sum()
    }

    pub fn count_for(&self, kind: &str) -> usize {
        self.associations
            .iter()
            .filter(|a| a.kind.as_str() == kind)
            .map(|a| a.count)
            .sum()
    }
}
