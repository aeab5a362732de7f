//! Old id -> new id bookkeeping for one clone operation

use super::error::StrategyError;
use crate::repository::{EntityKind, RowId};
use std::collections::{HashMap, HashSet};

/// Append-only, bidirectional map scoped to a single clone.
///
/// A kind is "populated" once its strategy has run, even if it copied nothing;
/// lookups against a kind that was never populated are ordering bugs.
#[derive(Debug, Default)]
pub struct IdentifierRemapTable {
    forward: HashMap<(EntityKind, RowId), RowId>,
    reverse: HashMap<(EntityKind, RowId), RowId>,
    populated: HashSet<EntityKind>,
}

impl IdentifierRemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: &EntityKind, old_id: RowId, new_id: RowId) -> Result<(), StrategyError> {
        let key = (kind.clone(), old_id);
        if self.forward.contains_key(&key) {
            return Err(StrategyError::DuplicateRemap {
                kind: kind.clone(),
                old_id,
            });
        }
        self.forward.insert(key, new_id);
        self.reverse.insert((kind.clone(), new_id), old_id);
        Ok(())
    }

    pub fn mark_populated(&mut self, kind: &EntityKind) {
        self.populated.insert(kind.clone());
    }

    pub fn is_populated(&self, kind: &EntityKind) -> bool {
        self.populated.contains(kind)
    }

    pub fn resolve(&self, kind: &EntityKind, old_id: RowId) -> Option<RowId> {
        self.forward.get(&(kind.clone(), old_id)).copied()
    }

    /// Reverse lookup: which source row a new row was copied from
    pub fn original(&self, kind: &EntityKind, new_id: RowId) -> Option<RowId> {
        self.reverse.get(&(kind.clone(), new_id)).copied()
    }

    /// Source ids recorded for `kind`, ascending
    pub fn old_ids(&self, kind: &EntityKind) -> Vec<RowId> {
        let mut ids: Vec<RowId> = self
            .forward
            .keys()
            .filter(|(k, _)| k == kind)
            .map(|(_, id)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}
