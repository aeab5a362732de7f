//! State threaded through every strategy of one clone operation

use super::remap::IdentifierRemapTable;
use crate::repository::{EntityKind, RepositoryRegistry, RowId};
use crate::transaction::TransactionHandle;

pub struct CloneContext<'a> {
    pub source_root_id: RowId,
    pub destination_root_id: RowId,
    pub root_kind: &'a EntityKind,
    pub registry: &'a RepositoryRegistry,
    pub remap: IdentifierRemapTable,
    pub tx: &'a mut TransactionHandle,
}

impl<'a> CloneContext<'a> {
    /// Fresh context with the root pair already remapped, so edges owned
    /// directly by the root (e.g. attachments on the root) resolve to the new root
    pub fn new(
        source_root_id: RowId,
        destination_root_id: RowId,
        root_kind: &'a EntityKind,
        registry: &'a RepositoryRegistry,
        tx: &'a mut TransactionHandle,
    ) -> Self {
        let mut remap = IdentifierRemapTable::new();
        // First entry of a fresh table cannot collide
        let _ = remap.insert(root_kind, source_root_id, destination_root_id);
        remap.mark_populated(root_kind);

        Self {
            source_root_id,
            destination_root_id,
            root_kind,
            registry,
            remap,
            tx,
        }
    }
}
