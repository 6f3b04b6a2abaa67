//! Diffing an edited document against its last-persisted state.

use crate::document::IdeaDocument;
use idealog_model::BlockWrite;
use idealog_storage::{BlockStore, StorageResult};
use std::collections::HashSet;
use tracing::debug;

/// What one reconciliation round changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub deleted: usize,
    pub upserted: usize,
}

/// Computes and applies the minimal insert/update/delete set that makes the
/// persisted Blocks match the document.
///
/// A clean document opens no transaction at all. Success clears the dirty
/// flags and replaces the persisted-id snapshot; on failure the document is
/// left exactly as it was, so a retry recomputes and resubmits the identical
/// diff.
pub fn reconcile_document(
    doc: &mut IdeaDocument,
    blocks: &BlockStore,
) -> StorageResult<ReconcileStats> {
    let current_ids: HashSet<&str> = doc.blocks.iter().map(|b| b.block_id.as_str()).collect();

    let to_delete: Vec<String> = doc
        .persisted_ids()
        .iter()
        .filter(|id| !current_ids.contains(id.as_str()))
        .cloned()
        .collect();

    // Order positions come from current list position, never from storage.
    let to_save: Vec<BlockWrite> = doc
        .blocks
        .iter()
        .enumerate()
        .filter(|(_, b)| b.dirty || !doc.persisted_ids().contains(&b.block_id))
        .map(|(position, b)| BlockWrite {
            block_id: b.block_id.clone(),
            kind: b.kind,
            content: b.content.clone(),
            order_index: position as i32,
        })
        .collect();

    if to_delete.is_empty() && to_save.is_empty() {
        return Ok(ReconcileStats::default());
    }

    let stats = ReconcileStats {
        deleted: to_delete.len(),
        upserted: to_save.len(),
    };
    blocks.apply_diff(&doc.idea_id, &to_delete, &to_save)?;
    doc.mark_saved();
    debug!(
        "[AUTOSAVE] reconciled idea {}: {} deleted, {} upserted",
        doc.idea_id, stats.deleted, stats.upserted
    );
    Ok(stats)
}
