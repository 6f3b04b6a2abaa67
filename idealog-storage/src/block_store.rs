//! Block repository — the ordered sub-entities owned by an Idea.
//!
//! `save_dirty_blocks` is the transactional upsert-batch primitive behind
//! reconciliation: each entry is first attempted as an update and inserted
//! when the update touches no row, and all entries of one call commit or
//! roll back together.

use crate::error::StorageResult;
use crate::now_ms;
use duckdb::{params, Connection, Transaction};
use idealog_model::{Block, BlockPatch, BlockWrite, NewBlock};
use std::sync::{Arc, Mutex};
use tracing::error;
use uuid::Uuid;

const BLOCK_COLUMNS: &str =
    "id, block_id, idea_id, kind, content, order_index, color, created_at, updated_at";

/// Repository over the `blocks` table.
#[derive(Clone)]
pub struct BlockStore {
    conn: Arc<Mutex<Connection>>,
}

impl BlockStore {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Blocks of an Idea in render order.
    pub fn get_by_idea_id(&self, idea_id: &str) -> StorageResult<Vec<Block>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BLOCK_COLUMNS} FROM blocks WHERE idea_id = ? \
             ORDER BY order_index ASC, created_at ASC"
        ))?;
        let blocks = stmt
            .query_map(params![idea_id], row_to_block)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(blocks)
    }

    /// Inserts a single Block and returns its surrogate id.
    pub fn add(&self, block: &NewBlock) -> StorageResult<String> {
        let conn = self.conn.lock().unwrap();
        let id = Uuid::new_v4().to_string();
        let now = now_ms();
        conn.execute(
            r#"
            INSERT INTO blocks (id, block_id, idea_id, kind, content, order_index, color, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                id,
                block.block_id,
                block.idea_id,
                block.kind.as_str(),
                block.content,
                block.order_index,
                block.color.as_deref(),
                now,
                now,
            ],
        )?;
        Ok(id)
    }

    /// Applies only the supplied fields to one Block.
    pub fn update(&self, idea_id: &str, block_id: &str, patch: &BlockPatch) -> StorageResult<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            UPDATE blocks SET
                kind = COALESCE(?, kind),
                content = COALESCE(?, content),
                order_index = COALESCE(?, order_index),
                color = COALESCE(?, color),
                updated_at = ?
            WHERE idea_id = ? AND block_id = ?
            "#,
            params![
                patch.kind.map(|k| k.as_str()),
                patch.content.as_deref(),
                patch.order_index,
                patch.color.as_deref(),
                now_ms(),
                idea_id,
                block_id,
            ],
        )?;
        Ok(())
    }

    /// Deletes one Block.
    pub fn delete(&self, idea_id: &str, block_id: &str) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM blocks WHERE idea_id = ? AND block_id = ?",
            params![idea_id, block_id],
        )?;
        Ok(())
    }

    /// Upserts every entry inside a single transaction. If any statement
    /// fails, the whole call rolls back and the original error is re-raised;
    /// a rollback failure is logged but never replaces it.
    pub fn save_dirty_blocks(&self, idea_id: &str, entries: &[BlockWrite]) -> StorageResult<()> {
        self.apply_diff(idea_id, &[], entries)
    }

    /// One reconciliation round: deletes, then upserts, all-or-nothing. An
    /// empty round opens no transaction.
    pub fn apply_diff(
        &self,
        idea_id: &str,
        to_delete: &[String],
        entries: &[BlockWrite],
    ) -> StorageResult<()> {
        if to_delete.is_empty() && entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        match apply_diff_tx(&tx, idea_id, to_delete, entries) {
            Ok(()) => {
                tx.commit()?;
                Ok(())
            }
            Err(e) => {
                if let Err(rb) = tx.rollback() {
                    error!("[BLOCKS] rollback failed after save error: {rb}");
                }
                Err(e)
            }
        }
    }

    /// Number of Blocks owned by an Idea.
    pub fn count_for_idea(&self, idea_id: &str) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM blocks WHERE idea_id = ?",
            params![idea_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

fn apply_diff_tx(
    tx: &Transaction<'_>,
    idea_id: &str,
    to_delete: &[String],
    entries: &[BlockWrite],
) -> StorageResult<()> {
    for block_id in to_delete {
        tx.execute(
            "DELETE FROM blocks WHERE idea_id = ? AND block_id = ?",
            params![idea_id, block_id],
        )?;
    }
    let now = now_ms();
    for entry in entries {
        let changed = tx.execute(
            r#"
            UPDATE blocks SET kind = ?, content = ?, order_index = ?, updated_at = ?
            WHERE idea_id = ? AND block_id = ?
            "#,
            params![
                entry.kind.as_str(),
                entry.content,
                entry.order_index,
                now,
                idea_id,
                entry.block_id,
            ],
        )?;
        if changed == 0 {
            tx.execute(
                r#"
                INSERT INTO blocks (id, block_id, idea_id, kind, content, order_index, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
                params![
                    Uuid::new_v4().to_string(),
                    entry.block_id,
                    idea_id,
                    entry.kind.as_str(),
                    entry.content,
                    entry.order_index,
                    now,
                    now,
                ],
            )?;
        }
    }
    Ok(())
}

fn row_to_block(row: &duckdb::Row<'_>) -> duckdb::Result<Block> {
    let kind_str: String = row.get(3)?;
    Ok(Block {
        id: row.get(0)?,
        block_id: row.get(1)?,
        idea_id: row.get(2)?,
        kind: kind_str.parse().unwrap_or_default(),
        content: row.get(4)?,
        order_index: row.get(5)?,
        color: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}
