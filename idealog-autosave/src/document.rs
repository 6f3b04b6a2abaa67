//! The in-memory document an editing session mutates between saves.

use idealog_model::{Block, BlockKind};
use idealog_storage::{BlockStore, StorageResult};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// A document shared between the editing session and the autosave
/// scheduler. The scheduler always reads the freshest state through this
/// cell rather than anything captured when a timer was armed.
pub type SharedDocument = Arc<Mutex<IdeaDocument>>;

/// One editable block of an open document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentBlock {
    pub block_id: String,
    pub kind: BlockKind,
    pub content: String,
    pub color: Option<String>,
    /// Unsaved in-memory changes since the last successful save.
    pub dirty: bool,
}

impl DocumentBlock {
    /// A fresh empty text block, as shown when an Idea has no content yet.
    pub fn empty_text() -> Self {
        Self {
            block_id: Uuid::new_v4().to_string(),
            kind: BlockKind::Text,
            content: String::new(),
            color: None,
            dirty: false,
        }
    }

    fn from_block(block: Block) -> Self {
        Self {
            block_id: block.block_id,
            kind: block.kind,
            content: block.content,
            color: block.color,
            dirty: false,
        }
    }
}

/// An Idea's blocks as currently edited, plus the id set known to be
/// persisted as of the last successful save.
#[derive(Debug)]
pub struct IdeaDocument {
    pub idea_id: String,
    pub blocks: Vec<DocumentBlock>,
    persisted_ids: HashSet<String>,
}

impl IdeaDocument {
    /// An unsaved document for a brand-new Idea: a single default block.
    pub fn new(idea_id: &str) -> Self {
        Self {
            idea_id: idea_id.to_string(),
            blocks: vec![DocumentBlock::empty_text()],
            persisted_ids: HashSet::new(),
        }
    }

    /// Loads the persisted Blocks of an Idea. An Idea with no Blocks yet
    /// yields exactly one default empty block, not dirty and not persisted.
    pub fn load(idea_id: &str, blocks: &BlockStore) -> StorageResult<Self> {
        let rows = blocks.get_by_idea_id(idea_id)?;
        let persisted_ids: HashSet<String> = rows.iter().map(|b| b.block_id.clone()).collect();
        let mut entries: Vec<DocumentBlock> =
            rows.into_iter().map(DocumentBlock::from_block).collect();
        if entries.is_empty() {
            entries.push(DocumentBlock::empty_text());
        }
        Ok(Self {
            idea_id: idea_id.to_string(),
            blocks: entries,
            persisted_ids,
        })
    }

    /// Wraps the document for sharing with the scheduler.
    pub fn into_shared(self) -> SharedDocument {
        Arc::new(Mutex::new(self))
    }

    /// Replaces a block's content and marks it dirty. Unknown ids are
    /// ignored.
    pub fn set_content(&mut self, block_id: &str, content: &str) {
        if let Some(block) = self.blocks.iter_mut().find(|b| b.block_id == block_id) {
            block.content = content.to_string();
            block.dirty = true;
        }
    }

    /// Appends a new dirty block and returns its id.
    pub fn push_block(&mut self, kind: BlockKind, content: &str) -> String {
        let block = DocumentBlock {
            block_id: Uuid::new_v4().to_string(),
            kind,
            content: content.to_string(),
            color: None,
            dirty: true,
        };
        let id = block.block_id.clone();
        self.blocks.push(block);
        id
    }

    /// Removes a block from the document; storage catches up at the next
    /// reconciliation round.
    pub fn remove_block(&mut self, block_id: &str) {
        self.blocks.retain(|b| b.block_id != block_id);
    }

    /// True if any block carries unsaved changes.
    pub fn any_dirty(&self) -> bool {
        self.blocks.iter().any(|b| b.dirty)
    }

    /// Cheap serialized `(id, content, dirty)` snapshot for change
    /// detection.
    pub fn change_signature(&self) -> String {
        let mut sig = String::new();
        for block in &self.blocks {
            sig.push_str(&block.block_id);
            sig.push('\u{1}');
            sig.push_str(&block.content);
            sig.push('\u{1}');
            sig.push(if block.dirty { '1' } else { '0' });
            sig.push('\u{2}');
        }
        sig
    }

    /// Ids persisted as of the last successful save.
    pub fn persisted_ids(&self) -> &HashSet<String> {
        &self.persisted_ids
    }

    /// Called after a successful save round: every surviving block is clean
    /// and the persisted-id snapshot becomes the current id set.
    pub(crate) fn mark_saved(&mut self) {
        for block in &mut self.blocks {
            block.dirty = false;
        }
        self.persisted_ids = self.blocks.iter().map(|b| b.block_id.clone()).collect();
    }
}
