//! Shared data model for the Idealog persistence core.
//!
//! Plain types passed between the storage layer, the reconciliation engine,
//! and UI collaborators. Nothing here touches the database.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A top-level note, pinned to a calendar date.
///
/// The derived date index (`YYYYMMDD`) used for month queries lives only in
/// storage — it is computed from `date` on every write and is never a field
/// callers can set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Idea {
    /// Engine-assigned, stable identifier.
    pub id: String,
    /// Short title text shown in lists.
    pub hint: String,
    /// Free-form body text.
    pub detail: String,
    pub date: NaiveDate,
    pub category: Option<String>,
    pub completed: bool,
    /// Epoch milliseconds.
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fields for creating an Idea. Id and timestamps are engine-assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIdea {
    pub hint: String,
    pub detail: String,
    pub date: NaiveDate,
    pub category: Option<String>,
    pub completed: bool,
}

/// Partial update for an Idea. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdeaPatch {
    pub hint: Option<String>,
    pub detail: Option<String>,
    pub date: Option<NaiveDate>,
    pub category: Option<String>,
    pub completed: Option<bool>,
}

impl IdeaPatch {
    /// True when no field is supplied — such a patch is a storage no-op.
    pub fn is_empty(&self) -> bool {
        self.hint.is_none()
            && self.detail.is_none()
            && self.date.is_none()
            && self.category.is_none()
            && self.completed.is_none()
    }
}

/// Content kind of a Block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    /// Plain text content.
    #[default]
    Text,
    /// Content is a resource reference to a stored image.
    Image,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Text => "text",
            BlockKind::Image => "image",
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(BlockKind::Text),
            "image" => Ok(BlockKind::Image),
            other => Err(format!("unknown block kind: {other}")),
        }
    }
}

/// An ordered, typed sub-unit of content belonging to exactly one Idea.
///
/// `(idea_id, block_id)` is unique. `order_index` defines render/save order
/// within the Idea and is recomputed from in-memory array position on every
/// save round rather than treated as independently authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Surrogate storage id.
    pub id: String,
    /// Caller-assigned id, unique within the owning Idea.
    pub block_id: String,
    pub idea_id: String,
    pub kind: BlockKind,
    /// Text, or a resource reference for image blocks.
    pub content: String,
    pub order_index: i32,
    /// Optional display color tag.
    pub color: Option<String>,
    /// Epoch milliseconds.
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fields for creating a Block. The surrogate id is engine-assigned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBlock {
    pub block_id: String,
    pub idea_id: String,
    pub kind: BlockKind,
    pub content: String,
    pub order_index: i32,
    pub color: Option<String>,
}

/// Partial update for a Block. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockPatch {
    pub kind: Option<BlockKind>,
    pub content: Option<String>,
    pub order_index: Option<i32>,
    pub color: Option<String>,
}

impl BlockPatch {
    /// True when no field is supplied — such a patch is a storage no-op.
    pub fn is_empty(&self) -> bool {
        self.kind.is_none()
            && self.content.is_none()
            && self.order_index.is_none()
            && self.color.is_none()
    }
}

/// One entry of a reconciliation save round, upserted by block id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockWrite {
    pub block_id: String,
    pub kind: BlockKind,
    pub content: String,
    pub order_index: i32,
}
