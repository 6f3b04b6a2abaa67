//! Reconciliation and debounced autosave for Idealog documents.
//!
//! UI collaborators edit an in-memory `IdeaDocument`; the scheduler watches
//! for real content changes, coalesces bursts of edits behind a debounce
//! timer, and drives the reconciliation engine, which persists exactly the
//! insert/update/delete set needed to make stored Blocks match the
//! document.

mod document;
mod error;
mod reconcile;
mod scheduler;

pub use document::{DocumentBlock, IdeaDocument, SharedDocument};
pub use error::{AutosaveError, AutosaveResult};
pub use reconcile::{reconcile_document, ReconcileStats};
pub use scheduler::{AutosaveConfig, AutosaveScheduler};
