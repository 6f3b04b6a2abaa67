//! Debounced autosave over a shared document.
//!
//! Every mutation notification recomputes a cheap change signature; a real
//! change (re)arms a single debounce timer, so bursts of keystrokes
//! coalesce into one save. The timer callback never acts on captured state —
//! it reads the document through the shared cell at fire time. Teardown
//! cancels the timer and runs one unconditional pass; by then there is
//! nobody left to report a failure to, so its outcome is only logged.

use crate::document::SharedDocument;
use crate::error::{AutosaveError, AutosaveResult};
use crate::reconcile::{reconcile_document, ReconcileStats};
use idealog_storage::BlockStore;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Configuration for the autosave scheduler.
#[derive(Debug, Clone)]
pub struct AutosaveConfig {
    /// Quiet period after the last observed change before a save fires.
    pub debounce: Duration,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
        }
    }
}

/// Debounced autosave driver for one editing session.
pub struct AutosaveScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    blocks: BlockStore,
    config: AutosaveConfig,
    /// Latest shared document, so a firing timer never reads stale state.
    latest: Mutex<Option<SharedDocument>>,
    /// Pending debounce timer, if armed.
    timer: Mutex<Option<JoinHandle<()>>>,
    /// Change signature as of the last successful save.
    last_signature: Mutex<Option<String>>,
    /// Serializes save rounds; two rounds for the same session must never
    /// overlap or a slow save could race a newer diff.
    save_gate: tokio::sync::Mutex<()>,
}

impl AutosaveScheduler {
    pub fn new(blocks: BlockStore, config: AutosaveConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                blocks,
                config,
                latest: Mutex::new(None),
                timer: Mutex::new(None),
                last_signature: Mutex::new(None),
                save_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Call after every document mutation. Arms (or re-arms) the debounce
    /// timer when the content actually changed and at least one block is
    /// dirty; anything else is a no-op. Callers must not hold the document
    /// lock across this call.
    pub fn notify_content_changed(&self, doc: &SharedDocument) {
        let (signature, any_dirty) = {
            let doc = doc.lock().unwrap();
            (doc.change_signature(), doc.any_dirty())
        };
        *self.inner.latest.lock().unwrap() = Some(doc.clone());

        let unchanged =
            self.inner.last_signature.lock().unwrap().as_deref() == Some(signature.as_str());
        if unchanged || !any_dirty {
            return;
        }

        let mut timer = self.inner.timer.lock().unwrap();
        if let Some(previous) = timer.take() {
            previous.abort();
        }
        let inner = self.inner.clone();
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.config.debounce).await;
            match run_save(&inner).await {
                Ok(stats) => {
                    debug!(
                        "[AUTOSAVE] debounced save: {} deleted, {} upserted",
                        stats.deleted, stats.upserted
                    );
                }
                Err(e) => warn!("[AUTOSAVE] debounced save failed: {e}"),
            }
        }));
    }

    /// Immediate save for a user-initiated action. Cancels any pending
    /// timer; failures surface to the caller.
    pub async fn flush_now(&self, doc: &SharedDocument) -> AutosaveResult<ReconcileStats> {
        self.cancel_timer();
        *self.inner.latest.lock().unwrap() = Some(doc.clone());
        run_save(&self.inner).await
    }

    /// Final flush at session teardown: cancel any pending timer and run one
    /// unconditional pass over the freshest state, whether or not a change
    /// was detected. Best-effort — the outcome is logged only.
    pub async fn flush_on_teardown(&self, doc: &SharedDocument) {
        self.cancel_timer();
        *self.inner.latest.lock().unwrap() = Some(doc.clone());
        match run_save(&self.inner).await {
            Ok(stats) => info!(
                "[AUTOSAVE] teardown flush: {} deleted, {} upserted",
                stats.deleted, stats.upserted
            ),
            Err(e) => warn!("[AUTOSAVE] teardown flush failed: {e}"),
        }
    }

    /// True while a debounce timer is armed.
    pub fn timer_armed(&self) -> bool {
        self.inner
            .timer
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    fn cancel_timer(&self) {
        if let Some(timer) = self.inner.timer.lock().unwrap().take() {
            timer.abort();
        }
    }
}

/// Runs one reconciliation round over the latest shared document. Rounds
/// serialize behind the save gate; the blocking DB work runs off the async
/// executor.
async fn run_save(inner: &Arc<Inner>) -> AutosaveResult<ReconcileStats> {
    let _gate = inner.save_gate.lock().await;

    let Some(doc) = inner.latest.lock().unwrap().clone() else {
        return Ok(ReconcileStats::default());
    };

    let blocks = inner.blocks.clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut doc = doc.lock().unwrap();
        let stats = reconcile_document(&mut doc, &blocks)?;
        Ok::<_, AutosaveError>((stats, doc.change_signature()))
    })
    .await
    .map_err(|e| AutosaveError::TaskPanicked(e.to_string()))?;

    let (stats, signature) = result?;
    *inner.last_signature.lock().unwrap() = Some(signature);
    Ok(stats)
}
