use chrono::NaiveDate;
use idealog_autosave::{AutosaveConfig, AutosaveScheduler, IdeaDocument};
use idealog_model::NewIdea;
use idealog_storage::{BlockStore, Storage};
use std::time::Duration;

const TEST_DEBOUNCE: Duration = Duration::from_millis(50);

fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn fixture() -> (Storage, String) {
    let storage = Storage::open_in_memory().unwrap();
    let idea_id = storage
        .ideas()
        .add(&NewIdea {
            hint: "draft".into(),
            detail: String::new(),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            category: None,
            completed: false,
        })
        .unwrap();
    (storage, idea_id)
}

fn scheduler(blocks: &BlockStore) -> AutosaveScheduler {
    AutosaveScheduler::new(
        blocks.clone(),
        AutosaveConfig {
            debounce: TEST_DEBOUNCE,
        },
    )
}

// ── Debounce behavior ────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn typing_burst_coalesces_into_one_save() {
    // End-to-end: load an empty idea (one default block, not dirty), type
    // twice inside the debounce window, and end up with exactly one
    // persisted block holding the final content.
    init_logs();
    let (storage, idea_id) = fixture();
    let blocks = storage.blocks();
    let scheduler = scheduler(&blocks);

    let doc = IdeaDocument::load(&idea_id, &blocks).unwrap();
    assert_eq!(doc.blocks.len(), 1);
    assert!(!doc.blocks[0].dirty);
    let block_id = doc.blocks[0].block_id.clone();
    let doc = doc.into_shared();

    assert!(!scheduler.timer_armed());

    doc.lock().unwrap().set_content(&block_id, "Hello");
    scheduler.notify_content_changed(&doc);
    assert!(scheduler.timer_armed());

    tokio::time::sleep(Duration::from_millis(20)).await;
    doc.lock().unwrap().set_content(&block_id, "Hello World");
    scheduler.notify_content_changed(&doc);
    assert!(scheduler.timer_armed());

    tokio::time::sleep(TEST_DEBOUNCE * 5).await;

    let persisted = blocks.get_by_idea_id(&idea_id).unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].content, "Hello World");
    assert!(!doc.lock().unwrap().any_dirty());
}

#[tokio::test(flavor = "multi_thread")]
async fn clean_document_arms_no_timer() {
    init_logs();
    let (storage, idea_id) = fixture();
    let blocks = storage.blocks();
    let scheduler = scheduler(&blocks);

    let doc = IdeaDocument::load(&idea_id, &blocks).unwrap().into_shared();
    scheduler.notify_content_changed(&doc);

    assert!(!scheduler.timer_armed());
    tokio::time::sleep(TEST_DEBOUNCE * 3).await;
    assert!(blocks.get_by_idea_id(&idea_id).unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn timer_reads_latest_state_not_captured_state() {
    // The edit after arming must be what lands on disk, even without a
    // second notification racing the timer.
    init_logs();
    let (storage, idea_id) = fixture();
    let blocks = storage.blocks();
    let scheduler = scheduler(&blocks);

    let doc = IdeaDocument::load(&idea_id, &blocks).unwrap();
    let block_id = doc.blocks[0].block_id.clone();
    let doc = doc.into_shared();

    doc.lock().unwrap().set_content(&block_id, "armed with this");
    scheduler.notify_content_changed(&doc);
    // Mutate behind the scheduler's back, before the timer fires.
    doc.lock().unwrap().set_content(&block_id, "fired with this");

    tokio::time::sleep(TEST_DEBOUNCE * 5).await;

    let persisted = blocks.get_by_idea_id(&idea_id).unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].content, "fired with this");
}

// ── Forced flushes ───────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn flush_now_saves_immediately_and_cancels_the_timer() {
    init_logs();
    let (storage, idea_id) = fixture();
    let blocks = storage.blocks();
    let scheduler = scheduler(&blocks);

    let doc = IdeaDocument::load(&idea_id, &blocks).unwrap();
    let block_id = doc.blocks[0].block_id.clone();
    let doc = doc.into_shared();

    doc.lock().unwrap().set_content(&block_id, "save me now");
    scheduler.notify_content_changed(&doc);
    assert!(scheduler.timer_armed());

    let stats = scheduler.flush_now(&doc).await.unwrap();
    assert_eq!(stats.upserted, 1);
    assert!(!scheduler.timer_armed());

    let persisted = blocks.get_by_idea_id(&idea_id).unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].content, "save me now");
}

#[tokio::test(flavor = "multi_thread")]
async fn notify_after_flush_does_not_rearm() {
    init_logs();
    let (storage, idea_id) = fixture();
    let blocks = storage.blocks();
    let scheduler = scheduler(&blocks);

    let doc = IdeaDocument::load(&idea_id, &blocks).unwrap();
    let block_id = doc.blocks[0].block_id.clone();
    let doc = doc.into_shared();

    doc.lock().unwrap().set_content(&block_id, "settled");
    scheduler.flush_now(&doc).await.unwrap();

    // Nothing changed since the save; the notification must be a no-op.
    scheduler.notify_content_changed(&doc);
    assert!(!scheduler.timer_armed());
}

#[tokio::test(flavor = "multi_thread")]
async fn teardown_flush_saves_without_a_pending_timer() {
    // Teardown runs unconditionally over the freshest state, whether or not
    // change detection ever armed a timer.
    init_logs();
    let (storage, idea_id) = fixture();
    let blocks = storage.blocks();
    let scheduler = scheduler(&blocks);

    let doc = IdeaDocument::load(&idea_id, &blocks).unwrap();
    let block_id = doc.blocks[0].block_id.clone();
    let doc = doc.into_shared();

    doc.lock().unwrap().set_content(&block_id, "last words");
    scheduler.flush_on_teardown(&doc).await;

    assert!(!scheduler.timer_armed());
    let persisted = blocks.get_by_idea_id(&idea_id).unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].content, "last words");
}

#[tokio::test(flavor = "multi_thread")]
async fn teardown_flush_persists_even_an_untouched_default_block() {
    // The default block of a never-edited document is unpersisted, so the
    // unconditional teardown pass writes it; cleanup_empty_ideas is the
    // recovery path for the abandoned empty Idea itself.
    init_logs();
    let (storage, idea_id) = fixture();
    let blocks = storage.blocks();
    let scheduler = scheduler(&blocks);

    let doc = IdeaDocument::load(&idea_id, &blocks).unwrap().into_shared();
    scheduler.flush_on_teardown(&doc).await;

    let persisted = blocks.get_by_idea_id(&idea_id).unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].content, "");
}

#[tokio::test(flavor = "multi_thread")]
async fn teardown_cancels_a_pending_timer_first() {
    init_logs();
    let (storage, idea_id) = fixture();
    let blocks = storage.blocks();
    let scheduler = scheduler(&blocks);

    let doc = IdeaDocument::load(&idea_id, &blocks).unwrap();
    let block_id = doc.blocks[0].block_id.clone();
    let doc = doc.into_shared();

    doc.lock().unwrap().set_content(&block_id, "going down");
    scheduler.notify_content_changed(&doc);
    assert!(scheduler.timer_armed());

    scheduler.flush_on_teardown(&doc).await;
    assert!(!scheduler.timer_armed());

    // Wait past the original debounce: exactly one row, one save.
    tokio::time::sleep(TEST_DEBOUNCE * 3).await;
    let persisted = blocks.get_by_idea_id(&idea_id).unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].content, "going down");
}
