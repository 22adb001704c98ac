//! Reviewer behavior: staleness revalidation, apply/skip/cancel semantics
//! and pause/resume.

mod common;

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use artfetch_common::events::EventBus;
use artfetch_svc::db::{queue, sessions};
use artfetch_svc::models::queue::ArtRequest;
use artfetch_svc::models::{
    ArtItemStatus, ArtType, EnqueueSpec, MediaType, QueueStatus, SessionStatus,
};
use artfetch_svc::services::{
    ArtworkChooser, ChooserOutcome, ChooserRequest, LanguagePolicy, Reviewer,
};

use common::{candidate, library_item, setup_db, FakeLibrary, FakeSource, ScriptedChooser};

fn reviewer(
    db: &sqlx::SqlitePool,
    library: &Arc<FakeLibrary>,
    source: &Arc<FakeSource>,
    chooser: Arc<dyn ArtworkChooser>,
) -> Reviewer {
    Reviewer::new(
        db.clone(),
        library.clone(),
        source.clone(),
        chooser,
        EventBus::new(16),
        LanguagePolicy::new("en", false),
    )
}

async fn enqueue_missing(
    db: &sqlx::SqlitePool,
    library_id: i64,
    title: &str,
    art_type: ArtType,
) -> i64 {
    let mut spec = EnqueueSpec::new(MediaType::Movie, library_id, title);
    spec.art_requests = vec![ArtRequest::missing(art_type)];
    queue::enqueue(db, spec).await.unwrap()
}

#[tokio::test]
async fn test_missing_item_gone_stale_is_never_presented() {
    let db = setup_db().await;
    let library = Arc::new(FakeLibrary::new());
    let source = Arc::new(FakeSource::new());

    // Queued as missing, but the slot is occupied by review time.
    let mut item = library_item(MediaType::Movie, 42, "Arrival");
    item.art
        .insert(ArtType::Poster, "http://img/now-set.jpg".to_string());
    library.insert(item);
    let queue_id = enqueue_missing(&db, 42, "Arrival", ArtType::Poster).await;

    source.set_candidates(
        MediaType::Movie,
        42,
        ArtType::Poster,
        vec![candidate("http://img/option.jpg")],
    );

    let chooser = Arc::new(ScriptedChooser::new(vec![]));
    let outcome = reviewer(&db, &library, &source, chooser.clone())
        .review(None, None, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    // Never presented, marked stale, entry resolved.
    assert_eq!(chooser.request_count(), 0);
    assert_eq!(library.set_art_call_count(), 0);
    assert_eq!(outcome.stats.details.stale.len(), 1);

    let items = queue::art_items_for(&db, &[queue_id])
        .await
        .unwrap()
        .remove(&queue_id)
        .unwrap();
    assert_eq!(items[0].status, ArtItemStatus::Stale);
}

#[tokio::test]
async fn test_candidate_with_changed_baseline_goes_stale() {
    let db = setup_db().await;
    let library = Arc::new(FakeLibrary::new());
    let source = Arc::new(FakeSource::new());

    // Candidate recorded against baseline X; live URL is now Y.
    let mut item = library_item(MediaType::Movie, 42, "Arrival");
    item.art
        .insert(ArtType::Fanart, "http://img/Y.jpg".to_string());
    library.insert(item);

    let mut spec = EnqueueSpec::new(MediaType::Movie, 42, "Arrival");
    spec.art_requests = vec![ArtRequest::candidate(ArtType::Fanart, "http://img/X.jpg")];
    let queue_id = queue::enqueue(&db, spec).await.unwrap();

    source.set_candidates(
        MediaType::Movie,
        42,
        ArtType::Fanart,
        vec![candidate("http://img/better.jpg")],
    );

    let chooser = Arc::new(ScriptedChooser::new(vec![]));
    reviewer(&db, &library, &source, chooser.clone())
        .review(None, None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(chooser.request_count(), 0);
    let items = queue::art_items_for(&db, &[queue_id])
        .await
        .unwrap()
        .remove(&queue_id)
        .unwrap();
    assert_eq!(items[0].status, ArtItemStatus::Stale);
}

#[tokio::test]
async fn test_selected_candidate_is_applied_and_logged() {
    let db = setup_db().await;
    let library = Arc::new(FakeLibrary::new());
    let source = Arc::new(FakeSource::new());

    library.insert(library_item(MediaType::Movie, 42, "Arrival"));
    let queue_id = enqueue_missing(&db, 42, "Arrival", ArtType::Poster).await;

    let chosen = candidate("http://img/chosen.jpg");
    source.set_candidates(MediaType::Movie, 42, ArtType::Poster, vec![chosen.clone()]);

    let chooser = Arc::new(ScriptedChooser::new(vec![ChooserOutcome::selected(chosen)]));
    let outcome = reviewer(&db, &library, &source, chooser)
        .review(None, None, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert!(!outcome.cancelled);
    assert_eq!(outcome.stats.applied, 1);
    assert_eq!(outcome.stats.details.manual_applied.len(), 1);
    assert_eq!(
        outcome.stats.details.manual_applied[0].url.as_deref(),
        Some("http://img/chosen.jpg")
    );

    let art = library.art_of(MediaType::Movie, 42);
    assert_eq!(
        art.get(&ArtType::Poster).map(String::as_str),
        Some("http://img/chosen.jpg")
    );

    let items = queue::art_items_for(&db, &[queue_id])
        .await
        .unwrap()
        .remove(&queue_id)
        .unwrap();
    assert_eq!(items[0].status, ArtItemStatus::Completed);

    let session = sessions::get_session(&db, outcome.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
}

#[tokio::test]
async fn test_candidate_with_intact_baseline_is_presented_and_applied() {
    let db = setup_db().await;
    let library = Arc::new(FakeLibrary::new());
    let source = Arc::new(FakeSource::new());

    // Fanart currently set to X; the scan queued an upgrade candidate.
    let mut item = library_item(MediaType::Movie, 42, "Arrival");
    item.art
        .insert(ArtType::Fanart, "http://img/X.jpg".to_string());
    library.insert(item);

    let mut spec = EnqueueSpec::new(MediaType::Movie, 42, "Arrival");
    spec.art_requests = vec![ArtRequest::candidate(ArtType::Fanart, "http://img/X.jpg")];
    let queue_id = queue::enqueue(&db, spec).await.unwrap();

    let upgrade = candidate("http://img/upgrade.jpg");
    source.set_candidates(MediaType::Movie, 42, ArtType::Fanart, vec![upgrade.clone()]);

    let chooser = Arc::new(ScriptedChooser::new(vec![ChooserOutcome::selected(upgrade)]));
    let outcome = reviewer(&db, &library, &source, chooser.clone())
        .review(None, None, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    // The chooser saw the candidate slot with its current URL.
    let requests = chooser.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].current_url, "http://img/X.jpg");
    drop(requests);

    assert_eq!(outcome.stats.applied, 1);
    let art = library.art_of(MediaType::Movie, 42);
    assert_eq!(
        art.get(&ArtType::Fanart).map(String::as_str),
        Some("http://img/upgrade.jpg")
    );

    let items = queue::art_items_for(&db, &[queue_id])
        .await
        .unwrap()
        .remove(&queue_id)
        .unwrap();
    assert_eq!(items[0].status, ArtItemStatus::Completed);
}

/// Chooser that occupies the slot behind the reviewer's back before
/// answering, simulating a library change between presentation and apply.
struct RacingChooser {
    library: Arc<FakeLibrary>,
}

#[async_trait]
impl ArtworkChooser for RacingChooser {
    async fn present(&self, request: ChooserRequest) -> ChooserOutcome {
        self.library.set_art(
            request.media_type,
            42,
            request.art_type,
            "http://img/raced-in.jpg",
        );
        ChooserOutcome::selected(request.candidates[0].clone())
    }
}

#[tokio::test]
async fn test_library_change_between_present_and_apply_is_caught() {
    let db = setup_db().await;
    let library = Arc::new(FakeLibrary::new());
    let source = Arc::new(FakeSource::new());

    library.insert(library_item(MediaType::Movie, 42, "Arrival"));
    let queue_id = enqueue_missing(&db, 42, "Arrival", ArtType::Poster).await;
    source.set_candidates(
        MediaType::Movie,
        42,
        ArtType::Poster,
        vec![candidate("http://img/option.jpg")],
    );

    let chooser = Arc::new(RacingChooser {
        library: library.clone(),
    });
    reviewer(&db, &library, &source, chooser)
        .review(None, None, &CancellationToken::new())
        .await
        .unwrap();

    // The pre-apply re-verification caught the change: nothing applied.
    assert_eq!(library.set_art_call_count(), 0);
    let art = library.art_of(MediaType::Movie, 42);
    assert_eq!(
        art.get(&ArtType::Poster).map(String::as_str),
        Some("http://img/raced-in.jpg")
    );

    let items = queue::art_items_for(&db, &[queue_id])
        .await
        .unwrap()
        .remove(&queue_id)
        .unwrap();
    assert_eq!(items[0].status, ArtItemStatus::Stale);
}

#[tokio::test]
async fn test_cancel_leaves_unapplied_entry_pending() {
    let db = setup_db().await;
    let library = Arc::new(FakeLibrary::new());
    let source = Arc::new(FakeSource::new());

    library.insert(library_item(MediaType::Movie, 42, "Arrival"));
    let queue_id = enqueue_missing(&db, 42, "Arrival", ArtType::Poster).await;
    source.set_candidates(
        MediaType::Movie,
        42,
        ArtType::Poster,
        vec![candidate("http://img/option.jpg")],
    );

    let chooser = Arc::new(ScriptedChooser::new(vec![ChooserOutcome::cancel()]));
    let outcome = reviewer(&db, &library, &source, chooser)
        .review(None, None, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.remaining, 1);

    let batch = queue::next_batch(&db, 10, QueueStatus::Pending, None)
        .await
        .unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].id, queue_id);

    let session = sessions::get_session(&db, outcome.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status, SessionStatus::Paused);
}

#[tokio::test]
async fn test_pause_and_resume_does_not_replay_applied_items() {
    let db = setup_db().await;
    let library = Arc::new(FakeLibrary::new());
    let source = Arc::new(FakeSource::new());

    library.insert(library_item(MediaType::Movie, 1, "First"));
    library.insert(library_item(MediaType::Movie, 2, "Second"));
    enqueue_missing(&db, 1, "First", ArtType::Poster).await;
    enqueue_missing(&db, 2, "Second", ArtType::Poster).await;

    let first_pick = candidate("http://img/first.jpg");
    let second_pick = candidate("http://img/second.jpg");
    source.set_candidates(MediaType::Movie, 1, ArtType::Poster, vec![first_pick.clone()]);
    source.set_candidates(MediaType::Movie, 2, ArtType::Poster, vec![second_pick.clone()]);

    // Run 1: apply the first item, cancel on the second.
    let chooser = Arc::new(ScriptedChooser::new(vec![
        ChooserOutcome::selected(first_pick),
        ChooserOutcome::cancel(),
    ]));
    let paused = reviewer(&db, &library, &source, chooser)
        .review(None, None, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert!(paused.cancelled);
    assert_eq!(paused.stats.applied, 1);
    assert_eq!(paused.remaining, 1);

    // Run 2: resume the session; only the second item is offered.
    let chooser = Arc::new(ScriptedChooser::new(vec![ChooserOutcome::selected(
        second_pick,
    )]));
    let resumed = reviewer(&db, &library, &source, chooser.clone())
        .review(None, Some(paused.session_id), &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(chooser.request_count(), 1);
    assert_eq!(
        chooser.requests.lock().unwrap()[0].title,
        "Second".to_string()
    );

    // Counters continued from the saved session, no duplicated log entries.
    assert_eq!(resumed.stats.applied, 2);
    assert_eq!(resumed.stats.details.manual_applied.len(), 2);
    assert_eq!(resumed.remaining, 0);

    let session = sessions::get_session(&db, resumed.session_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
}

#[tokio::test]
async fn test_skip_marks_item_skipped() {
    let db = setup_db().await;
    let library = Arc::new(FakeLibrary::new());
    let source = Arc::new(FakeSource::new());

    library.insert(library_item(MediaType::Movie, 42, "Arrival"));
    let queue_id = enqueue_missing(&db, 42, "Arrival", ArtType::Poster).await;
    source.set_candidates(
        MediaType::Movie,
        42,
        ArtType::Poster,
        vec![candidate("http://img/option.jpg")],
    );

    let chooser = Arc::new(ScriptedChooser::new(vec![ChooserOutcome::skip()]));
    let outcome = reviewer(&db, &library, &source, chooser)
        .review(None, None, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.stats.skipped, 1);
    let items = queue::art_items_for(&db, &[queue_id])
        .await
        .unwrap()
        .remove(&queue_id)
        .unwrap();
    assert_eq!(items[0].status, ArtItemStatus::Skipped);
}

#[tokio::test]
async fn test_no_options_auto_skips() {
    let db = setup_db().await;
    let library = Arc::new(FakeLibrary::new());
    let source = Arc::new(FakeSource::new());

    library.insert(library_item(MediaType::Movie, 42, "Arrival"));
    enqueue_missing(&db, 42, "Arrival", ArtType::Poster).await;
    // No candidates configured at all.

    let chooser = Arc::new(ScriptedChooser::new(vec![]));
    let outcome = reviewer(&db, &library, &source, chooser.clone())
        .review(None, None, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(chooser.request_count(), 0);
    assert_eq!(outcome.stats.auto, 1);
    assert_eq!(outcome.stats.details.manual_auto.len(), 1);
}
