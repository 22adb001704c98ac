//! Scanner behavior: discovery, sessions, cancellation, the precache gate
//! and upgrade detection.

mod common;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use artfetch_common::events::EventBus;
use artfetch_svc::db::{queue, sessions, textures};
use artfetch_svc::models::{ArtType, MediaType, QueueStatus, ReviewMode, SessionStatus};
use artfetch_svc::services::{
    LanguagePolicy, ScanOptions, ScanScope, ScanStatus, Scanner,
};

use common::{library_item, rated_candidate, setup_db, FakeLibrary, FakeSource};

fn scanner(
    db: &sqlx::SqlitePool,
    library: &Arc<FakeLibrary>,
    source: &Arc<FakeSource>,
    options: ScanOptions,
) -> Scanner {
    Scanner::new(
        db.clone(),
        library.clone(),
        source.clone(),
        EventBus::new(16),
        LanguagePolicy::new("en", false),
        options,
    )
}

fn poster_only_options() -> ScanOptions {
    ScanOptions {
        art_types: Some(vec![ArtType::Poster, ArtType::Fanart]),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_scan_queues_items_with_missing_artwork() {
    let db = setup_db().await;
    let library = Arc::new(FakeLibrary::new());
    let source = Arc::new(FakeSource::new());

    // One complete movie, one with both checked slots empty.
    let mut complete = library_item(MediaType::Movie, 1, "Complete");
    complete
        .art
        .insert(ArtType::Poster, "http://img/p.jpg".to_string());
    complete
        .art
        .insert(ArtType::Fanart, "http://img/f.jpg".to_string());
    library.insert(complete);
    library.insert(library_item(MediaType::Movie, 2, "Bare"));

    let scanner = scanner(&db, &library, &source, poster_only_options());
    let session_id = scanner.begin_session(ScanScope::Movies, None).await.unwrap();
    let outcome = scanner
        .scan(ScanScope::Movies, session_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, ScanStatus::Completed);
    assert_eq!(outcome.scanned, 2);
    assert_eq!(outcome.queued, 1);

    let batch = queue::next_batch(&db, 10, QueueStatus::Pending, None)
        .await
        .unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].title, "Bare");
    assert_eq!(batch[0].scan_session_id, Some(session_id));

    let items = queue::art_items_for(&db, &[batch[0].id])
        .await
        .unwrap()
        .remove(&batch[0].id)
        .unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|item| item.review_mode == ReviewMode::Missing));

    let session = sessions::get_session(&db, session_id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.stats.scanned, 2);
    assert_eq!(session.stats.queued, 1);
}

#[tokio::test]
async fn test_collection_failure_cancels_session() {
    let db = setup_db().await;
    let library = Arc::new(FakeLibrary::new());
    let source = Arc::new(FakeSource::new());

    *library.fail_listing.lock().unwrap() = Some(MediaType::Movie);

    let scanner = scanner(&db, &library, &source, poster_only_options());
    let session_id = scanner.begin_session(ScanScope::Movies, None).await.unwrap();
    let result = scanner
        .scan(ScanScope::Movies, session_id, &CancellationToken::new())
        .await;

    assert!(result.is_err());
    let session = sessions::get_session(&db, session_id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Cancelled);
}

#[tokio::test]
async fn test_cancellation_pauses_session() {
    let db = setup_db().await;
    let library = Arc::new(FakeLibrary::new());
    let source = Arc::new(FakeSource::new());
    library.insert(library_item(MediaType::Movie, 1, "Bare"));

    let cancel = CancellationToken::new();
    cancel.cancel();

    let scanner = scanner(&db, &library, &source, poster_only_options());
    let session_id = scanner.begin_session(ScanScope::Movies, None).await.unwrap();
    let outcome = scanner.scan(ScanScope::Movies, session_id, &cancel).await.unwrap();

    assert_eq!(outcome.status, ScanStatus::Paused);
    let session = sessions::get_session(&db, session_id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Paused);
}

#[tokio::test]
async fn test_upgrade_detection_requires_precache_confirmation() {
    let db = setup_db().await;
    let library = Arc::new(FakeLibrary::new());
    let source = Arc::new(FakeSource::new());

    // Existing poster with dimensions known neither locally nor to the
    // library.
    let mut item = library_item(MediaType::Movie, 1, "Arrival");
    item.art
        .insert(ArtType::Poster, "http://img/unmeasured.jpg".to_string());
    library.insert(item);

    let options = ScanOptions {
        include_upgrades: true,
        confirm_precache: false,
        art_types: Some(vec![ArtType::Poster]),
        ..Default::default()
    };
    let scanner = scanner(&db, &library, &source, options);
    let session_id = scanner.begin_session(ScanScope::Movies, None).await.unwrap();
    let outcome = scanner
        .scan(ScanScope::Movies, session_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, ScanStatus::PrecacheRequired);
    assert_eq!(outcome.precache_pending, 1);

    // The caching work list is durable; discovery need not re-run for it.
    let pending = textures::pending_precache_count(&db).await.unwrap();
    assert_eq!(pending, 1);

    let session = sessions::get_session(&db, session_id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Paused);
}

#[tokio::test]
async fn test_upgrade_detection_queues_candidate() {
    let db = setup_db().await;
    let library = Arc::new(FakeLibrary::new());
    let source = Arc::new(FakeSource::new());

    let mut item = library_item(MediaType::Movie, 1, "Arrival");
    item.art
        .insert(ArtType::Poster, "http://img/small.jpg".to_string());
    library.insert(item);
    // Library knows the cached texture's true dimensions.
    library.set_texture("http://img/small.jpg", 500, 750);

    // Fresh provider data offers 16x the pixels.
    let mut big = rated_candidate("http://img/big.jpg", 6.0, 50);
    big.width = 2000;
    big.height = 3000;
    big.language = "en".to_string();
    source.set_candidates(MediaType::Movie, 1, ArtType::Poster, vec![big]);

    let options = ScanOptions {
        include_upgrades: true,
        confirm_precache: true,
        art_types: Some(vec![ArtType::Poster]),
        ..Default::default()
    };
    let scanner = scanner(&db, &library, &source, options);
    let session_id = scanner.begin_session(ScanScope::Movies, None).await.unwrap();
    let outcome = scanner
        .scan(ScanScope::Movies, session_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, ScanStatus::Completed);
    assert_eq!(outcome.queued, 1);

    let batch = queue::next_batch(&db, 10, QueueStatus::Pending, None)
        .await
        .unwrap();
    let items = queue::art_items_for(&db, &[batch[0].id])
        .await
        .unwrap()
        .remove(&batch[0].id)
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].review_mode, ReviewMode::Candidate);
    assert_eq!(items[0].baseline_url, "http://img/small.jpg");
    assert!(items[0].requires_manual);
}

#[tokio::test]
async fn test_small_improvement_is_not_an_upgrade() {
    let db = setup_db().await;
    let library = Arc::new(FakeLibrary::new());
    let source = Arc::new(FakeSource::new());

    let mut item = library_item(MediaType::Movie, 1, "Arrival");
    item.art
        .insert(ArtType::Poster, "http://img/current.jpg".to_string());
    library.insert(item);
    library.set_texture("http://img/current.jpg", 1000, 1500);

    // Only 10% more pixels: below the 1.25x threshold.
    let mut slightly_bigger = rated_candidate("http://img/bigger.jpg", 0.0, 0);
    slightly_bigger.width = 1050;
    slightly_bigger.height = 1575;
    slightly_bigger.language = "en".to_string();
    source.set_candidates(MediaType::Movie, 1, ArtType::Poster, vec![slightly_bigger]);

    let options = ScanOptions {
        include_upgrades: true,
        confirm_precache: true,
        art_types: Some(vec![ArtType::Poster]),
        ..Default::default()
    };
    let scanner = scanner(&db, &library, &source, options);
    let session_id = scanner.begin_session(ScanScope::Movies, None).await.unwrap();
    let outcome = scanner
        .scan(ScanScope::Movies, session_id, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.queued, 0);
}

#[tokio::test]
async fn test_new_scan_cancels_paused_session_for_same_scope() {
    let db = setup_db().await;
    let library = Arc::new(FakeLibrary::new());
    let source = Arc::new(FakeSource::new());
    library.insert(library_item(MediaType::Movie, 1, "Bare"));

    let scanner = scanner(&db, &library, &source, poster_only_options());

    // First scan pauses.
    let cancel = CancellationToken::new();
    cancel.cancel();
    let first = scanner.begin_session(ScanScope::Movies, None).await.unwrap();
    scanner.scan(ScanScope::Movies, first, &cancel).await.unwrap();

    // A fresh scan for the same scope cancels the paused one, never merges.
    let second = scanner.begin_session(ScanScope::Movies, None).await.unwrap();
    assert_ne!(first, second);

    let old = sessions::get_session(&db, first).await.unwrap().unwrap();
    assert_eq!(old.status, SessionStatus::Cancelled);

    // Resuming instead reuses the session.
    let cancel = CancellationToken::new();
    cancel.cancel();
    scanner.scan(ScanScope::Movies, second, &cancel).await.unwrap();
    let resumed = scanner
        .begin_session(ScanScope::Movies, Some(second))
        .await
        .unwrap();
    assert_eq!(resumed, second);
}
