//! Queue store behavior: idempotent enqueue, prune/restore, counts.

mod common;

use artfetch_svc::db::queue;
use artfetch_svc::models::queue::ArtRequest;
use artfetch_svc::models::{
    ArtItemStatus, ArtType, EnqueueSpec, MediaType, QueueStatus, ReviewMode,
};

use common::setup_db;

fn spec_with_poster(library_id: i64, title: &str) -> EnqueueSpec {
    let mut spec = EnqueueSpec::new(MediaType::Movie, library_id, title);
    spec.art_requests = vec![ArtRequest::missing(ArtType::Poster)];
    spec
}

#[tokio::test]
async fn test_enqueue_same_item_twice_yields_one_entry_reset_to_pending() {
    let db = setup_db().await;

    let first = queue::enqueue(&db, spec_with_poster(42, "Arrival")).await.unwrap();

    // Resolve the entry, then re-enqueue it.
    queue::set_queue_status(&db, first, QueueStatus::Completed)
        .await
        .unwrap();

    let second = queue::enqueue(&db, spec_with_poster(42, "Arrival")).await.unwrap();
    assert_eq!(first, second);

    let total = queue::count_queue_items(&db, None, None).await.unwrap();
    assert_eq!(total, 1);

    let pending = queue::count_queue_items(&db, Some(QueueStatus::Pending), None)
        .await
        .unwrap();
    assert_eq!(pending, 1);
}

#[tokio::test]
async fn test_art_items_upserted_not_duplicated() {
    let db = setup_db().await;

    let queue_id = queue::enqueue(&db, spec_with_poster(42, "Arrival")).await.unwrap();

    // Re-scan finds the same slot, now as an upgrade candidate.
    let mut spec = EnqueueSpec::new(MediaType::Movie, 42, "Arrival");
    spec.art_requests = vec![ArtRequest::candidate(ArtType::Poster, "http://img/old.jpg")];
    queue::enqueue(&db, spec).await.unwrap();

    let items = queue::art_items_for(&db, &[queue_id])
        .await
        .unwrap()
        .remove(&queue_id)
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].review_mode, ReviewMode::Candidate);
    assert_eq!(items[0].baseline_url, "http://img/old.jpg");
    assert!(items[0].requires_manual);
    assert_eq!(items[0].status, ArtItemStatus::Pending);
}

#[tokio::test]
async fn test_batch_enqueue_returns_ids_in_input_order() {
    let db = setup_db().await;

    let specs = vec![
        spec_with_poster(10, "First"),
        spec_with_poster(11, "Second"),
        spec_with_poster(12, "Third"),
    ];
    let ids = queue::enqueue_batch(&db, &specs).await.unwrap();
    assert_eq!(ids.len(), 3);

    let batch = queue::next_batch(&db, 10, QueueStatus::Pending, None)
        .await
        .unwrap();
    let titles: Vec<&str> = batch.iter().map(|entry| entry.title.as_str()).collect();
    assert_eq!(titles, vec!["First", "Second", "Third"]);
}

#[tokio::test]
async fn test_next_batch_honors_media_filter() {
    let db = setup_db().await;

    queue::enqueue(&db, spec_with_poster(1, "Movie")).await.unwrap();
    let mut show = EnqueueSpec::new(MediaType::TvShow, 2, "Show");
    show.art_requests = vec![ArtRequest::missing(ArtType::Poster)];
    queue::enqueue(&db, show).await.unwrap();

    let movies = queue::next_batch(&db, 10, QueueStatus::Pending, Some(&[MediaType::Movie]))
        .await
        .unwrap();
    assert_eq!(movies.len(), 1);
    assert_eq!(movies[0].media_type, MediaType::Movie);
}

#[tokio::test]
async fn test_prune_keeps_rows_with_pending_art_items() {
    let db = setup_db().await;

    let mut spec = EnqueueSpec::new(MediaType::Movie, 42, "Arrival");
    spec.art_requests = vec![
        ArtRequest::missing(ArtType::Poster),
        ArtRequest::candidate(ArtType::Fanart, "http://img/old.jpg"),
    ];
    let queue_id = queue::enqueue(&db, spec).await.unwrap();

    // Terminal queue status, but the fanart candidate is still pending.
    queue::set_queue_status(&db, queue_id, QueueStatus::Skipped)
        .await
        .unwrap();
    let items = queue::art_items_for(&db, &[queue_id])
        .await
        .unwrap()
        .remove(&queue_id)
        .unwrap();
    let poster = items
        .iter()
        .find(|item| item.art_type == ArtType::Poster)
        .unwrap();
    queue::set_art_item_status(&db, poster.id, ArtItemStatus::Skipped)
        .await
        .unwrap();

    let removed = queue::prune_inactive(&db).await.unwrap();
    assert_eq!(removed, 0);

    // Restore brings the row back to pending for the remaining work.
    let restored = queue::restore_pending_items(&db, None).await.unwrap();
    assert_eq!(restored, 1);
    let pending = queue::count_queue_items(&db, Some(QueueStatus::Pending), None)
        .await
        .unwrap();
    assert_eq!(pending, 1);
}

#[tokio::test]
async fn test_prune_removes_fully_resolved_rows() {
    let db = setup_db().await;

    let queue_id = queue::enqueue(&db, spec_with_poster(42, "Arrival")).await.unwrap();
    let items = queue::art_items_for(&db, &[queue_id])
        .await
        .unwrap()
        .remove(&queue_id)
        .unwrap();
    queue::mark_art_item_selected(&db, items[0].id, "http://img/p.jpg", false)
        .await
        .unwrap();
    queue::set_queue_status(&db, queue_id, QueueStatus::Completed)
        .await
        .unwrap();

    let removed = queue::prune_inactive(&db).await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(queue::count_queue_items(&db, None, None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_mark_selected_completes_item() {
    let db = setup_db().await;

    let queue_id = queue::enqueue(&db, spec_with_poster(42, "Arrival")).await.unwrap();
    let items = queue::art_items_for(&db, &[queue_id])
        .await
        .unwrap()
        .remove(&queue_id)
        .unwrap();

    queue::mark_art_item_selected(&db, items[0].id, "http://img/p.jpg", true)
        .await
        .unwrap();

    let items = queue::art_items_for(&db, &[queue_id])
        .await
        .unwrap()
        .remove(&queue_id)
        .unwrap();
    assert_eq!(items[0].status, ArtItemStatus::Completed);
    assert_eq!(items[0].selected_url.as_deref(), Some("http://img/p.jpg"));
    assert!(!items[0].requires_manual);
}

#[tokio::test]
async fn test_count_pending_missing_ignores_candidates() {
    let db = setup_db().await;

    let mut spec = EnqueueSpec::new(MediaType::Movie, 42, "Arrival");
    spec.art_requests = vec![
        ArtRequest::missing(ArtType::Poster),
        ArtRequest::candidate(ArtType::Fanart, "http://img/old.jpg"),
    ];
    queue::enqueue(&db, spec).await.unwrap();

    let missing = queue::count_pending_missing(&db, None).await.unwrap();
    assert_eq!(missing, 1);
}
