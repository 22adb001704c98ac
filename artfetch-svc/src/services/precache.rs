//! Bulk texture pre-cache worker pool.
//!
//! Drains the persistent `precache_queue`: each URL is downloaded, its pixel
//! dimensions decoded and stored in `texture_cache`. Workers are idempotent
//! (measuring the same URL twice is harmless), so the pass can be cancelled
//! and resumed on a later invocation without re-running discovery.

use futures::stream::{self, StreamExt};
use sqlx::SqlitePool;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use artfetch_common::events::{ArtEvent, EventBus};
use artfetch_common::Result;

use crate::db::textures;

const DEFAULT_WORKERS: usize = 4;
const BATCH_SIZE: i64 = 50;

#[derive(Debug, Clone, Default)]
pub struct PrecacheStats {
    pub completed: u64,
    pub failed: u64,
    pub remaining: u64,
}

pub struct PrecachePool {
    db: SqlitePool,
    events: EventBus,
    client: reqwest::Client,
    workers: usize,
}

impl PrecachePool {
    pub fn new(db: SqlitePool, events: EventBus) -> Self {
        Self::with_workers(db, events, DEFAULT_WORKERS)
    }

    pub fn with_workers(db: SqlitePool, events: EventBus, workers: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("artfetch/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("reqwest client");

        Self {
            db,
            events,
            client,
            workers: workers.max(1),
        }
    }

    /// Run until the queue is drained or the token fires.
    ///
    /// Cancellation stops intake between batches; in-flight downloads settle
    /// within their HTTP timeout.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<PrecacheStats> {
        let total = textures::pending_precache_count(&self.db).await?;
        if total == 0 {
            return Ok(PrecacheStats::default());
        }

        tracing::info!(total, workers = self.workers, "Starting texture pre-cache");

        let completed = AtomicU64::new(0);
        let failed = AtomicU64::new(0);

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let batch = textures::next_precache_batch(&self.db, BATCH_SIZE).await?;
            if batch.is_empty() {
                break;
            }

            stream::iter(batch)
                .for_each_concurrent(self.workers, |url| {
                    let completed = &completed;
                    let failed = &failed;
                    async move {
                        if cancel.is_cancelled() {
                            return;
                        }

                        match self.measure(&url).await {
                            Ok((width, height)) => {
                                if let Err(e) =
                                    textures::put_texture(&self.db, &url, width, height).await
                                {
                                    tracing::error!("Failed to store texture dims: {}", e);
                                }
                                let _ = textures::mark_precache(&self.db, &url, true).await;
                                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                                self.events.emit_lossy(ArtEvent::PrecacheProgress {
                                    completed: done,
                                    total,
                                    timestamp: chrono::Utc::now(),
                                });
                            }
                            Err(e) => {
                                tracing::warn!("Pre-cache failed for {}: {}", url, e);
                                let _ = textures::mark_precache(&self.db, &url, false).await;
                                failed.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                })
                .await;
        }

        let remaining = textures::pending_precache_count(&self.db).await?;
        if remaining == 0 {
            textures::clear_finished_precache(&self.db).await?;
        }
        let stats = PrecacheStats {
            completed: completed.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
            remaining,
        };

        tracing::info!(
            completed = stats.completed,
            failed = stats.failed,
            remaining = stats.remaining,
            "Texture pre-cache finished"
        );

        Ok(stats)
    }

    async fn measure(&self, url: &str) -> std::result::Result<(u32, u32), String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }

        let bytes = response.bytes().await.map_err(|e| e.to_string())?;

        image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| e.to_string())?
            .into_dimensions()
            .map_err(|e| e.to_string())
    }
}
