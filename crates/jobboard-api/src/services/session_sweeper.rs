//! Background service that deletes expired login sessions.
//!
//! Expired sessions are already rejected at request time; this keeps the
//! `sessions` collection from growing without bound.

use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info};

use jobboard_firestore::SessionRepository;

use crate::metrics;

/// Default interval between sweeps.
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Sessions fetched per query. A sweep keeps paging until a short page.
const SWEEP_PAGE_SIZE: u32 = 500;

/// Upper bound on pages per sweep so one run cannot monopolise the store.
const MAX_PAGES_PER_SWEEP: usize = 20;

/// Expired session sweeper.
pub struct SessionSweeper {
    sessions: SessionRepository,
    interval: Duration,
    enabled: bool,
    page_size: u32,
    max_pages: usize,
}

impl SessionSweeper {
    /// Create a sweeper configured from `SESSION_SWEEP_ENABLED` and
    /// `SESSION_SWEEP_INTERVAL_SECS`.
    pub fn new(sessions: SessionRepository) -> Self {
        let enabled = std::env::var("SESSION_SWEEP_ENABLED")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true); // Enabled by default

        let interval = std::env::var("SESSION_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SWEEP_INTERVAL);

        Self {
            sessions,
            interval,
            enabled,
            page_size: SWEEP_PAGE_SIZE,
            max_pages: MAX_PAGES_PER_SWEEP,
        }
    }

    /// Override the page size and the page cap of a sweep.
    pub fn with_paging(mut self, page_size: u32, max_pages: usize) -> Self {
        self.page_size = page_size.max(1);
        self.max_pages = max_pages;
        self
    }

    /// Start the background sweep loop.
    ///
    /// This function runs indefinitely and should be spawned as a background task.
    pub async fn run(&self) {
        if !self.enabled {
            info!("Session sweeping is disabled");
            return;
        }

        info!("Starting session sweeper (interval: {:?})", self.interval);

        let mut ticker = interval(self.interval);

        loop {
            ticker.tick().await;

            match self.sweep_once().await {
                Ok(0) => {}
                Ok(deleted) => info!("Deleted {} expired sessions", deleted),
                Err(e) => error!("Session sweep error: {}", e),
            }
        }
    }

    /// Run a single sweep. Returns the number of sessions deleted.
    pub async fn sweep_once(&self) -> anyhow::Result<usize> {
        let now = Utc::now();
        let mut total = 0;

        for _ in 0..self.max_pages {
            let expired = self.sessions.list_expired(now, self.page_size).await?;
            if expired.is_empty() {
                break;
            }

            let deleted = self.sessions.delete_many(&expired).await?;
            total += deleted;
            metrics::record_sessions_swept(deleted);

            if expired.len() < self.page_size as usize {
                break;
            }
        }

        Ok(total)
    }
}
