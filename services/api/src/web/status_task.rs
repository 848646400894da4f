//! services/api/src/web/status_task.rs
//!
//! Reads a child's board status for a theme, creating the record on first access.

use chrono::{DateTime, Utc};
use sugoroku_core::domain::{BoardPosition, ProgressRecord};
use sugoroku_core::ports::{PortError, ProgressStore};
use tracing::{error, info};

/// The board status returned to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusView {
    pub theme: String,
    pub current_position: BoardPosition,
    pub finished: bool,
    pub started_at: DateTime<Utc>,
    /// Set when the store failed; the other fields are then the "not started" defaults.
    pub error: Option<String>,
}

impl StatusView {
    fn from_record(record: ProgressRecord) -> Self {
        Self {
            theme: record.theme,
            current_position: record.current_position,
            finished: record.finished,
            started_at: record.started_at,
            error: None,
        }
    }

    fn degraded(theme: &str, error: String) -> Self {
        Self {
            theme: theme.to_string(),
            current_position: BoardPosition::START,
            finished: false,
            started_at: Utc::now(),
            error: Some(error),
        }
    }
}

/// Returns the stored status, creating a fresh record at the start square if
/// none exists. Store failures never escape: the caller gets a degraded view
/// so the learning flow is not blocked.
pub async fn get_or_create_status(store: &dyn ProgressStore, user_id: &str, theme: &str) -> StatusView {
    match store.get(user_id, theme).await {
        Ok(record) => return StatusView::from_record(record),
        Err(PortError::NotFound(_)) => {}
        Err(e) => {
            error!("Error fetching progress for {} / {}: {}", user_id, theme, e);
            return StatusView::degraded(theme, format!("Failed to fetch progress: {}", e));
        }
    }

    match store.create(user_id, theme, BoardPosition::START, false).await {
        Ok(record) => {
            info!("Started theme '{}' for user {}", theme, user_id);
            StatusView::from_record(record)
        }
        // Another request created it between our get and create.
        Err(PortError::AlreadyExists(_)) => match store.get(user_id, theme).await {
            Ok(record) => StatusView::from_record(record),
            Err(e) => {
                error!("Error re-reading progress for {} / {}: {}", user_id, theme, e);
                StatusView::degraded(theme, format!("Failed to fetch progress: {}", e))
            }
        },
        Err(e) => {
            error!("Error creating progress for {} / {}: {}", user_id, theme, e);
            StatusView::degraded(theme, format!("Failed to create progress: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use sugoroku_core::ports::PortResult;

    #[tokio::test]
    async fn first_access_creates_record_at_start() {
        let store = InMemoryStore::new();
        let first = get_or_create_status(&store, "u1", "パン作り").await;
        let second = get_or_create_status(&store, "u1", "パン作り").await;

        for view in [&first, &second] {
            assert_eq!(view.current_position, BoardPosition::START);
            assert!(!view.finished);
            assert!(view.error.is_none());
        }
        assert_eq!(first.started_at, second.started_at);
        assert_eq!(store.progress_count().await, 1);
    }

    #[tokio::test]
    async fn existing_record_is_returned_unchanged() {
        let store = InMemoryStore::new();
        store
            .create("u1", "パン作り", BoardPosition::clamped(6), false)
            .await
            .unwrap();
        let view = get_or_create_status(&store, "u1", "パン作り").await;
        assert_eq!(view.current_position.value(), 6);
    }

    /// Fails every read with a storage error.
    struct FailingStore;

    #[async_trait]
    impl ProgressStore for FailingStore {
        async fn get(&self, _u: &str, _t: &str) -> PortResult<ProgressRecord> {
            Err(PortError::Unexpected("connection reset".into()))
        }
        async fn create(
            &self,
            _u: &str,
            _t: &str,
            _p: BoardPosition,
            _f: bool,
        ) -> PortResult<ProgressRecord> {
            unreachable!("create must not be attempted after a failed read")
        }
        async fn update(&self, _u: &str, _t: &str, _p: BoardPosition, _f: bool) -> PortResult<()> {
            unreachable!()
        }
        async fn compare_and_set(
            &self,
            _u: &str,
            _t: &str,
            _e: BoardPosition,
            _p: BoardPosition,
            _f: bool,
        ) -> PortResult<bool> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn read_failure_degrades_to_not_started() {
        let view = get_or_create_status(&FailingStore, "u1", "パン作り").await;
        assert_eq!(view.current_position, BoardPosition::START);
        assert!(!view.finished);
        assert_eq!(view.theme, "パン作り");
        assert!(view.error.unwrap().contains("connection reset"));
    }

    /// Reports NotFound on the first read, loses the create race, then finds
    /// the winner's record.
    struct LosesCreateRace {
        inner: InMemoryStore,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl ProgressStore for LosesCreateRace {
        async fn get(&self, u: &str, t: &str) -> PortResult<ProgressRecord> {
            if self.reads.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(PortError::NotFound("not yet".into()));
            }
            self.inner.get(u, t).await
        }
        async fn create(
            &self,
            u: &str,
            t: &str,
            p: BoardPosition,
            f: bool,
        ) -> PortResult<ProgressRecord> {
            self.inner.create(u, t, p, f).await
        }
        async fn update(&self, u: &str, t: &str, p: BoardPosition, f: bool) -> PortResult<()> {
            self.inner.update(u, t, p, f).await
        }
        async fn compare_and_set(
            &self,
            u: &str,
            t: &str,
            e: BoardPosition,
            p: BoardPosition,
            f: bool,
        ) -> PortResult<bool> {
            self.inner.compare_and_set(u, t, e, p, f).await
        }
    }

    #[tokio::test]
    async fn lost_create_race_rereads_the_winner() {
        let inner = InMemoryStore::new();
        inner
            .create("u1", "パン作り", BoardPosition::clamped(2), false)
            .await
            .unwrap();
        let store = LosesCreateRace {
            inner,
            reads: AtomicUsize::new(0),
        };

        let view = get_or_create_status(&store, "u1", "パン作り").await;
        assert!(view.error.is_none());
        assert_eq!(view.current_position.value(), 2);
    }
}
