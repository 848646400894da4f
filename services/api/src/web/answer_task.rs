//! services/api/src/web/answer_task.rs
//!
//! Applies one quiz answer to a child's board: read the current square,
//! move it with the progression rule, write it back, and hand out the reward
//! when the goal is reached.

use crate::config::ProgressUpdateMode;
use crate::web::reward::resolve_reward;
use sugoroku_core::domain::{BoardPosition, ProgressRecord, Reward};
use sugoroku_core::ports::{PortError, PortResult, ProgressStore, TeacherDirectory};
use sugoroku_core::progression::{advance, Step};
use tracing::{debug, error, info, warn};

/// One submitted answer, as sent by the quiz widget.
#[derive(Debug, Clone)]
pub struct AnswerEvent<'a> {
    pub user_id: &'a str,
    pub theme: &'a str,
    pub selected_option: &'a str,
    pub is_correct: bool,
}

/// Represents the outcome of the `submit_answer` task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOutcome {
    pub correct: bool,
    pub new_position: BoardPosition,
    pub finished: bool,
    pub reward: Option<Reward>,
    /// False when the new position could not be written back.
    pub persisted: bool,
}

/// Processes one answer.
///
/// Only a failed read of the current record is an error. A failed write is
/// logged and the computed position is still returned, so the caller's
/// board keeps moving even though the stored record may lag behind.
pub async fn submit_answer(
    progress: &dyn ProgressStore,
    teachers: &dyn TeacherDirectory,
    mode: ProgressUpdateMode,
    event: AnswerEvent<'_>,
) -> PortResult<AnswerOutcome> {
    info!(
        "Answer from {} on '{}': {:?} (correct: {})",
        event.user_id, event.theme, event.selected_option, event.is_correct
    );

    let (step, persisted) = match mode {
        ProgressUpdateMode::Unguarded => apply_unguarded(progress, &event).await?,
        ProgressUpdateMode::CompareAndSwap { max_retries } => {
            apply_compare_and_swap(progress, &event, max_retries).await?
        }
    };

    let reward = if step.finished {
        Some(resolve_reward(teachers, event.theme).await)
    } else {
        None
    };

    Ok(AnswerOutcome {
        correct: event.is_correct,
        new_position: step.next,
        finished: step.finished,
        reward,
        persisted,
    })
}

/// Fetches the current record, treating absence as `None`.
async fn fetch_current(
    progress: &dyn ProgressStore,
    event: &AnswerEvent<'_>,
) -> PortResult<Option<ProgressRecord>> {
    match progress.get(event.user_id, event.theme).await {
        Ok(record) => Ok(Some(record)),
        Err(PortError::NotFound(_)) => Ok(None),
        Err(e) => {
            error!(
                "Error fetching progress for {} / {}: {}",
                event.user_id, event.theme, e
            );
            Err(e)
        }
    }
}

fn current_position(record: &Option<ProgressRecord>) -> BoardPosition {
    record
        .as_ref()
        .map(|r| r.current_position)
        .unwrap_or(BoardPosition::START)
}

/// Plain read-modify-write. Two concurrent answers for the same pair can
/// both read the same square, and one of the moves is then lost.
async fn apply_unguarded(
    progress: &dyn ProgressStore,
    event: &AnswerEvent<'_>,
) -> PortResult<(Step, bool)> {
    let existing = fetch_current(progress, event).await?;
    let step = advance(current_position(&existing), event.is_correct);

    let write = match existing {
        Some(_) => {
            progress
                .update(event.user_id, event.theme, step.next, step.finished)
                .await
        }
        None => progress
            .create(event.user_id, event.theme, step.next, step.finished)
            .await
            .map(|_| ()),
    };

    let persisted = match write {
        Ok(()) => true,
        Err(e) => {
            error!(
                "Error saving progress for {} / {}: {}",
                event.user_id, event.theme, e
            );
            false
        }
    };
    Ok((step, persisted))
}

/// Conditional write on the square that was read; on conflict the record is
/// re-read and the move recomputed, up to `max_retries` times.
async fn apply_compare_and_swap(
    progress: &dyn ProgressStore,
    event: &AnswerEvent<'_>,
    max_retries: u32,
) -> PortResult<(Step, bool)> {
    let mut attempt = 0;
    loop {
        let existing = fetch_current(progress, event).await?;
        let step = advance(current_position(&existing), event.is_correct);

        let write = match &existing {
            Some(record) => {
                progress
                    .compare_and_set(
                        event.user_id,
                        event.theme,
                        record.current_position,
                        step.next,
                        step.finished,
                    )
                    .await
            }
            None => match progress
                .create(event.user_id, event.theme, step.next, step.finished)
                .await
            {
                Ok(_) => Ok(true),
                Err(PortError::AlreadyExists(_)) => Ok(false),
                Err(e) => Err(e),
            },
        };

        match write {
            Ok(true) => return Ok((step, true)),
            Ok(false) if attempt < max_retries => {
                attempt += 1;
                debug!(
                    "Progress for {} / {} changed underneath, retry {}",
                    event.user_id, event.theme, attempt
                );
            }
            Ok(false) => {
                warn!(
                    "Giving up saving progress for {} / {} after {} retries",
                    event.user_id, event.theme, max_retries
                );
                return Ok((step, false));
            }
            Err(e) => {
                error!(
                    "Error saving progress for {} / {}: {}",
                    event.user_id, event.theme, e
                );
                return Ok((step, false));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use sugoroku_core::domain::NewTeacher;
    use tokio::sync::Barrier;

    const CAS: ProgressUpdateMode = ProgressUpdateMode::CompareAndSwap { max_retries: 5 };

    fn event(is_correct: bool) -> AnswerEvent<'static> {
        AnswerEvent {
            user_id: "u1",
            theme: "パン作り",
            selected_option: "イースト",
            is_correct,
        }
    }

    async fn store_at(position: i64) -> InMemoryStore {
        let store = InMemoryStore::new();
        let position = BoardPosition::clamped(position);
        store
            .create("u1", "パン作り", position, position.is_goal())
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn correct_answer_on_nine_finishes_with_reward() {
        for mode in [ProgressUpdateMode::Unguarded, CAS] {
            let store = store_at(9).await;
            let outcome = submit_answer(&store, &store, mode, event(true)).await.unwrap();
            assert_eq!(outcome.new_position.value(), 10);
            assert!(outcome.finished);
            assert!(outcome.persisted);
            let reward = outcome.reward.expect("finishing grants a reward");
            assert_eq!(reward.knowledge_card(), "パン作りマスター");

            let stored = store.get("u1", "パン作り").await.unwrap();
            assert_eq!(stored.current_position.value(), 10);
            assert!(stored.finished);
        }
    }

    #[tokio::test]
    async fn wrong_answer_on_nine_steps_back_without_reward() {
        for mode in [ProgressUpdateMode::Unguarded, CAS] {
            let store = store_at(9).await;
            let outcome = submit_answer(&store, &store, mode, event(false)).await.unwrap();
            assert_eq!(outcome.new_position.value(), 8);
            assert!(!outcome.finished);
            assert!(outcome.reward.is_none());
        }
    }

    #[tokio::test]
    async fn first_answer_creates_the_record() {
        for mode in [ProgressUpdateMode::Unguarded, CAS] {
            let store = InMemoryStore::new();
            let outcome = submit_answer(&store, &store, mode, event(true)).await.unwrap();
            assert_eq!(outcome.new_position.value(), 1);
            let stored = store.get("u1", "パン作り").await.unwrap();
            assert_eq!(stored.current_position.value(), 1);
        }
    }

    #[tokio::test]
    async fn finishing_attaches_the_matching_teacher() {
        let store = store_at(9).await;
        store
            .register_teacher(NewTeacher {
                name: "うちだ".into(),
                shop_name: "うちだベーカリー".into(),
                specialty: "パン作り, ケーキ".into(),
                location: "駅前".into(),
                profile_img_url: None,
                visit_type: "見学".into(),
            })
            .await
            .unwrap();
        let outcome = submit_answer(&store, &store, CAS, event(true)).await.unwrap();
        let reward = outcome.reward.unwrap();
        assert_eq!(reward.teacher().map(|t| t.name.as_str()), Some("うちだ"));
    }

    /// Reads succeed but every write fails.
    struct ReadOnlyStore(InMemoryStore);

    #[async_trait]
    impl ProgressStore for ReadOnlyStore {
        async fn get(&self, u: &str, t: &str) -> PortResult<ProgressRecord> {
            self.0.get(u, t).await
        }
        async fn create(
            &self,
            _u: &str,
            _t: &str,
            _p: BoardPosition,
            _f: bool,
        ) -> PortResult<ProgressRecord> {
            Err(PortError::Unexpected("read-only".into()))
        }
        async fn update(&self, _u: &str, _t: &str, _p: BoardPosition, _f: bool) -> PortResult<()> {
            Err(PortError::Unexpected("read-only".into()))
        }
        async fn compare_and_set(
            &self,
            _u: &str,
            _t: &str,
            _e: BoardPosition,
            _p: BoardPosition,
            _f: bool,
        ) -> PortResult<bool> {
            Err(PortError::Unexpected("read-only".into()))
        }
    }

    #[tokio::test]
    async fn write_failure_still_returns_computed_position_and_reward() {
        for mode in [ProgressUpdateMode::Unguarded, CAS] {
            let inner = store_at(9).await;
            let teachers = InMemoryStore::new();
            let store = ReadOnlyStore(inner);
            let outcome = submit_answer(&store, &teachers, mode, event(true)).await.unwrap();
            assert_eq!(outcome.new_position.value(), 10);
            assert!(outcome.finished);
            assert!(!outcome.persisted);
            assert!(outcome.reward.is_some());
        }
    }

    /// Makes the first two reads wait for each other, so two concurrent
    /// answers both observe the same square before either writes.
    struct InterleavingStore {
        inner: InMemoryStore,
        barrier: Barrier,
        gated_reads: AtomicUsize,
    }

    impl InterleavingStore {
        async fn at(position: i64) -> Self {
            Self {
                inner: store_at(position).await,
                barrier: Barrier::new(2),
                gated_reads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ProgressStore for InterleavingStore {
        async fn get(&self, u: &str, t: &str) -> PortResult<ProgressRecord> {
            let record = self.inner.get(u, t).await;
            if self.gated_reads.fetch_add(1, Ordering::SeqCst) < 2 {
                self.barrier.wait().await;
            }
            record
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

    async fn two_concurrent_correct_answers(mode: ProgressUpdateMode) -> u8 {
        let store = Arc::new(InterleavingStore::at(3).await);
        let teachers = Arc::new(InMemoryStore::new());

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let store = store.clone();
                let teachers = teachers.clone();
                tokio::spawn(async move {
                    submit_answer(store.as_ref(), teachers.as_ref(), mode, event(true))
                        .await
                        .unwrap()
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        store
            .inner
            .get("u1", "パン作り")
            .await
            .unwrap()
            .current_position
            .value()
    }

    #[tokio::test]
    async fn unguarded_updates_lose_a_concurrent_move() {
        // Both answers read 3 and both write 4.
        assert_eq!(two_concurrent_correct_answers(ProgressUpdateMode::Unguarded).await, 4);
    }

    #[tokio::test]
    async fn compare_and_swap_keeps_both_concurrent_moves() {
        assert_eq!(two_concurrent_correct_answers(CAS).await, 5);
    }
}
