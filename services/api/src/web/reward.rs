//! services/api/src/web/reward.rs
//!
//! Builds the reward handed out when a child reaches the goal of a theme.

use sugoroku_core::domain::Reward;
use sugoroku_core::ports::TeacherDirectory;
use tracing::{info, warn};

/// Resolves the reward for a finished theme.
///
/// The knowledge card is always granted. A failed teacher lookup only drops
/// the teacher from the reward.
pub async fn resolve_reward(teachers: &dyn TeacherDirectory, theme: &str) -> Reward {
    let teacher = match teachers.find_teacher_for_theme(theme).await {
        Ok(teacher) => teacher,
        Err(e) => {
            warn!("Teacher lookup for '{}' failed, rewarding without one: {}", theme, e);
            None
        }
    };

    match &teacher {
        Some(t) => info!("Theme '{}' finished, unlocking teacher {} ({})", theme, t.name, t.id),
        None => info!("Theme '{}' finished, no matching teacher", theme),
    }
    Reward::for_theme(theme, teacher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryStore;
    use async_trait::async_trait;
    use sugoroku_core::domain::{NewTeacher, TeacherProfile};
    use sugoroku_core::ports::{PortError, PortResult};

    struct BrokenDirectory;

    #[async_trait]
    impl TeacherDirectory for BrokenDirectory {
        async fn register_teacher(&self, _teacher: NewTeacher) -> PortResult<TeacherProfile> {
            Err(PortError::Unexpected("down".into()))
        }

        async fn find_teacher_for_theme(&self, _theme: &str) -> PortResult<Option<TeacherProfile>> {
            Err(PortError::Unexpected("down".into()))
        }
    }

    #[tokio::test]
    async fn lookup_failure_still_grants_the_card() {
        let reward = resolve_reward(&BrokenDirectory, "パン作り").await;
        assert_eq!(reward, Reward::for_theme("パン作り", None));
    }

    #[tokio::test]
    async fn matching_teacher_is_attached() {
        let store = InMemoryStore::new();
        store
            .register_teacher(NewTeacher {
                name: "うちだ".into(),
                shop_name: "うちだベーカリー".into(),
                specialty: "パン作り".into(),
                location: "駅前".into(),
                profile_img_url: None,
                visit_type: "見学".into(),
            })
            .await
            .unwrap();

        let reward = resolve_reward(&store, "パン作り").await;
        assert_eq!(reward.knowledge_card(), "パン作りマスター");
        assert_eq!(reward.teacher().map(|t| t.shop_name.as_str()), Some("うちだベーカリー"));
    }

    #[tokio::test]
    async fn any_theme_gets_a_non_empty_card() {
        let store = InMemoryStore::new();
        for theme in ["", "金魚", "Bread making"] {
            let reward = resolve_reward(&store, theme).await;
            assert!(!reward.knowledge_card().is_empty());
            assert!(reward.teacher().is_none());
        }
    }
}
