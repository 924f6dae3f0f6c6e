use crate::application::clock::Clock;
use crate::domain::streak::advance_streak;
use crate::infrastructure::document_mapper::{user_path, FIELD_STREAK};
use crate::infrastructure::document_store::{DocumentStore, FieldUpdate};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::streak_store::StreakStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct StreakService<S, D>
where
    S: StreakStore + ?Sized,
    D: DocumentStore + ?Sized,
{
    streak_store: Arc<S>,
    document_store: Arc<D>,
    user_id: Option<String>,
    clock: Clock,
}

impl<S, D> StreakService<S, D>
where
    S: StreakStore + ?Sized,
    D: DocumentStore + ?Sized,
{
    pub fn new(streak_store: Arc<S>, document_store: Arc<D>, user_id: Option<String>) -> Self {
        Self {
            streak_store,
            document_store,
            user_id,
            clock: Clock::default(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Called once per launch. Local persistence errors surface; remote sync never fails the call.
    pub async fn check_and_update_streak(&self) -> Result<u32, InfraError> {
        let previous = self.streak_store.load()?;
        let update = advance_streak(previous.as_ref(), self.clock.now(), self.clock.calendar());

        if update.needs_persist() {
            self.streak_store.save(&update.state)?;
        }
        info!(
            transition = ?update.transition,
            streak = update.state.current_streak,
            "streak checked"
        );

        if update.streak_changed() {
            self.sync_remote(update.state.current_streak).await;
        }
        Ok(update.state.current_streak)
    }

    pub fn current_streak(&self) -> Result<u32, InfraError> {
        Ok(self
            .streak_store
            .load()?
            .map(|state| state.current_streak)
            .unwrap_or(0))
    }

    async fn sync_remote(&self, streak: u32) {
        let Some(user_id) = self.user_id.as_deref() else {
            debug!("no user configured; skipping remote streak sync");
            return;
        };
        let result = self
            .document_store
            .update(&user_path(user_id), vec![FieldUpdate::set(FIELD_STREAK, streak)])
            .await;
        if let Err(error) = result {
            warn!(user_id, streak, %error, "remote streak sync failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::streak::{CalendarPolicy, StreakState};
    use crate::infrastructure::document_mapper::new_user_fields;
    use crate::infrastructure::document_store::test_support::FlakyDocumentStore;
    use crate::infrastructure::document_store::InMemoryDocumentStore;
    use crate::infrastructure::streak_store::InMemoryStreakStore;
    use chrono::{DateTime, Utc};
    use serde_json::json;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn clock(at: &str) -> Clock {
        Clock::fixed(fixed_time(at), CalendarPolicy::Zone(chrono_tz::UTC))
    }

    fn service<D: DocumentStore>(
        streak_store: &Arc<InMemoryStreakStore>,
        document_store: &Arc<D>,
        at: &str,
    ) -> StreakService<InMemoryStreakStore, D> {
        StreakService::new(
            Arc::clone(streak_store),
            Arc::clone(document_store),
            Some("u1".to_string()),
        )
        .with_clock(clock(at))
    }

    async fn seeded_documents() -> Arc<InMemoryDocumentStore> {
        let documents = Arc::new(InMemoryDocumentStore::default());
        documents
            .set(&user_path("u1"), new_user_fields("u1").expect("fields"))
            .await
            .expect("seed user");
        documents
    }

    #[tokio::test]
    async fn first_launch_returns_one_and_syncs() {
        let streaks = Arc::new(InMemoryStreakStore::default());
        let documents = seeded_documents().await;

        let streak = service(&streaks, &documents, "2026-03-01T08:00:00Z")
            .check_and_update_streak()
            .await
            .expect("check streak");

        assert_eq!(streak, 1);
        let user = documents.get(&user_path("u1")).await.expect("get").expect("user");
        assert_eq!(user.field(FIELD_STREAK), Some(&json!(1)));
    }

    #[tokio::test]
    async fn same_day_twice_then_next_day_then_gap() {
        let streaks = Arc::new(InMemoryStreakStore::default());
        let documents = seeded_documents().await;

        let first = service(&streaks, &documents, "2026-03-01T08:00:00Z")
            .check_and_update_streak()
            .await
            .expect("first");
        let again = service(&streaks, &documents, "2026-03-01T22:00:00Z")
            .check_and_update_streak()
            .await
            .expect("again");
        assert_eq!(first, again);
        assert_eq!(
            streaks.load().expect("load").expect("state").last_active_at,
            fixed_time("2026-03-01T08:00:00Z")
        );

        let next_day = service(&streaks, &documents, "2026-03-02T07:00:00Z")
            .check_and_update_streak()
            .await
            .expect("next day");
        assert_eq!(next_day, 2);

        let after_gap = service(&streaks, &documents, "2026-03-04T07:00:00Z")
            .check_and_update_streak()
            .await
            .expect("after gap");
        assert_eq!(after_gap, 1);
    }

    #[tokio::test]
    async fn remote_failure_is_swallowed() {
        let streaks = Arc::new(InMemoryStreakStore::with_state(StreakState {
            last_active_at: fixed_time("2026-03-01T08:00:00Z"),
            current_streak: 6,
        }));
        let documents = Arc::new(FlakyDocumentStore::default());
        documents.fail_writes(true);

        let streak = service(&streaks, &documents, "2026-03-02T08:00:00Z")
            .check_and_update_streak()
            .await
            .expect("remote failure must not surface");

        assert_eq!(streak, 7);
        assert_eq!(streaks.load().expect("load").expect("state").current_streak, 7);
    }

    #[tokio::test]
    async fn missing_user_record_is_swallowed() {
        let streaks = Arc::new(InMemoryStreakStore::default());
        let documents = Arc::new(InMemoryDocumentStore::default());

        let streak = service(&streaks, &documents, "2026-03-01T08:00:00Z")
            .check_and_update_streak()
            .await
            .expect("check streak");
        assert_eq!(streak, 1);
    }

    #[test]
    fn current_streak_reads_without_updating() {
        let streaks = Arc::new(InMemoryStreakStore::default());
        let documents = Arc::new(InMemoryDocumentStore::default());
        let service = service(&streaks, &documents, "2026-03-01T08:00:00Z");

        assert_eq!(service.current_streak().expect("empty"), 0);
        streaks
            .save(&StreakState {
                last_active_at: fixed_time("2026-02-01T08:00:00Z"),
                current_streak: 9,
            })
            .expect("save");
        assert_eq!(service.current_streak().expect("stored"), 9);
    }
}
