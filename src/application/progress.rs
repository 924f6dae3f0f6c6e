use crate::application::clock::Clock;
use crate::domain::models::{date_key, UserProfile};
use crate::domain::plan::{reduce, PlanEvent, PlanState};
use crate::domain::progress::{flashcard_activity, ActivityBucket, ChartInterval, StudyTimeSummary};
use crate::infrastructure::document_mapper::{
    decode_flashcard_set_summary, decode_stored_plan, decode_user_profile, flashcard_sets_collection,
    plans_collection, statistics_path, user_path, FIELD_CREATED_AT,
};
use crate::infrastructure::document_store::{DocumentStore, Filter};
use crate::infrastructure::error::InfraError;
use chrono::Days;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressReport {
    pub interval: ChartInterval,
    pub study_time: StudyTimeSummary,
    pub completed_study_time: String,
    pub incomplete_study_time: String,
    pub flashcard_activity: Vec<ActivityBucket>,
    pub total_flashcards_created: u64,
}

pub struct ProgressService<D>
where
    D: DocumentStore + ?Sized,
{
    document_store: Arc<D>,
    user_id: String,
    clock: Clock,
}

impl<D> ProgressService<D>
where
    D: DocumentStore + ?Sized,
{
    pub fn new(document_store: Arc<D>, user_id: impl Into<String>) -> Self {
        Self {
            document_store,
            user_id: user_id.into(),
            clock: Clock::default(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub async fn report(&self, interval: ChartInterval) -> Result<ProgressReport, InfraError> {
        let profile = self.load_profile().await?;
        let study_time = self.study_time(&profile).await?;
        let flashcard_activity = self.flashcard_activity(interval).await?;

        Ok(ProgressReport {
            interval,
            completed_study_time: study_time.completed_label(),
            incomplete_study_time: study_time.incomplete_label(),
            study_time,
            flashcard_activity,
            total_flashcards_created: profile.map(|profile| profile.flashcards_created).unwrap_or(0),
        })
    }

    async fn load_profile(&self) -> Result<Option<UserProfile>, InfraError> {
        match self.document_store.get(&user_path(&self.user_id)).await? {
            Some(document) => match decode_user_profile(&document) {
                Ok(profile) => Ok(Some(profile)),
                Err(error) => {
                    warn!(%error, "ignoring malformed user record");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn study_time(&self, profile: &Option<UserProfile>) -> Result<StudyTimeSummary, InfraError> {
        let has_statistics = self
            .document_store
            .get(&statistics_path(&self.user_id))
            .await?
            .is_some();
        if !has_statistics {
            let profile = profile.as_ref();
            return Ok(StudyTimeSummary {
                completed_minutes: profile.and_then(|profile| profile.completed_study_time).unwrap_or(0),
                incomplete_minutes: profile.and_then(|profile| profile.incomplete_study_time).unwrap_or(0),
            });
        }

        let documents = self
            .document_store
            .query(&plans_collection(&self.user_id), Vec::new())
            .await?;
        let stored = documents
            .iter()
            .filter_map(|document| match decode_stored_plan(document) {
                Ok(plan) => Some(plan),
                Err(error) => {
                    warn!(path = %document.path, %error, "skipping malformed study plan");
                    None
                }
            })
            .collect();
        // Only the snapshot matters here; the reconciliation writes are left to the plan service.
        let state = reduce(&PlanState::default(), PlanEvent::Loaded(stored), self.clock.today()).state;
        Ok(StudyTimeSummary::from_plans(&state))
    }

    async fn flashcard_activity(&self, interval: ChartInterval) -> Result<Vec<ActivityBucket>, InfraError> {
        let today = self.clock.today();
        // One day of slack covers zones east of UTC; exact bucketing happens below.
        let lower_bound = interval
            .buckets(today)
            .first()
            .and_then(|start| start.checked_sub_days(Days::new(1)))
            .map(date_key);
        let filters = lower_bound
            .map(|bound| vec![Filter::Gte(FIELD_CREATED_AT.to_string(), bound.into())])
            .unwrap_or_default();

        let documents = self
            .document_store
            .query(&flashcard_sets_collection(&self.user_id), filters)
            .await?;
        let created = documents.iter().filter_map(|document| match decode_flashcard_set_summary(document) {
            Ok(summary) => Some((self.clock.calendar_day(summary.created_at), summary.card_count)),
            Err(error) => {
                warn!(path = %document.path, %error, "skipping malformed flashcard set");
                None
            }
        });
        Ok(flashcard_activity(interval, today, created))
    }
}
