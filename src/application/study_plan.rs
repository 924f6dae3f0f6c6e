use crate::application::clock::Clock;
use crate::domain::models::{date_key, validate_plan_set, StudyStatistics};
use crate::domain::plan::{reduce, PlanEffect, PlanEvent, PlanState, StoredPlan};
use crate::infrastructure::document_mapper::{
    completed_tasks_update, decode_statistics, decode_stored_plan, encode_archived_plan,
    encode_new_plan, history_path, incomplete_plans_increment, new_statistics_fields,
    overdue_counted_update, overdue_update, plan_completed_update, plan_key, plan_path,
    plans_collection, rollup_updates, statistics_path,
};
use crate::infrastructure::document_store::DocumentStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::inference_client::InferenceClient;
use chrono::NaiveDate;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, warn};

pub struct StudyPlanService<D, I>
where
    D: DocumentStore + ?Sized,
    I: InferenceClient + ?Sized,
{
    document_store: Arc<D>,
    inference_client: Arc<I>,
    user_id: String,
    clock: Clock,
    state: Mutex<PlanState>,
}

impl<D, I> StudyPlanService<D, I>
where
    D: DocumentStore + ?Sized,
    I: InferenceClient + ?Sized,
{
    pub fn new(document_store: Arc<D>, inference_client: Arc<I>, user_id: impl Into<String>) -> Self {
        Self {
            document_store,
            inference_client,
            user_id: user_id.into(),
            clock: Clock::default(),
            state: Mutex::new(PlanState::default()),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn snapshot(&self) -> Result<PlanState, InfraError> {
        Ok(self.lock_state()?.clone())
    }

    pub async fn load(&self) -> Result<PlanState, InfraError> {
        let documents = self
            .document_store
            .query(&plans_collection(&self.user_id), Vec::new())
            .await?;

        let mut stored: Vec<StoredPlan> = Vec::with_capacity(documents.len());
        for document in &documents {
            match decode_stored_plan(document) {
                Ok(plan) => stored.push(plan),
                Err(error) => warn!(path = %document.path, %error, "skipping malformed study plan"),
            }
        }

        let transition = reduce(&PlanState::default(), PlanEvent::Loaded(stored), self.clock.today());
        self.replace_state(transition.state.clone())?;
        self.execute(transition.effects).await?;
        Ok(transition.state)
    }

    pub async fn generate(&self, prompt: &str) -> Result<PlanState, InfraError> {
        let plans = self.inference_client.generate_study_plan(prompt).await?;
        validate_plan_set(&plans)
            .map_err(|error| InfraError::MalformedResponse(format!("invalid study plan: {error}")))?;

        let previous = self.snapshot()?;
        let transition = reduce(&previous, PlanEvent::PlansReplaced(plans), self.clock.today());
        if let Err(error) = self.execute(transition.effects).await {
            error!(%error, "replacing study plans failed; reloading from store");
            if let Err(reload_error) = self.load().await {
                warn!(error = %reload_error, "reload after failed plan replacement failed");
            }
            return Err(error);
        }

        info!(plans = transition.state.plans.len(), "study plan generated");
        self.replace_state(transition.state.clone())?;
        Ok(transition.state)
    }

    /// Local state keeps the toggle even when the remote write fails.
    pub async fn toggle_task(&self, date: NaiveDate, subject: &str) -> Result<PlanState, InfraError> {
        let previous = self.snapshot()?;
        let plan = previous
            .plan(date)
            .ok_or_else(|| InfraError::NotFound(format!("study plan {}", date_key(date))))?;
        if !plan.has_subject(subject) {
            return Err(InfraError::InvalidInput(format!(
                "plan {} has no subject '{subject}'",
                date_key(date)
            )));
        }

        let transition = reduce(
            &previous,
            PlanEvent::TaskToggled {
                date,
                subject: subject.to_string(),
            },
            self.clock.today(),
        );
        self.replace_state(transition.state.clone())?;
        self.execute(transition.effects).await?;
        Ok(transition.state)
    }

    /// Optimistic: the plan disappears immediately and comes back if any write fails.
    pub async fn remove_plan(&self, date: NaiveDate) -> Result<PlanState, InfraError> {
        let previous = self.snapshot()?;
        if previous.plan(date).is_none() {
            return Err(InfraError::NotFound(format!("study plan {}", date_key(date))));
        }

        let transition = reduce(&previous, PlanEvent::PlanRemoved { date }, self.clock.today());
        self.replace_state(transition.state.clone())?;

        if let Err(error) = self.execute(transition.effects).await {
            error!(date = %date_key(date), %error, "removing study plan failed; restoring it");
            self.replace_state(previous)?;
            return Err(error);
        }
        Ok(transition.state)
    }

    pub async fn reconcile(&self) -> Result<PlanState, InfraError> {
        let previous = self.snapshot()?;
        let transition = reduce(&previous, PlanEvent::Reconcile, self.clock.today());
        self.replace_state(transition.state.clone())?;
        self.execute(transition.effects).await?;
        Ok(transition.state)
    }

    pub async fn load_statistics(&self) -> Result<StudyStatistics, InfraError> {
        let path = statistics_path(&self.user_id);
        match self.document_store.get(&path).await? {
            Some(document) => decode_statistics(&document),
            None => {
                self.document_store.set(&path, new_statistics_fields()?).await?;
                Ok(StudyStatistics::default())
            }
        }
    }

    async fn stored_plan_key(&self, date: NaiveDate) -> Result<String, InfraError> {
        let document = self.document_store.get(&plan_path(&self.user_id, date)).await?;
        Ok(plan_key(date, document.as_ref()))
    }

    /// History and statistics writes are keyed by the stored plan instance and may be replayed.
    async fn execute(&self, effects: Vec<PlanEffect>) -> Result<(), InfraError> {
        let store = &self.document_store;
        let user_id = self.user_id.as_str();

        for effect in effects {
            match effect {
                PlanEffect::SetCompletedTasks { date, subjects } => {
                    store
                        .update(&plan_path(user_id, date), completed_tasks_update(&subjects))
                        .await?;
                }
                PlanEffect::SetPlanCompleted { date, completed } => {
                    store
                        .update(&plan_path(user_id, date), plan_completed_update(completed))
                        .await?;
                }
                PlanEffect::MarkOverdue { date, incomplete } => {
                    store
                        .update(&plan_path(user_id, date), overdue_update(&incomplete))
                        .await?;
                }
                PlanEffect::ClearOverdue { date } => {
                    store.update(&plan_path(user_id, date), overdue_update(&[])).await?;
                }
                PlanEffect::IncrementIncompletePlans { date } => {
                    let key = self.stored_plan_key(date).await?;
                    if self.load_statistics().await?.has_counted_overdue(&key) {
                        info!(plan = %key, "overdue plan already counted");
                    } else {
                        store
                            .update(&statistics_path(user_id), incomplete_plans_increment(&key))
                            .await?;
                    }
                    store
                        .update(&plan_path(user_id, date), overdue_counted_update())
                        .await?;
                }
                PlanEffect::Archive(archived) => {
                    let key = self.stored_plan_key(archived.plan.date).await?;
                    store
                        .set(
                            &history_path(user_id, &key),
                            encode_archived_plan(&archived, self.clock.now())?,
                        )
                        .await?;
                }
                PlanEffect::RecordCompletedStudy(rollup) => {
                    let key = self.stored_plan_key(rollup.date).await?;
                    if self.load_statistics().await?.has_completed(&key) {
                        info!(plan = %key, "completed plan already counted");
                    } else {
                        store
                            .update(
                                &statistics_path(user_id),
                                rollup_updates(&rollup, &key, self.clock.now())?,
                            )
                            .await?;
                    }
                }
                PlanEffect::DeletePlan { date } => {
                    store.delete(&plan_path(user_id, date)).await?;
                }
                PlanEffect::SavePlan(plan) => {
                    store
                        .set(&plan_path(user_id, plan.date), encode_new_plan(&plan, self.clock.now())?)
                        .await?;
                }
            }
        }
        Ok(())
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, PlanState>, InfraError> {
        self.state
            .lock()
            .map_err(|error| InfraError::Store(format!("plan state lock poisoned: {error}")))
    }

    fn replace_state(&self, state: PlanState) -> Result<(), InfraError> {
        *self.lock_state()? = state;
        Ok(())
    }
}
