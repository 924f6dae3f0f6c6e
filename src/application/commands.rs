use crate::application::bootstrap::bootstrap_workspace;
use crate::application::chat::ChatService;
use crate::application::clock::Clock;
use crate::application::flashcards::FlashcardService;
use crate::application::progress::{ProgressReport, ProgressService};
use crate::application::session::{ensure_user_records, UserRecordsOutcome};
use crate::application::streak::StreakService;
use crate::application::study_plan::StudyPlanService;
use crate::domain::models::{date_key, parse_date_key, CompletedPlanEntry, FlashcardSet, StudyStatistics};
use crate::domain::plan::PlanState;
use crate::domain::progress::ChartInterval;
use crate::domain::streak::CalendarPolicy;
use crate::infrastructure::config::{
    env_lookup, read_backend_config, read_timezone, read_user_id, save_user_id,
};
use crate::infrastructure::document_store::{DocumentStore, SqliteDocumentStore};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::inference_client::{ChatReply, InferenceClient, ReqwestInferenceClient};
use crate::infrastructure::streak_store::{SqliteStreakStore, StreakStore};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct AppState {
    config_dir: PathBuf,
    logs_dir: PathBuf,
    document_store: Arc<dyn DocumentStore>,
    streak_store: Arc<dyn StreakStore>,
    inference_client: Option<Arc<dyn InferenceClient>>,
    lookup: EnvLookup,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;

        Ok(Self {
            config_dir: bootstrap.config_dir,
            document_store: Arc::new(SqliteDocumentStore::new(&bootstrap.database_path)),
            streak_store: Arc::new(SqliteStreakStore::new(&bootstrap.database_path)),
            logs_dir: bootstrap.logs_dir,
            inference_client: None,
            lookup: Arc::new(env_lookup),
        })
    }

    /// Replaces the HTTP backend, which is otherwise built from `backend.json` per command.
    pub fn with_inference_client(mut self, inference_client: Arc<dyn InferenceClient>) -> Self {
        self.inference_client = Some(inference_client);
        self
    }

    pub fn with_lookup(mut self, lookup: EnvLookup) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        info!(command, "{message}");
    }

    pub fn log_error(&self, command: &str, message: &str) {
        error!(command, "{message}");
    }

    fn lookup(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
    }

    fn clock(&self) -> Result<Clock, InfraError> {
        let timezone = read_timezone(&self.config_dir, &|key: &str| self.lookup(key))?;
        let calendar = CalendarPolicy::from_timezone_name(timezone.as_deref()).map_err(InfraError::InvalidConfig)?;
        Ok(Clock::new(calendar))
    }

    fn user_id(&self) -> Result<Option<String>, InfraError> {
        read_user_id(&self.config_dir, &|key: &str| self.lookup(key))
    }

    fn required_user_id(&self) -> Result<String, InfraError> {
        self.user_id()?.ok_or_else(|| {
            InfraError::NotAuthenticated("no user configured; run `session set <user-id>` first".to_string())
        })
    }

    fn inference_client(&self) -> Result<Arc<dyn InferenceClient>, InfraError> {
        if let Some(client) = self.inference_client.as_ref() {
            return Ok(Arc::clone(client));
        }
        let config = read_backend_config(&self.config_dir, &|key: &str| self.lookup(key))?;
        Ok(Arc::new(ReqwestInferenceClient::new(&config)?))
    }

    fn study_plan_service(&self) -> Result<StudyPlanService<dyn DocumentStore, dyn InferenceClient>, InfraError> {
        Ok(StudyPlanService::new(
            Arc::clone(&self.document_store),
            self.inference_client()?,
            self.required_user_id()?,
        )
        .with_clock(self.clock()?))
    }

    fn flashcard_service(&self) -> Result<FlashcardService<dyn DocumentStore, dyn InferenceClient>, InfraError> {
        Ok(FlashcardService::new(
            Arc::clone(&self.document_store),
            self.inference_client()?,
            self.required_user_id()?,
        )
        .with_clock(self.clock()?))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StreakResponse {
    pub streak: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionResponse {
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<UserRecordsOutcome>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TaskView {
    pub subject: String,
    pub duration_minutes: u32,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlanView {
    pub date: String,
    pub tasks: Vec<TaskView>,
    pub is_completed: bool,
    pub is_overdue: bool,
    pub incomplete_tasks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatisticsResponse {
    pub total_study_minutes: u64,
    pub total_study_hours: u64,
    pub subject_hours: BTreeMap<String, u64>,
    pub total_plans_completed: u32,
    pub total_plans_incomplete: u32,
    pub completed_plans: Vec<CompletedPlanEntry>,
}

impl From<StudyStatistics> for StatisticsResponse {
    fn from(statistics: StudyStatistics) -> Self {
        Self {
            total_study_hours: statistics.total_study_hours(),
            subject_hours: statistics.subject_hours(),
            total_study_minutes: statistics.total_study_minutes,
            total_plans_completed: statistics.total_plans_completed,
            total_plans_incomplete: statistics.total_plans_incomplete,
            completed_plans: statistics.completed_plans,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GenerateFlashcardsResponse {
    pub created: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set: Option<FlashcardSet>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashcardInput {
    File(PathBuf),
    Topic(String),
    Text(String),
}

pub async fn check_streak_impl(state: &AppState) -> Result<StreakResponse, InfraError> {
    let service = StreakService::new(
        Arc::clone(&state.streak_store),
        Arc::clone(&state.document_store),
        state.user_id()?,
    )
    .with_clock(state.clock()?);
    let streak = service.check_and_update_streak().await?;
    state.log_info("check_streak", &format!("streak={streak}"));
    Ok(StreakResponse { streak })
}

pub fn current_streak_impl(state: &AppState) -> Result<StreakResponse, InfraError> {
    let service = StreakService::new(
        Arc::clone(&state.streak_store),
        Arc::clone(&state.document_store),
        state.user_id()?,
    );
    Ok(StreakResponse {
        streak: service.current_streak()?,
    })
}

pub async fn set_user_impl(state: &AppState, user_id: String) -> Result<SessionResponse, InfraError> {
    let user_id = user_id.trim().to_string();
    if user_id.is_empty() {
        return Err(InfraError::InvalidInput("user id must not be empty".to_string()));
    }
    save_user_id(&state.config_dir, Some(&user_id))?;
    let records = ensure_user_records(state.document_store.as_ref(), &user_id).await?;
    state.log_info("set_user", &format!("user_id={user_id}"));
    Ok(SessionResponse {
        user_id: Some(user_id),
        records: Some(records),
    })
}

pub fn clear_user_impl(state: &AppState) -> Result<SessionResponse, InfraError> {
    save_user_id(&state.config_dir, None)?;
    state.log_info("clear_user", "session cleared");
    Ok(SessionResponse {
        user_id: state.user_id()?,
        records: None,
    })
}

pub fn show_user_impl(state: &AppState) -> Result<SessionResponse, InfraError> {
    Ok(SessionResponse {
        user_id: state.user_id()?,
        records: None,
    })
}

pub async fn generate_plan_impl(state: &AppState, prompt: String) -> Result<Vec<PlanView>, InfraError> {
    if prompt.trim().is_empty() {
        return Err(InfraError::InvalidInput("study plan prompt must not be empty".to_string()));
    }
    let service = state.study_plan_service()?;
    service.load().await?;
    let plan_state = service.generate(prompt.trim()).await?;
    state.log_info("generate_plan", &format!("plans={}", plan_state.plans.len()));
    Ok(plan_views(&plan_state))
}

pub async fn list_plans_impl(state: &AppState) -> Result<Vec<PlanView>, InfraError> {
    let plan_state = state.study_plan_service()?.load().await?;
    Ok(plan_views(&plan_state))
}

pub async fn toggle_task_impl(state: &AppState, date: String, subject: String) -> Result<PlanView, InfraError> {
    let date = parse_date_key(&date, "date").map_err(InfraError::InvalidInput)?;
    let service = state.study_plan_service()?;
    service.load().await?;
    let plan_state = service.toggle_task(date, subject.trim()).await?;
    state.log_info(
        "toggle_task",
        &format!("date={} subject={}", date_key(date), subject.trim()),
    );
    plan_views(&plan_state)
        .into_iter()
        .find(|view| view.date == date_key(date))
        .ok_or_else(|| InfraError::NotFound(format!("study plan {}", date_key(date))))
}

pub async fn remove_plan_impl(state: &AppState, date: String) -> Result<Vec<PlanView>, InfraError> {
    let date = parse_date_key(&date, "date").map_err(InfraError::InvalidInput)?;
    let service = state.study_plan_service()?;
    service.load().await?;
    let plan_state = service.remove_plan(date).await?;
    state.log_info("remove_plan", &format!("date={}", date_key(date)));
    Ok(plan_views(&plan_state))
}

pub async fn reconcile_plans_impl(state: &AppState) -> Result<Vec<PlanView>, InfraError> {
    let service = state.study_plan_service()?;
    service.load().await?;
    let plan_state = service.reconcile().await?;
    Ok(plan_views(&plan_state))
}

pub async fn plan_statistics_impl(state: &AppState) -> Result<StatisticsResponse, InfraError> {
    let statistics = state.study_plan_service()?.load_statistics().await?;
    Ok(statistics.into())
}

pub async fn generate_flashcards_impl(
    state: &AppState,
    input: FlashcardInput,
    title: Option<String>,
) -> Result<GenerateFlashcardsResponse, InfraError> {
    let service = state.flashcard_service()?;
    let title = title.as_deref();
    let set = match &input {
        FlashcardInput::File(path) => service.generate_from_file(path, title).await?,
        FlashcardInput::Topic(topic) => service.generate_from_topic(topic, title).await?,
        FlashcardInput::Text(text) => service.generate_from_text(text, title).await?,
    };
    match set.as_ref() {
        Some(set) => state.log_info(
            "generate_flashcards",
            &format!("set_id={} cards={}", set.id, set.cards.len()),
        ),
        None => state.log_info("generate_flashcards", "no flashcards returned"),
    }
    Ok(GenerateFlashcardsResponse {
        created: set.is_some(),
        set,
    })
}

pub async fn list_flashcard_sets_impl(state: &AppState) -> Result<Vec<FlashcardSet>, InfraError> {
    state.flashcard_service()?.list_sets().await
}

pub async fn delete_flashcard_set_impl(state: &AppState, set_id: String) -> Result<bool, InfraError> {
    let set_id = set_id.trim();
    if set_id.is_empty() {
        return Err(InfraError::InvalidInput("set id must not be empty".to_string()));
    }
    let service = state.flashcard_service()?;
    let known = service
        .list_sets()
        .await?
        .iter()
        .any(|set| set.id == set_id);
    if !known {
        return Ok(false);
    }
    service.delete_set(set_id).await?;
    state.log_info("delete_flashcard_set", &format!("set_id={set_id}"));
    Ok(true)
}

pub async fn progress_impl(state: &AppState, interval: String) -> Result<ProgressReport, InfraError> {
    let interval: ChartInterval = interval.parse().map_err(InfraError::InvalidInput)?;
    ProgressService::new(Arc::clone(&state.document_store), state.required_user_id()?)
        .with_clock(state.clock()?)
        .report(interval)
        .await
}

pub async fn chat_impl(
    state: &AppState,
    message: String,
    conversation_id: Option<String>,
) -> Result<ChatReply, InfraError> {
    let service = ChatService::new(state.inference_client()?).with_conversation(conversation_id);
    let reply = service.send_message(&message).await?;
    state.log_info(
        "chat",
        &format!(
            "conversation_id={}",
            reply.conversation_id.as_deref().unwrap_or("-")
        ),
    );
    Ok(reply)
}

fn plan_views(plan_state: &PlanState) -> Vec<PlanView> {
    plan_state
        .plans
        .iter()
        .map(|plan| {
            let incomplete_tasks = plan_state.incomplete_tasks(plan.date).to_vec();
            PlanView {
                date: date_key(plan.date),
                tasks: plan
                    .tasks
                    .iter()
                    .map(|task| TaskView {
                        subject: task.subject.clone(),
                        duration_minutes: task.duration_minutes,
                        completed: plan_state.is_task_completed(plan.date, &task.subject),
                    })
                    .collect(),
                is_completed: plan_state.is_plan_completed(plan.date),
                is_overdue: !incomplete_tasks.is_empty(),
                incomplete_tasks,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{DailyPlan, Flashcard, Task};
    use crate::infrastructure::inference_client::FlashcardSource;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct TempWorkspace {
        dir: TempDir,
    }

    impl TempWorkspace {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().expect("create temp workspace"),
            }
        }

        fn app_state(&self, client: &Arc<FakeInferenceClient>) -> AppState {
            let client: Arc<dyn InferenceClient> = client.clone();
            AppState::new(self.dir.path().to_path_buf())
                .expect("initialize app state")
                .with_lookup(Arc::new(|_: &str| -> Option<String> { None }))
                .with_inference_client(client)
        }
    }

    #[derive(Default)]
    struct FakeInferenceClient {
        plans: Mutex<VecDeque<Vec<DailyPlan>>>,
        flashcards: Mutex<VecDeque<Vec<Flashcard>>>,
        chat_calls: AtomicUsize,
    }

    impl FakeInferenceClient {
        fn push_plans(&self, plans: Vec<DailyPlan>) {
            self.plans.lock().expect("plans lock poisoned").push_back(plans);
        }

        fn push_flashcards(&self, cards: Vec<Flashcard>) {
            self.flashcards
                .lock()
                .expect("flashcards lock poisoned")
                .push_back(cards);
        }
    }

    #[async_trait]
    impl InferenceClient for FakeInferenceClient {
        async fn chat(&self, message: &str, conversation_id: Option<&str>) -> Result<ChatReply, InfraError> {
            self.chat_calls.fetch_add(1, Ordering::SeqCst);
            Ok(ChatReply {
                conversation_id: Some(conversation_id.unwrap_or("conv-1").to_string()),
                answer: format!("echo: {message}"),
            })
        }

        async fn generate_flashcards(&self, _source: FlashcardSource) -> Result<Vec<Flashcard>, InfraError> {
            Ok(self
                .flashcards
                .lock()
                .expect("flashcards lock poisoned")
                .pop_front()
                .unwrap_or_default())
        }

        async fn generate_study_plan(&self, _prompt: &str) -> Result<Vec<DailyPlan>, InfraError> {
            self.plans
                .lock()
                .expect("plans lock poisoned")
                .pop_front()
                .ok_or_else(|| InfraError::Http("no scripted study plan".to_string()))
        }
    }

    fn far_future_plan(day: &str, subjects: &[(&str, u32)]) -> DailyPlan {
        DailyPlan {
            date: parse_date_key(day, "date").expect("valid date"),
            tasks: subjects
                .iter()
                .map(|(subject, minutes)| Task {
                    subject: subject.to_string(),
                    duration_minutes: *minutes,
                })
                .collect(),
        }
    }

    fn card(question: &str) -> Flashcard {
        Flashcard {
            question: question.to_string(),
            correct_answer: "answer".to_string(),
        }
    }

    #[tokio::test]
    async fn commands_require_a_configured_user() {
        let workspace = TempWorkspace::new();
        let client = Arc::new(FakeInferenceClient::default());
        let state = workspace.app_state(&client);

        let result = list_plans_impl(&state).await;
        assert!(matches!(result, Err(InfraError::NotAuthenticated(_))));
        let message = state.command_error("list_plans", &result.expect_err("no user"));
        assert!(message.contains("session set"));
    }

    #[tokio::test]
    async fn session_set_show_and_clear() {
        let workspace = TempWorkspace::new();
        let client = Arc::new(FakeInferenceClient::default());
        let state = workspace.app_state(&client);

        let set = set_user_impl(&state, " u1 ".to_string()).await.expect("set user");
        assert_eq!(set.user_id.as_deref(), Some("u1"));
        assert_eq!(
            set.records,
            Some(UserRecordsOutcome {
                created_user: true,
                created_statistics: true
            })
        );
        assert_eq!(show_user_impl(&state).expect("show").user_id.as_deref(), Some("u1"));

        let cleared = clear_user_impl(&state).expect("clear");
        assert_eq!(cleared.user_id, None);
        assert!(set_user_impl(&state, "   ".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn streak_check_persists_across_app_states() {
        let workspace = TempWorkspace::new();
        let client = Arc::new(FakeInferenceClient::default());
        let state = workspace.app_state(&client);
        set_user_impl(&state, "u1".to_string()).await.expect("set user");

        assert_eq!(current_streak_impl(&state).expect("before").streak, 0);
        assert_eq!(check_streak_impl(&state).await.expect("check").streak, 1);
        assert_eq!(check_streak_impl(&state).await.expect("same day").streak, 1);

        let reopened = workspace.app_state(&client);
        assert_eq!(current_streak_impl(&reopened).expect("reopened").streak, 1);
    }

    #[tokio::test]
    async fn plan_generate_toggle_and_statistics_flow() {
        let workspace = TempWorkspace::new();
        let client = Arc::new(FakeInferenceClient::default());
        let state = workspace.app_state(&client);
        set_user_impl(&state, "u1".to_string()).await.expect("set user");
        client.push_plans(vec![far_future_plan("2099-01-01", &[("Math", 60), ("Bio", 30)])]);

        let generated = generate_plan_impl(&state, "exam in january".to_string())
            .await
            .expect("generate");
        assert_eq!(generated.len(), 1);
        assert!(!generated[0].is_completed);

        let math = toggle_task_impl(&state, "2099-01-01".to_string(), "Math".to_string())
            .await
            .expect("toggle math");
        assert!(math.tasks[0].completed);
        assert!(!math.is_completed);

        let both = toggle_task_impl(&state, "2099-01-01".to_string(), "Bio".to_string())
            .await
            .expect("toggle bio");
        assert!(both.is_completed);
        assert!(!both.is_overdue);

        let listed = list_plans_impl(&state).await.expect("list");
        assert!(listed[0].is_completed);

        let removed = remove_plan_impl(&state, "2099-01-01".to_string())
            .await
            .expect("remove");
        assert!(removed.is_empty());

        let statistics = plan_statistics_impl(&state).await.expect("statistics");
        assert_eq!(statistics.total_study_minutes, 90);
        assert_eq!(statistics.total_study_hours, 1);
        assert_eq!(statistics.total_plans_completed, 1);
        assert_eq!(statistics.subject_hours.get("Math"), Some(&1));
    }

    #[tokio::test]
    async fn toggle_rejects_bad_dates_and_unknown_plans() {
        let workspace = TempWorkspace::new();
        let client = Arc::new(FakeInferenceClient::default());
        let state = workspace.app_state(&client);
        set_user_impl(&state, "u1".to_string()).await.expect("set user");

        let bad_date = toggle_task_impl(&state, "01/02/2099".to_string(), "Math".to_string()).await;
        assert!(matches!(bad_date, Err(InfraError::InvalidInput(_))));

        let unknown = toggle_task_impl(&state, "2099-01-02".to_string(), "Math".to_string()).await;
        assert!(matches!(unknown, Err(InfraError::NotFound(_))));
    }

    #[tokio::test]
    async fn flashcard_generate_list_and_delete_flow() {
        let workspace = TempWorkspace::new();
        let client = Arc::new(FakeInferenceClient::default());
        let state = workspace.app_state(&client);
        set_user_impl(&state, "u1".to_string()).await.expect("set user");
        client.push_flashcards(vec![card("What is ATP?"), card("What is DNA?")]);

        let generated = generate_flashcards_impl(&state, FlashcardInput::Topic("biology".to_string()), None)
            .await
            .expect("generate");
        assert!(generated.created);
        let set = generated.set.expect("set");
        assert_eq!(set.title, "Biology Flashcards");

        let empty = generate_flashcards_impl(&state, FlashcardInput::Text("notes".to_string()), None)
            .await
            .expect("empty response");
        assert!(!empty.created);

        let listed = list_flashcard_sets_impl(&state).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].cards.len(), 2);

        assert!(delete_flashcard_set_impl(&state, set.id.clone()).await.expect("delete"));
        assert!(!delete_flashcard_set_impl(&state, set.id).await.expect("delete again"));
        assert!(list_flashcard_sets_impl(&state).await.expect("list").is_empty());

        let progress = progress_impl(&state, "week".to_string()).await.expect("progress");
        assert_eq!(progress.flashcard_activity.len(), 7);
        assert_eq!(progress.total_flashcards_created, 1);
    }

    #[tokio::test]
    async fn progress_rejects_unknown_interval() {
        let workspace = TempWorkspace::new();
        let client = Arc::new(FakeInferenceClient::default());
        let state = workspace.app_state(&client);
        set_user_impl(&state, "u1".to_string()).await.expect("set user");

        let result = progress_impl(&state, "decade".to_string()).await;
        assert!(matches!(result, Err(InfraError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn chat_passes_conversation_through() {
        let workspace = TempWorkspace::new();
        let client = Arc::new(FakeInferenceClient::default());
        let state = workspace.app_state(&client);

        let first = chat_impl(&state, "hi".to_string(), None).await.expect("first");
        assert_eq!(first.conversation_id.as_deref(), Some("conv-1"));
        let resumed = chat_impl(&state, "again".to_string(), Some("conv-7".to_string()))
            .await
            .expect("resumed");
        assert_eq!(resumed.conversation_id.as_deref(), Some("conv-7"));
        assert_eq!(client.chat_calls.load(Ordering::SeqCst), 2);
    }
}
