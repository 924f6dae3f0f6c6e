use crate::domain::models::{
    date_key, parse_date_key, CompletedPlanEntry, DailyPlan, Flashcard, FlashcardSet, StudyStatistics,
    Task, UserProfile,
};
use crate::domain::plan::{ArchivedPlan, StoredPlan, StudyRollup};
use crate::infrastructure::document_store::{join_path, Document, FieldUpdate, Fields};
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

const USERS: &str = "users";
const STUDY_PLANS: &str = "study_plans";
const PLAN_HISTORY: &str = "plan_history";
const STATISTICS: &str = "statistics";
const STUDY_STATS: &str = "study_stats";
const FLASHCARD_SETS: &str = "flashcardSets";
const CARDS: &str = "cards";

pub const FIELD_COMPLETED_TASKS: &str = "completedTasks";
pub const FIELD_INCOMPLETE_TASKS: &str = "incompleteTasks";
pub const FIELD_IS_COMPLETED: &str = "isCompleted";
pub const FIELD_IS_OVERDUE: &str = "isOverdue";
pub const FIELD_OVERDUE_COUNTED: &str = "overdueCounted";
pub const FIELD_STREAK: &str = "streak";
pub const FIELD_FLASHCARDS_CREATED: &str = "flashcardsCreated";
pub const FIELD_CREATED_AT: &str = "createdAt";

pub fn user_path(user_id: &str) -> String {
    join_path(&[USERS, user_id])
}

pub fn plans_collection(user_id: &str) -> String {
    join_path(&[USERS, user_id, STUDY_PLANS])
}

pub fn plan_path(user_id: &str, date: NaiveDate) -> String {
    join_path(&[USERS, user_id, STUDY_PLANS, &date_key(date)])
}

pub fn history_path(user_id: &str, history_id: &str) -> String {
    join_path(&[USERS, user_id, PLAN_HISTORY, history_id])
}

pub fn statistics_path(user_id: &str) -> String {
    join_path(&[USERS, user_id, STATISTICS, STUDY_STATS])
}

pub fn flashcard_sets_collection(user_id: &str) -> String {
    join_path(&[USERS, user_id, FLASHCARD_SETS])
}

pub fn flashcard_set_path(user_id: &str, set_id: &str) -> String {
    join_path(&[USERS, user_id, FLASHCARD_SETS, set_id])
}

pub fn cards_collection(user_id: &str, set_id: &str) -> String {
    join_path(&[USERS, user_id, FLASHCARD_SETS, set_id, CARDS])
}

pub fn card_path(user_id: &str, set_id: &str, index: usize) -> String {
    join_path(&[USERS, user_id, FLASHCARD_SETS, set_id, CARDS, &index.to_string()])
}

/// Millisecond RFC 3339 in UTC, so stored timestamps compare lexically.
pub fn timestamp(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn to_fields<T: Serialize>(value: &T) -> Result<Fields, InfraError> {
    match serde_json::to_value(value)? {
        Value::Object(fields) => Ok(fields),
        other => Err(InfraError::Store(format!("expected an object document, got {other}"))),
    }
}

fn from_document<T: DeserializeOwned>(document: &Document, kind: &str) -> Result<T, InfraError> {
    serde_json::from_value(Value::Object(document.fields.clone())).map_err(|error| {
        InfraError::Store(format!("malformed {kind} document {}: {error}", document.path))
    })
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanDocument {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    completed_tasks: Vec<String>,
    #[serde(default)]
    incomplete_tasks: Vec<String>,
    #[serde(default)]
    is_completed: bool,
    #[serde(default)]
    is_overdue: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    overdue_counted: Option<bool>,
    #[serde(rename = "created_at", default, skip_serializing_if = "Option::is_none")]
    created_at: Option<String>,
}

pub fn encode_new_plan(plan: &DailyPlan, created_at: DateTime<Utc>) -> Result<Fields, InfraError> {
    to_fields(&PlanDocument {
        date: Some(date_key(plan.date)),
        tasks: plan.tasks.clone(),
        completed_tasks: Vec::new(),
        incomplete_tasks: Vec::new(),
        is_completed: false,
        is_overdue: false,
        overdue_counted: Some(false),
        created_at: Some(timestamp(created_at)),
    })
}

/// Plans written before `overdueCounted` existed treat `isOverdue` as already counted.
pub fn decode_stored_plan(document: &Document) -> Result<StoredPlan, InfraError> {
    let parsed: PlanDocument = from_document(document, "study plan")?;
    let raw_date = parsed.date.as_deref().unwrap_or_else(|| document.id());
    let date = parse_date_key(raw_date, "study_plan.date").map_err(InfraError::Store)?;
    let plan = DailyPlan {
        date,
        tasks: parsed.tasks,
    };
    plan.validate().map_err(InfraError::Store)?;

    Ok(StoredPlan {
        plan,
        completed_tasks: parsed.completed_tasks,
        incomplete_tasks: parsed.incomplete_tasks,
        is_completed: parsed.is_completed,
        overdue_counted: parsed.overdue_counted.unwrap_or(parsed.is_overdue),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ArchivedPlanDocument<'a> {
    date: String,
    tasks: &'a [Task],
    completed_tasks: &'a [String],
    incomplete_tasks: &'a [String],
    is_completed: bool,
    #[serde(rename = "archived_at")]
    archived_at: String,
    #[serde(rename = "was_completed")]
    was_completed: bool,
    #[serde(rename = "was_deleted")]
    was_deleted: bool,
}

pub fn encode_archived_plan(archived: &ArchivedPlan, archived_at: DateTime<Utc>) -> Result<Fields, InfraError> {
    to_fields(&ArchivedPlanDocument {
        date: date_key(archived.plan.date),
        tasks: &archived.plan.tasks,
        completed_tasks: &archived.completed_tasks,
        incomplete_tasks: &archived.incomplete_tasks,
        is_completed: archived.was_completed,
        archived_at: timestamp(archived_at),
        was_completed: archived.was_completed,
        was_deleted: archived.was_deleted,
    })
}

pub fn completed_tasks_update(subjects: &[String]) -> Vec<FieldUpdate> {
    vec![FieldUpdate::set(FIELD_COMPLETED_TASKS, subjects.to_vec())]
}

pub fn plan_completed_update(completed: bool) -> Vec<FieldUpdate> {
    vec![FieldUpdate::set(FIELD_IS_COMPLETED, completed)]
}

pub fn overdue_update(incomplete: &[String]) -> Vec<FieldUpdate> {
    vec![
        FieldUpdate::set(FIELD_IS_OVERDUE, !incomplete.is_empty()),
        FieldUpdate::set(FIELD_INCOMPLETE_TASKS, incomplete.to_vec()),
    ]
}

pub fn overdue_counted_update() -> Vec<FieldUpdate> {
    vec![FieldUpdate::set(FIELD_OVERDUE_COUNTED, true)]
}

pub fn new_statistics_fields() -> Result<Fields, InfraError> {
    to_fields(&StudyStatistics::default())
}

pub fn decode_statistics(document: &Document) -> Result<StudyStatistics, InfraError> {
    let mut statistics: StudyStatistics = from_document(document, "statistics")?;
    let mut subject_minutes = BTreeMap::new();
    for (key, minutes) in std::mem::take(&mut statistics.subject_minutes) {
        *subject_minutes.entry(unescape_subject(&key)).or_insert(0) += minutes;
    }
    statistics.subject_minutes = subject_minutes;
    Ok(statistics)
}

/// Subjects become one segment of a dotted field path; `%` and `.` are percent-escaped.
pub fn subject_field(subject: &str) -> String {
    let mut field = String::from("subjectMinutes.");
    for ch in subject.chars() {
        match ch {
            '%' => field.push_str("%25"),
            '.' => field.push_str("%2E"),
            other => field.push(other),
        }
    }
    field
}

fn unescape_subject(key: &str) -> String {
    let mut subject = String::with_capacity(key.len());
    let mut rest = key;
    while let Some(index) = rest.find('%') {
        subject.push_str(&rest[..index]);
        let tail = &rest[index..];
        if tail.starts_with("%25") {
            subject.push('%');
            rest = &tail[3..];
        } else if tail.starts_with("%2E") {
            subject.push('.');
            rest = &tail[3..];
        } else {
            subject.push('%');
            rest = &tail[1..];
        }
    }
    subject.push_str(rest);
    subject
}

/// Identifies one stored plan instance: its date plus the creation instant, when recorded.
pub fn plan_key(date: NaiveDate, document: Option<&Document>) -> String {
    let created_at = document
        .and_then(|document| document.field("created_at"))
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok());
    match created_at {
        Some(instant) => format!("{}_{}", date_key(date), instant.timestamp_millis()),
        None => date_key(date),
    }
}

pub fn rollup_updates(
    rollup: &StudyRollup,
    plan_key: &str,
    completed_at: DateTime<Utc>,
) -> Result<Vec<FieldUpdate>, InfraError> {
    let total = i64::try_from(rollup.total_minutes)
        .map_err(|_| InfraError::InvalidInput("study minutes overflow".to_string()))?;
    let mut updates = vec![FieldUpdate::increment("totalStudyMinutes", total)];
    for (subject, minutes) in &rollup.subject_minutes {
        let minutes = i64::try_from(*minutes)
            .map_err(|_| InfraError::InvalidInput("study minutes overflow".to_string()))?;
        updates.push(FieldUpdate::increment(subject_field(subject), minutes));
    }
    updates.push(FieldUpdate::increment("totalPlansCompleted", 1));

    let entry = CompletedPlanEntry {
        date: rollup.date,
        total_minutes: rollup.total_minutes,
        completed_at,
        plan_key: Some(plan_key.to_string()),
    };
    updates.push(FieldUpdate::array_union("completedPlans", serde_json::to_value(entry)?));
    Ok(updates)
}

pub fn incomplete_plans_increment(plan_key: &str) -> Vec<FieldUpdate> {
    vec![
        FieldUpdate::increment("totalPlansIncomplete", 1),
        FieldUpdate::array_union("countedOverduePlans", plan_key),
    ]
}

pub fn new_user_fields(user_id: &str) -> Result<Fields, InfraError> {
    to_fields(&UserProfile {
        user_id: user_id.to_string(),
        ..UserProfile::default()
    })
}

pub fn decode_user_profile(document: &Document) -> Result<UserProfile, InfraError> {
    from_document(document, "user")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardSetSummary {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub card_count: usize,
    pub created_at: DateTime<Utc>,
}

pub fn encode_flashcard_set(set: &FlashcardSet) -> Result<Fields, InfraError> {
    let mut fields = to_fields(&FlashcardSetSummary {
        id: set.id.clone(),
        title: set.title.clone(),
        kind: set.kind.clone(),
        card_count: set.cards.len(),
        created_at: set.created_at,
    })?;
    fields.insert(FIELD_CREATED_AT.to_string(), Value::String(timestamp(set.created_at)));
    Ok(fields)
}

pub fn decode_flashcard_set_summary(document: &Document) -> Result<FlashcardSetSummary, InfraError> {
    let mut summary: FlashcardSetSummary = from_document(document, "flashcard set")?;
    if summary.id.trim().is_empty() {
        summary.id = document.id().to_string();
    }
    Ok(summary)
}

pub fn encode_card(card: &Flashcard) -> Result<Fields, InfraError> {
    to_fields(card)
}

pub fn decode_card(document: &Document) -> Result<Flashcard, InfraError> {
    from_document(document, "flashcard")
}

/// Card documents are keyed by their position; paths sort lexically, so order numerically.
pub fn card_index(document: &Document) -> Option<usize> {
    document.id().parse().ok()
}

pub fn assemble_flashcard_set(summary: FlashcardSetSummary, cards: Vec<Flashcard>) -> FlashcardSet {
    FlashcardSet {
        id: summary.id,
        title: summary.title,
        kind: summary.kind,
        cards,
        created_at: summary.created_at,
    }
}
