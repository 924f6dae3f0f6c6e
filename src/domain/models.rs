use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub subject: String,
    #[serde(rename = "duration")]
    pub duration_minutes: u32,
}

impl Task {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.subject, "task.subject")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyPlan {
    pub date: NaiveDate,
    pub tasks: Vec<Task>,
}

impl DailyPlan {
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for task in &self.tasks {
            task.validate()?;
            if !seen.insert(task.subject.as_str()) {
                return Err(format!(
                    "plan {} lists subject '{}' more than once",
                    date_key(self.date),
                    task.subject
                ));
            }
        }
        Ok(())
    }

    pub fn has_subject(&self, subject: &str) -> bool {
        self.tasks.iter().any(|task| task.subject == subject)
    }

    pub fn total_minutes(&self) -> u64 {
        self.tasks
            .iter()
            .map(|task| u64::from(task.duration_minutes))
            .sum()
    }
}

pub fn validate_plan_set(plans: &[DailyPlan]) -> Result<(), String> {
    let mut dates = HashSet::new();
    for plan in plans {
        plan.validate()?;
        if !dates.insert(plan.date) {
            return Err(format!("plan date {} appears more than once", date_key(plan.date)));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Flashcard {
    pub question: String,
    #[serde(rename = "correctAnswer")]
    pub correct_answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardSet {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub cards: Vec<Flashcard>,
    pub created_at: DateTime<Utc>,
}

impl FlashcardSet {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "flashcard_set.id")?;
        validate_non_empty(&self.title, "flashcard_set.title")?;
        for card in &self.cards {
            validate_non_empty(&card.question, "flashcard.question")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPlanEntry {
    pub date: NaiveDate,
    pub total_minutes: u64,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct StudyStatistics {
    pub total_study_minutes: u64,
    pub subject_minutes: BTreeMap<String, u64>,
    pub total_plans_completed: u32,
    pub total_plans_incomplete: u32,
    pub completed_plans: Vec<CompletedPlanEntry>,
    pub counted_overdue_plans: Vec<String>,
}

impl StudyStatistics {
    pub fn total_study_hours(&self) -> u64 {
        self.total_study_minutes / 60
    }

    pub fn has_completed(&self, plan_key: &str) -> bool {
        self.completed_plans
            .iter()
            .any(|entry| entry.plan_key.as_deref() == Some(plan_key))
    }

    pub fn has_counted_overdue(&self, plan_key: &str) -> bool {
        self.counted_overdue_plans.iter().any(|key| key == plan_key)
    }

    pub fn subject_hours(&self) -> BTreeMap<String, u64> {
        self.subject_minutes
            .iter()
            .map(|(subject, minutes)| (subject.clone(), minutes / 60))
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub user_id: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub streak: u32,
    pub flashcards_created: u64,
    pub total_study_hours: u64,
    pub completed_study_time: Option<u64>,
    pub incomplete_study_time: Option<u64>,
}

pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date_key(value: &str, field_name: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| format!("{field_name} must be YYYY-MM-DD"))
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
