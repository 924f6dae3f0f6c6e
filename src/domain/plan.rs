use crate::domain::models::DailyPlan;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPlan {
    pub plan: DailyPlan,
    pub completed_tasks: Vec<String>,
    pub incomplete_tasks: Vec<String>,
    pub is_completed: bool,
    pub overdue_counted: bool,
}

impl StoredPlan {
    pub fn fresh(plan: DailyPlan) -> Self {
        Self {
            plan,
            completed_tasks: Vec::new(),
            incomplete_tasks: Vec::new(),
            is_completed: false,
            overdue_counted: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanState {
    pub plans: Vec<DailyPlan>,
    pub completed_tasks: BTreeMap<NaiveDate, BTreeSet<String>>,
    pub completed_plans: BTreeSet<NaiveDate>,
    pub incomplete_plans: BTreeMap<NaiveDate, Vec<String>>,
    pub overdue_counted: BTreeSet<NaiveDate>,
}

impl PlanState {
    pub fn plan(&self, date: NaiveDate) -> Option<&DailyPlan> {
        self.plans.iter().find(|plan| plan.date == date)
    }

    pub fn is_task_completed(&self, date: NaiveDate, subject: &str) -> bool {
        self.completed_tasks
            .get(&date)
            .is_some_and(|subjects| subjects.contains(subject))
    }

    pub fn is_plan_completed(&self, date: NaiveDate) -> bool {
        self.completed_plans.contains(&date)
    }

    pub fn incomplete_tasks(&self, date: NaiveDate) -> &[String] {
        self.incomplete_plans
            .get(&date)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn completed_subjects(&self, date: NaiveDate) -> Vec<String> {
        self.completed_tasks
            .get(&date)
            .map(|subjects| subjects.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn remaining_subjects(&self, plan: &DailyPlan) -> Vec<String> {
        plan.tasks
            .iter()
            .filter(|task| !self.is_task_completed(plan.date, &task.subject))
            .map(|task| task.subject.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanEvent {
    Loaded(Vec<StoredPlan>),
    TaskToggled { date: NaiveDate, subject: String },
    PlansReplaced(Vec<DailyPlan>),
    PlanRemoved { date: NaiveDate },
    Reconcile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchivedPlan {
    pub plan: DailyPlan,
    pub completed_tasks: Vec<String>,
    pub incomplete_tasks: Vec<String>,
    pub was_completed: bool,
    pub was_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudyRollup {
    pub date: NaiveDate,
    pub total_minutes: u64,
    pub subject_minutes: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanEffect {
    SetCompletedTasks { date: NaiveDate, subjects: Vec<String> },
    SetPlanCompleted { date: NaiveDate, completed: bool },
    MarkOverdue { date: NaiveDate, incomplete: Vec<String> },
    ClearOverdue { date: NaiveDate },
    IncrementIncompletePlans { date: NaiveDate },
    Archive(ArchivedPlan),
    RecordCompletedStudy(StudyRollup),
    DeletePlan { date: NaiveDate },
    SavePlan(DailyPlan),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanTransition {
    pub state: PlanState,
    pub effects: Vec<PlanEffect>,
}

impl PlanTransition {
    fn unchanged(state: &PlanState) -> Self {
        Self {
            state: state.clone(),
            effects: Vec::new(),
        }
    }
}

pub fn reduce(state: &PlanState, event: PlanEvent, today: NaiveDate) -> PlanTransition {
    match event {
        PlanEvent::Loaded(stored) => {
            let mut next = hydrate(stored);
            let mut effects = Vec::new();
            reconcile(&mut next, today, &mut effects);
            PlanTransition {
                state: next,
                effects,
            }
        }
        PlanEvent::TaskToggled { date, subject } => {
            // Toggles for plans that are not in the snapshot are ignored.
            if state.plan(date).is_none() {
                return PlanTransition::unchanged(state);
            }
            let mut next = state.clone();
            let subjects = next.completed_tasks.entry(date).or_default();
            if !subjects.remove(&subject) {
                subjects.insert(subject);
            }
            let remaining: Vec<String> = subjects.iter().cloned().collect();
            if remaining.is_empty() {
                next.completed_tasks.remove(&date);
            }

            let mut effects = vec![PlanEffect::SetCompletedTasks {
                date,
                subjects: remaining,
            }];
            reconcile(&mut next, today, &mut effects);
            PlanTransition {
                state: next,
                effects,
            }
        }
        PlanEvent::PlansReplaced(new_plans) => {
            let mut effects = Vec::new();
            for plan in &state.plans {
                archive_if_due(state, plan, today, false, &mut effects);
            }
            effects.extend(state.plans.iter().map(|plan| PlanEffect::DeletePlan { date: plan.date }));

            let mut plans = new_plans;
            plans.sort_by_key(|plan| plan.date);
            effects.extend(plans.iter().cloned().map(PlanEffect::SavePlan));

            let mut next = PlanState {
                plans,
                ..PlanState::default()
            };
            reconcile(&mut next, today, &mut effects);
            PlanTransition {
                state: next,
                effects,
            }
        }
        PlanEvent::PlanRemoved { date } => {
            let Some(plan) = state.plan(date) else {
                return PlanTransition::unchanged(state);
            };
            let mut effects = Vec::new();
            archive_if_due(state, plan, today, true, &mut effects);
            effects.push(PlanEffect::DeletePlan { date });

            let mut next = state.clone();
            next.plans.retain(|candidate| candidate.date != date);
            next.completed_tasks.remove(&date);
            next.completed_plans.remove(&date);
            next.incomplete_plans.remove(&date);
            next.overdue_counted.remove(&date);
            PlanTransition {
                state: next,
                effects,
            }
        }
        PlanEvent::Reconcile => {
            let mut next = state.clone();
            let mut effects = Vec::new();
            reconcile(&mut next, today, &mut effects);
            PlanTransition {
                state: next,
                effects,
            }
        }
    }
}

fn hydrate(stored: Vec<StoredPlan>) -> PlanState {
    let mut state = PlanState::default();
    for entry in stored {
        let date = entry.plan.date;
        if state.plan(date).is_some() {
            continue;
        }
        let completed: BTreeSet<String> = entry.completed_tasks.into_iter().collect();
        if !completed.is_empty() {
            state.completed_tasks.insert(date, completed);
        }
        if entry.is_completed {
            state.completed_plans.insert(date);
        }
        if !entry.incomplete_tasks.is_empty() {
            state.incomplete_plans.insert(date, entry.incomplete_tasks);
        }
        if entry.overdue_counted {
            state.overdue_counted.insert(date);
        }
        state.plans.push(entry.plan);
    }
    state.plans.sort_by_key(|plan| plan.date);
    state
}

fn reconcile(state: &mut PlanState, today: NaiveDate, effects: &mut Vec<PlanEffect>) {
    recompute_completed_plans(state, effects);
    recompute_overdue_plans(state, today, effects);
}

fn recompute_completed_plans(state: &mut PlanState, effects: &mut Vec<PlanEffect>) {
    let completed: BTreeSet<NaiveDate> = state
        .plans
        .iter()
        .filter(|plan| {
            !plan.tasks.is_empty()
                && plan
                    .tasks
                    .iter()
                    .all(|task| state.is_task_completed(plan.date, &task.subject))
        })
        .map(|plan| plan.date)
        .collect();

    for plan in &state.plans {
        let is_completed = completed.contains(&plan.date);
        if is_completed != state.completed_plans.contains(&plan.date) {
            effects.push(PlanEffect::SetPlanCompleted {
                date: plan.date,
                completed: is_completed,
            });
        }
    }
    state.completed_plans = completed;
}

fn recompute_overdue_plans(state: &mut PlanState, today: NaiveDate, effects: &mut Vec<PlanEffect>) {
    let mut incomplete_plans = BTreeMap::new();
    let mut newly_counted = Vec::new();

    for plan in &state.plans {
        let previous = state.incomplete_plans.get(&plan.date);
        if plan.date >= today {
            if previous.is_some() {
                effects.push(PlanEffect::ClearOverdue { date: plan.date });
            }
            continue;
        }

        let remaining = state.remaining_subjects(plan);
        if remaining.is_empty() {
            if previous.is_some() {
                effects.push(PlanEffect::ClearOverdue { date: plan.date });
            }
            continue;
        }

        if previous != Some(&remaining) {
            effects.push(PlanEffect::MarkOverdue {
                date: plan.date,
                incomplete: remaining.clone(),
            });
        }
        if !state.overdue_counted.contains(&plan.date) {
            effects.push(PlanEffect::IncrementIncompletePlans { date: plan.date });
            newly_counted.push(plan.date);
        }
        incomplete_plans.insert(plan.date, remaining);
    }

    state.overdue_counted.extend(newly_counted);
    state.incomplete_plans = incomplete_plans;
}

fn archive_if_due(
    state: &PlanState,
    plan: &DailyPlan,
    today: NaiveDate,
    was_deleted: bool,
    effects: &mut Vec<PlanEffect>,
) {
    let was_completed = state.is_plan_completed(plan.date);
    let past_due = plan.date < today;
    if !was_completed && !past_due {
        return;
    }

    effects.push(PlanEffect::Archive(ArchivedPlan {
        plan: plan.clone(),
        completed_tasks: state.completed_subjects(plan.date),
        incomplete_tasks: state.remaining_subjects(plan),
        was_completed,
        was_deleted,
    }));
    if was_completed {
        effects.push(PlanEffect::RecordCompletedStudy(rollup(state, plan)));
    }
}

fn rollup(state: &PlanState, plan: &DailyPlan) -> StudyRollup {
    let mut subject_minutes = BTreeMap::new();
    for task in &plan.tasks {
        if state.is_task_completed(plan.date, &task.subject) {
            *subject_minutes.entry(task.subject.clone()).or_insert(0) +=
                u64::from(task.duration_minutes);
        }
    }
    StudyRollup {
        date: plan.date,
        total_minutes: subject_minutes.values().sum(),
        subject_minutes,
    }
}
