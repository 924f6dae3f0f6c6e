use crate::domain::plan::PlanState;
use chrono::{Datelike, Days, Months, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartInterval {
    Week,
    Month,
    Year,
}

impl ChartInterval {
    pub fn bucket_count(self) -> usize {
        match self {
            Self::Week => 7,
            Self::Month => 30,
            Self::Year => 12,
        }
    }

    /// Bucket start dates, oldest first. The last bucket always contains `today`.
    pub fn buckets(self, today: NaiveDate) -> Vec<NaiveDate> {
        let count = self.bucket_count();
        match self {
            Self::Week | Self::Month => (0..count)
                .rev()
                .filter_map(|offset| today.checked_sub_days(Days::new(offset as u64)))
                .collect(),
            Self::Year => {
                let current_month = month_start(today);
                (0..count)
                    .rev()
                    .filter_map(|offset| current_month.checked_sub_months(Months::new(offset as u32)))
                    .collect()
            }
        }
    }

    fn bucket_key(self, day: NaiveDate) -> NaiveDate {
        match self {
            Self::Week | Self::Month => day,
            Self::Year => month_start(day),
        }
    }

    fn label(self, bucket: NaiveDate) -> String {
        let pattern = match self {
            Self::Week => "%a",
            Self::Month => "%-d",
            Self::Year => "%b",
        };
        bucket.format(pattern).to_string()
    }
}

impl FromStr for ChartInterval {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            other => Err(format!("unknown chart interval '{other}'")),
        }
    }
}

fn month_start(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityBucket {
    pub start: NaiveDate,
    pub label: String,
    pub cards: u64,
}

pub fn flashcard_activity<I>(interval: ChartInterval, today: NaiveDate, sets: I) -> Vec<ActivityBucket>
where
    I: IntoIterator<Item = (NaiveDate, usize)>,
{
    let buckets = interval.buckets(today);
    let mut totals: BTreeMap<NaiveDate, u64> = buckets.iter().map(|start| (*start, 0)).collect();

    for (created_on, card_count) in sets {
        if created_on > today {
            continue;
        }
        if let Some(total) = totals.get_mut(&interval.bucket_key(created_on)) {
            *total += card_count.max(1) as u64;
        }
    }

    buckets
        .into_iter()
        .map(|start| ActivityBucket {
            start,
            label: interval.label(start),
            cards: totals.get(&start).copied().unwrap_or(0),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StudyTimeSummary {
    pub completed_minutes: u64,
    pub incomplete_minutes: u64,
}

impl StudyTimeSummary {
    pub fn from_plans(state: &PlanState) -> Self {
        let mut summary = Self::default();
        for plan in &state.plans {
            for task in &plan.tasks {
                let minutes = u64::from(task.duration_minutes);
                if state.is_task_completed(plan.date, &task.subject) {
                    summary.completed_minutes += minutes;
                } else {
                    summary.incomplete_minutes += minutes;
                }
            }
        }
        summary
    }

    pub fn completed_label(&self) -> String {
        format_minutes(self.completed_minutes)
    }

    pub fn incomplete_label(&self) -> String {
        format_minutes(self.incomplete_minutes)
    }
}

pub fn format_minutes(total_minutes: u64) -> String {
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    if hours > 0 {
        format!("{hours} h {minutes} min")
    } else {
        format!("{minutes} min")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{DailyPlan, Task};
    use crate::domain::plan::{reduce, PlanEvent, StoredPlan};

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    #[test]
    fn bucket_counts_match_interval() {
        let today = date("2026-03-10");
        for interval in [ChartInterval::Week, ChartInterval::Month, ChartInterval::Year] {
            let buckets = flashcard_activity(interval, today, Vec::new());
            assert_eq!(buckets.len(), interval.bucket_count());
            assert!(buckets.iter().all(|bucket| bucket.cards == 0));
        }
    }

    #[test]
    fn week_window_ends_today() {
        let buckets = ChartInterval::Week.buckets(date("2026-03-10"));
        assert_eq!(buckets.first(), Some(&date("2026-03-04")));
        assert_eq!(buckets.last(), Some(&date("2026-03-10")));
    }

    #[test]
    fn year_window_spans_twelve_months() {
        let buckets = ChartInterval::Year.buckets(date("2026-03-10"));
        assert_eq!(buckets.first(), Some(&date("2025-04-01")));
        assert_eq!(buckets.last(), Some(&date("2026-03-01")));
    }

    #[test]
    fn activity_counts_cards_with_minimum_of_one() {
        let today = date("2026-03-10");
        let buckets = flashcard_activity(
            ChartInterval::Week,
            today,
            vec![
                (date("2026-03-10"), 12),
                (date("2026-03-10"), 0),
                (date("2026-03-08"), 3),
                (date("2026-02-01"), 40),
            ],
        );
        assert_eq!(buckets[6].cards, 13);
        assert_eq!(buckets[4].cards, 3);
        assert_eq!(buckets.iter().map(|bucket| bucket.cards).sum::<u64>(), 16);
        assert_eq!(buckets[6].label, "Tue");
    }

    #[test]
    fn yearly_activity_groups_by_month() {
        let buckets = flashcard_activity(
            ChartInterval::Year,
            date("2026-03-10"),
            vec![(date("2026-01-03"), 5), (date("2026-01-28"), 2)],
        );
        assert_eq!(buckets[9].label, "Jan");
        assert_eq!(buckets[9].cards, 7);
    }

    #[test]
    fn interval_parses_case_insensitively() {
        assert_eq!("Week".parse::<ChartInterval>(), Ok(ChartInterval::Week));
        assert_eq!("YEAR".parse::<ChartInterval>(), Ok(ChartInterval::Year));
        assert!("decade".parse::<ChartInterval>().is_err());
    }

    #[test]
    fn format_minutes_switches_to_hours() {
        assert_eq!(format_minutes(45), "45 min");
        assert_eq!(format_minutes(60), "1 h 0 min");
        assert_eq!(format_minutes(135), "2 h 15 min");
    }

    #[test]
    fn study_time_splits_completed_and_remaining() {
        let today = date("2026-03-10");
        let plan = DailyPlan {
            date: date("2026-03-11"),
            tasks: vec![
                Task {
                    subject: "Math".to_string(),
                    duration_minutes: 90,
                },
                Task {
                    subject: "Bio".to_string(),
                    duration_minutes: 20,
                },
            ],
        };
        let loaded = reduce(
            &PlanState::default(),
            PlanEvent::Loaded(vec![StoredPlan::fresh(plan)]),
            today,
        )
        .state;
        let toggled = reduce(
            &loaded,
            PlanEvent::TaskToggled {
                date: date("2026-03-11"),
                subject: "Math".to_string(),
            },
            today,
        )
        .state;

        let summary = StudyTimeSummary::from_plans(&toggled);
        assert_eq!(summary.completed_minutes, 90);
        assert_eq!(summary.incomplete_minutes, 20);
        assert_eq!(summary.completed_label(), "1 h 30 min");
        assert_eq!(summary.incomplete_label(), "20 min");
    }
}
