use chrono::{DateTime, Days, Local, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarPolicy {
    Local,
    Zone(Tz),
}

impl CalendarPolicy {
    pub fn from_timezone_name(name: Option<&str>) -> Result<Self, String> {
        match name.map(str::trim).filter(|value| !value.is_empty()) {
            None => Ok(Self::Local),
            Some(name) => name
                .parse::<Tz>()
                .map(Self::Zone)
                .map_err(|_| format!("unknown timezone '{name}'")),
        }
    }

    pub fn calendar_day(&self, instant: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::Local => instant.with_timezone(&Local).date_naive(),
            Self::Zone(zone) => instant.with_timezone(zone).date_naive(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::Local => "local".to_string(),
            Self::Zone(zone) => zone.name().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
    pub last_active_at: DateTime<Utc>,
    pub current_streak: u32,
}

impl StreakState {
    pub fn last_active_epoch_millis(&self) -> i64 {
        self.last_active_at.timestamp_millis()
    }

    pub fn from_epoch_millis(last_active_epoch_millis: i64, current_streak: u32) -> Option<Self> {
        DateTime::from_timestamp_millis(last_active_epoch_millis).map(|last_active_at| Self {
            last_active_at,
            current_streak,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakTransition {
    FirstRun,
    SameDay,
    Continued,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreakUpdate {
    pub state: StreakState,
    pub transition: StreakTransition,
    pub previous_streak: Option<u32>,
}

impl StreakUpdate {
    pub fn needs_persist(&self) -> bool {
        self.transition != StreakTransition::SameDay
    }

    pub fn streak_changed(&self) -> bool {
        self.previous_streak != Some(self.state.current_streak)
    }
}

pub fn advance_streak(
    previous: Option<&StreakState>,
    now: DateTime<Utc>,
    calendar: &CalendarPolicy,
) -> StreakUpdate {
    let Some(previous) = previous else {
        return StreakUpdate {
            state: StreakState {
                last_active_at: now,
                current_streak: 1,
            },
            transition: StreakTransition::FirstRun,
            previous_streak: None,
        };
    };

    let last_day = calendar.calendar_day(previous.last_active_at);
    let today = calendar.calendar_day(now);

    if last_day == today {
        return StreakUpdate {
            state: previous.clone(),
            transition: StreakTransition::SameDay,
            previous_streak: Some(previous.current_streak),
        };
    }

    let (current_streak, transition) = if last_day.checked_add_days(Days::new(1)) == Some(today) {
        (
            previous.current_streak.saturating_add(1),
            StreakTransition::Continued,
        )
    } else {
        (1, StreakTransition::Reset)
    };

    StreakUpdate {
        state: StreakState {
            last_active_at: now,
            current_streak,
        },
        transition,
        previous_streak: Some(previous.current_streak),
    }
}
