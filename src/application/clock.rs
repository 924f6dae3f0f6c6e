use crate::domain::streak::CalendarPolicy;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct Clock {
    now_provider: NowProvider,
    calendar: CalendarPolicy,
}

impl Clock {
    pub fn new(calendar: CalendarPolicy) -> Self {
        Self {
            now_provider: Arc::new(Utc::now),
            calendar,
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn fixed(instant: DateTime<Utc>, calendar: CalendarPolicy) -> Self {
        Self::new(calendar).with_now_provider(Arc::new(move || instant))
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    pub fn today(&self) -> NaiveDate {
        self.calendar.calendar_day(self.now())
    }

    pub fn calendar_day(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.calendar.calendar_day(instant)
    }

    pub fn calendar(&self) -> &CalendarPolicy {
        &self.calendar
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(CalendarPolicy::Local)
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Clock")
            .field("calendar", &self.calendar.name())
            .finish_non_exhaustive()
    }
}
