use crate::domain::streak::StreakState;
use crate::infrastructure::error::InfraError;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub trait StreakStore: Send + Sync {
    fn load(&self) -> Result<Option<StreakState>, InfraError>;
    fn save(&self, state: &StreakState) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteStreakStore {
    db_path: PathBuf,
}

impl SqliteStreakStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

impl StreakStore for SqliteStreakStore {
    fn load(&self) -> Result<Option<StreakState>, InfraError> {
        let connection = self.connect()?;
        let row: Option<(i64, i64)> = connection
            .query_row(
                "SELECT last_active_epoch_millis, current_streak FROM streak_state WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((last_active_epoch_millis, current_streak)) = row else {
            return Ok(None);
        };

        let current_streak = u32::try_from(current_streak).map_err(|_| {
            InfraError::Store(format!("invalid streak_state.current_streak {current_streak}"))
        })?;
        StreakState::from_epoch_millis(last_active_epoch_millis, current_streak)
            .map(Some)
            .ok_or_else(|| {
                InfraError::Store(format!(
                    "invalid streak_state.last_active_epoch_millis {last_active_epoch_millis}"
                ))
            })
    }

    fn save(&self, state: &StreakState) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO streak_state (id, last_active_epoch_millis, current_streak)
             VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
               last_active_epoch_millis = excluded.last_active_epoch_millis,
               current_streak = excluded.current_streak",
            params![state.last_active_epoch_millis(), i64::from(state.current_streak)],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStreakStore {
    state: Mutex<Option<StreakState>>,
}

impl InMemoryStreakStore {
    pub fn with_state(state: StreakState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
        }
    }
}

impl StreakStore for InMemoryStreakStore {
    fn load(&self) -> Result<Option<StreakState>, InfraError> {
        let state = self
            .state
            .lock()
            .map_err(|error| InfraError::Store(format!("streak state lock poisoned: {error}")))?;
        Ok(state.clone())
    }

    fn save(&self, state: &StreakState) -> Result<(), InfraError> {
        let mut stored = self
            .state
            .lock()
            .map_err(|error| InfraError::Store(format!("streak state lock poisoned: {error}")))?;
        *stored = Some(state.clone());
        Ok(())
    }
}
