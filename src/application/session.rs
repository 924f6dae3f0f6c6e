use crate::infrastructure::document_mapper::{new_statistics_fields, new_user_fields, statistics_path, user_path};
use crate::infrastructure::document_store::DocumentStore;
use crate::infrastructure::error::InfraError;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecordsOutcome {
    pub created_user: bool,
    pub created_statistics: bool,
}

pub async fn ensure_user_records<D>(document_store: &D, user_id: &str) -> Result<UserRecordsOutcome, InfraError>
where
    D: DocumentStore + ?Sized,
{
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(InfraError::InvalidInput("user id must not be empty".to_string()));
    }

    let mut outcome = UserRecordsOutcome::default();
    let user = user_path(user_id);
    if document_store.get(&user).await?.is_none() {
        document_store.set(&user, new_user_fields(user_id)?).await?;
        outcome.created_user = true;
    }
    let statistics = statistics_path(user_id);
    if document_store.get(&statistics).await?.is_none() {
        document_store.set(&statistics, new_statistics_fields()?).await?;
        outcome.created_statistics = true;
    }

    if outcome.created_user || outcome.created_statistics {
        info!(
            user_id,
            created_user = outcome.created_user,
            created_statistics = outcome.created_statistics,
            "user records initialized"
        );
    }
    Ok(outcome)
}
