use crate::infrastructure::config::{ensure_default_configs, load_configs};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::initialize_database;
use std::fs;
use std::path::{Path, PathBuf};

pub const DATABASE_FILE_NAME: &str = "studyaid.sqlite";

#[derive(Debug, Clone)]
pub struct BootstrapResult {
    pub config_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub database_path: PathBuf,
}

pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join(DATABASE_FILE_NAME);

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;
    load_configs(&config_dir)?;
    initialize_database(&database_path)?;

    Ok(BootstrapResult {
        config_dir,
        logs_dir,
        database_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_layout_and_is_repeatable() {
        let workspace = tempfile::tempdir().expect("tempdir");

        let first = bootstrap_workspace(workspace.path()).expect("first bootstrap");
        assert!(first.config_dir.join("app.json").exists());
        assert!(first.config_dir.join("backend.json").exists());
        assert!(first.config_dir.join("session.json").exists());
        assert!(first.logs_dir.is_dir());
        assert!(first.database_path.ends_with("state/studyaid.sqlite"));
        assert!(first.database_path.exists());

        let second = bootstrap_workspace(workspace.path()).expect("second bootstrap");
        assert_eq!(first.database_path, second.database_path);
    }

    #[test]
    fn invalid_config_fails_bootstrap() {
        let workspace = tempfile::tempdir().expect("tempdir");
        bootstrap_workspace(workspace.path()).expect("bootstrap");
        fs::write(workspace.path().join("config/app.json"), "{ not json").expect("corrupt config");

        assert!(bootstrap_workspace(workspace.path()).is_err());
    }
}
