/// Plan store configuration.
/// Reads `.feature/planboard.json` in the workspace, then
/// `~/.config/planboard/config.json` (or platform equivalent).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PLAN_PATH: &str = ".feature/PLAN.md";
pub const DEFAULT_LOGS_DIR: &str = ".feature/logs";
pub const DEFAULT_EXECUTE_DIR: &str = ".feature/execute";
pub const WORKSPACE_CONFIG_PATH: &str = ".feature/planboard.json";

/// Where the plan document is persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Working tree file.
    #[default]
    File,
    /// Dedicated git line, working tree untouched.
    Git,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanConfig {
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_git_line")]
    pub git_line: String,
    #[serde(default = "default_plan_path")]
    pub plan_path: String,
    #[serde(default = "default_logs_dir")]
    pub logs_dir: String,
    #[serde(default = "default_execute_dir")]
    pub execute_dir: String,
    /// Actor label for changes that did not come from our own commands.
    #[serde(default = "default_external_actor")]
    pub external_actor: String,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_git_line() -> String {
    "feature-plan".to_string()
}

fn default_plan_path() -> String {
    DEFAULT_PLAN_PATH.to_string()
}

fn default_logs_dir() -> String {
    DEFAULT_LOGS_DIR.to_string()
}

fn default_execute_dir() -> String {
    DEFAULT_EXECUTE_DIR.to_string()
}

fn default_external_actor() -> String {
    "External".to_string()
}

fn default_debounce_ms() -> u64 {
    500
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            git_line: default_git_line(),
            plan_path: default_plan_path(),
            logs_dir: default_logs_dir(),
            execute_dir: default_execute_dir(),
            external_actor: default_external_actor(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl PlanConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn logs_path(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.logs_dir)
    }

    pub fn execute_path(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.execute_dir)
    }
}

/// User-level config path: ~/.config/planboard/config.json
pub fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("planboard")
        .join("config.json")
}

/// Load config from path. Returns None if the file doesn't exist; a file
/// that fails to parse is reported and replaced by defaults.
pub fn load_config(path: &Path) -> Option<PlanConfig> {
    match fs::read_to_string(path) {
        Ok(content) => Some(serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!("[planboard.config] Failed to parse config {}: {}", path.display(), e);
            PlanConfig::default()
        })),
        Err(_) => None,
    }
}

/// Workspace config, then user config, then defaults.
pub fn resolve_config(workspace: &Path) -> PlanConfig {
    let candidates = [workspace.join(WORKSPACE_CONFIG_PATH), user_config_path()];
    for path in &candidates {
        if let Some(config) = load_config(path) {
            log::info!("[planboard.config] Using config {}", path.display());
            return config;
        }
    }
    log::info!("[planboard.config] No config found, using defaults");
    PlanConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: PlanConfig =
            serde_json::from_str(r#"{"backend":"git","externalActor":"Agent"}"#).unwrap();
        assert_eq!(config.backend, BackendKind::Git);
        assert_eq!(config.external_actor, "Agent");
        assert_eq!(config.plan_path, DEFAULT_PLAN_PATH);
        assert_eq!(config.git_line, "feature-plan");
        assert_eq!(config.debounce(), Duration::from_millis(500));
    }

    #[test]
    fn test_workspace_config_wins() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(WORKSPACE_CONFIG_PATH);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"debounceMs":50}"#).unwrap();

        let config = resolve_config(tmp.path());
        assert_eq!(config.debounce_ms, 50);
    }

    #[test]
    fn test_malformed_config_falls_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        assert_eq!(load_config(&path), Some(PlanConfig::default()));
        assert_eq!(load_config(&tmp.path().join("missing.json")), None);
    }
}
