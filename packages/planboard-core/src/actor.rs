/// Actor names for audit entries, and the identity used for plan commits.

use std::path::Path;

/// Email recorded on plan commits when the repository has none configured.
pub const PLACEHOLDER_EMAIL: &str = "planboard@localhost";

/// Label for changes made through our own commands.
pub fn user_actor(name: &str) -> String {
    format!("User ({})", name)
}

/// A `git config` value as seen from `workspace`, `None` when unset or when
/// git is unavailable.
pub async fn git_config(workspace: &Path, key: &str) -> Option<String> {
    let output = tokio::process::Command::new("git")
        .args(["config", key])
        .current_dir(workspace)
        .output()
        .await;

    match output {
        Ok(o) if o.status.success() => {
            let value = String::from_utf8_lossy(&o.stdout).trim().to_string();
            (!value.is_empty()).then_some(value)
        }
        Ok(_) => None,
        Err(e) => {
            log::debug!("[planboard.actor] git unavailable: {}", e);
            None
        }
    }
}

/// `git config user.name` in the workspace, falling back to the OS user.
pub async fn resolve_user_name(workspace: &Path) -> String {
    match git_config(workspace, "user.name").await {
        Some(name) => name,
        None => whoami::username(),
    }
}

/// Identity to force on plan commits. `None` when the repository already
/// has an email configured and git can sign commits on its own.
pub fn commit_identity(name: &str, configured_email: Option<&str>) -> Option<(String, String)> {
    match configured_email {
        Some(_) => None,
        None => Some((name.to_string(), PLACEHOLDER_EMAIL.to_string())),
    }
}
