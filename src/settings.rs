//! Tool settings.
//!
//! Fixed defaults (image, branch prefix, directory names) live here and are
//! handed to each component at construction. A `.vibe.toml` at the
//! repository root may override any of them.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// File name looked up at the repository root when no explicit path is given.
pub const SETTINGS_FILE: &str = ".vibe.toml";

/// Defaults used across the sandbox manager, runtime resolver and launcher.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Directory (relative to the repo root) holding worktrees and metadata.
    #[serde(default = "default_sandbox_dir")]
    pub sandbox_dir: String,
    /// Older directory names still honored when they exist.
    #[serde(default = "default_legacy_sandbox_dirs")]
    pub legacy_sandbox_dirs: Vec<String>,
    /// Branch prefix; sandbox branches are `<prefix>/<name>`.
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
    /// Image used when neither an override nor a devcontainer names one.
    #[serde(default = "default_image")]
    pub default_image: String,
    /// Shell command started inside the container.
    #[serde(default = "default_run_command")]
    pub run_command: String,
    /// Prefix for generated sandbox names.
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    /// Prefix for container names.
    #[serde(default = "default_container_prefix")]
    pub container_prefix: String,
    /// Repository part of tags given to devcontainer builds.
    #[serde(default = "default_build_tag_repository")]
    pub build_tag_repository: String,
    /// Devcontainer config path, relative to the worktree.
    #[serde(default = "default_devcontainer_path")]
    pub devcontainer_path: PathBuf,
    /// Container runtime executable.
    #[serde(default = "default_container_runtime")]
    pub container_runtime: String,
    /// Mount point of the worktree inside the container.
    #[serde(default = "default_workspace_folder")]
    pub workspace_folder: String,
}

fn default_sandbox_dir() -> String {
    ".codex-sandboxes".to_string()
}

fn default_legacy_sandbox_dirs() -> Vec<String> {
    vec![".opencode-sandboxes".to_string()]
}

fn default_branch_prefix() -> String {
    "codex".to_string()
}

fn default_image() -> String {
    "codex-sandbox:latest".to_string()
}

fn default_run_command() -> String {
    "codex --yolo".to_string()
}

fn default_name_prefix() -> String {
    "sb-".to_string()
}

fn default_container_prefix() -> String {
    "codex-sb-".to_string()
}

fn default_build_tag_repository() -> String {
    "vibe-devcontainer".to_string()
}

fn default_devcontainer_path() -> PathBuf {
    PathBuf::from(".devcontainer/devcontainer.json")
}

fn default_container_runtime() -> String {
    "docker".to_string()
}

fn default_workspace_folder() -> String {
    "/workspace".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sandbox_dir: default_sandbox_dir(),
            legacy_sandbox_dirs: default_legacy_sandbox_dirs(),
            branch_prefix: default_branch_prefix(),
            default_image: default_image(),
            run_command: default_run_command(),
            name_prefix: default_name_prefix(),
            container_prefix: default_container_prefix(),
            build_tag_repository: default_build_tag_repository(),
            devcontainer_path: default_devcontainer_path(),
            container_runtime: default_container_runtime(),
            workspace_folder: default_workspace_folder(),
        }
    }
}

impl Settings {
    /// Parses settings from TOML text.
    pub fn from_toml(path: &Path, text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Settings {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Loads settings from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Settings {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(path, &text)
    }

    /// Loads `<repo_root>/.vibe.toml` if present, defaults otherwise.
    pub fn discover(repo_root: &Path) -> Result<Self> {
        let path = repo_root.join(SETTINGS_FILE);
        if path.is_file() {
            tracing::debug!(path = ?path, "loading settings");
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.sandbox_dir, ".codex-sandboxes");
        assert_eq!(settings.branch_prefix, "codex");
        assert_eq!(settings.default_image, "codex-sandbox:latest");
        assert_eq!(settings.run_command, "codex --yolo");
        assert_eq!(settings.container_prefix, "codex-sb-");
        assert_eq!(
            settings.devcontainer_path,
            PathBuf::from(".devcontainer/devcontainer.json")
        );
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let toml = r#"
branch_prefix = "agent"
default_image = "ghcr.io/acme/dev:1"
"#;
        let settings = Settings::from_toml(Path::new("x.toml"), toml).unwrap();

        assert_eq!(settings.branch_prefix, "agent");
        assert_eq!(settings.default_image, "ghcr.io/acme/dev:1");
        assert_eq!(settings.run_command, "codex --yolo");
        assert_eq!(settings.container_runtime, "docker");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Settings::from_toml(Path::new("x.toml"), "brnach_prefix = \"typo\"").unwrap_err();
        assert!(matches!(err, Error::Settings { .. }));
        assert!(err.to_string().contains("x.toml"));
    }

    #[test]
    fn discover_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        assert_eq!(Settings::discover(dir.path()).unwrap(), Settings::default());

        std::fs::write(dir.path().join(SETTINGS_FILE), "run_command = \"bash\"\n").unwrap();
        let settings = Settings::discover(dir.path()).unwrap();
        assert_eq!(settings.run_command, "bash");
    }
}
