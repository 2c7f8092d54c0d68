//! Compiles a runtime description into a container-runtime `run` call.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::exec::{CommandRunner, Invocation, SystemRunner};
use crate::sandbox::SandboxRecord;
use crate::settings::Settings;

use super::RuntimeDescription;

/// Replaced with the worktree's absolute path.
pub const WORKSPACE_FOLDER_VAR: &str = "${localWorkspaceFolder}";
/// Replaced with the worktree's final path segment.
pub const WORKSPACE_BASENAME_VAR: &str = "${localWorkspaceFolderBasename}";

/// Host file or directory shared with every sandbox container.
struct HostMount {
    /// Path relative to the user's home directory.
    host: &'static str,
    container: &'static str,
    read_only: bool,
}

const HOST_MOUNTS: &[HostMount] = &[
    HostMount {
        host: ".gitconfig",
        container: "/root/.gitconfig",
        read_only: true,
    },
    HostMount {
        host: ".git-credentials",
        container: "/root/.git-credentials",
        read_only: true,
    },
    HostMount {
        host: ".ssh",
        container: "/root/.ssh",
        read_only: true,
    },
    HostMount {
        host: ".codex",
        container: "/root/.codex",
        read_only: false,
    },
    HostMount {
        host: ".config/gh",
        container: "/root/.config/gh",
        read_only: true,
    },
];

/// Host environment variables forwarded into the container when set.
pub const PASSTHROUGH_ENV: &[&str] = &[
    "OPENAI_API_KEY",
    "OPENAI_BASE_URL",
    "OPENAI_ORG_ID",
    "OPENAI_PROJECT",
    "GITHUB_TOKEN",
    "GH_TOKEN",
    "ANTHROPIC_API_KEY",
];

/// Substitutes the two workspace placeholders in `value`.
pub fn expand_workspace_variables(value: &str, worktree: &Path) -> String {
    let basename = worktree
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    value
        .replace(WORKSPACE_FOLDER_VAR, &worktree.to_string_lossy())
        .replace(WORKSPACE_BASENAME_VAR, &basename)
}

/// Snapshot of the host state that feeds credential mounts and env passthrough.
#[derive(Debug, Clone, Default)]
pub struct HostIntegration {
    home: Option<PathBuf>,
    env: BTreeMap<String, String>,
}

impl HostIntegration {
    /// Reads the home directory and allow-listed variables from this process.
    pub fn from_process() -> Self {
        Self::new(
            dirs::home_dir(),
            PASSTHROUGH_ENV
                .iter()
                .filter_map(|key| std::env::var(key).ok().map(|v| (key.to_string(), v))),
        )
    }

    /// Builds a snapshot from explicit values. Variables outside the
    /// allow-list are dropped.
    pub fn new<I, K, V>(home: Option<PathBuf>, env: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let env = env
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| PASSTHROUGH_ENV.contains(&k.as_str()))
            .collect();
        Self { home, env }
    }

    /// `-v host:container[:ro]` for each allow-listed path present on the host.
    pub fn mount_args(&self) -> Vec<String> {
        let Some(home) = &self.home else {
            return Vec::new();
        };
        let mut args = Vec::new();
        for mount in HOST_MOUNTS {
            let host = home.join(mount.host);
            if !host.exists() {
                continue;
            }
            let mut value = format!("{}:{}", host.display(), mount.container);
            if mount.read_only {
                value.push_str(":ro");
            }
            args.push("-v".to_string());
            args.push(value);
        }
        args
    }

    /// `-e KEY=VALUE` for each allow-listed variable with a non-empty value,
    /// in allow-list order.
    pub fn env_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for key in PASSTHROUGH_ENV {
            match self.env.get(*key) {
                Some(value) if !value.is_empty() => {
                    args.push("-e".to_string());
                    args.push(format!("{}={}", key, value));
                }
                _ => {}
            }
        }
        args
    }
}

/// Runs a sandbox's agent command in a container.
pub struct Launcher<R = SystemRunner> {
    runner: R,
    settings: Settings,
    host: HostIntegration,
}

impl<R: CommandRunner> Launcher<R> {
    /// Launcher using this process's home directory and environment.
    pub fn new(settings: Settings, runner: R) -> Self {
        Self::with_host(settings, runner, HostIntegration::from_process())
    }

    pub fn with_host(settings: Settings, runner: R, host: HostIntegration) -> Self {
        Self {
            runner,
            settings,
            host,
        }
    }

    /// Arguments for the container runtime, starting with `run`.
    ///
    /// Order: run flags and name, workspace attachment, working directory,
    /// declared mounts, user, host mounts, passthrough env, declared env,
    /// declared run args, image and `bash -lc <command>`.
    pub fn container_args(
        &self,
        record: &SandboxRecord,
        runtime: &RuntimeDescription,
        command: &str,
    ) -> Vec<String> {
        let worktree = record.worktree_path.as_path();
        let expand = |value: &str| expand_workspace_variables(value, worktree);

        let workspace_folder = runtime
            .workspace_folder
            .as_deref()
            .filter(|f| !f.is_empty())
            .map(expand)
            .unwrap_or_else(|| self.settings.workspace_folder.clone());

        let mut args: Vec<String> = ["run", "--rm", "-it", "--name"]
            .into_iter()
            .map(String::from)
            .collect();
        args.push(record.container_name.clone());

        match runtime.workspace_mount.as_deref().filter(|m| !m.is_empty()) {
            Some(mount) => {
                args.push("--mount".to_string());
                args.push(expand(mount));
            }
            None => {
                args.push("-v".to_string());
                args.push(format!("{}:{}", worktree.display(), workspace_folder));
            }
        }
        args.push("-w".to_string());
        args.push(workspace_folder);

        for mount in &runtime.mounts {
            args.push("--mount".to_string());
            args.push(expand(mount));
        }
        if let Some(user) = runtime.remote_user.as_deref().filter(|u| !u.is_empty()) {
            args.push("--user".to_string());
            args.push(user.to_string());
        }

        args.extend(self.host.mount_args());
        args.extend(self.host.env_args());
        for (key, value) in &runtime.container_env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, expand(value)));
        }
        args.extend(runtime.run_args.iter().cloned());

        let image = if runtime.image.is_empty() {
            self.settings.default_image.clone()
        } else {
            runtime.image.clone()
        };
        let command = if command.is_empty() {
            self.settings.run_command.as_str()
        } else {
            command
        };
        args.push(image);
        args.push("bash".to_string());
        args.push("-lc".to_string());
        args.push(command.to_string());
        args
    }

    /// Runs `command` in the sandbox container attached to this terminal.
    ///
    /// Returns when the container exits; a non-zero exit carries its code.
    pub fn launch(
        &self,
        record: &SandboxRecord,
        runtime: &RuntimeDescription,
        command: &str,
    ) -> Result<()> {
        let inv = Invocation::new(&self.settings.container_runtime).args(self.container_args(
            record, runtime, command,
        ));

        tracing::info!(
            container = %record.container_name,
            image = %runtime.image,
            "starting sandbox container"
        );

        self.runner
            .run_inherited(&inv)
            .map_err(|e| e.context("run container"))
    }
}
