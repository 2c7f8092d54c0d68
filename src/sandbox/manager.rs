//! Sandbox lifecycle: create, destroy and enumerate sandboxes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::{Error, Result};
use crate::exec::{CommandRunner, Invocation, SystemRunner};
use crate::naming;
use crate::settings::Settings;

use super::record::SandboxRecord;
use super::store::MetadataStore;
use super::worktree::Git;

/// Observed state of a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    /// Its container is currently running.
    Running,
    /// Worktree present, no running container.
    Stopped,
    /// The worktree was removed behind the tool's back.
    MissingWorktree,
}

impl std::fmt::Display for SandboxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SandboxState::Running => "running",
            SandboxState::Stopped => "stopped",
            SandboxState::MissingWorktree => "missing-worktree",
        };
        f.write_str(s)
    }
}

/// Creates and tears down sandboxes under one sandbox root.
///
/// Layout: worktrees at `<root>/<name>`, records at `<root>/meta/<name>.json`.
pub struct SandboxManager<R = SystemRunner> {
    sandbox_root: PathBuf,
    store: MetadataStore,
    git: Git<R>,
    settings: Settings,
}

impl<R: CommandRunner> SandboxManager<R> {
    /// Opens the sandbox root for `repo_root`, creating its metadata directory.
    ///
    /// `root` overrides the configured location; relative values are taken
    /// from the repo root.
    pub fn open(
        repo_root: PathBuf,
        root: Option<&Path>,
        settings: Settings,
        runner: R,
    ) -> Result<Self> {
        let sandbox_root = resolve_sandbox_root(&repo_root, root, &settings);
        let store = MetadataStore::open(sandbox_root.join("meta"))?;

        tracing::debug!(root = ?sandbox_root, "opened sandbox root");

        Ok(Self::with_store(repo_root, sandbox_root, store, settings, runner))
    }

    /// Builds a manager from already-resolved parts.
    pub fn with_store(
        repo_root: PathBuf,
        sandbox_root: PathBuf,
        store: MetadataStore,
        settings: Settings,
        runner: R,
    ) -> Self {
        Self {
            sandbox_root,
            store,
            git: Git::new(repo_root, runner),
            settings,
        }
    }

    pub fn repo_root(&self) -> &Path {
        self.git.repo_root()
    }

    pub fn sandbox_root(&self) -> &Path {
        &self.sandbox_root
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn git(&self) -> &Git<R> {
        &self.git
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Worktree location for a sandbox name.
    pub fn worktree_path(&self, name: &str) -> PathBuf {
        self.sandbox_root.join(name)
    }

    /// Creates sandbox `name` on branch `<prefix>/<name>` from `base_ref`.
    ///
    /// Validation and conflict checks run before any side effect. If the
    /// record cannot be saved after the worktree was added, the worktree is
    /// force-removed once and the save error is returned.
    pub fn create(
        &self,
        name: &str,
        base_ref: &str,
        branch_prefix: Option<&str>,
    ) -> Result<SandboxRecord> {
        if !naming::is_valid(name) {
            return Err(Error::InvalidName(name.to_string()));
        }
        let prefix = branch_prefix
            .filter(|p| !p.is_empty())
            .unwrap_or(self.settings.branch_prefix.as_str());

        if self.store.exists(name) {
            return Err(Error::Conflict(format!("sandbox {:?} already exists", name)));
        }
        let worktree = self.worktree_path(name);
        if worktree.exists() {
            return Err(Error::Conflict(format!(
                "worktree path already exists: {}",
                worktree.display()
            )));
        }

        let branch = format!("{}/{}", prefix, name);
        self.git.add_worktree(&branch, &worktree, base_ref)?;

        let record = SandboxRecord {
            name: name.to_string(),
            branch,
            base_ref: base_ref.to_string(),
            worktree_path: worktree,
            container_name: naming::container_name(&self.settings.container_prefix, name),
            created_at: Utc::now(),
        };

        if let Err(err) = self.store.save(&record) {
            tracing::warn!(name = %name, error = %err, "failed to save sandbox record, removing worktree");
            if let Err(cleanup) = self.git.remove_worktree(&record.worktree_path, true) {
                tracing::warn!(
                    path = ?record.worktree_path,
                    error = %cleanup,
                    "failed to remove worktree after save failure, may need manual cleanup"
                );
            }
            return Err(err);
        }

        tracing::info!(name = %name, branch = %record.branch, "created sandbox");
        Ok(record)
    }

    /// Tears a sandbox down: container, worktree, optionally branch, record.
    ///
    /// The container removal is best effort. Every later step stops the
    /// teardown on failure, leaving the record in place for a retry.
    pub fn destroy(&self, record: &SandboxRecord, force: bool, delete_branch: bool) -> Result<()> {
        let rm = Invocation::new(&self.settings.container_runtime)
            .args(["rm", "-f", record.container_name.as_str()]);
        if let Err(e) = self.git.runner().output(&rm) {
            tracing::debug!(container = %record.container_name, error = %e, "no container removed");
        }

        self.git.remove_worktree(&record.worktree_path, force)?;

        if delete_branch {
            self.git.delete_branch(&record.branch, force)?;
        }

        self.store.remove(&record.name)?;

        tracing::info!(name = %record.name, "destroyed sandbox");
        Ok(())
    }

    /// Destroys every sandbox in name order.
    ///
    /// Keeps going past failures; returns how many were destroyed and, if
    /// any failed, an [`Error::Aggregate`] naming each one.
    pub fn destroy_all(&self, force: bool, delete_branch: bool) -> (usize, Result<()>) {
        let records = match self.list() {
            Ok(records) => records,
            Err(e) => return (0, Err(e)),
        };

        let mut count = 0;
        let mut failures = Vec::new();
        for record in &records {
            match self.destroy(record, force, delete_branch) {
                Ok(()) => count += 1,
                Err(e) => {
                    tracing::warn!(name = %record.name, error = %e, "failed to destroy sandbox");
                    failures.push((record.name.clone(), e));
                }
            }
        }

        if failures.is_empty() {
            (count, Ok(()))
        } else {
            (count, Err(Error::Aggregate { failures }))
        }
    }

    /// Loads the record for `name`.
    pub fn load(&self, name: &str) -> Result<SandboxRecord> {
        self.store.load(name)
    }

    /// All records, sorted by name.
    pub fn list(&self) -> Result<Vec<SandboxRecord>> {
        let mut records = self.store.list()?;
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    /// All records with their observed state, sorted by name.
    pub fn statuses(&self) -> Result<Vec<(SandboxRecord, SandboxState)>> {
        let running = self.running_containers();
        Ok(self
            .list()?
            .into_iter()
            .map(|record| {
                let state = if !record.worktree_exists() {
                    SandboxState::MissingWorktree
                } else if running.contains(&record.container_name) {
                    SandboxState::Running
                } else {
                    SandboxState::Stopped
                };
                (record, state)
            })
            .collect())
    }

    /// Names of running containers; empty if the runtime cannot be queried.
    fn running_containers(&self) -> HashSet<String> {
        let ps = Invocation::new(&self.settings.container_runtime)
            .args(["ps", "--format", "{{.Names}}"]);
        match self.git.runner().output(&ps) {
            Ok(out) => out
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
            Err(e) => {
                tracing::debug!(error = %e, "could not list running containers");
                HashSet::new()
            }
        }
    }
}

/// Picks the sandbox root: explicit override, then the configured
/// directory if present, then the first existing legacy directory, then the
/// configured directory.
pub fn resolve_sandbox_root(repo_root: &Path, root: Option<&Path>, settings: &Settings) -> PathBuf {
    if let Some(root) = root.filter(|r| !r.as_os_str().is_empty()) {
        return if root.is_absolute() {
            root.to_path_buf()
        } else {
            repo_root.join(root)
        };
    }

    let default_root = repo_root.join(&settings.sandbox_dir);
    if default_root.exists() {
        return default_root;
    }
    settings
        .legacy_sandbox_dirs
        .iter()
        .map(|dir| repo_root.join(dir))
        .find(|dir| dir.exists())
        .unwrap_or(default_root)
}
