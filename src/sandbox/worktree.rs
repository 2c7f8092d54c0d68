//! Git operations backing a sandbox: worktrees, branches and repo discovery.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::exec::{CommandRunner, Invocation};
use crate::paths::{clean, resolve_against};

/// Git commands run from the main repository.
pub struct Git<R> {
    repo_root: PathBuf,
    runner: R,
}

impl<R: CommandRunner> Git<R> {
    pub fn new(repo_root: PathBuf, runner: R) -> Self {
        Self { repo_root, runner }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    fn git(&self) -> Invocation {
        Invocation::new("git").current_dir(&self.repo_root)
    }

    /// `git worktree add -b <branch> <path> <base_ref>`
    pub fn add_worktree(&self, branch: &str, path: &Path, base_ref: &str) -> Result<()> {
        let inv = self
            .git()
            .args(["worktree", "add", "-b", branch])
            .path_arg(path)
            .arg(base_ref);
        self.runner
            .output(&inv)
            .map_err(|e| e.context("create worktree"))?;

        tracing::info!(path = ?path, branch = %branch, base = %base_ref, "created sandbox worktree");
        Ok(())
    }

    /// `git worktree remove <path> [--force]`
    pub fn remove_worktree(&self, path: &Path, force: bool) -> Result<()> {
        let mut inv = self.git().args(["worktree", "remove"]).path_arg(path);
        if force {
            inv = inv.arg("--force");
        }
        self.runner
            .output(&inv)
            .map_err(|e| e.context("remove worktree"))?;

        tracing::info!(path = ?path, "removed sandbox worktree");
        Ok(())
    }

    /// `git branch -d <branch>`, or `-D` when forced.
    pub fn delete_branch(&self, branch: &str, force: bool) -> Result<()> {
        let flag = if force { "-D" } else { "-d" };
        let inv = self.git().args(["branch", flag, branch]);
        self.runner
            .output(&inv)
            .map_err(|e| e.context("delete branch"))?;

        tracing::info!(branch = %branch, "deleted sandbox branch");
        Ok(())
    }

    /// Returns `base` if given, otherwise the currently checked-out branch.
    ///
    /// A detached HEAD has no branch to base on, so it is rejected.
    pub fn resolve_base_ref(&self, base: Option<&str>) -> Result<String> {
        if let Some(base) = base.filter(|b| !b.is_empty()) {
            return Ok(base.to_string());
        }
        let current = git_line(
            &self.runner,
            &self.git().args(["rev-parse", "--abbrev-ref", "HEAD"]),
        )
        .map_err(|e| e.context("detect current branch"))?;
        if current == "HEAD" {
            return Err(Error::InvalidBaseRef(
                "detached HEAD; pass --base explicitly".to_string(),
            ));
        }
        Ok(current)
    }
}

/// Finds the main repository root for `cwd`.
///
/// From inside a linked worktree this resolves to the repository that owns
/// it, so sandboxes are always created next to the main checkout.
pub fn detect_repo_root<R: CommandRunner>(runner: &R, cwd: &Path) -> Result<PathBuf> {
    let git = || Invocation::new("git").current_dir(cwd);

    let top_level = git_line(runner, &git().args(["rev-parse", "--show-toplevel"]))
        .map_err(|e| e.context("not in git repository"))?;
    let common_dir = git_line(runner, &git().args(["rev-parse", "--git-common-dir"]))?;

    let top_level = PathBuf::from(top_level);
    // Relative common dirs are reported from `cwd`, not the top level.
    let common_dir = resolve_against(cwd, Path::new(&common_dir));

    if common_dir.file_name().is_some_and(|n| n == ".git") {
        if let Some(parent) = common_dir.parent() {
            return Ok(parent.to_path_buf());
        }
    }
    Ok(clean(&top_level))
}

fn git_line<R: CommandRunner>(runner: &R, inv: &Invocation) -> Result<String> {
    Ok(runner.output(inv)?.trim().to_string())
}
