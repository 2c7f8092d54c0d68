//! vibe - isolated agent sandboxes backed by git worktrees and containers.
//!
//! The library covers the sandbox lifecycle (worktree, branch and metadata
//! record) and runtime resolution (devcontainer config, image builds and
//! container launch arguments). The `vibe` binary is a thin layer on top.

pub mod error;
pub mod exec;
pub mod naming;
pub mod paths;
pub mod runtime;
pub mod sandbox;
pub mod settings;

pub use error::{Error, Result};
pub use exec::{CommandRunner, Invocation, SystemRunner};
pub use runtime::{
    BuildPlan, DevcontainerConfig, HostIntegration, Launcher, RuntimeDescription,
    RuntimeResolver,
};
pub use sandbox::{
    detect_repo_root, resolve_sandbox_root, MetadataStore, SandboxManager, SandboxRecord,
    SandboxState,
};
pub use settings::Settings;
