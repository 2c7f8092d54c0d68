//! Sandbox lifecycle.
//!
//! A sandbox pairs a git worktree on its own branch with a container name.
//! [`SandboxManager`] creates and destroys them, [`MetadataStore`] keeps one
//! JSON record per sandbox.

mod manager;
mod record;
mod store;
mod worktree;

pub use manager::{resolve_sandbox_root, SandboxManager, SandboxState};
pub use record::SandboxRecord;
pub use store::MetadataStore;
pub use worktree::{detect_repo_root, Git};
