//! Persisted sandbox record.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One sandbox: a worktree on its own branch plus the container that runs in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxRecord {
    /// Unique sandbox name; also the metadata file stem.
    pub name: String,
    /// Branch checked out in the worktree (`<prefix>/<name>`).
    pub branch: String,
    /// Ref the branch was created from.
    pub base_ref: String,
    /// Absolute path of the worktree.
    #[serde(rename = "worktree")]
    pub worktree_path: PathBuf,
    /// Container name derived from `name`.
    #[serde(rename = "container")]
    pub container_name: String,
    pub created_at: DateTime<Utc>,
}

impl SandboxRecord {
    /// Whether the worktree is still on disk.
    ///
    /// A missing worktree means something outside this tool removed it.
    pub fn worktree_exists(&self) -> bool {
        self.worktree_path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_uses_stable_field_names_on_disk() {
        let record = SandboxRecord {
            name: "feat-a".to_string(),
            branch: "codex/feat-a".to_string(),
            base_ref: "main".to_string(),
            worktree_path: PathBuf::from("/repo/.codex-sandboxes/feat-a"),
            container_name: "codex-sb-feat-a".to_string(),
            created_at: "2026-01-01T00:00:00Z".parse().unwrap(),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["worktree"], "/repo/.codex-sandboxes/feat-a");
        assert_eq!(value["container"], "codex-sb-feat-a");
        assert_eq!(value["base_ref"], "main");
        assert_eq!(value["created_at"], "2026-01-01T00:00:00Z");
    }

    #[test]
    fn record_accepts_offset_timestamps() {
        let json = r#"{
            "name": "x",
            "branch": "codex/x",
            "base_ref": "main",
            "worktree": "/tmp/x",
            "container": "codex-sb-x",
            "created_at": "2026-03-04T10:00:00+02:00"
        }"#;
        let record: SandboxRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.created_at.to_rfc3339(), "2026-03-04T08:00:00+00:00");
    }
}
