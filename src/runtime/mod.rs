//! Runtime resolution: turns an optional devcontainer config plus caller
//! overrides into a [`RuntimeDescription`], building an image when asked to.

mod build;
mod devcontainer;
mod launch;

pub use build::BuildPlan;
pub use devcontainer::{BuildDeclaration, BuildObject, BuildSpec, DevcontainerConfig};
pub use launch::{
    expand_workspace_variables, HostIntegration, Launcher, PASSTHROUGH_ENV,
    WORKSPACE_BASENAME_VAR, WORKSPACE_FOLDER_VAR,
};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::exec::{CommandRunner, Invocation, SystemRunner};
use crate::paths::{clean, resolve_against};
use crate::settings::Settings;

/// Fully resolved execution environment for one sandbox session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeDescription {
    pub image: String,
    pub run_args: Vec<String>,
    pub container_env: BTreeMap<String, String>,
    pub remote_user: Option<String>,
    pub mounts: Vec<String>,
    pub workspace_mount: Option<String>,
    pub workspace_folder: Option<String>,
}

impl RuntimeDescription {
    pub fn with_image(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    fn merge(&mut self, config: &DevcontainerConfig) {
        self.run_args.extend(config.run_args.iter().cloned());
        self.container_env.extend(
            config
                .container_env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        if config.remote_user.is_some() {
            self.remote_user = config.remote_user.clone();
        }
        self.mounts.extend(config.mounts.iter().cloned());
        if config.workspace_mount.is_some() {
            self.workspace_mount = config.workspace_mount.clone();
        }
        if config.workspace_folder.is_some() {
            self.workspace_folder = config.workspace_folder.clone();
        }
    }
}

/// Resolves runtime descriptions for sandbox worktrees.
pub struct RuntimeResolver<R = SystemRunner> {
    runner: R,
    settings: Settings,
    reuse_images: bool,
}

impl<R: CommandRunner> RuntimeResolver<R> {
    pub fn new(settings: Settings, runner: R) -> Self {
        Self {
            runner,
            settings,
            reuse_images: false,
        }
    }

    /// Skip builds whose tag already exists locally.
    pub fn reuse_images(mut self, reuse: bool) -> Self {
        self.reuse_images = reuse;
        self
    }

    /// Config file path for `worktree`: `config_path` or the default subpath,
    /// joined to the worktree when relative.
    pub fn config_path(&self, worktree: &Path, config_path: Option<&Path>) -> PathBuf {
        let path = config_path.unwrap_or(self.settings.devcontainer_path.as_path());
        resolve_against(worktree, path)
    }

    /// Produces the runtime description for `worktree`.
    ///
    /// Image precedence: `explicit_image`, then the config's `image`, then an
    /// image built from the config's build declaration, then the default.
    /// A missing config is an error only when `strict` is set.
    pub fn resolve(
        &self,
        worktree: &Path,
        explicit_image: Option<&str>,
        config_path: Option<&Path>,
        strict: bool,
    ) -> Result<RuntimeDescription> {
        let explicit_image = explicit_image.filter(|i| !i.is_empty());
        let mut runtime = RuntimeDescription::with_image(
            explicit_image.unwrap_or(self.settings.default_image.as_str()),
        );

        let path = self.config_path(worktree, config_path);
        if !path.exists() {
            if strict {
                return Err(Error::ConfigNotFound(path));
            }
            tracing::debug!(path = ?path, "no devcontainer config, using defaults");
            return Ok(runtime);
        }

        let config = DevcontainerConfig::load(&path)?;
        runtime.merge(&config);

        if explicit_image.is_some() {
            return Ok(runtime);
        }
        if let Some(image) = config.image() {
            runtime.image = image.to_string();
            return Ok(runtime);
        }
        if let Some(spec) = config.build_spec(&path)? {
            runtime.image = self.build(&path, &spec)?;
        }
        Ok(runtime)
    }

    /// Builds the declared image and returns its tag.
    fn build(&self, config_path: &Path, spec: &BuildSpec) -> Result<String> {
        let plan = BuildPlan::prepare(
            &clean(config_path),
            spec,
            &self.settings.build_tag_repository,
        )?;
        let runtime = self.settings.container_runtime.as_str();

        if self.reuse_images && self.image_exists(&plan.tag) {
            tracing::info!(tag = %plan.tag, "reusing devcontainer image");
            return Ok(plan.tag);
        }

        tracing::info!(
            tag = %plan.tag,
            dockerfile = ?plan.dockerfile,
            context = ?plan.context,
            "building devcontainer image"
        );
        self.runner
            .run_inherited(&plan.invocation(runtime))
            .map_err(|e| e.context("build devcontainer image"))?;
        Ok(plan.tag)
    }

    fn image_exists(&self, tag: &str) -> bool {
        let inv = Invocation::new(&self.settings.container_runtime).args(["image", "inspect", tag]);
        self.runner.output(&inv).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::{failure, ScriptedRunner};
    use crate::naming::short_hash;
    use std::fs;
    use tempfile::TempDir;

    fn worktree_with_config(text: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        let dc = dir.path().join(".devcontainer");
        fs::create_dir(&dc).unwrap();
        fs::write(dc.join("devcontainer.json"), text).unwrap();
        dir
    }

    #[test]
    fn explicit_image_wins_but_config_fields_still_apply() {
        let wt = worktree_with_config(
            r#"{
                "image": "from-config",
                "build": "Dockerfile",
                "runArgs": ["--init"],
                "containerEnv": {"A": "1"},
                "remoteUser": "dev",
            }"#,
        );
        let runner = ScriptedRunner::succeeding();
        let resolver = RuntimeResolver::new(Settings::default(), &runner);

        let rt = resolver.resolve(wt.path(), Some("override:1"), None, false).unwrap();

        assert_eq!(rt.image, "override:1");
        assert_eq!(rt.run_args, vec!["--init"]);
        assert_eq!(rt.container_env.get("A").map(String::as_str), Some("1"));
        assert_eq!(rt.remote_user.as_deref(), Some("dev"));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn config_image_beats_build() {
        let wt = worktree_with_config(r#"{"image": "from-config", "build": "Dockerfile"}"#);
        let runner = ScriptedRunner::succeeding();
        let resolver = RuntimeResolver::new(Settings::default(), &runner);

        let rt = resolver.resolve(wt.path(), None, None, false).unwrap();

        assert_eq!(rt.image, "from-config");
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn build_used_when_no_image_declared() {
        let wt = worktree_with_config(r#"{"build": "Dockerfile"}"#);
        fs::write(wt.path().join(".devcontainer/Dockerfile"), "FROM scratch\n").unwrap();
        let runner = ScriptedRunner::succeeding();
        let resolver = RuntimeResolver::new(Settings::default(), &runner);

        let rt = resolver.resolve(wt.path(), None, None, false).unwrap();

        assert!(rt.image.starts_with("vibe-devcontainer:"));
        assert_eq!(rt.image.len(), "vibe-devcontainer:".len() + 12);
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "docker");
        assert_eq!(calls[0].args[0], "build");
    }

    #[test]
    fn default_image_when_config_declares_neither() {
        let wt = worktree_with_config(r#"{"remoteUser": "dev"}"#);
        let runner = ScriptedRunner::succeeding();
        let resolver = RuntimeResolver::new(Settings::default(), &runner);

        let rt = resolver.resolve(wt.path(), None, None, false).unwrap();

        assert_eq!(rt.image, "codex-sandbox:latest");
        assert_eq!(rt.remote_user.as_deref(), Some("dev"));
    }

    #[test]
    fn missing_config_depends_on_strictness() {
        let wt = TempDir::new().unwrap();
        let resolver = RuntimeResolver::new(Settings::default(), ScriptedRunner::succeeding());

        let rt = resolver.resolve(wt.path(), None, None, false).unwrap();
        assert_eq!(rt, RuntimeDescription::with_image("codex-sandbox:latest"));

        let rt = resolver
            .resolve(wt.path(), Some("mine"), Some(Path::new("nope.json")), false)
            .unwrap();
        assert_eq!(rt.image, "mine");

        let err = resolver
            .resolve(wt.path(), None, Some(Path::new("nope.json")), true)
            .unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound(ref p) if p == &wt.path().join("nope.json")));
    }

    #[test]
    fn config_path_that_is_a_directory_is_an_io_error() {
        let wt = TempDir::new().unwrap();
        fs::create_dir_all(wt.path().join(".devcontainer/devcontainer.json")).unwrap();
        let runner = ScriptedRunner::succeeding();
        let resolver = RuntimeResolver::new(Settings::default(), &runner);

        let err = resolver.resolve(wt.path(), None, None, false).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn malformed_config_is_a_parse_error() {
        let wt = worktree_with_config("{ image: ");
        let resolver = RuntimeResolver::new(Settings::default(), ScriptedRunner::succeeding());

        let err = resolver.resolve(wt.path(), None, None, false).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn build_scenario_resolves_paths_and_sorts_args() {
        let wt = worktree_with_config(
            r#"{
                "build": {
                    "dockerfile": "Dockerfile.dev",
                    "context": "..",
                    "args": {"B": "2", "A": "1"}
                }
            }"#,
        );
        let dc = wt.path().join(".devcontainer");
        fs::write(dc.join("Dockerfile.dev"), "FROM scratch\n").unwrap();
        let runner = ScriptedRunner::succeeding();
        let resolver = RuntimeResolver::new(Settings::default(), &runner);

        let rt = resolver.resolve(wt.path(), None, None, false).unwrap();

        let config = dc.join("devcontainer.json");
        let dockerfile = dc.join("Dockerfile.dev");
        let tag = format!(
            "vibe-devcontainer:{}",
            short_hash(&format!(
                "{}|{}|{}",
                config.display(),
                dockerfile.display(),
                wt.path().display()
            ))
        );
        assert_eq!(rt.image, tag);

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        let expected: Vec<String> = vec![
            "build".to_string(),
            "-t".to_string(),
            tag.clone(),
            "-f".to_string(),
            dockerfile.display().to_string(),
            "--build-arg".to_string(),
            "A=1".to_string(),
            "--build-arg".to_string(),
            "B=2".to_string(),
            wt.path().display().to_string(),
        ];
        assert_eq!(calls[0].args, expected);
    }

    #[test]
    fn missing_build_inputs_fail_before_building() {
        let wt = worktree_with_config(r#"{"build": {"dockerfile": "Nope"}}"#);
        let runner = ScriptedRunner::succeeding();
        let resolver = RuntimeResolver::new(Settings::default(), &runner);

        let err = resolver.resolve(wt.path(), None, None, false).unwrap_err();
        assert!(matches!(err, Error::BuildInput(_)));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn failed_build_is_an_external_command_error() {
        let wt = worktree_with_config(r#"{"build": "Dockerfile"}"#);
        fs::write(wt.path().join(".devcontainer/Dockerfile"), "FROM scratch\n").unwrap();
        let runner = ScriptedRunner::with(|inv| Err(failure(inv, "step 1 failed")));
        let resolver = RuntimeResolver::new(Settings::default(), &runner);

        let err = resolver.resolve(wt.path(), None, None, false).unwrap_err();
        assert_eq!(err.exit_code(), Some(1));
        assert!(err.to_string().starts_with("build devcontainer image: docker build"));
    }

    #[test]
    fn reuse_skips_build_when_tag_exists() {
        let wt = worktree_with_config(r#"{"build": "Dockerfile"}"#);
        fs::write(wt.path().join(".devcontainer/Dockerfile"), "FROM scratch\n").unwrap();
        let runner = ScriptedRunner::succeeding();
        let resolver = RuntimeResolver::new(Settings::default(), &runner).reuse_images(true);

        let rt = resolver.resolve(wt.path(), None, None, false).unwrap();

        let lines = runner.lines();
        assert_eq!(lines, vec![format!("docker image inspect {}", rt.image)]);
    }

    #[test]
    fn reuse_builds_when_tag_is_missing() {
        let wt = worktree_with_config(r#"{"build": "Dockerfile"}"#);
        fs::write(wt.path().join(".devcontainer/Dockerfile"), "FROM scratch\n").unwrap();
        let runner = ScriptedRunner::with(|inv| {
            if inv.args.first().map(String::as_str) == Some("image") {
                Err(failure(inv, "No such image"))
            } else {
                Ok(String::new())
            }
        });
        let resolver = RuntimeResolver::new(Settings::default(), &runner).reuse_images(true);

        resolver.resolve(wt.path(), None, None, false).unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].args[0], "build");
    }

    #[test]
    fn relative_config_path_is_joined_to_worktree() {
        let resolver = RuntimeResolver::new(Settings::default(), ScriptedRunner::succeeding());
        assert_eq!(
            resolver.config_path(Path::new("/wt"), Some(Path::new("./cfg/../dc.json"))),
            PathBuf::from("/wt/dc.json")
        );
        assert_eq!(
            resolver.config_path(Path::new("/wt"), None),
            PathBuf::from("/wt/.devcontainer/devcontainer.json")
        );
        assert_eq!(
            resolver.config_path(Path::new("/wt"), Some(Path::new("/abs/dc.json"))),
            PathBuf::from("/abs/dc.json")
        );
    }
}
