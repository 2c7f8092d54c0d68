//! Devcontainer image builds.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::exec::Invocation;
use crate::naming::short_hash;
use crate::paths::resolve_against;

use super::devcontainer::BuildSpec;

/// A build with inputs resolved and checked, ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    /// Tag derived from the config path, Dockerfile and context.
    pub tag: String,
    pub dockerfile: PathBuf,
    pub context: PathBuf,
    pub args: BTreeMap<String, String>,
}

impl BuildPlan {
    /// Resolves `spec` against the directory of `config_path`.
    ///
    /// The Dockerfile must exist and the context must be a directory. The
    /// tag is `<repository>:<short hash>` of the three resolved paths, so an
    /// unchanged config always maps to the same tag.
    pub fn prepare(config_path: &Path, spec: &BuildSpec, repository: &str) -> Result<Self> {
        let base = config_path.parent().unwrap_or_else(|| Path::new("."));
        let dockerfile = resolve_against(base, Path::new(&spec.dockerfile));
        let context = resolve_against(base, Path::new(&spec.context));

        if !dockerfile.exists() {
            return Err(Error::BuildInput(format!(
                "devcontainer dockerfile not found: {}",
                dockerfile.display()
            )));
        }
        if !context.is_dir() {
            return Err(Error::BuildInput(format!(
                "devcontainer context is not a directory: {}",
                context.display()
            )));
        }

        let tag = format!(
            "{}:{}",
            repository,
            short_hash(&format!(
                "{}|{}|{}",
                config_path.display(),
                dockerfile.display(),
                context.display()
            ))
        );

        Ok(Self {
            tag,
            dockerfile,
            context,
            args: spec.args.clone(),
        })
    }

    /// `<runtime> build -t <tag> -f <dockerfile> [--build-arg K=V]... <context>`
    ///
    /// Build args come out sorted by key.
    pub fn invocation(&self, runtime: &str) -> Invocation {
        let mut inv = Invocation::new(runtime)
            .args(["build", "-t", self.tag.as_str(), "-f"])
            .path_arg(&self.dockerfile);
        for (key, value) in &self.args {
            inv = inv.arg("--build-arg").arg(format!("{}={}", key, value));
        }
        inv.path_arg(&self.context)
    }
}
