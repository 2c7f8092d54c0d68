//! `devcontainer.json` parsing.
//!
//! The file is JSON with comments and trailing commas, so it is read with
//! `json5`. Only the fields the launcher understands are kept.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

const DEFAULT_DOCKERFILE: &str = "Dockerfile";
const DEFAULT_CONTEXT: &str = ".";

/// Subset of a devcontainer configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevcontainerConfig {
    pub image: Option<String>,
    /// Either a Dockerfile path or a build object; see [`BuildDeclaration`].
    pub build: Option<Value>,
    /// Legacy top-level Dockerfile path.
    pub docker_file: Option<String>,
    /// Legacy top-level build context.
    pub context: Option<String>,
    #[serde(default)]
    pub run_args: Vec<String>,
    #[serde(default)]
    pub container_env: BTreeMap<String, String>,
    pub remote_user: Option<String>,
    #[serde(default)]
    pub mounts: Vec<String>,
    pub workspace_mount: Option<String>,
    pub workspace_folder: Option<String>,
}

/// Object form of the `build` field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BuildObject {
    pub dockerfile: Option<String>,
    pub context: Option<String>,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

/// The three shapes a `build` field can take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildDeclaration {
    Absent,
    /// `"build": "Dockerfile.dev"`
    Path(String),
    /// `"build": { "dockerfile": ..., "context": ..., "args": {...} }`
    Object(BuildObject),
}

impl BuildDeclaration {
    /// Classifies a raw `build` value, trying absent, string, then object.
    pub fn parse(value: Option<&Value>) -> std::result::Result<Self, String> {
        match value {
            None | Some(Value::Null) => Ok(BuildDeclaration::Absent),
            Some(Value::String(path)) => Ok(BuildDeclaration::Path(path.clone())),
            Some(obj @ Value::Object(_)) => serde_json::from_value(obj.clone())
                .map(BuildDeclaration::Object)
                .map_err(|e| format!("decode build object: {}", e)),
            Some(other) => Err(format!(
                "build must be a string or an object, got {}",
                kind(other)
            )),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A build request with defaults filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpec {
    /// Dockerfile path, relative to the config file unless absolute.
    pub dockerfile: String,
    /// Build context, relative to the config file unless absolute.
    pub context: String,
    pub args: BTreeMap<String, String>,
}

impl DevcontainerConfig {
    /// Parses configuration text, tolerating comments and trailing commas.
    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        json5::from_str(text).map_err(|e| Error::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Reads and parses the file at `path`. Read failures are [`Error::Io`].
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(path, &text)
    }

    /// Declared image, ignoring empty strings.
    pub fn image(&self) -> Option<&str> {
        non_empty(&self.image)
    }

    /// Build request, or `None` when the config declares no build.
    ///
    /// Legacy `dockerFile`/`context` seed the request and the `build` field
    /// overrides them field by field.
    pub fn build_spec(&self, path: &Path) -> Result<Option<BuildSpec>> {
        let declaration =
            BuildDeclaration::parse(self.build.as_ref()).map_err(|reason| Error::ConfigParse {
                path: path.to_path_buf(),
                reason,
            })?;

        let mut dockerfile = non_empty(&self.docker_file).map(str::to_string);
        let mut context = non_empty(&self.context).map(str::to_string);
        let mut args = BTreeMap::new();

        match declaration {
            BuildDeclaration::Absent => {
                if dockerfile.is_none() && context.is_none() {
                    return Ok(None);
                }
            }
            BuildDeclaration::Path(path) => {
                if !path.is_empty() {
                    dockerfile = Some(path);
                }
            }
            BuildDeclaration::Object(obj) => {
                if let Some(d) = obj.dockerfile.filter(|d| !d.is_empty()) {
                    dockerfile = Some(d);
                }
                if let Some(c) = obj.context.filter(|c| !c.is_empty()) {
                    context = Some(c);
                }
                args = obj.args;
            }
        }

        Ok(Some(BuildSpec {
            dockerfile: dockerfile.unwrap_or_else(|| DEFAULT_DOCKERFILE.to_string()),
            context: context.unwrap_or_else(|| DEFAULT_CONTEXT.to_string()),
            args,
        }))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
