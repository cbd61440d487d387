//! Builds the namespaced option list handed to the cloud deployment layer
//! from an environment-variables file and an option template.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;
use tracing::{debug, warn};

pub mod template;

pub use template::{default_template, ENVIRONMENT_NAMESPACE, ENVIRONMENT_OPTION};

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("no value provisioned for auto-generated option {0}")]
    Unresolved(String),
    #[error("environment file must hold a JSON object")]
    EnvironmentNotObject,
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// An option value, either known now or supplied by the provisioning step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawValue", into = "RawValue")]
pub enum ConfigValue {
    Literal(String),
    DeferredExternal(String),
}

/// On-disk form: scalars are literals, `{"auto_generated": name}` is deferred.
#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Text(String),
    Number(Number),
    Flag(bool),
    Deferred { auto_generated: String },
}

impl From<RawValue> for ConfigValue {
    fn from(raw: RawValue) -> Self {
        match raw {
            RawValue::Text(s) => ConfigValue::Literal(s),
            RawValue::Number(n) => ConfigValue::Literal(n.to_string()),
            RawValue::Flag(b) => ConfigValue::Literal(b.to_string()),
            RawValue::Deferred { auto_generated } => ConfigValue::DeferredExternal(auto_generated),
        }
    }
}

impl From<ConfigValue> for RawValue {
    fn from(value: ConfigValue) -> Self {
        match value {
            ConfigValue::Literal(s) => RawValue::Text(s),
            ConfigValue::DeferredExternal(name) => RawValue::Deferred {
                auto_generated: name,
            },
        }
    }
}

/// One template entry, possibly still waiting on a provisioned value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateOption {
    pub namespace: String,
    pub option_name: String,
    pub value: ConfigValue,
}

/// A fully resolved record as the deployment API expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OptionSetting {
    pub namespace: String,
    pub option_name: String,
    pub value: String,
}

/// Joins the environment into `k=v,k=v`. Strings are written bare, other
/// JSON values in their JSON form. Keys come out sorted.
pub fn flatten_environment(env: &Map<String, Value>) -> String {
    let mut pairs: Vec<String> = env
        .iter()
        .map(|(k, v)| match v {
            Value::String(s) => format!("{k}={s}"),
            other => format!("{k}={other}"),
        })
        .collect();
    pairs.sort();
    pairs.join(",")
}

/// Puts the flattened environment into `template`, replacing an existing
/// environment-variables record or appending one.
pub fn build_configuration(
    env: &Map<String, Value>,
    mut template: Vec<TemplateOption>,
) -> Vec<TemplateOption> {
    let value = ConfigValue::Literal(flatten_environment(env));
    match template
        .iter_mut()
        .find(|o| o.namespace == ENVIRONMENT_NAMESPACE && o.option_name == ENVIRONMENT_OPTION)
    {
        Some(existing) => existing.value = value,
        None => template.push(TemplateOption {
            namespace: ENVIRONMENT_NAMESPACE.to_string(),
            option_name: ENVIRONMENT_OPTION.to_string(),
            value,
        }),
    }
    debug!(options = template.len(), vars = env.len(), "configuration built");
    template
}

/// Substitutes every deferred value from `provisioned`. Fails on the first
/// one that has no entry, so nothing unresolved reaches the deployment API.
pub fn resolve(
    options: Vec<TemplateOption>,
    provisioned: &HashMap<String, String>,
) -> Result<Vec<OptionSetting>, DeployError> {
    options
        .into_iter()
        .map(|o| {
            let value = match o.value {
                ConfigValue::Literal(v) => v,
                ConfigValue::DeferredExternal(name) => match provisioned.get(&name) {
                    Some(v) => v.clone(),
                    None => {
                        warn!(option = %o.option_name, name = %name, "unresolved option");
                        return Err(DeployError::Unresolved(name));
                    }
                },
            };
            Ok(OptionSetting {
                namespace: o.namespace,
                option_name: o.option_name,
                value,
            })
        })
        .collect()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, DeployError> {
    let raw = fs::read_to_string(path).map_err(|source| DeployError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| DeployError::Json {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_environment(path: &Path) -> Result<Map<String, Value>, DeployError> {
    match read_json::<Value>(path)? {
        Value::Object(map) => Ok(map),
        _ => Err(DeployError::EnvironmentNotObject),
    }
}

pub fn load_template(path: &Path) -> Result<Vec<TemplateOption>, DeployError> {
    read_json(path)
}
