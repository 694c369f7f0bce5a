//! Server configuration.
//!
//! A single YAML (or JSON) file holds per-tool settings. The file is found
//! through `$AGENTBOX_CONFIG`, falling back to `~/.agentbox/config.yaml`;
//! a missing default file is an empty configuration.

use crate::tools::ToolKind;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "AGENTBOX_CONFIG";

/// Variables that enable library injection into the agent. Never accepted from
/// configuration; compared case-insensitively.
const DANGEROUS_ENV_VARS: &[&str] = &[
    // Linux library injection
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "LD_AUDIT",
    // Language paths
    "PYTHONPATH",
    "NODE_OPTIONS",
    "RUBYLIB",
    "PERL5LIB",
    // Shell/system
    "IFS",
    "MALLOC_CONF",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("`{tool}` requires `{field}` in the `{tool}` section of the config file")]
    MissingField {
        tool: &'static str,
        field: &'static str,
    },

    #[error("`{name}` in the `{tool}` section is not allowed: it can inject code into the agent")]
    DangerousEnv { tool: &'static str, name: String },
}

/// Settings shared by every tool section.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ToolSection {
    /// Extra variables for the agent process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// The `coder` tool runs the claude CLI against a different backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct CoderSection {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub claude: ToolSection,
    #[serde(default)]
    pub coder: CoderSection,
    #[serde(default)]
    pub codex: ToolSection,
    #[serde(default)]
    pub gemini: ToolSection,
}

/// Location of the configuration file, and whether it was named explicitly.
pub fn config_path() -> Option<(PathBuf, bool)> {
    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR).filter(|p| !p.is_empty()) {
        return Some((PathBuf::from(path), true));
    }
    dirs::home_dir().map(|home| (home.join(".agentbox").join("config.yaml"), false))
}

/// Load the configuration from its standard location.
pub fn load_config() -> Result<Config, ConfigError> {
    match config_path() {
        Some((path, true)) => load_config_file(&path),
        Some((path, false)) if path.exists() => load_config_file(&path),
        _ => Ok(Config::default()),
    }
}

/// Load a configuration file, choosing the format by extension.
pub fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let parsed = if is_json {
        serde_json::from_str(&data).map_err(|err| err.to_string())
    } else if data.trim().is_empty() {
        Ok(Config::default())
    } else {
        serde_yml::from_str(&data).map_err(|err| err.to_string())
    };
    parsed.map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

/// Environment for an agent process: `base` overlaid with the tool's settings.
pub fn build_env<I>(kind: ToolKind, config: &Config, base: I) -> Result<BTreeMap<String, String>, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let tool = kind.name();
    let mut overlay = BTreeMap::new();
    match kind {
        ToolKind::Claude => overlay.extend(config.claude.env.clone()),
        ToolKind::Codex => overlay.extend(config.codex.env.clone()),
        ToolKind::Gemini => overlay.extend(config.gemini.env.clone()),
        ToolKind::Coder => {
            let coder = &config.coder;
            overlay.extend(coder.env.clone());
            let base_url = non_empty(coder.base_url.as_deref())
                .ok_or(ConfigError::MissingField { tool, field: "base_url" })?;
            let token = non_empty(coder.api_token.as_deref())
                .ok_or(ConfigError::MissingField { tool, field: "api_token" })?;
            overlay.insert("ANTHROPIC_BASE_URL".to_string(), base_url.to_string());
            overlay.insert("ANTHROPIC_AUTH_TOKEN".to_string(), token.to_string());
            if let Some(model) = non_empty(coder.model.as_deref()) {
                overlay.insert("ANTHROPIC_MODEL".to_string(), model.to_string());
            }
        }
    }

    if let Some(name) = overlay.keys().find(|name| is_dangerous_env_var(name)) {
        return Err(ConfigError::DangerousEnv {
            tool,
            name: name.clone(),
        });
    }

    let mut env: BTreeMap<String, String> = base.into_iter().collect();
    env.extend(overlay);
    Ok(env)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn is_dangerous_env_var(key: &str) -> bool {
    DANGEROUS_ENV_VARS
        .iter()
        .any(|d| d.eq_ignore_ascii_case(key))
        || key
            .get(..5)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("DYLD_"))
}
