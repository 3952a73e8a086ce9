//! Configuration file loader for the `.buildrelay/` directory and agent
//! directories.
//!
//! A master directory contains:
//! - `.buildrelay/master.toml`: global settings
//! - `.buildrelay/builders/*.yaml`: builder definitions
//!
//! An agent directory contains `agent.toml`.

use crate::config::error::ConfigError;
use crate::config::error::ConfigResult;
use crate::config::models::AppConfig;
use br_protocol::config_models::{AgentConfig, BuilderConfig, MasterConfig};
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Name of the master configuration directory.
pub const MASTER_DIR: &str = ".buildrelay";

/// Name of the file that marks an agent directory.
pub const AGENT_FILE: &str = "agent.toml";

/// Loads all configuration from the `.buildrelay/` directory.
///
/// # Arguments
///
/// * `root` - Root directory containing the `.buildrelay/` folder
///
/// # Returns
///
/// An `AppConfig` with builders sorted by name. If the directory or some
/// of its files are missing, the corresponding defaults are used rather
/// than an error.
///
/// # Errors
///
/// Returns `ConfigError` if:
/// - Files exist but cannot be read
/// - Files have invalid syntax (TOML or YAML)
/// - Required fields are missing in configuration files
///
/// # Example
///
/// ```rust,no_run
/// use br_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// println!("Loaded {} builders", config.builders.len());
/// # Ok(())
/// # }
/// ```
pub async fn load_config(root: &Path) -> ConfigResult<AppConfig> {
    let master_dir = root.join(MASTER_DIR);

    if !master_dir.exists() {
        debug!(dir = %master_dir.display(), "no master directory, using defaults");
        return Ok(AppConfig::default());
    }

    let master = load_master_config(&master_dir)?;
    let builders = load_builders(&master_dir)?;
    info!(
        dir = %master_dir.display(),
        builders = builders.len(),
        "loaded master configuration"
    );

    Ok(AppConfig { master, builders })
}

/// Loads global configuration from `master.toml`.
fn load_master_config(master_dir: &Path) -> ConfigResult<MasterConfig> {
    let config_path = master_dir.join("master.toml");

    if !config_path.exists() {
        return Ok(MasterConfig::default());
    }

    read_toml(&config_path)
}

/// Loads all builder definitions from `builders/*.yaml`.
fn load_builders(master_dir: &Path) -> ConfigResult<Vec<BuilderConfig>> {
    let builders_dir = master_dir.join("builders");

    if !builders_dir.exists() {
        return Ok(Vec::new());
    }

    let mut builders = Vec::new();

    for entry in WalkDir::new(&builders_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
    {
        let entry = entry.map_err(|source| ConfigError::DirectoryWalk {
            path: builders_dir.clone(),
            source,
        })?;

        let path = entry.path();

        let ext = path.extension().and_then(|s| s.to_str());
        if ext != Some("yaml") && ext != Some("yml") {
            continue;
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        let builder: BuilderConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlParse {
                path: path.to_path_buf(),
                source,
            })?;

        if builder.name.trim().is_empty() {
            return Err(ConfigError::InvalidConfig {
                path: path.to_path_buf(),
                reason: "builder name must not be empty".to_string(),
            });
        }

        builders.push(builder);
    }

    builders.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(builders)
}

/// Loads `agent.toml` from an agent directory.
///
/// # Errors
///
/// Returns `ConfigError::FileRead` if the file is missing or unreadable,
/// `ConfigError::TomlParse` if it is malformed, and
/// `ConfigError::InvalidConfig` if the name or master address is empty.
pub fn load_agent_config(agent_dir: &Path) -> ConfigResult<AgentConfig> {
    let config_path = agent_dir.join(AGENT_FILE);
    let config: AgentConfig = read_toml(&config_path)?;

    if config.name.trim().is_empty() {
        return Err(ConfigError::InvalidConfig {
            path: config_path,
            reason: "agent name must not be empty".to_string(),
        });
    }
    if config.master.trim().is_empty() {
        return Err(ConfigError::InvalidConfig {
            path: config_path,
            reason: "master address must not be empty".to_string(),
        });
    }
    Ok(config)
}

/// Whether `path` is a usable agent directory.
///
/// Logs why not: a missing or unreadable `agent.toml` is reported
/// differently from one with unexpected contents.
pub fn is_agent_dir(path: &Path) -> bool {
    match load_agent_config(path) {
        Ok(_) => true,
        Err(ConfigError::FileRead { path, source }) => {
            warn!(file = %path.display(), error = %source, "cannot read agent configuration");
            false
        }
        Err(err) => {
            warn!(dir = %path.display(), error = %err, "not an agent directory: unexpected contents");
            false
        }
    }
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> ConfigResult<T> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
        path: path.to_path_buf(),
        source,
    })
}
