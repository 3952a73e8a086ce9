//! Configuration models that aggregate all settings.
//!
//! [`AppConfig`] is the parsed `.buildrelay/` directory. Compiling it turns
//! every builder definition into a runnable [`Builder`], collecting all
//! configuration errors in one pass.

use br_protocol::config_models::{BuilderConfig, MasterConfig};
use std::collections::HashSet;

use super::error::{ConfigErrors, ErrorReporter};
use crate::build::{compile_builder, Builder};

/// Unified master configuration loaded from the `.buildrelay/` directory.
///
/// - `master.toml`: global settings
/// - `builders/*.yaml`: builder definitions
///
/// # Example
///
/// ```rust,no_run
/// use br_core::config::loader::load_config;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new(".")).await?;
/// let builders = config.compile()?;
/// println!("Loaded {} builders", builders.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Global settings from `master.toml`.
    pub master: MasterConfig,

    /// Builder definitions from `builders/*.yaml`, sorted by name.
    pub builders: Vec<BuilderConfig>,
}

impl AppConfig {
    pub fn builder(&self, name: &str) -> Option<&BuilderConfig> {
        self.builders.iter().find(|builder| builder.name == name)
    }

    /// Compiles every builder, reporting problems to `reporter`.
    pub fn compile_with(&self, reporter: &mut dyn ErrorReporter) -> Vec<Builder> {
        let mut seen = HashSet::new();
        let mut builders = Vec::with_capacity(self.builders.len());
        for config in &self.builders {
            if !seen.insert(config.name.as_str()) {
                reporter.error(format!("duplicate builder name '{}'", config.name));
                continue;
            }
            builders.push(compile_builder(config, reporter));
        }
        builders
    }

    /// Compiles every builder.
    ///
    /// # Errors
    ///
    /// Returns every configuration error found, if there were any.
    pub fn compile(&self) -> Result<Vec<Builder>, ConfigErrors> {
        let mut errors = ConfigErrors::new();
        let builders = self.compile_with(&mut errors);
        errors.into_result(builders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(name: &str, command: &str) -> BuilderConfig {
        serde_yaml::from_str(&format!(
            "name: {name}\nsteps:\n  - type: shell\n    command: \"{command}\"\n"
        ))
        .unwrap()
    }

    #[test]
    fn test_compile_valid_config() {
        let config = AppConfig {
            master: MasterConfig::default(),
            builders: vec![builder("unit", "make"), builder("docs", "make %(prop:target:-html)s")],
        };

        let builders = config.compile().unwrap();

        assert_eq!(builders.len(), 2);
        assert!(config.builder("docs").is_some());
        assert!(config.builder("missing").is_none());
    }

    #[test]
    fn test_compile_collects_every_error() {
        let config = AppConfig {
            master: MasterConfig::default(),
            builders: vec![
                builder("unit", "make %(prop:x"),
                builder("unit", "make"),
                builder("docs", "echo %(nope:x)s"),
            ],
        };

        let errors = config.compile().unwrap_err();

        assert_eq!(errors.len(), 3);
        assert!(errors.errors()[1].contains("duplicate builder name 'unit'"));
        assert!(errors.errors()[2].starts_with("builder 'docs' step 1 (shell): "));
    }
}
