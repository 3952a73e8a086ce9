//! Compiles builder definitions into runnable steps.
//!
//! Every string in a step definition that contains `%(` is parsed as an
//! interpolation template here, once, so malformed placeholders are
//! reported before any build starts.

use br_protocol::config_models::{BuilderConfig, CommandLine, StepConfig};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::step::{BuildStep, StepFlags};
use super::steps::{
    DirectoryOp, DirectoryStep, SetPropertiesFromEnvStep, SetPropertyStep, ShellCommand, ShellStep,
};
use crate::config::error::{ErrorReporter, ScopedReporter};
use crate::render::{Interpolate, Renderable};

/// A named sequence of steps plus the properties it adds to every build.
#[derive(Clone)]
pub struct Builder {
    pub name: String,
    pub properties: BTreeMap<String, Value>,
    pub steps: Vec<Arc<dyn BuildStep>>,
}

impl Builder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
            steps: Vec::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_step(mut self, step: impl BuildStep + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name()).collect()
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("name", &self.name)
            .field("properties", &self.properties)
            .field("steps", &self.step_names())
            .finish()
    }
}

/// Compiles one builder, reporting every problem found to `reporter`.
///
/// The returned builder is only meaningful when nothing was reported.
pub fn compile_builder(config: &BuilderConfig, reporter: &mut dyn ErrorReporter) -> Builder {
    let mut builder = Builder::new(&config.name);
    builder.properties = config.properties.clone();

    if config.steps.is_empty() {
        reporter.error(format!("builder '{}' has no steps", config.name));
    }
    for (index, step) in config.steps.iter().enumerate() {
        let name = step.display_name();
        let mut scoped = ScopedReporter::new(
            &mut *reporter,
            format!("builder '{}' step {} ({name})", config.name, index + 1),
        );
        builder.steps.push(compile_step(step, name, &mut scoped));
    }
    builder
}

fn compile_step(
    step: &StepConfig,
    name: String,
    reporter: &mut dyn ErrorReporter,
) -> Arc<dyn BuildStep> {
    let flags = StepFlags::from(step.common());
    match step {
        StepConfig::Shell {
            command,
            workdir,
            env,
            timeout,
            max_time,
            property,
            ..
        } => {
            let command = match command {
                CommandLine::Argv(argv) => {
                    if argv.is_empty() {
                        reporter.error("command must not be empty".to_string());
                    }
                    ShellCommand::Argv(Renderable::Sequence(
                        argv.iter().map(|arg| compile_string(arg, reporter)).collect(),
                    ))
                }
                CommandLine::Line(line) => {
                    if line.trim().is_empty() {
                        reporter.error("command must not be empty".to_string());
                    }
                    ShellCommand::Line(compile_string(line, reporter))
                }
            };
            let mut shell = ShellStep::new(name, command)
                .with_flags(flags)
                .with_workdir(compile_string(workdir, reporter))
                .with_limits(*timeout, *max_time);
            for (key, value) in env {
                shell = shell.with_env(key, compile_string(value, reporter));
            }
            if let Some(property) = property {
                shell = shell.with_property(property);
            }
            Arc::new(shell)
        }
        StepConfig::Mkdir { dir, .. } => Arc::new(
            DirectoryStep::new(
                name,
                DirectoryOp::Make {
                    dir: compile_string(dir, reporter),
                },
            )
            .with_flags(flags),
        ),
        StepConfig::Rmdir {
            dir,
            timeout,
            max_time,
            ..
        } => Arc::new(
            DirectoryStep::new(
                name,
                DirectoryOp::Remove {
                    dir: compile_string(dir, reporter),
                },
            )
            .with_flags(flags)
            .with_limits(*timeout, *max_time),
        ),
        StepConfig::Cpdir {
            fromdir,
            todir,
            timeout,
            max_time,
            ..
        } => Arc::new(
            DirectoryStep::new(
                name,
                DirectoryOp::Copy {
                    fromdir: compile_string(fromdir, reporter),
                    todir: compile_string(todir, reporter),
                },
            )
            .with_flags(flags)
            .with_limits(*timeout, *max_time),
        ),
        StepConfig::SetProperty {
            property, value, ..
        } => {
            if property.is_empty() {
                reporter.error("property name must not be empty".to_string());
            }
            Arc::new(
                SetPropertyStep::new(name, property.clone(), compile_value(value, reporter))
                    .with_flags(flags),
            )
        }
        StepConfig::SetPropertiesFromEnv {
            variables, source, ..
        } => Arc::new(
            SetPropertiesFromEnvStep::new(name, variables.clone(), source.clone()).with_flags(flags),
        ),
    }
}

/// A string from configuration: a template if it contains `%(`, otherwise
/// a literal.
pub fn compile_string(text: &str, reporter: &mut dyn ErrorReporter) -> Renderable {
    if text.contains("%(") {
        Interpolate::parse(text, reporter).into()
    } else {
        Renderable::from(text)
    }
}

/// A configuration value with every nested string compiled.
pub fn compile_value(value: &Value, reporter: &mut dyn ErrorReporter) -> Renderable {
    match value {
        Value::String(text) => compile_string(text, reporter),
        Value::Array(items) => Renderable::Sequence(
            items
                .iter()
                .map(|item| compile_value(item, reporter))
                .collect(),
        ),
        Value::Object(map) => Renderable::Mapping(
            map.iter()
                .map(|(key, item)| (Renderable::from(key.as_str()), compile_value(item, reporter)))
                .collect(),
        ),
        other => Renderable::Literal(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::error::ConfigErrors;
    use crate::properties::PropertyStore;
    use crate::render::RenderContext;
    use serde_json::json;

    fn parse(yaml: &str) -> BuilderConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_compiles_every_step_kind() {
        let config = parse(
            r#"
name: unit
properties:
  flavor: debug
steps:
  - type: rmdir
    dir: build
  - type: mkdir
    name: prepare
    dir: build
  - type: shell
    name: compile
    command: ["make", "FLAVOR=%(prop:flavor)s"]
    halt-on-failure: true
  - type: cpdir
    fromdir: build
    todir: archive
  - type: set-property
    property: tag
    value: "v%(prop:version:-0)s"
  - type: set-properties-from-env
    variables: [PATH]
"#,
        );
        let mut errors = ConfigErrors::new();
        let builder = compile_builder(&config, &mut errors);

        assert!(errors.is_empty(), "{errors}");
        assert_eq!(
            builder.step_names(),
            vec!["rmdir", "prepare", "compile", "cpdir", "set-property", "set-properties-from-env"]
        );
        assert!(builder.steps[2].flags().halt_on_failure);
        assert_eq!(builder.properties["flavor"], json!("debug"));
    }

    #[test]
    fn test_reports_malformed_placeholders_with_location() {
        let config = parse(
            r#"
name: broken
steps:
  - type: shell
    command: "echo %(prop:version"
  - type: shell
    name: empty
    command: []
"#,
        );
        let mut errors = ConfigErrors::new();
        compile_builder(&config, &mut errors);

        assert_eq!(errors.len(), 2);
        assert!(errors.errors()[0].starts_with("builder 'broken' step 1 (shell): "));
        assert_eq!(
            errors.errors()[1],
            "builder 'broken' step 2 (empty): command must not be empty"
        );
    }

    #[test]
    fn test_builder_without_steps_is_an_error() {
        let config = parse("name: idle\nsteps: []\n");
        let mut errors = ConfigErrors::new();
        compile_builder(&config, &mut errors);
        assert_eq!(errors.errors(), ["builder 'idle' has no steps"]);
    }

    #[test]
    fn test_plain_strings_stay_literal() {
        let mut errors = ConfigErrors::new();
        assert!(compile_string("date +%Y", &mut errors).is_literal());
        assert!(!compile_string("%(prop:x)s", &mut errors).is_literal());
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn test_compiled_values_render_nested_templates() {
        let mut errors = ConfigErrors::new();
        let value = compile_value(
            &json!({"tags": ["%(prop:branch)s", 3], "fixed": true}),
            &mut errors,
        );
        let mut properties = PropertyStore::new();
        properties.set("branch", "main", "test", false);

        let rendered = value
            .render(&RenderContext::from_properties(&properties))
            .await
            .unwrap();

        assert_eq!(rendered, json!({"tags": ["main", 3], "fixed": true}));
    }
}
