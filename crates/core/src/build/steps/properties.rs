use async_trait::async_trait;
use br_protocol::build_models::BuildResult;
use serde_json::Value;

use crate::build::error::StepResult;
use crate::build::step::{BuildStep, StepContext, StepFlags};
use crate::render::Renderable;

/// Sets one runtime property to a rendered value.
#[derive(Debug, Clone)]
pub struct SetPropertyStep {
    name: String,
    flags: StepFlags,
    property: String,
    value: Renderable,
}

impl SetPropertyStep {
    pub fn new(name: impl Into<String>, property: impl Into<String>, value: impl Into<Renderable>) -> Self {
        Self {
            name: name.into(),
            flags: StepFlags::default(),
            property: property.into(),
            value: value.into(),
        }
    }

    pub fn with_flags(mut self, flags: StepFlags) -> Self {
        self.flags = flags;
        self
    }
}

#[async_trait]
impl BuildStep for SetPropertyStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn flags(&self) -> StepFlags {
        self.flags
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> StepResult<BuildResult> {
        let value = ctx.render(&self.value).await?;
        ctx.set_property(&self.property, value, &self.name, true).await;
        Ok(BuildResult::Success)
    }
}

/// Copies variables from the agent's environment into runtime properties.
///
/// Unset or empty variables are skipped.
#[derive(Debug, Clone)]
pub struct SetPropertiesFromEnvStep {
    name: String,
    flags: StepFlags,
    variables: Vec<String>,
    source: String,
}

impl SetPropertiesFromEnvStep {
    pub fn new(name: impl Into<String>, variables: Vec<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: StepFlags::default(),
            variables,
            source: source.into(),
        }
    }

    pub fn with_flags(mut self, flags: StepFlags) -> Self {
        self.flags = flags;
        self
    }
}

#[async_trait]
impl BuildStep for SetPropertiesFromEnvStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn flags(&self) -> StepFlags {
        self.flags
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> StepResult<BuildResult> {
        let environ = ctx.connection.environ();
        let found: Vec<(String, String)> = self
            .variables
            .iter()
            .filter_map(|name| {
                environ
                    .get(name)
                    .filter(|value| !value.is_empty())
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect();

        for (name, value) in found {
            ctx.set_property(&name, Value::String(value), &self.source, true)
                .await;
        }
        Ok(BuildResult::Success)
    }
}
