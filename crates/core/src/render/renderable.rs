//! The renderable value tree and its recursive resolver.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use br_protocol::build_models::SourceStamp;
use futures::future::{try_join_all, BoxFuture};
use serde_json::{Map, Value};

use super::error::{RenderError, RenderResult};
use super::interpolate::Interpolate;
use super::lookup::Lookup;
use super::value::to_display_string;
use super::with_properties::WithProperties;
use crate::properties::PropertyStore;

/// What a render call can see: the build's properties and source stamps.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub properties: &'a PropertyStore,
    pub source_stamps: &'a [SourceStamp],
}

impl<'a> RenderContext<'a> {
    pub fn new(properties: &'a PropertyStore, source_stamps: &'a [SourceStamp]) -> Self {
        Self {
            properties,
            source_stamps,
        }
    }

    /// Context with properties only.
    pub fn from_properties(properties: &'a PropertyStore) -> Self {
        Self::new(properties, &[])
    }

    /// The source stamp checked out for `codebase`.
    pub fn source_stamp(&self, codebase: &str) -> Option<&'a SourceStamp> {
        self.source_stamps
            .iter()
            .find(|stamp| stamp.codebase == codebase)
    }
}

/// A user-supplied renderable.
///
/// Implementations may be impure; an error fails the render and, with it,
/// the owning step.
#[async_trait]
pub trait Render: Send + Sync + fmt::Debug {
    async fn render(&self, ctx: &RenderContext<'_>) -> RenderResult<Value>;
}

type RenderFn = dyn Fn(&RenderContext<'_>) -> RenderResult<Value> + Send + Sync;

struct FnRender(Box<RenderFn>);

impl fmt::Debug for FnRender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnRender")
    }
}

#[async_trait]
impl Render for FnRender {
    async fn render(&self, ctx: &RenderContext<'_>) -> RenderResult<Value> {
        (self.0)(ctx)
    }
}

/// A value that is resolved against a build's properties before use.
///
/// Constructed once at configuration time and rendered fresh for every
/// build; never mutated after construction.
#[derive(Debug, Clone)]
pub enum Renderable {
    /// Returned unchanged.
    Literal(Value),

    /// Elements are rendered concurrently; order is preserved.
    Sequence(Vec<Renderable>),

    /// Keys and values are both rendered; keys are converted to strings.
    Mapping(Vec<(Renderable, Renderable)>),

    Lookup(Box<Lookup>),

    Interpolate(Arc<Interpolate>),

    WithProperties(Arc<WithProperties>),

    Custom(Arc<dyn Render>),
}

impl Renderable {
    /// Wraps a synchronous closure.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&RenderContext<'_>) -> RenderResult<Value> + Send + Sync + 'static,
    {
        Renderable::Custom(Arc::new(FnRender(Box::new(f))))
    }

    /// Whether rendering can only ever return the literal itself.
    pub fn is_literal(&self) -> bool {
        matches!(self, Renderable::Literal(_))
    }

    /// Resolves this value against `ctx`.
    ///
    /// Sequences and mappings render their children concurrently and fail
    /// on the first child error.
    pub fn render<'a>(&'a self, ctx: &'a RenderContext<'a>) -> BoxFuture<'a, RenderResult<Value>> {
        Box::pin(async move {
            match self {
                Renderable::Literal(value) => Ok(value.clone()),
                Renderable::Sequence(items) => {
                    let values = try_join_all(items.iter().map(|item| item.render(ctx))).await?;
                    Ok(Value::Array(values))
                }
                Renderable::Mapping(pairs) => {
                    let rendered = try_join_all(pairs.iter().map(|(key, value)| async move {
                        futures::try_join!(key.render(ctx), value.render(ctx))
                    }))
                    .await?;
                    let mut map = Map::new();
                    for (key, value) in rendered {
                        map.insert(to_display_string(&key), value);
                    }
                    Ok(Value::Object(map))
                }
                Renderable::Lookup(lookup) => lookup.render(ctx).await,
                Renderable::Interpolate(interpolate) => {
                    interpolate.render(ctx).await.map(Value::String)
                }
                Renderable::WithProperties(with_properties) => {
                    with_properties.render(ctx).await.map(Value::String)
                }
                Renderable::Custom(custom) => custom.render(ctx).await,
            }
        })
    }

    /// Renders and converts the result to text.
    pub async fn render_string(&self, ctx: &RenderContext<'_>) -> RenderResult<String> {
        let ctx = *ctx;
        let value = self.render(&ctx).await?;
        Ok(to_display_string(&value))
    }
}

impl From<Value> for Renderable {
    fn from(value: Value) -> Self {
        Renderable::Literal(value)
    }
}

impl From<&str> for Renderable {
    fn from(value: &str) -> Self {
        Renderable::Literal(Value::String(value.to_string()))
    }
}

impl From<String> for Renderable {
    fn from(value: String) -> Self {
        Renderable::Literal(Value::String(value))
    }
}

impl From<Interpolate> for Renderable {
    fn from(value: Interpolate) -> Self {
        Renderable::Interpolate(Arc::new(value))
    }
}

impl From<WithProperties> for Renderable {
    fn from(value: WithProperties) -> Self {
        Renderable::WithProperties(Arc::new(value))
    }
}

impl From<Lookup> for Renderable {
    fn from(value: Lookup) -> Self {
        Renderable::Lookup(Box::new(value))
    }
}

impl<T: Into<Renderable>> From<Vec<T>> for Renderable {
    fn from(items: Vec<T>) -> Self {
        Renderable::Sequence(items.into_iter().map(Into::into).collect())
    }
}

/// A lookup of one build property.
///
/// With `default_when_false` (the default) a falsy value also yields the
/// default; without it only a missing property does.
#[derive(Debug, Clone)]
pub struct Property {
    name: String,
    default: Renderable,
    default_when_false: bool,
}

impl Property {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: Renderable::Literal(Value::Null),
            default_when_false: true,
        }
    }

    pub fn default(mut self, default: impl Into<Renderable>) -> Self {
        self.default = default.into();
        self
    }

    pub fn default_when_false(mut self, default_when_false: bool) -> Self {
        self.default_when_false = default_when_false;
        self
    }
}

impl From<Property> for Renderable {
    fn from(property: Property) -> Self {
        Lookup::property(property.name)
            .with_default(property.default)
            .with_default_when_false(property.default_when_false)
            .into()
    }
}

/// Fails a render with a user-facing message.
pub fn render_failure(message: impl Into<String>) -> RenderError {
    RenderError::Failed(message.into())
}
