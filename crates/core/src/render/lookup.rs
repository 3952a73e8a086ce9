//! Keyed lookups with default, default-when-false and has-key handling.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use super::error::RenderResult;
use super::renderable::{RenderContext, Renderable};
use super::value::is_truthy;

/// Where a [`Lookup`] finds its key.
#[derive(Debug, Clone)]
pub enum LookupSource {
    /// The build's property store.
    Properties,

    /// Attributes of the source stamp for one codebase. A codebase the
    /// build did not check out has no attributes.
    SourceStamp(String),

    /// Keyword substitutions bound when the interpolation was built.
    /// Values are rendered only when looked up.
    Keywords(Arc<BTreeMap<String, Renderable>>),
}

/// Looks up `key` and decides between its value, a default and a
/// has-key replacement.
#[derive(Debug, Clone)]
pub struct Lookup {
    source: LookupSource,
    key: String,
    default: Renderable,
    default_when_false: bool,
    has_key: Option<Renderable>,
    elide_none_as: Option<Value>,
}

impl Lookup {
    /// A lookup in `source` with a `null` default, default-when-false
    /// enabled and no elision.
    pub fn new(source: LookupSource, key: impl Into<String>) -> Self {
        Self {
            source,
            key: key.into(),
            default: Renderable::Literal(Value::Null),
            default_when_false: true,
            has_key: None,
            elide_none_as: None,
        }
    }

    pub fn property(key: impl Into<String>) -> Self {
        Self::new(LookupSource::Properties, key)
    }

    pub fn with_default(mut self, default: impl Into<Renderable>) -> Self {
        self.default = default.into();
        self
    }

    pub fn with_default_when_false(mut self, default_when_false: bool) -> Self {
        self.default_when_false = default_when_false;
        self
    }

    /// Rendered instead of the value whenever the key is present.
    pub fn with_has_key(mut self, has_key: impl Into<Renderable>) -> Self {
        self.has_key = Some(has_key.into());
        self
    }

    /// Replaces a final `null` result.
    pub fn with_elide_none_as(mut self, replacement: Value) -> Self {
        self.elide_none_as = Some(replacement);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    async fn find(&self, ctx: &RenderContext<'_>) -> RenderResult<Option<Value>> {
        match &self.source {
            LookupSource::Properties => Ok(ctx.properties.get(&self.key).cloned()),
            LookupSource::SourceStamp(codebase) => Ok(ctx
                .source_stamp(codebase)
                .and_then(|stamp| stamp.as_dict().remove(&self.key))),
            LookupSource::Keywords(keywords) => match keywords.get(&self.key) {
                Some(renderable) => Ok(Some(renderable.render(ctx).await?)),
                None => Ok(None),
            },
        }
    }

    pub(crate) async fn render(&self, ctx: &RenderContext<'_>) -> RenderResult<Value> {
        let result = match self.find(ctx).await? {
            None => self.default.render(ctx).await?,
            Some(value) => {
                if self.default_when_false && !is_truthy(&value) {
                    self.default.render(ctx).await?
                } else if let Some(has_key) = &self.has_key {
                    has_key.render(ctx).await?
                } else {
                    value
                }
            }
        };

        match (&self.elide_none_as, result) {
            (Some(replacement), Value::Null) => Ok(replacement.clone()),
            (_, value) => Ok(value),
        }
    }
}
