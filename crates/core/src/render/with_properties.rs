//! Legacy property interpolation on bare property names.
//!
//! Keys name properties directly (`%(branch)s`) and may carry one of the
//! operators `:-`, `:~` or `:+`. Replacement text is used verbatim.

use std::collections::BTreeMap;

use futures::future::try_join_all;
use serde_json::Value;

use super::error::{FormatError, RenderError, RenderResult};
use super::format::FormatString;
use super::renderable::{RenderContext, Renderable};
use super::value::is_truthy;
use crate::properties::PropertyStore;

#[derive(Debug, Clone)]
pub struct WithProperties {
    format: FormatString,
    substitutions: Substitutions,
}

#[derive(Debug, Clone)]
enum Substitutions {
    /// Property names substituted positionally.
    Names(Vec<String>),
    /// Temporary values that shadow properties of the same name.
    Keywords(BTreeMap<String, Renderable>),
}

impl WithProperties {
    /// Named substitution against the build's properties.
    pub fn new(format: &str) -> Result<Self, FormatError> {
        Self::keywords(format, BTreeMap::new())
    }

    /// `format % (prop(names[0]), prop(names[1]), ...)`.
    pub fn positional<I, S>(format: &str, names: I) -> Result<Self, FormatError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            format: FormatString::parse(format)?,
            substitutions: Substitutions::Names(names.into_iter().map(Into::into).collect()),
        })
    }

    /// Named substitution where `keywords` are rendered per build and take
    /// precedence over properties.
    pub fn keywords(
        format: &str,
        keywords: BTreeMap<String, Renderable>,
    ) -> Result<Self, FormatError> {
        Ok(Self {
            format: FormatString::parse(format)?,
            substitutions: Substitutions::Keywords(keywords),
        })
    }

    pub(crate) async fn render(&self, ctx: &RenderContext<'_>) -> RenderResult<String> {
        match &self.substitutions {
            Substitutions::Names(names) => {
                let empty = BTreeMap::new();
                let values = names
                    .iter()
                    .map(|name| resolve(name, ctx.properties, &empty))
                    .collect::<RenderResult<Vec<_>>>()?;
                Ok(self.format.format_positional(&values)?)
            }
            Substitutions::Keywords(keywords) => {
                let temporary = try_join_all(keywords.iter().map(|(name, renderable)| async move {
                    renderable.render(ctx).await.map(|value| (name.clone(), value))
                }))
                .await?;
                let temporary: BTreeMap<String, Value> = temporary.into_iter().collect();

                let mut values = BTreeMap::new();
                for key in self.format.keys() {
                    if !values.contains_key(key) {
                        values.insert(key.to_string(), resolve(key, ctx.properties, &temporary)?);
                    }
                }
                Ok(self.format.format_named(&values)?)
            }
        }
    }
}

/// Resolves one key. The last operator occurrence splits name from
/// replacement; `:-` is tried before `:~`, and `:~` before `:+`.
fn resolve(
    key: &str,
    properties: &PropertyStore,
    temporary: &BTreeMap<String, Value>,
) -> RenderResult<Value> {
    let lookup = |name: &str| temporary.get(name).or_else(|| properties.get(name));

    let value = if let Some((name, repl)) = key.rsplit_once(":-") {
        lookup(name)
            .cloned()
            .unwrap_or_else(|| Value::String(repl.to_string()))
    } else if let Some((name, repl)) = key.rsplit_once(":~") {
        let truthy = temporary
            .get(name)
            .filter(|value| is_truthy(value))
            .or_else(|| properties.get(name).filter(|value| is_truthy(value)));
        truthy
            .cloned()
            .unwrap_or_else(|| Value::String(repl.to_string()))
    } else if let Some((name, repl)) = key.rsplit_once(":+") {
        if lookup(name).is_some() {
            Value::String(repl.to_string())
        } else {
            Value::String(String::new())
        }
    } else {
        lookup(key)
            .cloned()
            .ok_or_else(|| RenderError::MissingProperty(key.to_string()))?
    };

    Ok(match value {
        Value::Null => Value::String(String::new()),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture_store() -> PropertyStore {
        let mut store = PropertyStore::new();
        store.set("prop_str", "a-string", "test", false);
        store.set("prop_none", Value::Null, "test", false);
        store.set("prop_zero", 0, "test", false);
        store.set("prop_empty", "", "test", false);
        store
    }

    #[test]
    fn test_resolve_property_map_rules() {
        let store = fixture_store();
        let none = BTreeMap::new();
        let get = |key: &str| resolve(key, &store, &none);

        assert_eq!(get("prop_str").unwrap(), json!("a-string"));
        assert_eq!(get("prop_none").unwrap(), json!(""));
        assert_eq!(get("prop_zero").unwrap(), json!(0));
        assert_eq!(
            get("prop_nosuch"),
            Err(RenderError::MissingProperty("prop_nosuch".to_string()))
        );

        assert_eq!(get("prop_none:-missing").unwrap(), json!(""));
        assert_eq!(get("prop_zero:-missing").unwrap(), json!(0));
        assert_eq!(get("prop_nosuch:-missing").unwrap(), json!("missing"));

        assert_eq!(get("prop_none:~missing").unwrap(), json!("missing"));
        assert_eq!(get("prop_empty:~missing").unwrap(), json!("missing"));
        assert_eq!(get("prop_str:~missing").unwrap(), json!("a-string"));

        assert_eq!(get("prop_none:+present").unwrap(), json!("present"));
        assert_eq!(get("prop_nosuch:+present").unwrap(), json!(""));
    }

    #[tokio::test]
    async fn test_positional_names() {
        let mut store = PropertyStore::new();
        store.set("revision", "47", "test", false);
        let ctx = RenderContext::from_properties(&store);

        let command = WithProperties::positional("build-%s.tar.gz", ["revision"]).unwrap();
        assert_eq!(command.render(&ctx).await.unwrap(), "build-47.tar.gz");
    }

    #[tokio::test]
    async fn test_named_with_operators() {
        let mut store = PropertyStore::new();
        store.set("prop1", "foo", "test", false);
        let ctx = RenderContext::from_properties(&store);

        let minus = WithProperties::new("build-%(prop1:-empty)s-%(prop2:-empty)s.tar.gz").unwrap();
        assert_eq!(minus.render(&ctx).await.unwrap(), "build-foo-empty.tar.gz");

        let plus = WithProperties::new("build-%(prop1:+exists)s-%(prop2:+exists)s.tar.gz").unwrap();
        assert_eq!(plus.render(&ctx).await.unwrap(), "build-exists-.tar.gz");
    }

    #[tokio::test]
    async fn test_keywords_shadow_properties() {
        let mut store = PropertyStore::new();
        store.set("x", 10, "test", false);
        let ctx = RenderContext::from_properties(&store);

        let mut keywords = BTreeMap::new();
        keywords.insert(
            "x".to_string(),
            Renderable::from_fn(|ctx| {
                let x = ctx.properties.get("x").and_then(Value::as_i64).unwrap_or(0);
                Ok(json!(x + 1))
            }),
        );
        let command = WithProperties::keywords("%(x)s", keywords).unwrap();
        assert_eq!(command.render(&ctx).await.unwrap(), "11");
    }

    #[tokio::test]
    async fn test_missing_property_fails_render() {
        let store = PropertyStore::new();
        let ctx = RenderContext::from_properties(&store);
        let command = WithProperties::new("%(absent)s").unwrap();
        assert_eq!(
            command.render(&ctx).await,
            Err(RenderError::MissingProperty("absent".to_string()))
        );
    }

    #[tokio::test]
    async fn test_recursive_sequence() {
        let mut store = PropertyStore::new();
        store.set("x", 10, "test", false);
        store.set("y", 20, "test", false);
        let ctx = RenderContext::from_properties(&store);

        let command = Renderable::Sequence(vec![
            WithProperties::new("%(x)s %(y)s").unwrap().into(),
            "and".into(),
            WithProperties::new("%(y)s %(x)s").unwrap().into(),
        ]);
        assert_eq!(
            command.render(&ctx).await.unwrap(),
            json!(["10 20", "and", "20 10"])
        );
    }
}
