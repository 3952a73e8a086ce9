//! Selector-tagged string interpolation.
//!
//! Placeholders have the form `%(SELECTOR:ARG[:OP[REPL]])s`:
//!
//! | selector | argument             | looks up                              |
//! |----------|----------------------|---------------------------------------|
//! | `prop`   | `NAME`               | a build property                      |
//! | `src`    | `CODEBASE:ATTRIBUTE` | an attribute of a codebase's stamp    |
//! | `kw`     | `NAME`               | a keyword substitution                |
//!
//! `OP` is `-` (fallback when missing), `~` (fallback when missing or
//! false) or `+` (replacement when present). `REPL` is interpolated again.
//! A placeholder without an operator behaves as `:-` with an empty
//! fallback.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::Value;

use super::error::RenderResult;
use super::format::FormatString;
use super::lookup::{Lookup, LookupSource};
use super::renderable::{RenderContext, Renderable};
use crate::config::error::{ConfigErrors, ErrorReporter};

type Keywords = Arc<BTreeMap<String, Renderable>>;

/// A parsed interpolation template.
///
/// Every distinct placeholder key is parsed once into a [`Renderable`]
/// subtree; repeated placeholders share it.
#[derive(Debug, Clone)]
pub struct Interpolate {
    source: String,
    format: FormatString,
    substitutions: Substitutions,
}

#[derive(Debug, Clone)]
enum Substitutions {
    Named(BTreeMap<String, Renderable>),
    Positional(Vec<Renderable>),
}

/// Collects positional or keyword substitutions before parsing.
#[derive(Debug, Clone)]
pub struct InterpolateBuilder {
    format: String,
    args: Vec<Renderable>,
    kwargs: BTreeMap<String, Renderable>,
}

impl Interpolate {
    pub fn builder(format: impl Into<String>) -> InterpolateBuilder {
        InterpolateBuilder {
            format: format.into(),
            args: Vec::new(),
            kwargs: BTreeMap::new(),
        }
    }

    /// Parses `format` with no substitutions, reporting errors to `reporter`.
    pub fn parse(format: &str, reporter: &mut dyn ErrorReporter) -> Self {
        Self::builder(format).build(reporter)
    }

    /// Parses `format` with no substitutions.
    ///
    /// # Errors
    ///
    /// Returns every configuration error found in the template.
    pub fn new(format: &str) -> Result<Self, ConfigErrors> {
        let mut errors = ConfigErrors::new();
        let interpolate = Self::parse(format, &mut errors);
        errors.into_result(interpolate)
    }

    /// The template text.
    pub fn template(&self) -> &str {
        &self.source
    }

    /// Renders every substitution concurrently, then formats.
    pub async fn render(&self, ctx: &RenderContext<'_>) -> RenderResult<String> {
        match &self.substitutions {
            Substitutions::Named(substitutions) => {
                let values = try_join_all(substitutions.iter().map(|(key, renderable)| async move {
                    renderable.render(ctx).await.map(|value| (key.clone(), value))
                }))
                .await?;
                let values: BTreeMap<String, Value> = values.into_iter().collect();
                Ok(self.format.format_named(&values)?)
            }
            Substitutions::Positional(args) => {
                let values = try_join_all(args.iter().map(|arg| arg.render(ctx))).await?;
                Ok(self.format.format_positional(&values)?)
            }
        }
    }

    fn parse_named(format: String, kwargs: &Keywords, reporter: &mut dyn ErrorReporter) -> Self {
        let parsed = parse_format(&format, reporter);
        if parsed.positional_count() > 0 {
            reporter.error(format!(
                "Interpolate '{format}' uses positional placeholders but has no positional arguments"
            ));
        }

        let mut substitutions = BTreeMap::new();
        for key in parsed.keys() {
            if substitutions.contains_key(key) {
                continue;
            }
            if let Some(renderable) = parse_key(key, kwargs, reporter) {
                substitutions.insert(key.to_string(), renderable);
            }
        }

        Self {
            source: format,
            format: parsed,
            substitutions: Substitutions::Named(substitutions),
        }
    }
}

impl InterpolateBuilder {
    /// Adds a positional substitution.
    pub fn arg(mut self, arg: impl Into<Renderable>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds a keyword substitution, looked up with the `kw` selector.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Renderable>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    /// Parses the template, reporting every problem to `reporter`.
    ///
    /// The returned value is only meaningful when nothing was reported.
    pub fn build(self, reporter: &mut dyn ErrorReporter) -> Interpolate {
        if !self.args.is_empty() && !self.kwargs.is_empty() {
            reporter.error(
                "Interpolate takes either positional or keyword substitutions, not both."
                    .to_string(),
            );
        }

        if self.args.is_empty() {
            return Interpolate::parse_named(self.format, &Arc::new(self.kwargs), reporter);
        }

        let parsed = parse_format(&self.format, reporter);
        if parsed.keys().next().is_some() {
            reporter.error(format!(
                "Interpolate '{}' with positional arguments cannot use named placeholders",
                self.format
            ));
        } else if parsed.positional_count() != self.args.len() {
            reporter.error(format!(
                "Interpolate '{}' has {} placeholders but {} arguments",
                self.format,
                parsed.positional_count(),
                self.args.len()
            ));
        }

        Interpolate {
            source: self.format,
            format: parsed,
            substitutions: Substitutions::Positional(self.args),
        }
    }
}

fn parse_format(format: &str, reporter: &mut dyn ErrorReporter) -> FormatString {
    FormatString::parse(format).unwrap_or_else(|err| {
        reporter.error(format!("invalid Interpolate format string '{format}': {err}"));
        FormatString::default()
    })
}

/// `[\w._-]*`
fn is_identifier(text: &str) -> bool {
    text.chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn split_repl(arg: &str) -> (&str, Option<&str>) {
    match arg.split_once(':') {
        Some((name, repl)) => (name, Some(repl)),
        None => (arg, None),
    }
}

fn parse_key(key: &str, kwargs: &Keywords, reporter: &mut dyn ErrorReporter) -> Option<Renderable> {
    let Some((selector, arg)) = key.split_once(':') else {
        reporter.error(format!(
            "invalid Interpolate substitution without selector '{key}'"
        ));
        return None;
    };

    let (source, name, repl) = match selector {
        "prop" => {
            let (name, repl) = split_repl(arg);
            if !is_identifier(name) {
                reporter.error(format!(
                    "Property name must be alphanumeric for prop Interpolation '{arg}'"
                ));
                return None;
            }
            (LookupSource::Properties, name, repl)
        }
        "src" => {
            let mut parts = arg.splitn(3, ':');
            let codebase = parts.next().unwrap_or_default();
            let Some(attribute) = parts.next() else {
                reporter.error(format!(
                    "Must specify both codebase and attribute for src Interpolation '{arg}'"
                ));
                return None;
            };
            if !is_identifier(codebase) {
                reporter.error(format!(
                    "Codebase must be alphanumeric for src Interpolation '{arg}'"
                ));
                return None;
            }
            if !is_identifier(attribute) {
                reporter.error(format!(
                    "Attribute must be alphanumeric for src Interpolation '{arg}'"
                ));
                return None;
            }
            (
                LookupSource::SourceStamp(codebase.to_string()),
                attribute,
                parts.next(),
            )
        }
        "kw" => {
            let (name, repl) = split_repl(arg);
            if !is_identifier(name) {
                reporter.error(format!(
                    "Keyword must be alphanumeric for kw Interpolation '{arg}'"
                ));
                return None;
            }
            (LookupSource::Keywords(Arc::clone(kwargs)), name, repl)
        }
        other => {
            reporter.error(format!("invalid Interpolate selector '{other}'"));
            return None;
        }
    };

    let repl = repl.unwrap_or("-");
    let lookup = Lookup::new(source, name);
    let lookup = if let Some(tail) = repl.strip_prefix('-') {
        lookup
            .with_default(nested(tail, kwargs, reporter))
            .with_default_when_false(false)
    } else if let Some(tail) = repl.strip_prefix('~') {
        lookup
            .with_default(nested(tail, kwargs, reporter))
            .with_default_when_false(true)
    } else if let Some(tail) = repl.strip_prefix('+') {
        lookup
            .with_has_key(nested(tail, kwargs, reporter))
            .with_default("")
            .with_default_when_false(false)
    } else {
        let op: String = repl.chars().take(1).collect();
        reporter.error(format!("invalid Interpolate default type '{op}'"));
        return None;
    };

    Some(lookup.with_elide_none_as(Value::String(String::new())).into())
}

/// Replacement text, itself an interpolation unless it has no `%`.
fn nested(text: &str, kwargs: &Keywords, reporter: &mut dyn ErrorReporter) -> Renderable {
    if text.contains('%') {
        Interpolate::parse_named(text.to_string(), kwargs, reporter).into()
    } else {
        Renderable::from(text)
    }
}
