//! Renderable values and string interpolation.
//!
//! Step arguments are stored as [`Renderable`] trees built at configuration
//! time and resolved against each build's [`PropertyStore`] right before a
//! command is dispatched.
//!
//! - [`renderable`]: the value tree, [`Render`] for user values, [`Property`]
//! - [`lookup`]: keyed lookups with default and has-key handling
//! - [`interpolate`]: `%(prop:name:-default)s` templates
//! - [`with_properties`]: legacy `%(name:-default)s` templates
//! - [`format`]: percent-format parsing and application
//!
//! [`PropertyStore`]: crate::properties::PropertyStore

pub mod error;
pub mod format;
pub mod interpolate;
pub mod lookup;
pub mod renderable;
pub mod value;
pub mod with_properties;

pub use error::{FormatError, RenderError, RenderResult};
pub use interpolate::{Interpolate, InterpolateBuilder};
pub use lookup::{Lookup, LookupSource};
pub use renderable::{render_failure, Property, Render, RenderContext, Renderable};
pub use value::{is_truthy, to_display_string};
pub use with_properties::WithProperties;
