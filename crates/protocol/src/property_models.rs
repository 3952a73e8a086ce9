//! Property snapshot models.
//!
//! Status reporters and build records see properties only through these
//! plain structures, never through the live property store.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

/// One property as it appears in a sorted listing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct PropertyEntry {
    pub name: String,

    #[ts(type = "unknown")]
    pub value: Value,

    /// Where the value came from, e.g. a step name or `Build`.
    pub source: String,

    /// Set during execution; not carried into a rebuild.
    #[serde(default)]
    pub runtime: bool,
}

/// A property's value and source, as held in a plain mapping.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct PropertyValue {
    #[ts(type = "unknown")]
    pub value: Value,
    pub source: String,
}
