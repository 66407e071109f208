// burrow-core/src/schema.rs
// Attribute definitions consumed read-only from the ORM layer

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{BurrowError, Result};

/// One attribute descriptor from a collection definition.
///
/// The adapter consults `type` (only `datetime` changes translation),
/// `unique`/`index` (store index provisioning) and `autoIncrement` (stripped
/// at load, unsupported). `indexed` is set by the lifecycle manager once the
/// store has built the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub attr_type: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unique: bool,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub index: bool,

    #[serde(rename = "autoIncrement", default, skip_serializing_if = "std::ops::Not::not")]
    pub auto_increment: bool,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub indexed: bool,
}

impl AttributeDef {
    pub fn is_datetime(&self) -> bool {
        self.attr_type.as_deref() == Some("datetime")
    }
}

/// A collection definition: attribute name → descriptor.
pub type Definition = HashMap<String, AttributeDef>;

/// Parse a definition from the raw JSON form the ORM hands over.
pub fn definition_from_value(value: &Value) -> Result<Definition> {
    let obj = value
        .as_object()
        .ok_or_else(|| BurrowError::InvalidCriteria("definition must be an object".to_string()))?;

    let mut def = Definition::new();
    for (name, attr) in obj {
        let parsed: AttributeDef = serde_json::from_value(attr.clone())?;
        def.insert(name.clone(), parsed);
    }
    Ok(def)
}

/// True when the schema marks `field` as a datetime attribute.
pub fn is_datetime_field(schema: Option<&Definition>, field: &str) -> bool {
    schema
        .and_then(|s| s.get(field))
        .map(AttributeDef::is_datetime)
        .unwrap_or(false)
}
