//! MCP tool definitions
//!
//! Typed shape of the tool metadata the poisoning detector inspects:
//! a name, a prose description, and a JSON-schema-like input schema.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An MCP tool as declared by a server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "inputSchema", skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<InputSchema>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: None,
        }
    }

    pub fn with_schema(mut self, schema: InputSchema) -> Self {
        self.input_schema = Some(schema);
        self
    }
}

/// Recursive input schema. Properties are kept in a `BTreeMap` so scan
/// order is deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, SchemaProperty>,
    #[serde(
        default,
        rename = "additionalProperties",
        skip_serializing_if = "Option::is_none"
    )]
    pub additional_properties: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<InputSchema>>,
    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
}

/// A single schema property, with its own description, default, and
/// nested schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaProperty {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub property_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Box<InputSchema>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_tool_from_wire_shape() {
        let json = r#"{
            "name": "fetch_weather",
            "description": "Fetch the weather for a location.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "location": {"type": "string", "description": "City name"}
                },
                "required": ["location"]
            }
        }"#;
        let tool: ToolDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(tool.name, "fetch_weather");
        let schema = tool.input_schema.unwrap();
        assert_eq!(schema.schema_type.as_deref(), Some("object"));
        assert_eq!(schema.required, vec!["location"]);
        assert_eq!(
            schema.properties["location"].description.as_deref(),
            Some("City name")
        );
    }

    #[test]
    fn missing_description_defaults_to_empty() {
        let tool: ToolDefinition = serde_json::from_str(r#"{"name": "t"}"#).unwrap();
        assert!(tool.description.is_empty());
        assert!(tool.input_schema.is_none());
    }
}
