use rmcp::{
    model::{CallToolResult, Content, JsonObject},
    ErrorData as McpError,
};
use schemars::JsonSchema;
use serde::Serialize;
use std::sync::Arc;

/// Parse tool arguments into a typed input, reporting bad input as
/// `invalid_params` so the agent can correct the call.
pub fn parse_arguments<T>(arguments: JsonObject) -> Result<T, McpError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_value(serde_json::Value::Object(arguments)).map_err(|e| {
        McpError::invalid_params(format!("Invalid tool arguments: {}", e), None)
    })
}

/// JSON Schema for a tool input type, as an MCP input schema object.
pub fn input_schema<T: JsonSchema>() -> Arc<JsonObject> {
    let schema = schemars::schema_for!(T);
    match serde_json::to_value(schema) {
        Ok(serde_json::Value::Object(map)) => Arc::new(map),
        _ => {
            let mut map = JsonObject::new();
            map.insert("type".to_string(), serde_json::json!("object"));
            Arc::new(map)
        }
    }
}

/// Successful tool result carrying pretty-printed JSON text.
pub fn json_result<T: Serialize>(value: &T) -> CallToolResult {
    let json = serde_json::to_string_pretty(value).unwrap_or_default();
    CallToolResult::success(vec![Content::text(json)])
}

pub fn tool_error(message: impl Into<String>) -> CallToolResult {
    CallToolResult::error(vec![Content::text(message.into())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct TestInput {
        /// Organization name
        organization: String,
        #[serde(default)]
        search: Option<String>,
    }

    fn object(value: serde_json::Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_parse_arguments() {
        let input: TestInput = parse_arguments(object(json!({"organization": "acme"}))).unwrap();
        assert_eq!(input.organization, "acme");
        assert!(input.search.is_none());

        let result: Result<TestInput, McpError> = parse_arguments(object(json!({"search": "x"})));
        let err = result.unwrap_err();
        assert!(err.message.contains("organization"));
    }

    #[test]
    fn test_input_schema_lists_properties() {
        let schema = input_schema::<TestInput>();
        assert_eq!(schema.get("type"), Some(&json!("object")));
        let properties = schema.get("properties").and_then(|p| p.as_object()).unwrap();
        assert!(properties.contains_key("organization"));
        assert!(properties.contains_key("search"));
    }

    #[test]
    fn test_result_helpers() {
        let ok = json_result(&json!({"name": "prod"}));
        assert_ne!(ok.is_error, Some(true));

        let err = tool_error("boom");
        assert_eq!(err.is_error, Some(true));
    }
}
