//! Tool type definitions for the analytical agent's function-calling.
//!
//! The toolbox is small and fixed: ordinal lookup into results the
//! shopper has already seen, catalog keyword search, item-detail lookup,
//! and web search as a last resort.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Tool name for ordinal lookup in already-shown results.
pub const GET_SHOWN_ITEM: &str = "get_shown_item";
/// Tool name for catalog keyword search.
pub const KEYWORD_SEARCH: &str = "keyword_search";
/// Tool name for item-detail lookup.
pub const GET_ITEM_DETAILS: &str = "get_item_details";
/// Tool name for web search.
pub const WEB_SEARCH: &str = "web_search";

/// A tool definition that can be sent to an LLM for function-calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (must match dispatch table in executor).
    pub name: String,
    /// Human-readable description of what the tool does.
    pub description: String,
    /// JSON Schema object describing the tool's parameters.
    pub parameters: serde_json::Value,
}

/// A tool call requested by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this call (assigned by the provider).
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON-encoded arguments for the tool.
    pub arguments: String,
}

/// The result of executing a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// ID of the tool call this result corresponds to.
    pub tool_call_id: String,
    /// Result content (JSON string on success, error message on failure).
    pub content: String,
    /// Whether this result represents an error.
    pub is_error: bool,
}

/// A set of tool definitions scoped to an agent role.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    definitions: Vec<ToolDefinition>,
}

impl ToolSet {
    /// Returns the tool definitions in this set.
    #[must_use]
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Returns `true` if this set contains no tools.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Returns the number of tools in this set.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Tool set for the analytical agent.
    #[must_use]
    pub fn analytical_tools() -> Self {
        Self {
            definitions: vec![
                def_get_shown_item(),
                def_keyword_search(),
                def_get_item_details(),
                def_web_search(),
            ],
        }
    }
}

fn def_get_shown_item() -> ToolDefinition {
    ToolDefinition {
        name: GET_SHOWN_ITEM.to_string(),
        description: "Look up an item the shopper has already been shown by its 1-based \
                       position (\"the second one\" is position 2)."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "position": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "1-based position in the last shown results."
                }
            },
            "required": ["position"],
            "additionalProperties": false
        }),
    }
}

fn def_keyword_search() -> ToolDefinition {
    ToolDefinition {
        name: KEYWORD_SEARCH.to_string(),
        description: "Search the catalog by keywords (make, model, feature). Returns \
                       matching items with price and attributes."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Keywords to search for."
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of results. Defaults to 5.",
                    "default": 5
                }
            },
            "required": ["query"],
            "additionalProperties": false
        }),
    }
}

fn def_get_item_details() -> ToolDefinition {
    ToolDefinition {
        name: GET_ITEM_DETAILS.to_string(),
        description: "Retrieve the full record for one item by its identifier.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "id": {
                    "type": "string",
                    "description": "Item identifier."
                }
            },
            "required": ["id"],
            "additionalProperties": false
        }),
    }
}

fn def_web_search() -> ToolDefinition {
    ToolDefinition {
        name: WEB_SEARCH.to_string(),
        description: "Search the web. Use only when the catalog tools cannot answer \
                       (reliability data, reviews, recalls)."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Web search query."
                }
            },
            "required": ["query"],
            "additionalProperties": false
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analytical_toolset() {
        let ts = ToolSet::analytical_tools();
        assert_eq!(ts.len(), 4);
        let names: Vec<&str> = ts.definitions().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec![GET_SHOWN_ITEM, KEYWORD_SEARCH, GET_ITEM_DETAILS, WEB_SEARCH]
        );
    }

    #[test]
    fn test_default_toolset_empty() {
        assert!(ToolSet::default().is_empty());
    }

    #[test]
    fn test_all_definitions_have_valid_schemas() {
        for def in ToolSet::analytical_tools().definitions() {
            assert!(!def.description.is_empty());
            assert_eq!(def.parameters["type"], "object");
            assert!(def.parameters["required"].is_array());
        }
    }
}
