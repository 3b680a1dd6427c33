// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! JSON parsing for GitHub Copilot chat exports.
//!
//! This module handles deserialization of the JSON format produced by
//! GitHub Copilot's chat export feature. The format contains conversation
//! history including user messages, assistant responses, reasoning, tool
//! invocations, and file edits.
//!
//! # Format Overview
//!
//! A Copilot chat export contains a list of request/response pairs. Each
//! response is an ordered list of items discriminated by a `kind` field;
//! items without a `kind` are plain text fragments. Parsing is lenient:
//! missing fields fall back to defaults, and kinds this crate does not know
//! are kept as [`ResponseItem::Unknown`] rather than rejected.
//!
//! # Example
//!
//! ```
//! use cpturns::parser::parse_chat;
//!
//! let json = r#"{
//!     "requests": [{
//!         "requestId": "request_1",
//!         "timestamp": 1733356800000,
//!         "message": { "text": "Hello" },
//!         "response": [{ "value": "Hi there!" }]
//!     }]
//! }"#;
//!
//! let chat = parse_chat(json).unwrap();
//! assert_eq!(chat.requests.len(), 1);
//! assert_eq!(chat.requests[0].request_id, "request_1");
//! ```

use serde::Deserialize;
use serde_json::Value;
use snafu::prelude::*;

/// Error type for JSON parsing failures.
#[derive(Debug, Snafu)]
pub enum ParseError {
    /// Failed to parse JSON content.
    #[snafu(display("failed to parse JSON: {source}"))]
    Json {
        /// The underlying JSON parsing error.
        source: serde_json::Error,
    },
}

/// Response kinds that carry no content worth rendering.
const IGNORED_KINDS: &[&str] = &[
    "mcpServersStarting",
    "undoStop",
    "progressTaskSerialized",
    "elicitationSerialized",
    "confirmation",
    "agent",
];

/// The root structure of a GitHub Copilot chat export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatExport {
    /// The sequence of request/response exchanges in the conversation.
    #[serde(default)]
    pub requests: Vec<Request>,
}

/// A single request/response exchange in the conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    /// Identifier Copilot assigns to the request; the first one names the session.
    pub request_id: String,

    /// Unix timestamp in milliseconds when the request was made.
    pub timestamp: i64,

    /// The model identifier used for this response (e.g., "claude-sonnet-4").
    pub model_id: Option<String>,

    /// The user's message that initiated this request.
    pub message: Message,

    /// The assistant's response items, in the order they were produced.
    pub response: Vec<ResponseItem>,
}

/// A user message in the conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Message {
    /// The text content of the user's message.
    #[serde(default)]
    pub text: String,
}

/// A reference to a symbol or file embedded in the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineRef {
    /// A code symbol (function, type) with an optional location.
    Symbol {
        /// Symbol name.
        name: String,
        /// File containing the symbol.
        path: Option<String>,
        /// 1-indexed line where the symbol starts.
        line: Option<u32>,
    },
    /// A file reference.
    File {
        /// Optional display name.
        name: Option<String>,
        /// The file path being referenced.
        path: String,
    },
    /// A bare name with no location information.
    Named(String),
}

/// Structured output attached to a tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolData {
    /// A command run in the integrated terminal.
    Terminal {
        /// The command line as the user would have typed it.
        command: String,
        /// Raw captured output, escape sequences included.
        output: String,
        /// Unix timestamp in milliseconds when the command ran.
        timestamp: Option<i64>,
    },
    /// An update to the agent's todo list.
    TodoList(Vec<TodoItem>),
}

/// One entry of a todo list update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoItem {
    /// Status such as `not-started`, `in-progress`, `completed`.
    pub status: String,
    /// Human-readable title.
    pub title: String,
}

/// A serialized tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Tool name, when the export recorded one.
    pub tool_name: Option<String>,
    /// Present-tense description (e.g., `Reading [](file:///a.rs)`).
    pub invocation_message: Option<String>,
    /// Past-tense description (e.g., "Searched for files").
    pub past_tense: Option<String>,
    /// Tool-specific payload.
    pub data: Option<ToolData>,
}

/// An item within an assistant's response.
///
/// Responses are composed of many items whose relative order matters.
/// Everything this crate does not render is still represented explicitly:
/// [`ResponseItem::Ignored`] for known noise and [`ResponseItem::Unknown`]
/// for kinds added to the export format after this crate was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseItem {
    /// Plain text content from the assistant.
    Text(String),

    /// Reasoning ("thinking") content.
    Thinking {
        /// The reasoning text.
        value: String,
        /// A short title Copilot generated for it.
        generated_title: Option<String>,
    },

    /// A reference to a symbol or file mentioned inline.
    InlineReference(InlineRef),

    /// A URI indicating the file a following edit applies to.
    CodeBlockUri {
        /// The file path associated with the code block.
        path: String,
    },

    /// A group of text edits applied to a file.
    TextEditGroup {
        /// The file path that was edited.
        path: String,
        /// The replacement texts, in order.
        edits: Vec<String>,
    },

    /// Announces the tool about to be invoked.
    PrepareToolInvocation {
        /// Name of the tool.
        tool_name: Option<String>,
    },

    /// A tool invocation performed by the assistant.
    ToolInvocation(ToolInvocation),

    /// A known kind that carries nothing to render.
    Ignored(String),

    /// An unrecognized response item.
    Unknown {
        /// The `kind` discriminator, if the item had one.
        kind: Option<String>,
        /// The item's `value` when it is a string.
        value: Option<String>,
    },
}

impl<'de> Deserialize<'de> for ResponseItem {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

impl ResponseItem {
    fn from_value(value: &Value) -> Self {
        let text_value = get_string(value, &["value"]);

        let Some(kind) = get_str(value, &["kind"]) else {
            return match text_value {
                Some(text) => Self::Text(text),
                None => Self::Unknown {
                    kind: None,
                    value: None,
                },
            };
        };

        match kind {
            "text" => Self::Text(text_value.unwrap_or_default()),
            "thinking" => Self::Thinking {
                value: text_value.unwrap_or_default(),
                generated_title: get_string(value, &["generatedTitle"]),
            },
            "inlineReference" => Self::InlineReference(extract_inline_ref(value)),
            "codeblockUri" => Self::CodeBlockUri {
                path: get_string(value, &["uri", "path"]).unwrap_or_default(),
            },
            "textEditGroup" => Self::TextEditGroup {
                path: get_string(value, &["uri", "path"]).unwrap_or_default(),
                edits: extract_edits(value),
            },
            "prepareToolInvocation" => Self::PrepareToolInvocation {
                tool_name: get_string(value, &["toolName"]),
            },
            "toolInvocationSerialized" => Self::ToolInvocation(ToolInvocation {
                tool_name: get_string(value, &["toolName"]),
                invocation_message: get_message(value, "invocationMessage"),
                past_tense: get_message(value, "pastTenseMessage"),
                data: extract_tool_data(value),
            }),
            k if IGNORED_KINDS.contains(&k) => Self::Ignored(k.to_owned()),
            other => Self::Unknown {
                kind: Some(other.to_owned()),
                value: text_value,
            },
        }
    }

    /// Short name of the item's kind, used in diagnostics and tests.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Thinking { .. } => "thinking",
            Self::InlineReference(_) => "inlineReference",
            Self::CodeBlockUri { .. } => "codeblockUri",
            Self::TextEditGroup { .. } => "textEditGroup",
            Self::PrepareToolInvocation { .. } => "prepareToolInvocation",
            Self::ToolInvocation(_) => "toolInvocationSerialized",
            Self::Ignored(_) => "ignored",
            Self::Unknown { .. } => "unknown",
        }
    }
}

impl<'de> Deserialize<'de> for Request {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        let request_id = get_string(&value, &["requestId"]).unwrap_or_default();

        let timestamp = value
            .get("timestamp")
            .and_then(Value::as_i64)
            .unwrap_or(0);

        let model_id = get_string(&value, &["modelId"]);

        let message = value
            .get("message")
            .and_then(|m| serde_json::from_value(m.clone()).ok())
            .unwrap_or_default();

        let response = value
            .get("response")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(ResponseItem::from_value).collect())
            .unwrap_or_default();

        Ok(Self {
            request_id,
            timestamp,
            model_id,
            message,
            response,
        })
    }
}

/// Builds an [`InlineRef`] from an `inlineReference` item.
///
/// Symbol references carry a `kind` and a `location` inside
/// `inlineReference`; file references carry a `path` there instead.
fn extract_inline_ref(value: &Value) -> InlineRef {
    let outer_name = get_string(value, &["name"]).filter(|n| !n.is_empty());

    let Some(inner) = value.get("inlineReference").filter(|v| v.is_object()) else {
        return InlineRef::Named(outer_name.unwrap_or_default());
    };

    if inner.get("kind").is_some() {
        let name = get_string(inner, &["name"])
            .or(outer_name)
            .unwrap_or_default();
        let path = get_string(inner, &["location", "uri", "path"]).filter(|p| !p.is_empty());
        let line = inner
            .get("location")
            .and_then(|l| l.get("range"))
            .and_then(|r| r.get("startLineNumber"))
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok());
        return InlineRef::Symbol { name, path, line };
    }

    match get_string(inner, &["path"]).filter(|p| !p.is_empty()) {
        Some(path) => InlineRef::File {
            name: outer_name,
            path,
        },
        None => InlineRef::Named(
            outer_name
                .or_else(|| get_string(inner, &["name"]))
                .unwrap_or_default(),
        ),
    }
}

/// Extracts the `toolSpecificData` payload of a tool invocation.
fn extract_tool_data(value: &Value) -> Option<ToolData> {
    let data = value.get("toolSpecificData")?;
    match get_str(data, &["kind"])? {
        "terminal" => Some(ToolData::Terminal {
            command: get_string(data, &["commandLine", "original"]).unwrap_or_default(),
            output: get_string(data, &["terminalCommandOutput", "text"]).unwrap_or_default(),
            timestamp: data
                .get("terminalCommandState")
                .and_then(|s| s.get("timestamp"))
                .and_then(Value::as_i64),
        }),
        "todoList" => Some(ToolData::TodoList(
            data.get("todoList")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .map(|todo| TodoItem {
                    status: get_string(todo, &["status"]).unwrap_or_else(|| "unknown".into()),
                    title: get_string(todo, &["title"]).unwrap_or_default(),
                })
                .collect(),
        )),
        _ => None,
    }
}

/// Reads a message field that is either a plain string or `{ "value": ... }`.
fn get_message(value: &Value, key: &str) -> Option<String> {
    let field = value.get(key)?;
    field
        .as_str()
        .or_else(|| get_str(field, &["value"]))
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Navigates a JSON path and returns the string value at the end.
///
/// # Arguments
///
/// * `value` - The root JSON value to navigate from
/// * `path` - A sequence of keys to follow through the JSON structure
fn get_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut current = value;
    for key in path {
        current = current.get(*key)?;
    }
    current.as_str()
}

/// Like [`get_str`] but returns an owned `String`.
fn get_string(value: &Value, path: &[&str]) -> Option<String> {
    get_str(value, path).map(str::to_owned)
}

/// Extracts edit texts from the nested edits array structure.
///
/// The JSON format nests edits as: `edits: [[{text: "..."}], [{text: "..."}]]`
fn extract_edits(value: &Value) -> Vec<String> {
    value
        .get("edits")
        .and_then(|e| e.as_array())
        .into_iter()
        .flatten()
        .filter_map(|group| group.as_array())
        .flatten()
        .filter_map(|edit| edit.get("text")?.as_str())
        .map(str::to_owned)
        .collect()
}

/// Parses a JSON string into a [`ChatExport`] structure.
///
/// # Errors
///
/// Returns an error if the input is not valid JSON or its top level is not
/// an object.
///
/// # Example
///
/// ```
/// use cpturns::parser::parse_chat;
///
/// let chat = parse_chat(r#"{ "requests": [] }"#).unwrap();
/// assert!(chat.requests.is_empty());
/// ```
pub fn parse_chat(json_str: &str) -> Result<ChatExport, ParseError> {
    serde_json::from_str(json_str).context(JsonSnafu)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat_json(requests_json: &str) -> String {
        format!(r#"{{ "requests": [{requests_json}] }}"#)
    }

    fn request_json(message: &str, response_items: &str) -> String {
        format!(
            r#"{{
                "requestId": "request_abc",
                "timestamp": 1733356800000,
                "modelId": "claude-sonnet-4",
                "message": {{ "text": "{message}" }},
                "response": [{response_items}]
            }}"#
        )
    }

    fn first_item(response_items: &str) -> ResponseItem {
        let json = chat_json(&request_json("Hi", response_items));
        let mut chat = parse_chat(&json).unwrap();
        chat.requests.remove(0).response.remove(0)
    }

    #[test]
    fn parses_minimal_chat() {
        let json = chat_json(&request_json("Hello", ""));
        let chat = parse_chat(&json).unwrap();

        assert_eq!(chat.requests.len(), 1);
        let request = &chat.requests[0];
        assert_eq!(request.request_id, "request_abc");
        assert_eq!(request.timestamp, 1_733_356_800_000);
        assert_eq!(request.message.text, "Hello");
        assert_eq!(request.model_id.as_deref(), Some("claude-sonnet-4"));
    }

    #[test]
    fn missing_requests_is_empty_export() {
        let chat = parse_chat(r#"{"responderUsername": "GitHub Copilot"}"#).unwrap();
        assert!(chat.requests.is_empty());
    }

    #[test]
    fn request_fields_default_when_missing() {
        let chat = parse_chat(r#"{"requests": [{}]}"#).unwrap();
        assert_eq!(chat.requests[0], Request::default());
    }

    #[test]
    fn parses_text_with_and_without_kind() {
        assert_eq!(first_item(r#"{"value": "Hello"}"#), ResponseItem::Text("Hello".into()));
        assert_eq!(
            first_item(r#"{"kind": "text", "value": "Hi"}"#),
            ResponseItem::Text("Hi".into())
        );
    }

    #[test]
    fn parses_thinking() {
        let item = first_item(
            r#"{"kind": "thinking", "value": "**Plan**\nRead files", "generatedTitle": "Planning"}"#,
        );
        assert_eq!(
            item,
            ResponseItem::Thinking {
                value: "**Plan**\nRead files".into(),
                generated_title: Some("Planning".into()),
            }
        );
    }

    #[test]
    fn parses_symbol_reference() {
        let item = first_item(
            r#"{
                "kind": "inlineReference",
                "inlineReference": {
                    "name": "parse_chat",
                    "kind": 12,
                    "location": {
                        "uri": { "path": "/work/src/parser.rs" },
                        "range": { "startLineNumber": 42 }
                    }
                }
            }"#,
        );
        assert_eq!(
            item,
            ResponseItem::InlineReference(InlineRef::Symbol {
                name: "parse_chat".into(),
                path: Some("/work/src/parser.rs".into()),
                line: Some(42),
            })
        );
    }

    #[test]
    fn parses_symbol_reference_without_location() {
        let item = first_item(
            r#"{"kind": "inlineReference", "name": "Outer", "inlineReference": {"kind": 5}}"#,
        );
        assert_eq!(
            item,
            ResponseItem::InlineReference(InlineRef::Symbol {
                name: "Outer".into(),
                path: None,
                line: None,
            })
        );
    }

    #[test]
    fn parses_file_reference() {
        let item = first_item(
            r#"{"kind": "inlineReference", "name": "main.rs", "inlineReference": {"path": "/src/main.rs"}}"#,
        );
        assert_eq!(
            item,
            ResponseItem::InlineReference(InlineRef::File {
                name: Some("main.rs".into()),
                path: "/src/main.rs".into(),
            })
        );
    }

    #[test]
    fn parses_reference_with_non_object_payload() {
        let item = first_item(r#"{"kind": "inlineReference", "name": "x", "inlineReference": "x"}"#);
        assert_eq!(item, ResponseItem::InlineReference(InlineRef::Named("x".into())));
    }

    #[test]
    fn parses_codeblock_uri_and_edit_group() {
        let json = chat_json(&request_json(
            "Edit",
            r#"
                {"kind": "codeblockUri", "uri": {"path": "/src/a.rs"}},
                {
                    "kind": "textEditGroup",
                    "uri": {"path": "/src/a.rs"},
                    "edits": [[{"text": "fn a() {}"}], [{"text": "// end"}]]
                }
            "#,
        ));
        let chat = parse_chat(&json).unwrap();
        let response = &chat.requests[0].response;

        assert_eq!(
            response[0],
            ResponseItem::CodeBlockUri {
                path: "/src/a.rs".into()
            }
        );
        assert_eq!(
            response[1],
            ResponseItem::TextEditGroup {
                path: "/src/a.rs".into(),
                edits: vec!["fn a() {}".into(), "// end".into()],
            }
        );
    }

    #[test]
    fn parses_terminal_tool_invocation() {
        let item = first_item(
            r#"{
                "kind": "toolInvocationSerialized",
                "invocationMessage": "Using \"Run in Terminal\"",
                "toolSpecificData": {
                    "kind": "terminal",
                    "commandLine": { "original": "cargo test" },
                    "terminalCommandOutput": { "text": "\u001b[32mok\u001b[0m" },
                    "terminalCommandState": { "timestamp": 1733356860000 }
                }
            }"#,
        );
        let ResponseItem::ToolInvocation(tool) = item else {
            panic!("Expected ToolInvocation, got {item:?}");
        };
        assert_eq!(tool.tool_name, None);
        assert_eq!(tool.invocation_message.as_deref(), Some("Using \"Run in Terminal\""));
        assert_eq!(
            tool.data,
            Some(ToolData::Terminal {
                command: "cargo test".into(),
                output: "\u{1b}[32mok\u{1b}[0m".into(),
                timestamp: Some(1_733_356_860_000),
            })
        );
    }

    #[test]
    fn parses_todo_list_tool_invocation() {
        let item = first_item(
            r#"{
                "kind": "toolInvocationSerialized",
                "toolName": "Manage Todos",
                "pastTenseMessage": { "value": "Updated todo list" },
                "toolSpecificData": {
                    "kind": "todoList",
                    "todoList": [
                        { "status": "completed", "title": "Parse input" },
                        { "title": "Render" }
                    ]
                }
            }"#,
        );
        let ResponseItem::ToolInvocation(tool) = item else {
            panic!("Expected ToolInvocation, got {item:?}");
        };
        assert_eq!(tool.tool_name.as_deref(), Some("Manage Todos"));
        assert_eq!(tool.past_tense.as_deref(), Some("Updated todo list"));
        assert_eq!(
            tool.data,
            Some(ToolData::TodoList(vec![
                TodoItem {
                    status: "completed".into(),
                    title: "Parse input".into(),
                },
                TodoItem {
                    status: "unknown".into(),
                    title: "Render".into(),
                },
            ]))
        );
    }

    #[test]
    fn parses_prepare_tool_invocation() {
        assert_eq!(
            first_item(r#"{"kind": "prepareToolInvocation", "toolName": "copilot_readFile"}"#),
            ResponseItem::PrepareToolInvocation {
                tool_name: Some("copilot_readFile".into())
            }
        );
    }

    #[test]
    fn parses_ignored_kinds() {
        assert_eq!(
            first_item(r#"{"kind": "undoStop", "id": "x"}"#),
            ResponseItem::Ignored("undoStop".into())
        );
    }

    #[test]
    fn parses_unknown_kind_keeping_value() {
        assert_eq!(
            first_item(r#"{"kind": "brandNewKind", "value": "payload"}"#),
            ResponseItem::Unknown {
                kind: Some("brandNewKind".into()),
                value: Some("payload".into()),
            }
        );
    }

    #[test]
    fn parses_object_without_kind_or_value_as_unknown() {
        assert_eq!(
            first_item(r#"{"someField": "someValue"}"#),
            ResponseItem::Unknown {
                kind: None,
                value: None
            }
        );
    }

    #[test]
    fn preserves_item_order() {
        let json = chat_json(&request_json(
            "Multi",
            r#"{"value": "First"}, {"kind": "thinking", "value": "hmm"}, {"value": "Second"}"#,
        ));
        let chat = parse_chat(&json).unwrap();
        let kinds: Vec<_> = chat.requests[0]
            .response
            .iter()
            .map(ResponseItem::kind_name)
            .collect();

        assert_eq!(kinds, ["text", "thinking", "text"]);
    }

    #[test]
    fn returns_error_for_invalid_json() {
        assert!(parse_chat("not valid json").is_err());
    }

    #[test]
    fn returns_error_for_wrong_top_level_type() {
        assert!(parse_chat("[1, 2, 3]").is_err());
    }
}
