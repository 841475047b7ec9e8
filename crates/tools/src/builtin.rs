//! The canonical tool catalog (`spec.md` §4.1). Every [`ToolDefinition`]'s
//! `parameters` schema is authored as a `serde_json::json!{}` literal, per
//! `SPEC_FULL.md` §4.1 — no schema-derivation macro crate is introduced.

use canonical::ToolDefinition;
use serde_json::json;

/// The external dependency each tool's availability is gated on
/// (`spec.md` §4.1 `listEnabled`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    DateTime,
    Memory,
    Sandbox,
    FileRecall,
    WebSearch,
    ImageGeneration,
}

pub struct RegistryEntry {
    pub definition: ToolDefinition,
    pub category: ToolCategory,
}

pub fn catalog() -> Vec<RegistryEntry> {
    vec![
        RegistryEntry {
            definition: ToolDefinition {
                name: "date_time_now".to_owned(),
                description: "Returns the current date and time, optionally in a given IANA timezone.".to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "timezone": {
                            "type": "string",
                            "description": "IANA timezone name, e.g. 'Asia/Tokyo'. Defaults to UTC.",
                        },
                    },
                    "required": [],
                }),
            },
            category: ToolCategory::DateTime,
        },
        RegistryEntry {
            definition: ToolDefinition {
                name: "memory_list".to_owned(),
                description: "Lists the short facts currently remembered about the user.".to_owned(),
                parameters: json!({"type": "object", "properties": {}, "required": []}),
            },
            category: ToolCategory::Memory,
        },
        RegistryEntry {
            definition: ToolDefinition {
                name: "memory_create".to_owned(),
                description: "Remembers a new short fact about the user.".to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": {"text": {"type": "string", "description": "The fact to remember."}},
                    "required": ["text"],
                }),
            },
            category: ToolCategory::Memory,
        },
        RegistryEntry {
            definition: ToolDefinition {
                name: "memory_update".to_owned(),
                description: "Replaces the text of a previously remembered fact.".to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "memory_id": {"type": "string"},
                        "text": {"type": "string"},
                    },
                    "required": ["memory_id", "text"],
                }),
            },
            category: ToolCategory::Memory,
        },
        RegistryEntry {
            definition: ToolDefinition {
                name: "memory_delete".to_owned(),
                description: "Forgets a previously remembered fact.".to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": {"memory_id": {"type": "string"}},
                    "required": ["memory_id"],
                }),
            },
            category: ToolCategory::Memory,
        },
        RegistryEntry {
            definition: ToolDefinition {
                name: "sandbox_execute".to_owned(),
                description: "Runs a shell command in the conversation's sandbox container and returns its output.".to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "command": {"type": "string", "description": "The shell command to run."},
                        "workdir": {"type": "string", "description": "Working directory, relative to /workspace. Defaults to /workspace."},
                    },
                    "required": ["command"],
                }),
            },
            category: ToolCategory::Sandbox,
        },
        RegistryEntry {
            definition: ToolDefinition {
                name: "sandbox_write_file".to_owned(),
                description: "Writes (or overwrites) a file inside the sandbox workspace.".to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string"},
                        "content": {"type": "string"},
                    },
                    "required": ["path", "content"],
                }),
            },
            category: ToolCategory::Sandbox,
        },
        RegistryEntry {
            definition: ToolDefinition {
                name: "sandbox_read_file".to_owned(),
                description: "Reads a file from the sandbox workspace, optionally capped to a maximum number of lines.".to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string"},
                        "max_lines": {"type": "integer", "minimum": 1},
                    },
                    "required": ["path"],
                }),
            },
            category: ToolCategory::Sandbox,
        },
        RegistryEntry {
            definition: ToolDefinition {
                name: "sandbox_list_files".to_owned(),
                description: "Lists files and directories in the sandbox workspace.".to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Defaults to /workspace."},
                        "recursive": {"type": "boolean"},
                    },
                    "required": [],
                }),
            },
            category: ToolCategory::Sandbox,
        },
        RegistryEntry {
            definition: ToolDefinition {
                name: "sandbox_diff_edit".to_owned(),
                description: "Replaces an exact substring within a sandbox file.".to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string"},
                        "search": {"type": "string"},
                        "replace": {"type": "string"},
                        "all_occurrences": {"type": "boolean", "description": "Replace every match instead of only the first. Defaults to false."},
                    },
                    "required": ["path", "search", "replace"],
                }),
            },
            category: ToolCategory::Sandbox,
        },
        RegistryEntry {
            definition: ToolDefinition {
                name: "sandbox_stats".to_owned(),
                description: "Returns resource usage (memory, CPU, process count, disk) for the conversation's sandbox container.".to_owned(),
                parameters: json!({"type": "object", "properties": {}, "required": []}),
            },
            category: ToolCategory::Sandbox,
        },
        RegistryEntry {
            definition: ToolDefinition {
                name: "file_recall_search".to_owned(),
                description: "Searches the tenant's uploaded documents for passages relevant to a query.".to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string"},
                        "max_results": {"type": "integer", "minimum": 1, "maximum": 50},
                    },
                    "required": ["query"],
                }),
            },
            category: ToolCategory::FileRecall,
        },
        RegistryEntry {
            definition: ToolDefinition {
                name: "web_search".to_owned(),
                description: "Searches the public web and returns summarized results.".to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": {"query": {"type": "string"}},
                    "required": ["query"],
                }),
            },
            category: ToolCategory::WebSearch,
        },
        RegistryEntry {
            definition: ToolDefinition {
                name: "image_generation".to_owned(),
                description: "Generates an image from a text prompt.".to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "prompt": {"type": "string"},
                        "size": {"type": "string", "description": "e.g. '1024x1024'."},
                    },
                    "required": ["prompt"],
                }),
            },
            category: ToolCategory::ImageGeneration,
        },
    ]
}
