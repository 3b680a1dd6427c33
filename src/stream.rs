// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Conversion of a response item stream into render blocks.
//!
//! Copilot streams a response as many small items: text fragments split
//! around inline references, reasoning, tool calls, and edits announced by a
//! preceding `codeblockUri`. [`Processor::process`] walks that stream once and
//! produces [`Block`]s with paths already shortened and terminal output
//! already cleaned, so the renderer never looks at raw items.

use crate::config::RenderConfig;
use crate::parser::{InlineRef, ResponseItem, TodoItem, ToolData, ToolInvocation};
use crate::paths::PathNormalizer;
use crate::sanitize::{Truncation, clean_terminal_output};
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

/// `Reading [](file:///a.rs), lines 3 to 9` style messages.
static READ_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(Reading|Creating) \[\]\(([^)]*)\)(?:, lines (\d+) to (\d+))?")
        .expect("read message pattern is valid")
});

/// Empty-label Markdown links to files: `[](file:///a.rs)`.
static FILE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\]\((?:file://)?([^)]+)\)").expect("file link pattern is valid")
});

/// Bare absolute or glob source paths in tool messages: `/src/a.py#L3-9`.
static BARE_SOURCE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"`?((?:\*\*?|/)[A-Za-z0-9_\-./*{}]+\.(?:cpp|hpp|h|py|md|txt)\b(?:#L?\d+(?:-\d*)?)?)`?")
        .expect("bare source path pattern is valid")
});

/// Label used when an edit group carries no path at all.
const UNKNOWN_EDIT_PATH: &str = "Code Block";

/// Label used when a `codeblockUri` announced an edit but had no path.
const UNKNOWN_EDIT_FILE: &str = "Unknown File";

/// Label used when no tool name can be recovered.
pub const UNKNOWN_TOOL: &str = "Unknown Tool";

/// A mode-independent unit of rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// Assistant prose with inline references already formatted.
    Prose(String),
    /// A reference that stood on its own, already formatted.
    Reference(String),
    /// A reasoning segment.
    Reasoning {
        /// Title Copilot generated for the segment.
        title: Option<String>,
        /// The reasoning text.
        body: String,
    },
    /// A file edit with its full replacement content.
    Edit {
        /// Edited file, relative to the project root when possible.
        path: String,
        /// Replacement text, verbatim.
        content: String,
    },
    /// A tool invocation.
    Tool(ToolBlock),
    /// An item kind this crate does not recognize.
    Raw {
        /// The item's `kind`, or `(none)`.
        kind: String,
        /// The item's text value, if any.
        text: Option<String>,
    },
}

impl Block {
    /// Short name of the block's kind.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Prose(_) => "prose",
            Self::Reference(_) => "reference",
            Self::Reasoning { .. } => "reasoning",
            Self::Edit { .. } => "edit",
            Self::Tool(_) => "tool",
            Self::Raw { .. } => "raw",
        }
    }
}

/// A processed tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolBlock {
    /// Resolved tool name.
    pub name: String,
    /// Invocation message with file links rewritten.
    pub action: Option<String>,
    /// Unix timestamp in milliseconds, when known.
    pub timestamp: Option<i64>,
    /// Structured output.
    pub output: Option<ToolOutput>,
}

impl ToolBlock {
    /// Whether this invocation applied a patch (shown separately as an edit).
    #[must_use]
    pub fn is_apply_patch(&self) -> bool {
        self.name.contains("Apply Patch")
            || self
                .action
                .as_deref()
                .is_some_and(|a| a.contains("Apply Patch"))
    }
}

/// Structured output of a tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutput {
    /// A terminal command and its cleaned output.
    Terminal {
        /// The command line.
        command: String,
        /// Output with escape sequences removed, truncated per config.
        output: String,
    },
    /// A todo list update.
    Todo(Vec<TodoItem>),
}

/// Walks response items and builds [`Block`]s.
#[derive(Debug, Clone)]
pub struct Processor<'a> {
    paths: &'a PathNormalizer,
    truncation: Option<Truncation>,
}

impl<'a> Processor<'a> {
    /// Creates a processor shortening paths with `paths` and truncating
    /// terminal output as `config` says.
    #[must_use]
    pub const fn new(paths: &'a PathNormalizer, config: &RenderConfig) -> Self {
        Self {
            paths,
            truncation: config.truncation,
        }
    }

    /// Converts one response into blocks, preserving item order.
    #[must_use]
    pub fn process(&self, items: &[ResponseItem]) -> Vec<Block> {
        let mut state = StreamState::default();

        for item in items {
            match item {
                ResponseItem::Text(text) => state.prose.push_text(text),
                ResponseItem::InlineReference(reference) => {
                    state.prose.push_reference(self.format_reference(reference));
                }
                ResponseItem::Ignored(_) => {}
                ResponseItem::Thinking {
                    value,
                    generated_title,
                } => {
                    state.flush_prose();
                    if !value.trim().is_empty() {
                        state.blocks.push(Block::Reasoning {
                            title: generated_title.clone(),
                            body: value.clone(),
                        });
                    }
                }
                ResponseItem::CodeBlockUri { path } => {
                    state.flush_prose();
                    state.pending_edit_path = Some(if path.is_empty() {
                        UNKNOWN_EDIT_FILE.to_owned()
                    } else {
                        self.paths.relative(path)
                    });
                }
                ResponseItem::TextEditGroup { path, edits } => {
                    state.flush_prose();
                    let path = state
                        .pending_edit_path
                        .take()
                        .or_else(|| (!path.is_empty()).then(|| self.paths.relative(path)))
                        .unwrap_or_else(|| UNKNOWN_EDIT_PATH.to_owned());
                    let content = edits.iter().fold(String::new(), |mut acc, edit| {
                        acc.push_str(edit);
                        acc.push('\n');
                        acc
                    });
                    state.blocks.push(Block::Edit { path, content });
                }
                ResponseItem::PrepareToolInvocation { tool_name } => {
                    state.flush_prose();
                    state.pending_tool_name.clone_from(tool_name);
                }
                ResponseItem::ToolInvocation(invocation) => {
                    state.flush_prose();
                    let prepared = state.pending_tool_name.take();
                    let block = self.tool_block(invocation, prepared);
                    state.blocks.push(Block::Tool(block));
                }
                ResponseItem::Unknown { kind, value } => {
                    state.flush_prose();
                    let kind = kind.clone().unwrap_or_else(|| "(none)".to_owned());
                    debug!(%kind, "keeping unrecognized response item as raw block");
                    state.blocks.push(Block::Raw {
                        kind,
                        text: value.clone().filter(|v| !v.trim().is_empty()),
                    });
                }
            }
        }

        state.flush_prose();
        state.blocks
    }

    /// Formats an inline reference as Markdown.
    fn format_reference(&self, reference: &InlineRef) -> String {
        match reference {
            InlineRef::Symbol { name, path, line } => {
                let symbol = format!("`{}`", escape_for_inline_code(name));
                let Some(path) = path else {
                    return symbol;
                };
                let basename = file_name(path);
                let relative = self.paths.relative(path);
                match line {
                    Some(line) => format!("{symbol} ([{basename}:{line}]({relative}#L{line}))"),
                    None => format!("{symbol} ([{basename}]({relative}))"),
                }
            }
            InlineRef::File { name, path } => {
                let display = name.as_deref().unwrap_or_else(|| file_name(path));
                format!("[{display}]({})", self.paths.relative(path))
            }
            InlineRef::Named(name) if name.is_empty() => String::new(),
            InlineRef::Named(name) => format!("`{}`", escape_for_inline_code(name)),
        }
    }

    fn tool_block(&self, invocation: &ToolInvocation, prepared: Option<String>) -> ToolBlock {
        let message = invocation
            .invocation_message
            .as_deref()
            .or(invocation.past_tense.as_deref());

        let name = invocation
            .tool_name
            .clone()
            .or(prepared)
            .or_else(|| {
                message
                    .and_then(|m| m.strip_prefix("Using "))
                    .map(|rest| rest.trim_matches('"').to_owned())
            })
            .unwrap_or_else(|| UNKNOWN_TOOL.to_owned());

        let action = message.map(|m| self.clean_action(m));

        let (timestamp, output) = match &invocation.data {
            Some(ToolData::Terminal {
                command,
                output,
                timestamp,
            }) => (
                *timestamp,
                Some(ToolOutput::Terminal {
                    command: command.clone(),
                    output: clean_terminal_output(output, self.truncation),
                }),
            ),
            Some(ToolData::TodoList(items)) => (None, Some(ToolOutput::Todo(items.clone()))),
            None => (None, None),
        };

        ToolBlock {
            name,
            action,
            timestamp,
            output,
        }
    }

    /// Rewrites file links, or failing those bare source paths, in a tool
/// message into backticked relative paths.
    fn clean_action(&self, message: &str) -> String {
        if let Some(caps) = READ_MESSAGE.captures(message) {
            let verb = &caps[1];
            let uri = caps[2].strip_prefix("file://").unwrap_or(&caps[2]);
            let target = match (caps.get(3), caps.get(4)) {
                (Some(start), Some(end)) => {
                    let base = uri.split_once('#').map_or(uri, |(base, _)| base);
                    format!("{base}#L{}-L{}", start.as_str(), end.as_str())
                }
                _ => uri.to_owned(),
            };
            return format!("{verb} `{}`", self.paths.relative(&target));
        }

        let linked = FILE_LINK.replace_all(message, |caps: &Captures<'_>| {
            format!("`{}`", self.paths.relative(&caps[1]))
        });
        if let Cow::Owned(linked) = linked {
            return linked;
        }

        BARE_SOURCE_PATH
            .replace_all(message, |caps: &Captures<'_>| {
                let whole = &caps[0];
                let path = &caps[1];
                if whole.starts_with('`') || whole.ends_with('`') {
                    whole.to_owned()
                } else if path.starts_with('*') {
                    format!("`{path}`")
                } else {
                    format!("`{}`", self.paths.relative(path))
                }
            })
            .into_owned()
    }
}

/// Per-response mutable state.
#[derive(Default)]
struct StreamState {
    blocks: Vec<Block>,
    prose: ProseRun,
    pending_tool_name: Option<String>,
    pending_edit_path: Option<String>,
}

impl StreamState {
    fn flush_prose(&mut self) {
        self.prose.drain_into(&mut self.blocks);
    }
}

/// Consecutive text fragments and inline references.
#[derive(Default)]
struct ProseRun {
    fragments: Vec<Fragment>,
}

enum Fragment {
    Text(String),
    Reference(String),
}

impl ProseRun {
    fn push_text(&mut self, text: &str) {
        // Bare fences are streaming artifacts around edit blocks.
        if is_only_code_fences(text) && !text.trim().is_empty() {
            return;
        }
        self.fragments.push(Fragment::Text(text.to_owned()));
    }

    fn push_reference(&mut self, formatted: String) {
        if !formatted.is_empty() {
            self.fragments.push(Fragment::Reference(formatted));
        }
    }

    /// Emits one prose block, or standalone reference blocks when the run
    /// holds no actual text.
    fn drain_into(&mut self, blocks: &mut Vec<Block>) {
        let fragments = std::mem::take(&mut self.fragments);
        let has_text = fragments
            .iter()
            .any(|f| matches!(f, Fragment::Text(t) if !t.trim().is_empty()));

        if has_text {
            let prose: String = fragments
                .into_iter()
                .map(|f| match f {
                    Fragment::Text(s) | Fragment::Reference(s) => s,
                })
                .collect();
            blocks.push(Block::Prose(prose));
        } else {
            blocks.extend(fragments.into_iter().filter_map(|f| match f {
                Fragment::Reference(r) => Some(Block::Reference(r)),
                Fragment::Text(_) => None,
            }));
        }
    }
}

/// Returns `true` if the string contains only code fence markers and whitespace.
///
/// These are streaming artifacts from the Copilot response that shouldn't
/// appear in rendered output.
fn is_only_code_fences(s: &str) -> bool {
    s.lines().all(|line| {
        let trimmed = line.trim();
        trimmed.is_empty() || trimmed == "```"
    })
}

/// Escapes backticks in a string for use inside inline code spans.
///
/// Replaces backticks with single quotes to avoid breaking the inline code
/// syntax when displaying names that contain backticks.
pub(crate) fn escape_for_inline_code(s: &str) -> String {
    s.replace('`', "'")
}

fn file_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or(path)
}
