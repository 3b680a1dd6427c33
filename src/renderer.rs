// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Markdown rendering of extracted turns.
//!
//! This module turns one [`Turn`] into a Markdown document. What the document
//! shows for reasoning, edits, terminal output, and timestamps comes from the
//! [`RenderConfig`]; the same turn and config always produce the same bytes.
//!
//! # Output Format
//!
//! Each exchange of the turn renders as:
//! - a `# Turn N` heading
//! - `## User` with the escaped request text (plus a timestamp line in
//!   human mode)
//! - `## Assistant` with the response blocks in order
//! - a closing `---` rule
//!
//! Exchanges folded into the turn as continuations follow the opener,
//! separated by a `====` rule.
//!
//! # Example
//!
//! ```
//! use cpturns::config::{Mode, RenderConfig};
//! use cpturns::parser::parse_chat;
//! use cpturns::paths::PathNormalizer;
//! use cpturns::renderer::render_turn;
//! use cpturns::stream::Processor;
//! use cpturns::turns::extract_turns;
//!
//! let chat = parse_chat(r#"{"requests": [{
//!     "message": { "text": "Hello!" },
//!     "response": [{ "value": "Hi there!" }]
//! }]}"#).unwrap();
//!
//! let config = RenderConfig::for_mode(Mode::Agent);
//! let paths = PathNormalizer::default();
//! let turns = extract_turns(&chat, &Processor::new(&paths, &config));
//! let markdown = render_turn(&turns[0], &config);
//!
//! assert!(markdown.starts_with("# Turn 1\n\n## User\n\nHello!"));
//! assert!(markdown.contains("Hi there!"));
//! ```

use crate::config::{EditVisibility, ReasoningStyle, RenderConfig};
use crate::stream::{Block, ToolBlock, ToolOutput, UNKNOWN_TOOL, escape_for_inline_code};
use crate::turns::{Exchange, Turn};
use chrono::DateTime;
use std::fmt::Write;
use std::path::Path;

/// Fallback summary for a reasoning group without any title.
const DEFAULT_REASONING_TITLE: &str = "Thinking Process";

/// Returns a markdown heading prefix with the given level and offset.
///
/// The heading level is clamped to a maximum of 6 (H6).
fn heading(level: u8, offset: u8) -> String {
    let actual = (level + offset).min(6);
    "#".repeat(actual as usize)
}

/// Renders a turn as a Markdown document.
///
/// Rendering is pure: no I/O, no clock. Timestamps come from the export and
/// are formatted in UTC.
#[must_use]
pub fn render_turn(turn: &Turn, config: &RenderConfig) -> String {
    let mut out = String::new();

    for (i, exchange) in turn.exchanges().iter().enumerate() {
        if i > 0 {
            writeln!(out, "\n{}\n", "=".repeat(40)).unwrap();
        }
        render_exchange(&mut out, exchange, config);
    }

    out
}

fn render_exchange(out: &mut String, exchange: &Exchange, config: &RenderConfig) {
    let offset = config.heading_offset;

    writeln!(out, "{} Turn {}\n", heading(1, offset), exchange.ordinal).unwrap();
    writeln!(out, "{} User\n", heading(2, offset)).unwrap();

    if config.timestamps
        && let Some(metadata) = request_metadata(exchange)
    {
        writeln!(out, "{metadata}\n").unwrap();
    }
    writeln!(out, "{}\n", escape_prose(exchange.request_text.trim_end())).unwrap();

    writeln!(out, "{} Assistant\n", heading(2, offset)).unwrap();
    render_blocks(out, &exchange.blocks, config);

    out.push_str("---\n\n");
}

/// Builds the `*timestamp · model*` line shown under the user heading.
fn request_metadata(exchange: &Exchange) -> Option<String> {
    if exchange.timestamp <= 0 {
        return None;
    }
    let ts = format_timestamp(exchange.timestamp, "%Y-%m-%d %H:%M UTC")?;
    Some(match &exchange.model_id {
        Some(model) => format!("*{ts} · {model}*"),
        None => format!("*{ts}*"),
    })
}

fn format_timestamp(millis: i64, format: &str) -> Option<String> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.format(format).to_string())
}

fn render_blocks(out: &mut String, blocks: &[Block], config: &RenderConfig) {
    let mut reasoning: Vec<(Option<&str>, &str)> = Vec::new();

    for block in blocks {
        if let Block::Reasoning { title, body } = block {
            reasoning.push((title.as_deref(), body.as_str()));
            continue;
        }
        render_reasoning(out, &reasoning, config);
        reasoning.clear();

        match block {
            Block::Prose(text) => {
                let text = text.trim_end();
                if !text.is_empty() {
                    writeln!(out, "{}\n", escape_prose(text)).unwrap();
                }
            }
            Block::Reference(reference) => writeln!(out, "{reference}\n").unwrap(),
            Block::Edit { path, content } => render_edit(out, path, content, config),
            Block::Tool(tool) => render_tool(out, tool, config),
            Block::Raw { kind, text } => {
                writeln!(out, "<!-- unrecognized response item: {} -->\n", kind.replace("--", "-"))
                    .unwrap();
                if let Some(text) = text {
                    writeln!(out, "{}\n", escape_prose(text.trim_end())).unwrap();
                }
            }
            Block::Reasoning { .. } => unreachable!("reasoning blocks are grouped above"),
        }
    }

    render_reasoning(out, &reasoning, config);
}

/// One titled section of a reasoning group.
struct ReasoningSection<'a> {
    header: Option<&'a str>,
    lines: Vec<&'a str>,
}

impl<'a> ReasoningSection<'a> {
    /// Splits a reasoning segment into an optional header and body lines.
    ///
    /// A bold first line (`**Title**`) wins over the generated title; a body
    /// line repeating the header is dropped, as are blank edge lines.
    fn parse(title: Option<&'a str>, body: &'a str) -> Self {
        let mut lines: Vec<&str> = body.trim().lines().collect();

        let header = match lines.first().copied().and_then(bold_title) {
            Some(bold) => {
                lines.remove(0);
                Some(bold)
            }
            None => title.filter(|t| !t.is_empty()),
        };

        if let (Some(header), Some(first)) = (header, lines.first().copied()) {
            let first = first.trim();
            if first == header || bold_title(first) == Some(header) {
                lines.remove(0);
            }
        }

        while lines.first().is_some_and(|l| l.trim().is_empty()) {
            lines.remove(0);
        }
        while lines.last().is_some_and(|l| l.trim().is_empty()) {
            lines.pop();
        }

        Self { header, lines }
    }

    fn is_empty(&self) -> bool {
        self.header.is_none() && self.lines.is_empty()
    }
}

/// Returns the inner text of a `**bold**` line.
fn bold_title(line: &str) -> Option<&str> {
    let line = line.trim();
    line.strip_prefix("**")?
        .strip_suffix("**")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Picks the summary for a reasoning group: the last segment that has a
/// title, generated or bold.
fn reasoning_summary<'a>(group: &[(Option<&'a str>, &'a str)]) -> &'a str {
    group
        .iter()
        .rev()
        .find_map(|(title, body)| {
            title
                .filter(|t| !t.is_empty())
                .or_else(|| body.trim().lines().next().and_then(bold_title))
        })
        .unwrap_or(DEFAULT_REASONING_TITLE)
}

fn render_reasoning(out: &mut String, group: &[(Option<&str>, &str)], config: &RenderConfig) {
    if group.is_empty() {
        return;
    }

    let sections: Vec<ReasoningSection<'_>> = group
        .iter()
        .map(|(title, body)| ReasoningSection::parse(*title, body))
        .filter(|s| !s.is_empty())
        .collect();
    if sections.is_empty() {
        return;
    }

    match config.reasoning {
        ReasoningStyle::CodeBlock => {
            let body = sections
                .iter()
                .map(|s| {
                    let mut text = String::new();
                    if let Some(header) = s.header {
                        write!(text, "**{header}**").unwrap();
                        if !s.lines.is_empty() {
                            text.push_str("\n\n");
                        }
                    }
                    text.push_str(&s.lines.join("\n"));
                    text
                })
                .collect::<Vec<_>>()
                .join("\n\n");
            let fence = fence_for(&body);
            writeln!(out, "\n{fence}thinking\n{body}\n{fence}\n").unwrap();
        }
        ReasoningStyle::Collapsible => {
            let body = sections
                .iter()
                .map(|s| {
                    let mut quoted: Vec<String> = Vec::new();
                    if let Some(header) = s.header {
                        quoted.push(format!("> **{}**", escape_xml_tags(header)));
                        if !s.lines.is_empty() {
                            quoted.push(">".to_owned());
                        }
                    }
                    quoted.extend(s.lines.iter().map(|l| {
                        if l.is_empty() {
                            ">".to_owned()
                        } else {
                            format!("> {}", escape_xml_tags(l))
                        }
                    }));
                    quoted.join("\n")
                })
                .collect::<Vec<_>>()
                .join("\n>\n");
            let summary = escape_xml_tags(reasoning_summary(group));
            writeln!(
                out,
                "\n<details>\n<summary>{summary}</summary>\n\n{body}\n\n</details>\n"
            )
            .unwrap();
        }
    }
}

fn render_edit(out: &mut String, path: &str, content: &str, config: &RenderConfig) {
    let display = escape_for_inline_code(path);
    match config.edits {
        EditVisibility::Hidden => {
            writeln!(out, "> **Editing File:** `{display}`\n").unwrap();
        }
        EditVisibility::Folded => {
            writeln!(
                out,
                "\n<details>\n<summary>Editing File: <code>{}</code></summary>\n",
                escape_xml_tags(path)
            )
            .unwrap();
            write_code_block(out, &language_for(path), content);
            out.push_str("\n</details>\n\n");
        }
        EditVisibility::Full => {
            writeln!(out, "**Editing File:** `{display}`\n").unwrap();
            write_code_block(out, &language_for(path), content);
            out.push('\n');
        }
    }
}

fn render_tool(out: &mut String, tool: &ToolBlock, config: &RenderConfig) {
    if config.timestamps
        && let Some(time) = tool
            .timestamp
            .and_then(|ts| format_timestamp(ts, "%Y-%m-%d %H:%M:%S UTC"))
    {
        writeln!(out, "> **Time:** {time}\n").unwrap();
    }

    // A hidden edit already prints its path; the patch action would repeat it.
    let suppress_action = tool.is_apply_patch() && config.edits == EditVisibility::Hidden;
    if !suppress_action {
        match &tool.action {
            Some(action) => writeln!(out, "> **Action:** {}\n", escape_xml_tags(action)).unwrap(),
            None if tool.name != UNKNOWN_TOOL => {
                writeln!(out, "> **Action:** {}\n", escape_xml_tags(&tool.name)).unwrap();
            }
            None => {}
        }
    }

    match &tool.output {
        Some(ToolOutput::Terminal { command, output }) => {
            if !command.is_empty() {
                out.push_str("Command:\n");
                write_code_block(out, "bash", command);
            }
            if !output.is_empty() {
                out.push_str("Output:\n");
                write_code_block(out, "bash", output);
            }
            out.push('\n');
        }
        Some(ToolOutput::Todo(items)) => {
            out.push_str("**Todo List Updated:**\n");
            for item in items {
                writeln!(out, "- [{}] {}", item.status, escape_xml_tags(&item.title)).unwrap();
            }
            out.push('\n');
        }
        None => {}
    }
}

/// Writes `content` in a fence long enough not to be closed by the content.
fn write_code_block(out: &mut String, language: &str, content: &str) {
    let fence = fence_for(content);
    writeln!(out, "{fence}{language}").unwrap();
    out.push_str(content);
    if !content.is_empty() && !content.ends_with('\n') {
        out.push('\n');
    }
    writeln!(out, "{fence}").unwrap();
}

/// Returns a backtick fence longer than any backtick run in `content`.
fn fence_for(content: &str) -> String {
    let longest = content
        .split(|c: char| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat(longest.max(2) + 1)
}

/// Uses the file extension as the code block's info string.
fn language_for(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_owned()
}

/// Escapes XML-like tags outside fenced code blocks.
fn escape_prose(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut in_fence = false;

    for line in s.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            result.push_str(line);
        } else if in_fence {
            result.push_str(line);
        } else {
            result.push_str(&escape_xml_tags(line));
        }
    }

    result
}

/// Escapes XML/HTML-like tags so they render literally in Markdown.
///
/// Uses HTML entities (`&lt;` `&gt;`) which are more reliably rendered across
/// markdown viewers. Only escapes `<` when followed by a letter, `/`, or `!`
/// to avoid false positives on mathematical comparisons like `x < 5`.
fn escape_xml_tags(s: &str) -> String {
    let mut result = String::with_capacity(s.len() * 2);
    let mut chars = s.chars().peekable();
    let mut in_tag = false;

    while let Some(c) = chars.next() {
        if c == '<' {
            let is_tag_start = chars
                .peek()
                .is_some_and(|&next| next.is_ascii_alphabetic() || next == '/' || next == '!');

            if is_tag_start {
                result.push_str("&lt;");
                in_tag = true;
            } else {
                result.push(c);
            }
        } else if c == '>' && in_tag {
            result.push_str("&gt;");
            in_tag = false;
        } else {
            result.push(c);
        }
    }

    result
}
