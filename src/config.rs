// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Presentation modes and the settings derived from them.
//!
//! A run picks exactly one [`Mode`]. Everything mode-dependent is looked up
//! in [`RenderConfig::for_mode`] so the differences between modes live in one
//! table instead of being spread over the formatting code.

use crate::sanitize::Truncation;
use std::fmt;
use std::str::FromStr;

/// Output style selected for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Flat Markdown for feeding to another agent: reasoning in code blocks,
    /// edit contents hidden.
    #[default]
    Agent,
    /// VS Code-like view for people: reasoning and edits folded in
    /// `<details>` blocks, timestamps shown.
    Human,
    /// Like [`Mode::Agent`] but with full edit contents and untruncated
    /// terminal output.
    Fullout,
}

impl Mode {
    /// All modes, in flag order.
    pub const ALL: [Self; 3] = [Self::Agent, Self::Human, Self::Fullout];

    /// The mode's command-line name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Human => "human",
            Self::Fullout => "fullout",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| format!("unknown mode: {s}"))
    }
}

/// How file edits appear in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditVisibility {
    /// Only the edited path is shown.
    Hidden,
    /// Path as a `<details>` summary, content folded inside.
    Folded,
    /// Path followed by the full replacement content.
    Full,
}

/// How reasoning segments appear in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningStyle {
    /// A fenced ```` ```thinking ```` block.
    CodeBlock,
    /// A folded `<details>` block with quoted sections.
    Collapsible,
}

/// Immutable rendering settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderConfig {
    /// The selected mode.
    pub mode: Mode,
    /// Edit presentation.
    pub edits: EditVisibility,
    /// Reasoning presentation.
    pub reasoning: ReasoningStyle,
    /// Terminal output truncation, `None` to keep everything.
    pub truncation: Option<Truncation>,
    /// Whether request and tool timestamps are printed.
    pub timestamps: bool,
    /// Number of heading levels to shift (0-5).
    ///
    /// A value of 0 produces H1/H2 headings (default).
    /// A value of 1 produces H2/H3 headings, useful for embedding.
    pub heading_offset: u8,
}

impl RenderConfig {
    /// Returns the settings table entry for `mode`.
    #[must_use]
    pub fn for_mode(mode: Mode) -> Self {
        let (edits, reasoning, truncation, timestamps) = match mode {
            Mode::Agent => (
                EditVisibility::Hidden,
                ReasoningStyle::CodeBlock,
                Some(Truncation::default()),
                false,
            ),
            Mode::Human => (
                EditVisibility::Folded,
                ReasoningStyle::Collapsible,
                Some(Truncation::default()),
                true,
            ),
            Mode::Fullout => (EditVisibility::Full, ReasoningStyle::CodeBlock, None, false),
        };
        Self {
            mode,
            edits,
            reasoning,
            truncation,
            timestamps,
            heading_offset: 0,
        }
    }

    /// Disables terminal truncation regardless of mode.
    #[must_use]
    pub const fn with_full_terminal(mut self) -> Self {
        self.truncation = None;
        self
    }

    /// Shifts every heading down by `offset` levels.
    #[must_use]
    pub const fn with_heading_offset(mut self, offset: u8) -> Self {
        self.heading_offset = offset;
        self
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self::for_mode(Mode::default())
    }
}
