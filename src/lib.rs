// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Convert GitHub Copilot chat exports to per-turn Markdown documents.
//!
//! This crate reconstructs the turns of a Copilot chat export and renders
//! each one as its own Markdown file, suitable for archiving, diffing, or
//! handing to another agent.
//!
//! # Overview
//!
//! 1. [`parser`] reads the JSON export into typed requests and response items
//! 2. [`turns`] numbers the exchanges and folds "Continue" requests into the
//!    turn before them, using [`stream`] to turn each response into blocks
//! 3. [`renderer`] writes each turn as Markdown in the selected [`config::Mode`]
//! 4. [`session`] and [`output`] decide whether files from a different chat
//!    must be archived, then write the new files
//!
//! # Example
//!
//! ```
//! use cpturns::config::{Mode, RenderConfig};
//! use cpturns::convert::render_chat;
//! use cpturns::parser::parse_chat;
//! use cpturns::paths::PathNormalizer;
//!
//! let chat = parse_chat(r#"{"requests": [
//!     {"message": {"text": "Write a parser"}, "response": [{"value": "Done."}]},
//!     {"message": {"text": "Continue"}, "response": [{"value": "Added tests."}]}
//! ]}"#).unwrap();
//!
//! let turns = render_chat(&chat, &RenderConfig::for_mode(Mode::Agent), &PathNormalizer::default());
//!
//! assert_eq!(turns.len(), 1);
//! assert_eq!(turns[0].label, "1-2");
//! assert!(turns[0].markdown.contains("Added tests."));
//! ```
//!
//! # Modules
//!
//! - [`parser`]: JSON parsing and type definitions for Copilot chat exports
//! - [`sanitize`]: escape-sequence stripping and output truncation
//! - [`paths`]: project-root detection and relative paths
//! - [`stream`]: response items to render blocks
//! - [`turns`]: turn extraction and continuation merging
//! - [`config`]: presentation modes
//! - [`renderer`]: Markdown generation
//! - [`session`]: session continuity decisions
//! - [`output`]: file layout, archiving, and writes
//! - [`convert`]: a whole run

#![deny(missing_docs)]

pub mod config;
pub mod convert;
pub mod output;
pub mod parser;
pub mod paths;
pub mod renderer;
pub mod sanitize;
pub mod session;
pub mod stream;
pub mod turns;
