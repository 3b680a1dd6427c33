// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Session continuity between runs.
//!
//! Re-exporting the same chat should overwrite the previous turn files, but
//! exporting a different chat to the same place must not clobber them. The
//! first request's id identifies the chat; it is remembered in a small state
//! file and compared on the next run. This module only decides; the moves
//! happen in [`crate::output`].

use crate::parser::ChatExport;
use chrono::{DateTime, TimeZone};
use std::fmt;

/// Identifies the conversation an export belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wraps a raw token. Surrounding whitespace is dropped.
    #[must_use]
    pub fn new(token: &str) -> Self {
        Self(token.trim().to_owned())
    }

    /// Derives the token from the first request's id.
    ///
    /// Returns `None` for an empty export or when the id is missing.
    #[must_use]
    pub fn from_export(chat: &ChatExport) -> Option<Self> {
        chat.requests
            .first()
            .map(|r| r.request_id.trim())
            .filter(|id| !id.is_empty())
            .map(Self::new)
    }

    /// Parses persisted state: exactly one non-empty line.
    ///
    /// Anything else is treated as malformed and yields `None`.
    #[must_use]
    pub fn parse_persisted(contents: &str) -> Option<Self> {
        let trimmed = contents.trim();
        if trimmed.is_empty() || trimmed.contains('\n') {
            return None;
        }
        Some(Self::new(trimmed))
    }

    /// The raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the current export relates to the previous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Same conversation as last time.
    SameSession,
    /// A different conversation than last time.
    NewSession,
    /// Nothing usable was persisted.
    NoPriorState,
}

/// Compares the current token with the persisted one.
#[must_use]
pub fn compare(current: &SessionToken, previous: Option<&SessionToken>) -> SessionStatus {
    match previous {
        None => SessionStatus::NoPriorState,
        Some(prev) if prev == current => SessionStatus::SameSession,
        Some(_) => SessionStatus::NewSession,
    }
}

/// What to do with existing turn files before writing new ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveRecord {
    /// Leave existing files in place.
    NoAction,
    /// Move existing turn files into a new directory first.
    Archive {
        /// Name of the directory to create next to the outputs.
        dir_name: String,
    },
}

/// Decides on archival; only a new session archives.
///
/// The archive directory is named from `now` as `archive_YYYYMMDD_HHMMSS`.
#[must_use]
pub fn plan_archive<Tz>(status: SessionStatus, now: &DateTime<Tz>) -> ArchiveRecord
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    match status {
        SessionStatus::NewSession => ArchiveRecord::Archive {
            dir_name: format!("archive_{}", now.format("%Y%m%d_%H%M%S")),
        },
        SessionStatus::SameSession | SessionStatus::NoPriorState => ArchiveRecord::NoAction,
    }
}
