// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! One conversion run, from parsed export to files on disk.
//!
//! The run is split into a pure planning half ([`plan_session`],
//! [`render_chat`]) and [`write_outputs`], which performs the archive, the
//! turn writes, and the session save in that order.

use crate::config::RenderConfig;
use crate::output::{self, Archived, OutputLayout, StorageError};
use crate::parser::ChatExport;
use crate::paths::PathNormalizer;
use crate::renderer::render_turn;
use crate::session::{self, ArchiveRecord, SessionStatus, SessionToken};
use crate::stream::Processor;
use crate::turns::extract_turns;
use chrono::{DateTime, TimeZone};
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

/// The session decision for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPlan {
    /// Token of the current export, if it has one.
    pub token: Option<SessionToken>,
    /// Relation to the previous run.
    pub status: SessionStatus,
    /// What to do with existing turn files.
    pub archive: ArchiveRecord,
}

/// A rendered turn ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTurn {
    /// `N` or `N-M`.
    pub label: String,
    /// The Markdown document.
    pub markdown: String,
}

/// Outcome of [`write_outputs`].
#[derive(Debug, Default)]
pub struct RunReport {
    /// Where earlier turn files went, when the run archived.
    pub archived: Option<Archived>,
    /// Turn files written.
    pub written: Vec<PathBuf>,
    /// Turn files that could not be written.
    pub failed: Vec<StorageError>,
}

/// Decides whether existing outputs must be archived before writing.
///
/// An export without a session token never archives.
#[must_use]
pub fn plan_session<Tz>(chat: &ChatExport, layout: &OutputLayout, now: &DateTime<Tz>) -> SessionPlan
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let token = SessionToken::from_export(chat);
    let status = token.as_ref().map_or(SessionStatus::NoPriorState, |current| {
        session::compare(current, output::read_session(layout).as_ref())
    });
    let archive = session::plan_archive(status, now);
    info!(?status, ?archive, "session check");

    SessionPlan {
        token,
        status,
        archive,
    }
}

/// Extracts and renders every turn of `chat`.
#[must_use]
pub fn render_chat(
    chat: &ChatExport,
    config: &RenderConfig,
    paths: &PathNormalizer,
) -> Vec<RenderedTurn> {
    let processor = Processor::new(paths, config);
    extract_turns(chat, &processor)
        .iter()
        .map(|turn| RenderedTurn {
            label: turn.label(),
            markdown: render_turn(turn, config),
        })
        .collect()
}

/// Archives (when planned), writes every turn, then saves the session token.
///
/// # Errors
///
/// Fails before anything is written if the output directory cannot be
/// created or the archive step fails. Individual turn write failures are
/// collected in [`RunReport::failed`] instead.
pub fn write_outputs(
    plan: &SessionPlan,
    turns: &[RenderedTurn],
    layout: &OutputLayout,
) -> Result<RunReport, StorageError> {
    output::ensure_dir(layout)?;

    let mut report = RunReport::default();
    if let ArchiveRecord::Archive { dir_name } = &plan.archive {
        report.archived = Some(output::archive(layout, dir_name)?);
    }

    for turn in turns {
        let path = layout.turn_path(&turn.label);
        match output::write_turn(&path, &turn.markdown) {
            Ok(()) => report.written.push(path),
            Err(err) => {
                warn!(%err, "skipping turn");
                report.failed.push(err);
            }
        }
    }

    if let Some(token) = &plan.token
        && let Err(err) = output::write_session(layout, token)
    {
        warn!(%err, "session state not saved");
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_chat;
    use chrono::Utc;

    fn chat(first_id: &str) -> ChatExport {
        parse_chat(&format!(
            r#"{{"requests": [
                {{"requestId": "{first_id}", "message": {{"text": "Plan it"}}, "response": [{{"value": "ok"}}]}},
                {{"requestId": "r2", "message": {{"text": "Continue"}}, "response": [{{"value": "more"}}]}},
                {{"requestId": "r3", "message": {{"text": "Ship it"}}, "response": []}}
            ]}}"#
        ))
        .unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap()
    }

    #[test]
    fn renders_labels_in_order() {
        let turns = render_chat(&chat("r1"), &RenderConfig::default(), &PathNormalizer::default());
        let labels: Vec<_> = turns.iter().map(|t| t.label.as_str()).collect();

        assert_eq!(labels, ["1-2", "3"]);
        assert!(turns[0].markdown.contains("# Turn 2"));
    }

    #[test]
    fn first_run_has_no_prior_state() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = OutputLayout::from_output_path(&tmp.path().join("chat.md"));

        let plan = plan_session(&chat("r1"), &layout, &now());
        assert_eq!(plan.status, SessionStatus::NoPriorState);
        assert_eq!(plan.archive, ArchiveRecord::NoAction);
    }

    #[test]
    fn empty_export_never_archives() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = OutputLayout::from_output_path(&tmp.path().join("chat.md"));
        output::write_session(&layout, &SessionToken::new("old")).unwrap();

        let plan = plan_session(&ChatExport::default(), &layout, &now());
        assert_eq!(plan.token, None);
        assert_eq!(plan.archive, ArchiveRecord::NoAction);
    }

    #[test]
    fn new_session_archives_before_writing() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = OutputLayout::from_output_path(&tmp.path().join("chat.md"));
        let config = RenderConfig::default();

        let first = chat("session-a");
        let plan = plan_session(&first, &layout, &now());
        let turns = render_chat(&first, &config, &PathNormalizer::default());
        let report = write_outputs(&plan, &turns, &layout).unwrap();
        assert_eq!(report.written.len(), 2);
        assert_eq!(report.archived, None);

        let second = chat("session-b");
        let plan = plan_session(&second, &layout, &now());
        assert_eq!(plan.status, SessionStatus::NewSession);
        let turns = render_chat(&second, &config, &PathNormalizer::default());
        let report = write_outputs(&plan, &turns, &layout).unwrap();

        let archive_dir = tmp.path().join("archive_20250102_030405");
        assert_eq!(report.archived.map(|a| a.files.len()), Some(2));
        assert!(archive_dir.join("chat_turn_1-2.md").exists());
        assert!(archive_dir.join("chat_turn_3.md").exists());
        assert!(tmp.path().join("chat_turn_1-2.md").exists());
        assert_eq!(
            output::read_session(&layout),
            Some(SessionToken::new("session-b"))
        );
    }

    #[test]
    fn failed_archive_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = OutputLayout::from_output_path(&tmp.path().join("chat.md"));
        std::fs::write(layout.turn_path("3"), "old turn").unwrap();
        output::write_session(&layout, &SessionToken::new("old")).unwrap();

        let plan = SessionPlan {
            token: Some(SessionToken::new("new")),
            status: SessionStatus::NewSession,
            archive: ArchiveRecord::Archive {
                dir_name: "missing/archive_20250102_030405".into(),
            },
        };
        let turns = render_chat(&chat("new"), &RenderConfig::default(), &PathNormalizer::default());

        let err = write_outputs(&plan, &turns, &layout).unwrap_err();

        assert!(matches!(err, StorageError::CreateDir { .. }));
        assert!(!layout.turn_path("1-2").exists());
        assert_eq!(std::fs::read_to_string(layout.turn_path("3")).unwrap(), "old turn");
        assert_eq!(output::read_session(&layout), Some(SessionToken::new("old")));
    }

    #[test]
    fn failed_turn_write_keeps_the_others() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = OutputLayout::from_output_path(&tmp.path().join("chat.md"));
        std::fs::create_dir(layout.turn_path("1-2")).unwrap();

        let export = chat("r1");
        let plan = plan_session(&export, &layout, &now());
        let turns = render_chat(&export, &RenderConfig::default(), &PathNormalizer::default());
        let report = write_outputs(&plan, &turns, &layout).unwrap();

        assert_eq!(report.written, [layout.turn_path("3")]);
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(report.failed[0], StorageError::WriteTurn { .. }));
        assert!(layout.turn_path("3").is_file());
        assert_eq!(output::read_session(&layout), Some(SessionToken::new("r1")));
    }

    #[test]
    fn same_session_overwrites_in_place() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = OutputLayout::from_output_path(&tmp.path().join("chat.md"));
        let config = RenderConfig::default();
        let export = chat("same");

        for _ in 0..2 {
            let plan = plan_session(&export, &layout, &now());
            let turns = render_chat(&export, &config, &PathNormalizer::default());
            write_outputs(&plan, &turns, &layout).unwrap();
        }

        assert!(!tmp.path().join("archive_20250102_030405").exists());
        assert!(tmp.path().join("chat_turn_3.md").exists());
    }
}
