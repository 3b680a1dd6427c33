// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Output file layout and the filesystem side of a run.
//!
//! For an output path like `docs/chat.md` the turn files are
//! `docs/chat_turn_1.md`, `docs/chat_turn_2-3.md`, ..., the session state
//! lives in `docs/chat.session`, and archives go to
//! `docs/archive_YYYYMMDD_HHMMSS/`.

use crate::session::SessionToken;
use snafu::prelude::*;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Extension used when the output path has none.
const DEFAULT_EXTENSION: &str = ".md";

/// Error type for filesystem operations on the output location.
#[derive(Debug, Snafu)]
pub enum StorageError {
    /// The output directory could not be created.
    #[snafu(display("failed to create output directory {}: {source}", path.display()))]
    CreateDir {
        /// Directory that could not be created.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The output directory could not be listed.
    #[snafu(display("failed to list {}: {source}", path.display()))]
    ListDir {
        /// Directory being listed.
        path: PathBuf,
        /// The underlying traversal error.
        source: walkdir::Error,
    },

    /// An existing turn file could not be moved into the archive.
    #[snafu(display("failed to archive {} into {}: {source}", from.display(), to.display()))]
    Archive {
        /// File being moved.
        from: PathBuf,
        /// Destination path.
        to: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The session file could not be written.
    #[snafu(display("failed to save session state to {}: {source}", path.display()))]
    SaveSession {
        /// Session file path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A turn file could not be written.
    #[snafu(display("failed to write {}: {source}", path.display()))]
    WriteTurn {
        /// Turn file path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

/// Where a run's files go, derived from the requested output path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    dir: PathBuf,
    base: String,
    extension: String,
}

impl OutputLayout {
    /// Splits `output` into directory, base name, and extension.
    ///
    /// # Example
    ///
    /// ```
    /// use cpturns::output::OutputLayout;
    /// use std::path::Path;
    ///
    /// let layout = OutputLayout::from_output_path(Path::new("notes/chat.md"));
    /// assert_eq!(layout.turn_path("2-3"), Path::new("notes/chat_turn_2-3.md"));
    /// assert_eq!(layout.session_path(), Path::new("notes/chat.session"));
    /// ```
    #[must_use]
    pub fn from_output_path(output: &Path) -> Self {
        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let base = output
            .file_stem()
            .map_or_else(|| "chat".to_owned(), |s| s.to_string_lossy().into_owned());
        let extension = output
            .extension()
            .map_or_else(|| DEFAULT_EXTENSION.to_owned(), |e| format!(".{}", e.to_string_lossy()));

        Self {
            dir,
            base,
            extension,
        }
    }

    /// Directory holding the outputs.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file for the turn labeled `label`.
    #[must_use]
    pub fn turn_path(&self, label: &str) -> PathBuf {
        self.dir.join(self.turn_file_name(label))
    }

    fn turn_file_name(&self, label: &str) -> String {
        format!("{}_turn_{label}{}", self.base, self.extension)
    }

    /// Path of the session state file.
    #[must_use]
    pub fn session_path(&self) -> PathBuf {
        self.dir.join(format!("{}.session", self.base))
    }

    /// Whether `name` looks like one of this layout's turn files.
    fn is_turn_file_name(&self, name: &str) -> bool {
        let prefix = format!("{}_turn_", self.base);
        name.strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(&self.extension))
            .is_some_and(|label| !label.is_empty())
    }
}

/// Creates the output directory if needed.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_dir(layout: &OutputLayout) -> Result<(), StorageError> {
    std::fs::create_dir_all(layout.dir()).context(CreateDirSnafu { path: layout.dir() })
}

/// Reads the persisted session token.
///
/// A missing, unreadable, or malformed file yields `None`.
#[must_use]
pub fn read_session(layout: &OutputLayout) -> Option<SessionToken> {
    let path = layout.session_path();
    match std::fs::read_to_string(&path) {
        Ok(contents) => {
            let token = SessionToken::parse_persisted(&contents);
            if token.is_none() {
                debug!(path = %path.display(), "ignoring malformed session file");
            }
            token
        }
        Err(err) => {
            debug!(path = %path.display(), %err, "no readable session file");
            None
        }
    }
}

/// Persists `token`, replacing any previous value.
///
/// # Errors
///
/// Returns an error if the session file cannot be written.
pub fn write_session(layout: &OutputLayout, token: &SessionToken) -> Result<(), StorageError> {
    let path = layout.session_path();
    std::fs::write(&path, token.as_str()).context(SaveSessionSnafu { path: &path })
}

/// Lists existing turn files of this layout, sorted by name.
///
/// # Errors
///
/// Returns an error if the output directory cannot be read.
pub fn existing_turn_files(layout: &OutputLayout) -> Result<Vec<PathBuf>, StorageError> {
    if !layout.dir().is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(layout.dir()).min_depth(1).max_depth(1) {
        let entry = entry.context(ListDirSnafu { path: layout.dir() })?;
        if entry.file_type().is_file()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| layout.is_turn_file_name(name))
        {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Turn files moved by [`archive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archived {
    /// The directory actually created.
    pub dir: PathBuf,
    /// New paths of the moved files, sorted by name.
    pub files: Vec<PathBuf>,
}

/// Moves every existing turn file into a new directory named `dir_name`
/// under the output directory.
///
/// Files are renamed, never copied and deleted, so an interrupted archive
/// leaves each file either in place or in the archive. An earlier archive is
/// never reused: if `dir_name` already exists, `dir_name_2`, `dir_name_3`,
/// ... are tried instead.
///
/// # Errors
///
/// Returns the first failure; files already moved stay in the archive.
pub fn archive(layout: &OutputLayout, dir_name: &str) -> Result<Archived, StorageError> {
    let files = existing_turn_files(layout)?;
    let archive_dir = create_fresh_dir(layout.dir(), dir_name)?;

    let mut moved = Vec::with_capacity(files.len());
    for from in files {
        let Some(name) = from.file_name() else {
            continue;
        };
        let to = archive_dir.join(name);
        std::fs::rename(&from, &to).context(ArchiveSnafu {
            from: &from,
            to: &to,
        })?;
        moved.push(to);
    }

    info!(count = moved.len(), dir = %archive_dir.display(), "archived previous session");
    Ok(Archived {
        dir: archive_dir,
        files: moved,
    })
}

/// Creates `parent/name`, or the first free `parent/name_N` for N >= 2.
fn create_fresh_dir(parent: &Path, name: &str) -> Result<PathBuf, StorageError> {
    let mut candidate = parent.join(name);
    let mut attempt = 1_u32;
    loop {
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                attempt += 1;
                debug!(dir = %candidate.display(), "archive directory taken");
                candidate = parent.join(format!("{name}_{attempt}"));
            }
            Err(source) => {
                return Err(StorageError::CreateDir {
                    path: candidate,
                    source,
                });
            }
        }
    }
}

/// Writes one turn document.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_turn(path: &Path, markdown: &str) -> Result<(), StorageError> {
    std::fs::write(path, markdown).context(WriteTurnSnafu { path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn derives_layout_from_output_path() {
        let layout = OutputLayout::from_output_path(Path::new("out/log.txt"));

        assert_eq!(layout.dir(), Path::new("out"));
        assert_eq!(layout.turn_path("1"), Path::new("out/log_turn_1.txt"));
        assert_eq!(layout.session_path(), Path::new("out/log.session"));
    }

    #[test]
    fn bare_file_name_uses_current_dir_and_default_extension() {
        let layout = OutputLayout::from_output_path(Path::new("chat"));

        assert_eq!(layout.dir(), Path::new("."));
        assert_eq!(layout.turn_path("4-5"), Path::new("./chat_turn_4-5.md"));
    }

    #[test]
    fn matches_only_own_turn_files() {
        let layout = OutputLayout::from_output_path(Path::new("chat.md"));

        assert!(layout.is_turn_file_name("chat_turn_1.md"));
        assert!(layout.is_turn_file_name("chat_turn_6-8.md"));
        assert!(!layout.is_turn_file_name("chat_turn_.md"));
        assert!(!layout.is_turn_file_name("other_turn_1.md"));
        assert!(!layout.is_turn_file_name("chat_turn_1.txt"));
        assert!(!layout.is_turn_file_name("chat.md"));
    }

    #[test]
    fn session_round_trip_and_fail_open() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = OutputLayout::from_output_path(&tmp.path().join("chat.md"));

        assert_eq!(read_session(&layout), None);

        write_session(&layout, &SessionToken::new("request_1")).unwrap();
        assert_eq!(read_session(&layout), Some(SessionToken::new("request_1")));

        fs::write(layout.session_path(), "a\nb\n").unwrap();
        assert_eq!(read_session(&layout), None);
    }

    #[test]
    fn archive_moves_turn_files_only() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = OutputLayout::from_output_path(&tmp.path().join("chat.md"));
        for name in ["chat_turn_1.md", "chat_turn_2-3.md", "notes.md", "chat.session"] {
            fs::write(tmp.path().join(name), name).unwrap();
        }

        let archived = archive(&layout, "archive_20250101_000000").unwrap();
        let moved = archived.files;

        let archive_dir = tmp.path().join("archive_20250101_000000");
        assert_eq!(archived.dir, archive_dir);
        assert_eq!(
            moved,
            [
                archive_dir.join("chat_turn_1.md"),
                archive_dir.join("chat_turn_2-3.md"),
            ]
        );
        assert_eq!(fs::read_to_string(&moved[0]).unwrap(), "chat_turn_1.md");
        assert!(!tmp.path().join("chat_turn_1.md").exists());
        assert!(tmp.path().join("notes.md").exists());
        assert!(tmp.path().join("chat.session").exists());
    }

    #[test]
    fn archive_never_reuses_an_existing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = OutputLayout::from_output_path(&tmp.path().join("chat.md"));
        let turn = layout.turn_path("1");

        fs::write(&turn, "from A").unwrap();
        let first = archive(&layout, "archive_20250101_000000").unwrap();
        fs::write(&turn, "from B").unwrap();
        let second = archive(&layout, "archive_20250101_000000").unwrap();
        fs::write(&turn, "from C").unwrap();
        let third = archive(&layout, "archive_20250101_000000").unwrap();

        assert_eq!(first.dir, tmp.path().join("archive_20250101_000000"));
        assert_eq!(second.dir, tmp.path().join("archive_20250101_000000_2"));
        assert_eq!(third.dir, tmp.path().join("archive_20250101_000000_3"));
        for (archived, text) in [(first, "from A"), (second, "from B"), (third, "from C")] {
            assert_eq!(fs::read_to_string(&archived.files[0]).unwrap(), text);
        }
    }

    #[test]
    fn archive_fails_when_directory_cannot_be_created() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = OutputLayout::from_output_path(&tmp.path().join("chat.md"));
        fs::write(layout.turn_path("1"), "keep").unwrap();

        let err = archive(&layout, "missing/archive_20250101_000000").unwrap_err();

        assert!(matches!(err, StorageError::CreateDir { .. }));
        assert_eq!(fs::read_to_string(layout.turn_path("1")).unwrap(), "keep");
    }

    #[test]
    fn existing_files_of_missing_dir_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = OutputLayout::from_output_path(&tmp.path().join("missing/chat.md"));

        assert!(existing_turn_files(&layout).unwrap().is_empty());
    }
}
