// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Project-root detection and path shortening.
//!
//! Copilot records absolute paths from the machine the chat ran on. When the
//! output lands inside a git checkout, paths under that checkout are rewritten
//! relative to it so the documents stay readable and portable.

use std::path::{Component, Path, PathBuf};

/// Directory whose presence marks a project root.
const ROOT_MARKER: &str = ".git";

/// Walks up from `start` looking for a directory that contains `.git`.
///
/// `start` is made absolute against the current directory first. Returns
/// `None` when no ancestor carries the marker or `start` cannot be resolved.
#[must_use]
pub fn detect_project_root(start: &Path) -> Option<PathBuf> {
    let start = std::path::absolute(start).ok()?;
    let start = normalize(&start);
    start
        .ancestors()
        .find(|dir| dir.join(ROOT_MARKER).exists())
        .map(Path::to_path_buf)
}

/// Rewrites `path` relative to `root` when it is an absolute path under it.
///
/// A trailing `#fragment` (line anchors such as `#L10-L20`) is carried over
/// untouched. Relative paths, paths outside `root`, and any path when `root`
/// is `None` come back unchanged, so applying this twice is the same as
/// applying it once.
///
/// # Example
///
/// ```
/// use cpturns::paths::to_relative_path;
/// use std::path::Path;
///
/// let root = Path::new("/work/project");
/// assert_eq!(to_relative_path("/work/project/src/main.rs#L3", Some(root)), "src/main.rs#L3");
/// assert_eq!(to_relative_path("/etc/hosts", Some(root)), "/etc/hosts");
/// ```
#[must_use]
pub fn to_relative_path(path: &str, root: Option<&Path>) -> String {
    let Some(root) = root else {
        return path.to_owned();
    };
    if path.is_empty() {
        return String::new();
    }

    let (clean, suffix) = match path.rsplit_once('#') {
        Some((clean, fragment)) => (clean, Some(fragment)),
        None => (path, None),
    };

    let clean = Path::new(clean);
    if !clean.is_absolute() {
        return path.to_owned();
    }

    let normalized = normalize(clean);
    let Ok(relative) = normalized.strip_prefix(normalize(root)) else {
        return path.to_owned();
    };

    let mut out = if relative.as_os_str().is_empty() {
        String::from(".")
    } else {
        relative.to_string_lossy().into_owned()
    };
    if let Some(fragment) = suffix {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

/// Shortens paths against a detected project root.
///
/// This is the context value handed to the response processor; it replaces
/// any process-wide notion of "the current project".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathNormalizer {
    root: Option<PathBuf>,
}

impl PathNormalizer {
    /// Creates a normalizer for `root`, or a pass-through one for `None`.
    #[must_use]
    pub const fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    /// Creates a normalizer rooted at the project containing `start`, if any.
    #[must_use]
    pub fn detect(start: &Path) -> Self {
        Self::new(detect_project_root(start))
    }

    /// The detected project root.
    #[must_use]
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// See [`to_relative_path`].
    #[must_use]
    pub fn relative(&self, path: &str) -> String {
        to_relative_path(path, self.root())
    }
}

/// Lexically resolves `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
