//! Path classification for sample attribution
//!
//! Decides which source files a sample may be attributed to. The policy is an
//! ordered list of rules, first match wins:
//!
//! 1. Library installs (`site-packages`, `/lib/python`) are never traceable,
//!    even when a configured fragment would match them.
//! 2. Interactive synthetic sources (`<ipython...>`) are always traceable.
//! 3. The profiler's own module is never traceable.
//! 4. Any configured fragment substring-matches the filename -> traceable.
//! 5. Fallback: canonicalize the filename and test it against the project
//!    base path. This is last because it costs a filesystem syscall.

use std::fs;
use std::path::PathBuf;
use thiserror::Error;

/// Path markers identifying standard-library / third-party installs.
pub const LIBRARY_MARKERS: [&str; 2] = ["site-packages", "/lib/python"];

/// Synthetic filenames produced by interactive sessions.
pub const INTERACTIVE_MARKER: &str = "<ipython";

/// Path marker for the profiler's own Python package. Samples landing in our
/// own instrumentation must never be attributed to user code.
pub const SELF_MODULE_MARKER: &str = "sondeo/sondeo";

/// Rule 2 predicate: a synthetic filename produced by an interactive
/// session. Shared with the locator's cheap pre-rejection so the walk skips
/// exactly the synthetic names this rule does not admit.
pub(crate) fn is_interactive_source(filename: &str) -> bool {
    filename.starts_with('<') && filename.contains(INTERACTIVE_MARKER)
}

/// Errors raised by filter construction and classification
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("scope fragment is not a plain ASCII path: {0:?}")]
    NonAsciiFragment(String),

    #[error("base path is not a plain ASCII path: {0:?}")]
    NonAsciiBasePath(String),

    /// Canonical-path resolution failed in the base-path fallback rule.
    /// This is fatal: an unresolvable path at this stage means a broken
    /// assumption (e.g. a file deleted mid-run), and continuing would
    /// silently corrupt attribution. Embedders are expected to abort.
    #[error("failed to resolve {path:?} to a canonical path: {source}")]
    Resolution {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FilterError {
    /// True for errors the embedding process should treat as unrecoverable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FilterError::Resolution { .. })
    }
}

/// Filter describing which source files are in profiling scope
///
/// Immutable after construction: all path data is copied in, so the
/// controlling process's originals need not stay alive. Install via
/// [`crate::registry::install`] to make it the process-wide active filter.
#[derive(Debug, Clone)]
pub struct PathFilter {
    /// Ordered path fragments; a file containing any of them is in scope
    fragments: Vec<String>,
    /// Canonical project root used by the fallback rule
    base_path: String,
    /// Advisory "profile everything" flag from the controlling process.
    /// Not consulted by `should_trace`; surfaced in diagnostics only.
    profile_all: bool,
}

impl PathFilter {
    /// Build a filter from the controlling process's scope description.
    ///
    /// Fragments and the base path must be plain ASCII paths; a single
    /// non-representable entry fails the whole construction, leaving any
    /// previously installed filter untouched.
    pub fn new(
        fragments: Vec<String>,
        base_path: String,
        profile_all: bool,
    ) -> Result<Self, FilterError> {
        for fragment in &fragments {
            if !fragment.is_ascii() {
                return Err(FilterError::NonAsciiFragment(fragment.clone()));
            }
        }
        if !base_path.is_ascii() {
            return Err(FilterError::NonAsciiBasePath(base_path));
        }

        Ok(Self {
            fragments,
            base_path,
            profile_all,
        })
    }

    /// Should a sample in `filename` be attributed to the user's code?
    ///
    /// Rules are evaluated in order; the first one that applies decides.
    /// Only the final fallback touches the filesystem, and a resolution
    /// failure there surfaces as the fatal [`FilterError::Resolution`].
    pub fn should_trace(&self, filename: &str) -> Result<bool, FilterError> {
        // Rule 1: library installs are out, unconditionally. Checked before
        // fragment matches so a fragment can never re-admit vendored code.
        if self.is_library_install(filename) {
            return Ok(false);
        }

        // Rule 2: interactive synthetic sources have no filesystem path and
        // must be admitted before the canonicalization fallback.
        if is_interactive_source(filename) {
            return Ok(true);
        }

        // Rule 3: never attribute samples to the profiler itself.
        if filename.contains(SELF_MODULE_MARKER) {
            return Ok(false);
        }

        // Rule 4: explicit scope fragments, no filesystem access.
        if self.matches_fragment(filename) {
            return Ok(true);
        }

        // Rule 5: resolve and compare against the project root.
        self.under_base_path(filename)
    }

    fn is_library_install(&self, filename: &str) -> bool {
        LIBRARY_MARKERS.iter().any(|m| filename.contains(m))
    }

    fn matches_fragment(&self, filename: &str) -> bool {
        self.fragments.iter().any(|f| filename.contains(f.as_str()))
    }

    fn under_base_path(&self, filename: &str) -> Result<bool, FilterError> {
        let resolved: PathBuf =
            fs::canonicalize(filename).map_err(|source| FilterError::Resolution {
                path: filename.to_string(),
                source,
            })?;
        Ok(resolved.to_string_lossy().contains(&self.base_path))
    }

    /// Configured fragments, in the order the controlling process gave them
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// Canonical project root used by the fallback rule
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// The advisory "profile everything" flag
    pub fn profile_all(&self) -> bool {
        self.profile_all
    }
}
