//! Call-stack attribution
//!
//! Walks the host runtime's live stack innermost-first and returns the first
//! frame whose source file the active [`PathFilter`] puts in scope. When no
//! frame qualifies, or the stack cannot be inspected at all, the sentinel
//! `("<BOGUS>", 1, 0)` location is returned with `found = false`.

use crate::filter::{is_interactive_source, FilterError, PathFilter, SELF_MODULE_MARKER};
use crate::frames::{StackLocation, StackSource, WalkControl};
use crate::registry;
use tracing::trace;

/// Interpreter-install marker used by the cheap pre-rejection. Deliberately
/// broader than the filter's `/lib/python`: any interpreter-adjacent path is
/// skipped before paying for a filter consultation.
const RUNTIME_PATH_MARKER: &str = "/python";

/// Attribute the current sample using the process-wide active filter.
///
/// The filter snapshot is taken once per call; a concurrent replacement
/// affects the next call, never a walk in progress. With no filter installed
/// the result is the sentinel (profiling effectively disabled).
pub fn locate(source: &dyn StackSource) -> Result<StackLocation, FilterError> {
    let filter = registry::current();
    locate_with(source, filter.as_deref())
}

/// Attribute the current sample against an explicit filter snapshot.
///
/// Per frame, innermost first: an undecodable filename aborts the whole walk
/// with the sentinel (the stack cannot be trusted past it); an empty
/// filename skips the frame; synthetic, interpreter-install, and self-module
/// paths are skipped without consulting the filter; otherwise the filter
/// decides, and the first match wins. A fatal filter error (canonical-path
/// resolution failure) propagates as `Err`.
pub fn locate_with(
    source: &dyn StackSource,
    filter: Option<&PathFilter>,
) -> Result<StackLocation, FilterError> {
    if !source.ready() {
        return Ok(StackLocation::unresolved());
    }
    let Some(filter) = filter else {
        return Ok(StackLocation::unresolved());
    };

    let mut outcome: Result<StackLocation, FilterError> = Ok(StackLocation::unresolved());
    source.walk(&mut |frame| {
        let filename = match frame.source_file() {
            Some(name) => name,
            // Stack unreadable: do not resume past a frame we cannot decode.
            None => return WalkControl::Stop,
        };
        if filename.is_empty() {
            return WalkControl::Continue;
        }
        if cheap_reject(&filename) {
            return WalkControl::Continue;
        }
        match filter.should_trace(&filename) {
            Ok(true) => {
                let offset = frame.instruction_offset();
                let line = frame.line_for_offset(offset);
                outcome = Ok(StackLocation::resolved(filename, line, offset));
                WalkControl::Stop
            }
            Ok(false) => WalkControl::Continue,
            Err(err) => {
                outcome = Err(err);
                WalkControl::Stop
            }
        }
    });

    if let Ok(location) = &outcome {
        if !location.found {
            trace!("no traceable frame on the stack");
        }
    }
    outcome
}

/// Frames skippable without a filter consultation: synthetic sources other
/// than interactive ones, interpreter installs, and the profiler itself.
/// The exemption is exactly the filter's interactive rule, so every `<` name
/// that rule would not admit is skipped here instead of reaching the
/// filesystem fallback.
fn cheap_reject(filename: &str) -> bool {
    (filename.contains('<') && !is_interactive_source(filename))
        || filename.contains(RUNTIME_PATH_MARKER)
        || filename.contains(SELF_MODULE_MARKER)
}
