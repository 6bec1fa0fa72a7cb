//! Host-runtime stack abstraction
//!
//! The locator walks whatever call stack the host managed runtime exposes.
//! [`StackSource`] models that capability: `walk` must hold the runtime's
//! execution lock for the whole traversal and feed frames innermost-first to
//! the visitor, so no frame reference ever escapes the critical section.

use serde::{Deserialize, Serialize};

/// Pseudo-filename attributed to samples with no traceable frame.
pub const SENTINEL_FILE: &str = "<BOGUS>";

/// Where a sample should be attributed
///
/// Produced and consumed per sample, never stored by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackLocation {
    /// Source file of the innermost in-scope frame
    pub file: String,
    /// 1-based line number the instruction offset maps to
    pub line: u32,
    /// Bytecode offset within the frame's code object
    pub instruction_offset: u32,
    /// False when no frame in the stack was in scope
    pub found: bool,
}

impl StackLocation {
    /// The sentinel result: no attributable frame.
    pub fn unresolved() -> Self {
        Self {
            file: SENTINEL_FILE.to_string(),
            line: 1,
            instruction_offset: 0,
            found: false,
        }
    }

    /// A successful attribution.
    pub fn resolved(file: String, line: u32, instruction_offset: u32) -> Self {
        Self {
            file,
            line,
            instruction_offset,
            found: true,
        }
    }
}

/// Visitor verdict for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkControl {
    /// Move outward to the caller frame
    Continue,
    /// Stop the walk
    Stop,
}

/// One activation record as reported by the host runtime
pub trait FrameInfo {
    /// Decode the frame's source-file identifier into plain text.
    /// `None` means the identifier could not be decoded; the locator treats
    /// the whole stack as unreadable from that point.
    fn source_file(&self) -> Option<String>;

    /// Current bytecode offset; 0 on runtimes that cannot report one.
    fn instruction_offset(&self) -> u32;

    /// Best-effort line number for a bytecode offset in this frame.
    fn line_for_offset(&self, offset: u32) -> u32;
}

/// A live call stack the locator can walk
pub trait StackSource {
    /// False when the runtime is not initialized or the calling thread has
    /// no interpreter state. Must be cheap and safe from any context.
    fn ready(&self) -> bool;

    /// Acquire the runtime's execution lock, then feed live frames
    /// innermost-first to `visit` until it returns [`WalkControl::Stop`] or
    /// the stack is exhausted. The lock is released on every exit path.
    fn walk(&self, visit: &mut dyn FnMut(&dyn FrameInfo) -> WalkControl);
}

/// Prerecorded frame for [`ReplayStack`]
#[derive(Debug, Clone)]
pub struct ReplayFrame {
    /// Decoded filename; `None` simulates an undecodable identifier
    pub file: Option<String>,
    /// Bytecode offset reported by the frame
    pub instruction_offset: u32,
    /// Line the offset maps to
    pub line: u32,
}

impl ReplayFrame {
    pub fn new(file: &str, line: u32, instruction_offset: u32) -> Self {
        Self {
            file: Some(file.to_string()),
            instruction_offset,
            line,
        }
    }

    /// A frame whose filename cannot be decoded.
    pub fn undecodable() -> Self {
        Self {
            file: None,
            instruction_offset: 0,
            line: 1,
        }
    }
}

impl FrameInfo for ReplayFrame {
    fn source_file(&self) -> Option<String> {
        self.file.clone()
    }

    fn instruction_offset(&self) -> u32 {
        self.instruction_offset
    }

    fn line_for_offset(&self, _offset: u32) -> u32 {
        self.line
    }
}

/// A [`StackSource`] backed by a prerecorded frame list, innermost first.
/// Used by tests and offline replay of captured stacks; there is no runtime
/// lock to take, so `walk` is a plain iteration.
#[derive(Debug, Clone, Default)]
pub struct ReplayStack {
    frames: Vec<ReplayFrame>,
    not_ready: bool,
}

impl ReplayStack {
    pub fn new(frames: Vec<ReplayFrame>) -> Self {
        Self {
            frames,
            not_ready: false,
        }
    }

    /// A stack whose runtime reports "not initialized / no thread state".
    pub fn unavailable() -> Self {
        Self {
            frames: Vec::new(),
            not_ready: true,
        }
    }
}

impl StackSource for ReplayStack {
    fn ready(&self) -> bool {
        !self.not_ready
    }

    fn walk(&self, visit: &mut dyn FnMut(&dyn FrameInfo) -> WalkControl) {
        for frame in &self.frames {
            if visit(frame) == WalkControl::Stop {
                break;
            }
        }
    }
}
