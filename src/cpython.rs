//! Live CPython frame-chain backend
//!
//! Implements [`StackSource`] over an in-process CPython interpreter using
//! the raw C API. The interpreter's global lock is held for the whole walk:
//! the frame chain is live, mutable state that other interpreter threads may
//! push, pop, or garbage-collect at any moment. Attribute access is used for
//! `co_filename` and `f_lasti` rather than struct field offsets, since the
//! frame and code layouts are opaque on recent CPython versions.

use crate::frames::{FrameInfo, StackSource, WalkControl};
use pyo3::ffi;
use std::ffi::CStr;
use std::os::raw::{c_char, c_int};

const FILENAME_ATTR: &[u8] = b"co_filename\0";
const LASTI_ATTR: &[u8] = b"f_lasti\0";

/// RAII acquisition of the interpreter's global lock. Released on every exit
/// path, including an aborted walk.
struct GilGuard {
    state: ffi::PyGILState_STATE,
}

impl GilGuard {
    fn acquire() -> Self {
        Self {
            state: unsafe { ffi::PyGILState_Ensure() },
        }
    }
}

impl Drop for GilGuard {
    fn drop(&mut self) {
        unsafe { ffi::PyGILState_Release(self.state) };
    }
}

/// The live interpreter's call stack for the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct CPythonStack;

impl StackSource for CPythonStack {
    /// No interpreter, or a thread the interpreter has never seen, means no
    /// stack to inspect. Both checks are cheap and safe pre-GIL.
    fn ready(&self) -> bool {
        unsafe {
            ffi::Py_IsInitialized() != 0 && !ffi::PyGILState_GetThisThreadState().is_null()
        }
    }

    fn walk(&self, visit: &mut dyn FnMut(&dyn FrameInfo) -> WalkControl) {
        let _gil = GilGuard::acquire();
        unsafe {
            // PyEval_GetFrame returns a borrowed reference; take our own so
            // the loop below uniformly owns the frame it is inspecting.
            let mut frame = ffi::PyEval_GetFrame();
            if frame.is_null() {
                return;
            }
            ffi::Py_IncRef(frame.cast());

            while !frame.is_null() {
                let view = FrameView { frame };
                if visit(&view) == WalkControl::Stop {
                    ffi::Py_DecRef(frame.cast());
                    return;
                }
                // PyFrame_GetBack hands back a strong reference (or null at
                // the outermost frame).
                let caller = ffi::PyFrame_GetBack(frame);
                ffi::Py_DecRef(frame.cast());
                frame = caller;
            }
        }
    }
}

/// Non-owning view of one interpreter frame, valid only while the walk holds
/// the GIL.
struct FrameView {
    frame: *mut ffi::PyFrameObject,
}

impl FrameInfo for FrameView {
    fn source_file(&self) -> Option<String> {
        unsafe {
            let code = ffi::PyFrame_GetCode(self.frame);
            if code.is_null() {
                return None;
            }
            let filename =
                ffi::PyObject_GetAttrString(code.cast(), FILENAME_ATTR.as_ptr().cast::<c_char>());
            ffi::Py_DecRef(code.cast());
            if filename.is_null() {
                ffi::PyErr_Clear();
                return None;
            }
            let ascii = ffi::PyUnicode_AsASCIIString(filename);
            ffi::Py_DecRef(filename);
            if ascii.is_null() {
                // Not representable as a plain narrow string; the locator
                // treats this as an unreadable stack.
                ffi::PyErr_Clear();
                return None;
            }
            let chars = ffi::PyBytes_AsString(ascii);
            let decoded = if chars.is_null() {
                ffi::PyErr_Clear();
                None
            } else {
                Some(CStr::from_ptr(chars).to_string_lossy().into_owned())
            };
            ffi::Py_DecRef(ascii);
            decoded
        }
    }

    fn instruction_offset(&self) -> u32 {
        unsafe {
            let lasti =
                ffi::PyObject_GetAttrString(self.frame.cast(), LASTI_ATTR.as_ptr().cast::<c_char>());
            if lasti.is_null() {
                ffi::PyErr_Clear();
                return 0;
            }
            let value = ffi::PyLong_AsLong(lasti);
            ffi::Py_DecRef(lasti);
            if value < 0 {
                // -1 means the frame has not started executing; substitute 0
                // and let the line lookup do its best.
                ffi::PyErr_Clear();
                0
            } else {
                value as u32
            }
        }
    }

    fn line_for_offset(&self, offset: u32) -> u32 {
        unsafe {
            let code = ffi::PyFrame_GetCode(self.frame);
            if code.is_null() {
                return 1;
            }
            let line = ffi::PyCode_Addr2Line(code, offset as c_int);
            ffi::Py_DecRef(code.cast());
            if line < 1 {
                1
            } else {
                line as u32
            }
        }
    }
}
