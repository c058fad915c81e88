//! The interface between the debugger and whoever drives it.
//!
//! A [`DebuggerUI`] shows the [`Feedback`] of the last operation and answers with the next
//! [`Status`], which names exactly one operation of the session.

use crate::breakpoint::BreakpointId;
use crate::errors::Result;
use crate::feedback::Feedback;
use crate::memory::MemoryFormat;

#[cfg(feature = "cli")]
pub mod cli;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// Kill the debuggee and leave
    DebuggerQuit,
    /// No more input; leave without killing the debuggee
    EndOfInput,
    Kill,
    DumpRegisters,
    Continue,
    Step(usize),
    /// Dump a number of words at an address or symbol
    ReadMem(MemoryFormat, usize, String),
    SetBreakpoint(String),
    ListBreakpoints,
    DelBreakpoint(BreakpointId),
    Backtrace,
}

pub trait DebuggerUI {
    fn process(&mut self, feedback: Feedback) -> Result<Status>;
}
