//! Results of debugger operations, as handed to the UI.

use std::fmt::Display;

use crate::addr::Addr;
use crate::breakpoint::BreakpointId;
use crate::errors::DebuggerError;
use crate::memory::MemoryDump;
use crate::registers::RegisterSet;
use crate::stepper::ExecEvent;
use crate::unwind::Backtrace;

#[derive(Debug)]
pub enum Feedback {
    Ok,
    Error(DebuggerError),
    Registers(RegisterSet),
    /// Everything that happened while the debuggee ran
    Events(Vec<ExecEvent>),
    Memory(MemoryDump),
    BreakpointSet { id: BreakpointId, addr: Addr },
    BreakpointDeleted(BreakpointId),
    Breakpoints(Vec<(BreakpointId, Addr)>),
    Backtrace(Backtrace),
    Killed,
}

impl Display for Feedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Feedback::Ok => write!(f, "Ok")?,
            Feedback::Error(e) => write!(f, "Error: {e}")?,
            Feedback::Registers(regs) => write!(f, "{regs}")?,
            Feedback::Events(events) => {
                for (idx, ev) in events.iter().enumerate() {
                    if idx > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{ev}")?;
                }
            }
            Feedback::Memory(dump) => write!(f, "{dump}")?,
            Feedback::BreakpointSet { id, addr } => write!(f, "breakpoint {id} set at {addr}")?,
            Feedback::BreakpointDeleted(id) => write!(f, "breakpoint {id} deleted")?,
            Feedback::Breakpoints(list) if list.is_empty() => write!(f, "no breakpoints")?,
            Feedback::Breakpoints(list) => {
                for (idx, (id, addr)) in list.iter().enumerate() {
                    if idx > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{id}: {addr}")?;
                }
            }
            Feedback::Backtrace(bt) => write!(f, "{bt}")?,
            Feedback::Killed => write!(f, "program killed")?,
        }

        Ok(())
    }
}

impl From<Result<Feedback, DebuggerError>> for Feedback {
    fn from(value: Result<Feedback, DebuggerError>) -> Self {
        match value {
            Ok(f) => f,
            Err(e) => Feedback::Error(e),
        }
    }
}
