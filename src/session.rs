//! # Session Module
//!
//! The state of one debugging session and the operations the operator can run on it.
//!
//! A [`Session`] owns the debuggee, the symbol index of its executable (if it has one), the
//! breakpoint table and the stepper. Each operation takes the session by reference, does its
//! work and reports the outcome as [`Feedback`] for the UI.

use tracing::{debug, warn};

use crate::breakpoint::{BreakpointId, BreakpointTable};
use crate::debuggee::{Debuggee, Tracee};
use crate::elf::ElfImage;
use crate::errors::Result;
use crate::feedback::Feedback;
use crate::memory::{self, MemoryFormat};
use crate::resolve::resolve;
use crate::stepper::Stepper;
use crate::unwind;

#[derive(Debug)]
pub struct Session<'data, T: Tracee = Debuggee> {
    tracee: T,
    image: Option<ElfImage<'data>>,
    breakpoints: BreakpointTable,
    stepper: Stepper,
}

impl<'data, T: Tracee> Session<'data, T> {
    /// Starts a session on an already launched `tracee`
    ///
    /// Without an `image`, symbol names cannot be resolved and backtraces show bare addresses.
    pub fn new(tracee: T, image: Option<ElfImage<'data>>) -> Self {
        if image.is_none() {
            warn!("no symbol table, symbol names are unavailable");
        }
        Self {
            tracee,
            image,
            breakpoints: BreakpointTable::new(),
            stepper: Stepper::new(),
        }
    }

    pub fn tracee(&self) -> &T {
        &self.tracee
    }

    pub fn image(&self) -> Option<&ElfImage<'data>> {
        self.image.as_ref()
    }

    pub fn breakpoints(&self) -> &BreakpointTable {
        &self.breakpoints
    }

    pub fn kill(&mut self) -> Result<Feedback> {
        self.tracee.kill()?;
        self.stepper.forget(&mut self.breakpoints);
        Ok(Feedback::Killed)
    }

    pub fn dump_registers(&self) -> Result<Feedback> {
        Ok(Feedback::Registers(self.tracee.read_registers()?))
    }

    pub fn cont(&mut self) -> Result<Feedback> {
        let events = self.stepper.cont(&mut self.tracee, &mut self.breakpoints)?;
        Ok(Feedback::Events(events))
    }

    pub fn step(&mut self, count: usize) -> Result<Feedback> {
        let events = self
            .stepper
            .step(&mut self.tracee, &mut self.breakpoints, count)?;
        Ok(Feedback::Events(events))
    }

    /// Dumps `count` words at the address `target` resolves to
    pub fn dump_memory(
        &self,
        format: MemoryFormat,
        count: usize,
        target: &str,
    ) -> Result<Feedback> {
        let addr = resolve(target, &self.tracee, self.image.as_ref())?;
        debug!("dumping {count} words at {addr}");
        let dump = memory::dump_memory(&self.tracee, addr, count, format);
        Ok(Feedback::Memory(dump))
    }

    pub fn set_breakpoint(&mut self, target: &str) -> Result<Feedback> {
        let addr = resolve(target, &self.tracee, self.image.as_ref())?;
        let id = self.breakpoints.insert(&mut self.tracee, addr)?;
        Ok(Feedback::BreakpointSet { id, addr })
    }

    pub fn list_breakpoints(&self) -> Result<Feedback> {
        Ok(Feedback::Breakpoints(self.breakpoints.list().collect()))
    }

    pub fn del_breakpoint(&mut self, id: BreakpointId) -> Result<Feedback> {
        self.breakpoints.remove(&mut self.tracee, id)?;
        Ok(Feedback::BreakpointDeleted(id))
    }

    pub fn backtrace(&self) -> Result<Feedback> {
        let bt = unwind::backtrace(&self.tracee, self.image.as_ref())?;
        Ok(Feedback::Backtrace(bt))
    }
}
