//! # Debugger Module
//!
//! The main loop: ask the UI for the next operation, run it on the [`Session`], hand the result
//! back to the UI, repeat until the UI says to stop.

use tracing::{error, info, warn};

use crate::debuggee::{Debuggee, Tracee};
use crate::errors::Result;
use crate::feedback::Feedback;
use crate::session::Session;
use crate::ui::{DebuggerUI, Status};

pub struct Debugger<'data, UI: DebuggerUI, T: Tracee = Debuggee> {
    session: Session<'data, T>,
    ui: UI,
}

impl<'data, UI: DebuggerUI, T: Tracee> Debugger<'data, UI, T> {
    pub fn build(session: Session<'data, T>, ui: UI) -> Self {
        Debugger { session, ui }
    }

    pub fn session(&self) -> &Session<'data, T> {
        &self.session
    }

    pub fn ui(&self) -> &UI {
        &self.ui
    }

    /// Runs commands until the UI quits or runs out of input
    ///
    /// Failed operations are reported to the UI and do not end the loop. Only an error of the UI
    /// itself is returned.
    pub fn run_debugger(&mut self) -> Result<()> {
        let mut feedback: Feedback = Feedback::Ok;
        loop {
            let status = match self.ui.process(feedback) {
                Ok(s) => s,
                Err(e) => {
                    error!("{e}");
                    return Err(e);
                }
            };
            feedback = match status {
                Status::DebuggerQuit => {
                    self.cleanup();
                    break;
                }
                Status::EndOfInput => {
                    info!("end of input, leaving the debuggee to the kernel");
                    break;
                }
                Status::Kill => self.session.kill(),
                Status::DumpRegisters => self.session.dump_registers(),
                Status::Continue => self.session.cont(),
                Status::Step(count) => self.session.step(count),
                Status::ReadMem(format, count, target) => {
                    self.session.dump_memory(format, count, &target)
                }
                Status::SetBreakpoint(target) => self.session.set_breakpoint(&target),
                Status::ListBreakpoints => self.session.list_breakpoints(),
                Status::DelBreakpoint(id) => self.session.del_breakpoint(id),
                Status::Backtrace => self.session.backtrace(),
            }
            .into();
        }

        Ok(())
    }

    /// Kills the debuggee if it is still alive
    pub fn cleanup(&mut self) {
        if !self.session.tracee().is_alive() {
            return;
        }
        if let Err(e) = self.session.kill() {
            warn!("could not kill the debuggee: {e}");
        }
    }
}
