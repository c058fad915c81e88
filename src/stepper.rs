//! # Stepper Module
//!
//! Resumes the debuggee, one instruction at a time or until it stops on its own, and reports
//! what happened along the way as a list of [`ExecEvent`]s.
//!
//! Breakpoint traps are handed to the [`BreakpointTable`], and a pending breakpoint is always
//! stepped over before the debuggee runs again. Signals the debuggee stops on are forwarded
//! to it, so its own handlers still run.

use std::fmt::Display;

use nix::sys::signal::Signal;
use tracing::{debug, trace};

use crate::addr::Addr;
use crate::breakpoint::{BreakpointId, BreakpointTable, TrapOutcome};
use crate::debuggee::{ResumeMode, StopReason, TrapCause, Tracee};
use crate::errors::TraceError;

/// Something the operator should hear about after resuming the debuggee
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecEvent {
    /// A single step finished at this pc
    Stopped(Addr),
    BreakpointHit { id: BreakpointId, addr: Addr },
    /// A trap that was not caused by one of our breakpoints
    UnknownTrap(Addr),
    /// The debuggee received a signal, which is delivered to it
    Signal(Signal),
    Exited(i32),
    Terminated(Signal),
}

impl Display for ExecEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecEvent::Stopped(pc) => write!(f, "stopped at {pc}"),
            ExecEvent::BreakpointHit { id, addr } => write!(f, "breakpoint {id} hit at {addr}"),
            ExecEvent::UnknownTrap(pc) => write!(f, "trace trap at {pc}"),
            ExecEvent::Signal(sig) => write!(f, "program received signal {sig}, forwarding"),
            ExecEvent::Exited(code) => write!(f, "program exited with code {code}"),
            ExecEvent::Terminated(sig) => write!(f, "program terminated by signal {sig}"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Stepper {
    /// A signal the debuggee stopped on that has not been delivered yet
    pending_signal: Option<Signal>,
}

impl Stepper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_signal(&self) -> Option<Signal> {
        self.pending_signal
    }

    /// Executes up to `count` instructions
    ///
    /// Stepping ends early when the debuggee exits or receives a signal. The signal is delivered
    /// with one more single step before returning.
    pub fn step<T: Tracee>(
        &mut self,
        tracee: &mut T,
        breakpoints: &mut BreakpointTable,
        count: usize,
    ) -> Result<Vec<ExecEvent>, TraceError> {
        let mut events = Vec::new();
        for _ in 0..count {
            let signal = self.pending_signal.take();
            let stop = match breakpoints.step_over_pending(tracee, signal)? {
                Some(over) => {
                    if let Some(sig) = over.forwarded {
                        events.push(ExecEvent::Signal(sig));
                        self.record(tracee, breakpoints, over.stop, &mut events)?;
                        break;
                    }
                    over.stop
                }
                None => tracee.resume(ResumeMode::SingleStep, signal)?,
            };

            if let StopReason::Signaled(sig) = stop {
                events.push(ExecEvent::Signal(sig));
                let after = tracee.forward_signal(sig, ResumeMode::SingleStep)?;
                self.record(tracee, breakpoints, after, &mut events)?;
                break;
            }
            if !self.record(tracee, breakpoints, stop, &mut events)? {
                break;
            }
        }
        Ok(events)
    }

    /// Runs the debuggee until it hits a trap, exits or is terminated
    ///
    /// Signals on the way are reported and delivered, and the debuggee keeps running.
    pub fn cont<T: Tracee>(
        &mut self,
        tracee: &mut T,
        breakpoints: &mut BreakpointTable,
    ) -> Result<Vec<ExecEvent>, TraceError> {
        let mut events = Vec::new();
        let mut signal = self.pending_signal.take();

        if let Some(over) = breakpoints.step_over_pending(tracee, signal.take())? {
            if let Some(sig) = over.forwarded {
                events.push(ExecEvent::Signal(sig));
            }
            match over.stop {
                // the kernel does not always report a finished step as TRAP_TRACE
                StopReason::Trapped(_) => (),
                StopReason::Signaled(sig) => {
                    events.push(ExecEvent::Signal(sig));
                    signal = Some(sig);
                }
                other => {
                    self.record(tracee, breakpoints, other, &mut events)?;
                    return Ok(events);
                }
            }
        }

        loop {
            let stop = match signal.take() {
                Some(sig) => tracee.forward_signal(sig, ResumeMode::Continue)?,
                None => tracee.resume(ResumeMode::Continue, None)?,
            };
            match stop {
                StopReason::Signaled(sig) => {
                    events.push(ExecEvent::Signal(sig));
                    signal = Some(sig);
                }
                StopReason::Trapped(_) => {
                    events.push(self.on_trap(tracee, breakpoints)?);
                    break;
                }
                other => {
                    self.record(tracee, breakpoints, other, &mut events)?;
                    break;
                }
            }
        }
        Ok(events)
    }

    /// Turns a stop into an event; returns whether the debuggee may be resumed again
    ///
    /// A signal stop is kept as the pending signal, to be delivered on the next resume.
    fn record<T: Tracee>(
        &mut self,
        tracee: &mut T,
        breakpoints: &mut BreakpointTable,
        stop: StopReason,
        events: &mut Vec<ExecEvent>,
    ) -> Result<bool, TraceError> {
        trace!("stop: {stop}");
        match stop {
            StopReason::Trapped(TrapCause::Breakpoint) => {
                events.push(self.on_trap(tracee, breakpoints)?);
            }
            StopReason::Trapped(_) => {
                let pc = Addr::from(tracee.read_registers()?.pc());
                events.push(ExecEvent::Stopped(pc));
            }
            StopReason::Signaled(sig) => {
                debug!("holding back {sig} until the next resume");
                self.pending_signal = Some(sig);
                events.push(ExecEvent::Signal(sig));
                return Ok(false);
            }
            StopReason::Exited(code) => {
                self.forget(breakpoints);
                events.push(ExecEvent::Exited(code));
                return Ok(false);
            }
            StopReason::Terminated(sig) => {
                self.forget(breakpoints);
                events.push(ExecEvent::Terminated(sig));
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn on_trap<T: Tracee>(
        &mut self,
        tracee: &mut T,
        breakpoints: &mut BreakpointTable,
    ) -> Result<ExecEvent, TraceError> {
        Ok(match breakpoints.handle_trap(tracee)? {
            TrapOutcome::Hit { id, addr } => ExecEvent::BreakpointHit { id, addr },
            TrapOutcome::Unrecognized { pc } => ExecEvent::UnknownTrap(pc),
        })
    }

    /// Drops per-process state once the debuggee is gone
    pub fn forget(&mut self, breakpoints: &mut BreakpointTable) {
        self.pending_signal = None;
        breakpoints.clear_pending();
    }
}
