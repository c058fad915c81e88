//! # Breakpoint Module
//!
//! Software breakpoints and the table that owns them.
//!
//! A breakpoint replaces the first byte of an instruction with the trap opcode. Memory is only
//! accessible a word at a time, so patching and restoring always read the current word, merge
//! the single byte in and write the word back. That way two breakpoints whose words overlap
//! never undo each other.
//!
//! When the debuggee runs into a breakpoint, [`BreakpointTable::handle_trap`] puts the original
//! byte back and rewinds the pc onto the breakpoint address, so the operator sees the stop
//! exactly at the breakpoint. Before the next resume, [`BreakpointTable::step_over_pending`]
//! executes that one original instruction and arms the breakpoint again.

use std::fmt::Display;

use nix::sys::signal::Signal;
use tracing::{debug, trace};

use crate::addr::Addr;
use crate::consts::{MAX_BREAKPOINTS, TRAP_BYTE_MASK, TRAP_INSN_LEN, TRAP_OPCODE};
use crate::debuggee::{ResumeMode, StopReason, Tracee};
use crate::errors::{BpError, TraceError};
use crate::Word;

/// Number of a breakpoint as shown to the operator
///
/// Ids start at 1 and are never reused within a session, even after the breakpoint that held
/// one was deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakpointId(u32);

impl BreakpointId {
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl From<u32> for BreakpointId {
    fn from(value: u32) -> Self {
        BreakpointId(value)
    }
}

impl Display for BreakpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `word` with its lowest byte replaced by the trap opcode
#[inline]
pub fn patched_word(word: Word) -> Word {
    (word & !TRAP_BYTE_MASK) | TRAP_OPCODE as Word
}

/// `current` with its lowest byte taken from `saved`
#[inline]
pub fn restored_word(current: Word, saved: Word) -> Word {
    (current & !TRAP_BYTE_MASK) | (saved & TRAP_BYTE_MASK)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    id: BreakpointId,
    addr: Addr,
    saved_word: Word,
    enabled: bool,
}

impl Breakpoint {
    pub fn id(&self) -> BreakpointId {
        self.id
    }

    pub fn addr(&self) -> Addr {
        self.addr
    }

    /// The word at [`Self::addr`] as it was before the breakpoint was inserted
    pub fn saved_word(&self) -> Word {
        self.saved_word
    }

    /// Whether the trap opcode is currently in memory
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn arm<T: Tracee>(&mut self, tracee: &mut T) -> Result<(), TraceError> {
        let word = tracee.peek_word(self.addr)?;
        let patched = patched_word(word);
        trace!("arm {}: {word:016x} -> {patched:016x}", self.addr);
        tracee.poke_word(self.addr, patched)?;
        self.enabled = true;
        Ok(())
    }

    fn lift<T: Tracee>(&mut self, tracee: &mut T) -> Result<(), TraceError> {
        let word = tracee.peek_word(self.addr)?;
        let restored = restored_word(word, self.saved_word);
        trace!("lift {}: {word:016x} -> {restored:016x}", self.addr);
        tracee.poke_word(self.addr, restored)?;
        self.enabled = false;
        Ok(())
    }
}

/// Result of inspecting a trap stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapOutcome {
    /// One of our breakpoints; the pc now points at `addr`
    Hit { id: BreakpointId, addr: Addr },
    /// A trap we did not cause, left untouched
    Unrecognized { pc: Addr },
}

/// Result of executing the instruction under a hit breakpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SteppedOver {
    /// A signal that interrupted the step and was delivered to the debuggee
    pub forwarded: Option<Signal>,
    /// How the step ended
    pub stop: StopReason,
}

/// All breakpoints of a session, in insertion order
#[derive(Debug, Clone)]
pub struct BreakpointTable {
    entries: Vec<Breakpoint>,
    next_id: u32,
    /// Breakpoint the debuggee is currently stopped on, lifted until it is stepped over
    pending: Option<BreakpointId>,
}

impl Default for BreakpointTable {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakpointTable {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
            pending: None,
        }
    }

    /// Inserts a breakpoint at `addr`
    ///
    /// The table is left unchanged if anything fails.
    ///
    /// # Errors
    ///
    /// * [`BpError::InvalidAddress`] for the null address and [`Addr::UNRESOLVED`]
    /// * [`BpError::TableFull`] if [`MAX_BREAKPOINTS`] breakpoints exist
    /// * [`BpError::Duplicate`] if there already is a breakpoint at `addr`
    /// * [`BpError::Trace`] if the word at `addr` cannot be read or patched
    pub fn insert<T: Tracee>(
        &mut self,
        tracee: &mut T,
        addr: Addr,
    ) -> Result<BreakpointId, BpError> {
        if addr.is_null() || addr == Addr::UNRESOLVED {
            return Err(BpError::InvalidAddress(addr));
        }
        if self.entries.len() >= MAX_BREAKPOINTS {
            return Err(BpError::TableFull);
        }
        if self.entries.iter().any(|b| b.addr == addr) {
            return Err(BpError::Duplicate(addr));
        }

        let saved_word = tracee.peek_word(addr)?;
        trace!("original word: {saved_word:016x}");
        tracee.poke_word(addr, patched_word(saved_word))?;

        let id = BreakpointId(self.next_id);
        self.next_id += 1;
        self.entries.push(Breakpoint {
            id,
            addr,
            saved_word,
            enabled: true,
        });
        debug!("breakpoint {id} inserted at {addr}");
        Ok(id)
    }

    /// Removes breakpoint `id` and restores the original code
    ///
    /// If the debuggee is no longer running there is nothing to restore, and the breakpoint is
    /// dropped all the same.
    pub fn remove<T: Tracee>(
        &mut self,
        tracee: &mut T,
        id: BreakpointId,
    ) -> Result<Addr, BpError> {
        let pos = self
            .entries
            .iter()
            .position(|b| b.id == id)
            .ok_or(BpError::NotFound(id))?;
        let addr = self.entries[pos].addr;
        let saved = self.entries[pos].saved_word;

        let restore = tracee
            .peek_word(addr)
            .and_then(|w| tracee.poke_word(addr, restored_word(w, saved)));
        match restore {
            Ok(()) => (),
            Err(TraceError::NotRunning) => {
                debug!("debuggee is gone, dropping breakpoint {id} without restoring")
            }
            Err(e) => return Err(e.into()),
        }

        self.entries.remove(pos);
        if self.pending == Some(id) {
            self.pending = None;
        }
        debug!("breakpoint {id} at {addr} removed");
        Ok(addr)
    }

    /// `(id, address)` of every breakpoint, in insertion order
    pub fn list(&self) -> impl Iterator<Item = (BreakpointId, Addr)> + '_ {
        self.entries.iter().map(|b| (b.id, b.addr))
    }

    pub fn get(&self, id: BreakpointId) -> Option<&Breakpoint> {
        self.entries.iter().find(|b| b.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The breakpoint that must be stepped over before the next resume
    pub fn pending_step_over(&self) -> Option<BreakpointId> {
        self.pending
    }

    /// Forgets the pending step-over, for when the debuggee is gone
    pub fn clear_pending(&mut self) {
        self.pending = None;
    }

    /// Inspects a trap stop of the debuggee
    ///
    /// The reported pc is one trap instruction past the address that trapped. If an enabled
    /// breakpoint sits at that address, its original byte is put back, the pc is rewound onto it
    /// and the breakpoint becomes pending until [`Self::step_over_pending`] runs.
    pub fn handle_trap<T: Tracee>(&mut self, tracee: &mut T) -> Result<TrapOutcome, TraceError> {
        let mut regs = tracee.read_registers()?;
        let pc = Addr::from(regs.pc());
        let Some(trap_addr) = pc.checked_sub(TRAP_INSN_LEN) else {
            return Ok(TrapOutcome::Unrecognized { pc });
        };
        let Some(bp) = self
            .entries
            .iter_mut()
            .find(|b| b.enabled && b.addr == trap_addr)
        else {
            debug!("trap at {pc} is not one of ours");
            return Ok(TrapOutcome::Unrecognized { pc });
        };

        bp.lift(tracee)?;
        regs.set_pc(trap_addr.u64());
        tracee.write_registers(&regs)?;
        let id = bp.id;
        self.pending = Some(id);
        debug!("hit breakpoint {id} at {trap_addr}");
        Ok(TrapOutcome::Hit {
            id,
            addr: trap_addr,
        })
    }

    /// Executes the original instruction under the pending breakpoint and arms it again
    ///
    /// Returns [None] if no breakpoint is pending. `signal` is delivered with the step. A
    /// signal that stops the step is forwarded right away, before the breakpoint is armed. If
    /// the debuggee ends during the step, the breakpoint stays lifted.
    pub fn step_over_pending<T: Tracee>(
        &mut self,
        tracee: &mut T,
        signal: Option<Signal>,
    ) -> Result<Option<SteppedOver>, TraceError> {
        let Some(id) = self.pending.take() else {
            return Ok(None);
        };
        let Some(pos) = self.entries.iter().position(|b| b.id == id) else {
            return Ok(None);
        };
        trace!("stepping over breakpoint {id}");

        let mut forwarded = None;
        let mut stop = tracee.resume(ResumeMode::SingleStep, signal)?;
        if let StopReason::Signaled(sig) = stop {
            forwarded = Some(sig);
            stop = tracee.forward_signal(sig, ResumeMode::SingleStep)?;
        }

        if stop.is_alive() {
            self.entries[pos].arm(tracee)?;
        } else {
            debug!("debuggee ended while stepping over breakpoint {id}");
        }
        Ok(Some(SteppedOver { forwarded, stop }))
    }
}
