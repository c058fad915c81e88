//! # Error Module
//!
//! Error types for every layer of the debugger.
//!
//! Each engine component has its own error enum so callers see exactly what can go wrong for
//! the operation they called. [`DebuggerError`] wraps all of them and is what the session hands
//! to the UI, which is the only place errors are turned into text for the operator.

use thiserror::Error;

use crate::addr::Addr;
use crate::breakpoint::BreakpointId;

/// Result type used throughout the session and the binaries
pub type Result<T> = std::result::Result<T, DebuggerError>;

/// Failures while reading the executable image
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ElfError {
    #[error("not an ELF file (bad magic)")]
    NotElf,
    #[error("unsupported ELF image: {0}")]
    Unsupported(&'static str),
    #[error("malformed ELF image: {0}")]
    Malformed(&'static str),
    #[error("ELF image is truncated: a table or string lies outside the file")]
    Truncated,
    #[error("ELF image has no symbol table")]
    NoSymbolTable,
}

/// Failures while starting the debuggee
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Executable does not exist: {0}")]
    ExecutableDoesNotExist(String),
    #[error("Executable is not a file: {0}")]
    ExecutableIsNotAFile(String),
    #[error("Executable is not executable: {0}")]
    NotExecutable(String),
    #[error("Could not convert to CString: {0}")]
    CStringConv(#[from] std::ffi::NulError),
    #[error("Could not fork: {0}")]
    Fork(nix::Error),
    #[error("Could not execute {0}")]
    ExecFailed(String),
    #[error("Os error: {0}")]
    Os(#[from] nix::Error),
}

/// Failures of a single ptrace interaction with the debuggee
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TraceError {
    #[error("Os error: {0}")]
    Os(#[from] nix::Error),
    #[error("the program is not running")]
    NotRunning,
    #[error("unexpected wait status: {0}")]
    UnexpectedStatus(String),
    #[error("address computation overflowed")]
    AddressOverflow,
}

/// Failures of the breakpoint table
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BpError {
    #[error("invalid breakpoint address {0}")]
    InvalidAddress(Addr),
    #[error("there already is a breakpoint at {0}")]
    Duplicate(Addr),
    #[error("maximum number of breakpoints reached")]
    TableFull,
    #[error("breakpoint {0} not found")]
    NotFound(BreakpointId),
    #[error(transparent)]
    Trace(#[from] TraceError),
}

/// Failures while turning a user token into an address
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("invalid address or symbol: {0}")]
    Invalid(String),
    #[error(transparent)]
    Trace(#[from] TraceError),
}

#[derive(Error, Debug)]
pub enum DebuggerError {
    #[error(transparent)]
    Elf(#[from] ElfError),
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error(transparent)]
    Trace(#[from] TraceError),
    #[error(transparent)]
    Breakpoint(#[from] BpError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<nix::Error> for DebuggerError {
    fn from(value: nix::Error) -> Self {
        DebuggerError::Trace(TraceError::Os(value))
    }
}
