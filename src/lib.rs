//! # elfdbg
//!
//! A small debugger for ELF64 executables on Linux/x86-64.
//!
//! The debuggee is started under [ptrace](nix::sys::ptrace) control. The operator can set
//! software breakpoints by address or function name, step or continue execution, dump registers
//! and memory, and print backtraces that follow the frame pointer chain and are symbolicated
//! through the executable's symbol table.
//!
//! The pieces, leaves first:
//!
//! * [`elf`]: the symbol index of the executable
//! * [`debuggee`]: the traced process and the [`Tracee`](debuggee::Tracee) contract
//! * [`breakpoint`], [`stepper`], [`memory`], [`unwind`], [`resolve`]: the engine, generic over
//!   any [`Tracee`](debuggee::Tracee)
//! * [`session`]: one debugging session, one method per command
//! * [`debugger`] and [`ui`]: the command loop
//!
//! [`symdump`] reuses the symbol index for a plain symbol listing.

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
compile_error!("elfdbg only supports x86_64 Linux");

pub mod addr;
pub mod breakpoint;
pub mod consts;
pub mod debuggee;
pub mod debugger;
pub mod elf;
pub mod errors;
pub mod feedback;
pub mod memory;
pub mod registers;
pub mod resolve;
pub mod session;
pub mod stepper;
pub mod symdump;
pub mod ui;
pub mod unwind;

#[cfg(test)]
pub(crate) mod testutil;

/// A machine word of the debuggee, as read and written by ptrace
pub type Word = i64;
