//! Platform constants for x86-64 Linux.
//!
//! The trap instruction, its length and the siginfo codes that tell a breakpoint trap from a
//! single-step trap all depend on the architecture, so they are collected here instead of being
//! spread over the engine.
//!
//! The siginfo codes are deeply nested into the libc and not available from nix.
//!
//! Source: <https://elixir.bootlin.com/linux/v6.13.1/source/include/uapi/asm-generic/siginfo.h#L227>

/// `int3`
pub const TRAP_OPCODE: u8 = 0xcc;
/// Bytes the pc has advanced past the breakpoint address when the trap is reported
pub const TRAP_INSN_LEN: usize = 1;
/// Mask selecting the byte a software breakpoint overwrites
pub const TRAP_BYTE_MASK: i64 = 0xff;

/// Size of a machine word, the unit of ptrace memory access
pub const WORD_BYTES: usize = 8;

/// Simultaneous software breakpoints per session
pub const MAX_BREAKPOINTS: usize = 100;

/// Sent by the kernel from somewhere, `int3` traps report this
pub const SI_KERNEL: i32 = 0x80;

// ---------------- SIGTRAP si_codes ---------------------------------------------------------------

/// Process breakpoint, also reported by x86-64 for a single step over `syscall`
pub const TRAP_BRKPT: i32 = 0x1;
/// Process trace trap
pub const TRAP_TRACE: i32 = 0x2;
