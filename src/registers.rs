//! # Registers Module
//!
//! The x86-64 register file of the debuggee.
//!
//! [`RegisterSet`] mirrors the kernel's `user_regs_struct` field for field, so a set read with
//! `PTRACE_GETREGS` can be modified and written back without losing anything. The engine only
//! needs three of them by role (instruction, stack and frame pointer); those get accessors so
//! the breakpoint and unwind code does not name x86 registers directly.

use std::fmt::Display;

use nix::libc::user_regs_struct;

/// Names of the fields of a [`RegisterSet`]
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    r15,
    r14,
    r13,
    r12,
    rbp,
    rbx,
    r11,
    r10,
    r9,
    r8,
    rax,
    rcx,
    rdx,
    rsi,
    rdi,
    orig_rax,
    rip,
    cs,
    eflags,
    rsp,
    ss,
    fs_base,
    gs_base,
    ds,
    es,
    fs,
    gs,
}

/// Registers shown by a register dump, in display order
pub const DUMP_ORDER: &[Register] = &[
    Register::rax,
    Register::rbx,
    Register::rcx,
    Register::rdx,
    Register::rsi,
    Register::rdi,
    Register::rbp,
    Register::rsp,
    Register::r8,
    Register::r9,
    Register::r10,
    Register::r11,
    Register::r12,
    Register::r13,
    Register::r14,
    Register::r15,
    Register::rip,
    Register::eflags,
];

impl Register {
    pub fn name(&self) -> &'static str {
        match self {
            Register::r15 => "r15",
            Register::r14 => "r14",
            Register::r13 => "r13",
            Register::r12 => "r12",
            Register::rbp => "rbp",
            Register::rbx => "rbx",
            Register::r11 => "r11",
            Register::r10 => "r10",
            Register::r9 => "r9",
            Register::r8 => "r8",
            Register::rax => "rax",
            Register::rcx => "rcx",
            Register::rdx => "rdx",
            Register::rsi => "rsi",
            Register::rdi => "rdi",
            Register::orig_rax => "orig_rax",
            Register::rip => "rip",
            Register::cs => "cs",
            Register::eflags => "eflags",
            Register::rsp => "rsp",
            Register::ss => "ss",
            Register::fs_base => "fs_base",
            Register::gs_base => "gs_base",
            Register::ds => "ds",
            Register::es => "es",
            Register::fs => "fs",
            Register::gs => "gs",
        }
    }
}

impl Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A snapshot of all general purpose, segment and flag registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegisterSet {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub rbp: u64,
    pub rbx: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rax: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub orig_rax: u64,
    pub rip: u64,
    pub cs: u64,
    pub eflags: u64,
    pub rsp: u64,
    pub ss: u64,
    pub fs_base: u64,
    pub gs_base: u64,
    pub ds: u64,
    pub es: u64,
    pub fs: u64,
    pub gs: u64,
}

impl RegisterSet {
    pub fn get(&self, r: Register) -> u64 {
        match r {
            Register::r15 => self.r15,
            Register::r14 => self.r14,
            Register::r13 => self.r13,
            Register::r12 => self.r12,
            Register::rbp => self.rbp,
            Register::rbx => self.rbx,
            Register::r11 => self.r11,
            Register::r10 => self.r10,
            Register::r9 => self.r9,
            Register::r8 => self.r8,
            Register::rax => self.rax,
            Register::rcx => self.rcx,
            Register::rdx => self.rdx,
            Register::rsi => self.rsi,
            Register::rdi => self.rdi,
            Register::orig_rax => self.orig_rax,
            Register::rip => self.rip,
            Register::cs => self.cs,
            Register::eflags => self.eflags,
            Register::rsp => self.rsp,
            Register::ss => self.ss,
            Register::fs_base => self.fs_base,
            Register::gs_base => self.gs_base,
            Register::ds => self.ds,
            Register::es => self.es,
            Register::fs => self.fs,
            Register::gs => self.gs,
        }
    }

    pub fn set(&mut self, r: Register, v: u64) {
        let slot = match r {
            Register::r15 => &mut self.r15,
            Register::r14 => &mut self.r14,
            Register::r13 => &mut self.r13,
            Register::r12 => &mut self.r12,
            Register::rbp => &mut self.rbp,
            Register::rbx => &mut self.rbx,
            Register::r11 => &mut self.r11,
            Register::r10 => &mut self.r10,
            Register::r9 => &mut self.r9,
            Register::r8 => &mut self.r8,
            Register::rax => &mut self.rax,
            Register::rcx => &mut self.rcx,
            Register::rdx => &mut self.rdx,
            Register::rsi => &mut self.rsi,
            Register::rdi => &mut self.rdi,
            Register::orig_rax => &mut self.orig_rax,
            Register::rip => &mut self.rip,
            Register::cs => &mut self.cs,
            Register::eflags => &mut self.eflags,
            Register::rsp => &mut self.rsp,
            Register::ss => &mut self.ss,
            Register::fs_base => &mut self.fs_base,
            Register::gs_base => &mut self.gs_base,
            Register::ds => &mut self.ds,
            Register::es => &mut self.es,
            Register::fs => &mut self.fs,
            Register::gs => &mut self.gs,
        };
        *slot = v;
    }

    /// Instruction pointer
    #[inline]
    pub fn pc(&self) -> u64 {
        self.rip
    }

    #[inline]
    pub fn set_pc(&mut self, pc: u64) {
        self.rip = pc;
    }

    /// Stack pointer
    #[inline]
    pub fn sp(&self) -> u64 {
        self.rsp
    }

    /// Frame pointer
    #[inline]
    pub fn fp(&self) -> u64 {
        self.rbp
    }
}

impl Display for RegisterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (idx, r) in DUMP_ORDER.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{:<8}{:#018x}", format!("{r}:"), self.get(*r))?;
        }
        Ok(())
    }
}

impl From<user_regs_struct> for RegisterSet {
    fn from(r: user_regs_struct) -> Self {
        Self {
            r15: r.r15,
            r14: r.r14,
            r13: r.r13,
            r12: r.r12,
            rbp: r.rbp,
            rbx: r.rbx,
            r11: r.r11,
            r10: r.r10,
            r9: r.r9,
            r8: r.r8,
            rax: r.rax,
            rcx: r.rcx,
            rdx: r.rdx,
            rsi: r.rsi,
            rdi: r.rdi,
            orig_rax: r.orig_rax,
            rip: r.rip,
            cs: r.cs,
            eflags: r.eflags,
            rsp: r.rsp,
            ss: r.ss,
            fs_base: r.fs_base,
            gs_base: r.gs_base,
            ds: r.ds,
            es: r.es,
            fs: r.fs,
            gs: r.gs,
        }
    }
}

impl From<RegisterSet> for user_regs_struct {
    fn from(r: RegisterSet) -> Self {
        user_regs_struct {
            r15: r.r15,
            r14: r.r14,
            r13: r.r13,
            r12: r.r12,
            rbp: r.rbp,
            rbx: r.rbx,
            r11: r.r11,
            r10: r.r10,
            r9: r.r9,
            r8: r.r8,
            rax: r.rax,
            rcx: r.rcx,
            rdx: r.rdx,
            rsi: r.rsi,
            rdi: r.rdi,
            orig_rax: r.orig_rax,
            rip: r.rip,
            cs: r.cs,
            eflags: r.eflags,
            rsp: r.rsp,
            ss: r.ss,
            fs_base: r.fs_base,
            gs_base: r.gs_base,
            ds: r.ds,
            es: r.es,
            fs: r.fs,
            gs: r.gs,
        }
    }
}
