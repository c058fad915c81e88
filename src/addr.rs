//! # Address Module
//!
//! Provides the [`Addr`] type, a plain virtual address in the debuggee's address space.
//!
//! [`Addr`] wraps a `usize` and is what every engine component passes around: the ELF symbol
//! index reports symbol values as [`Addr`], the breakpoint table is keyed by it and ptrace
//! accesses take it. Formatting with [`Display`] gives the short `0x401136` form the operator
//! sees; [`Debug`](std::fmt::Debug) pads to the full word width.

use std::fmt::Display;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use crate::Word;

/// Raw pointer type used by [ptrace](nix::sys::ptrace) for addresses
pub type RawPointer = *mut std::ffi::c_void;

/// A virtual address in the debuggee
#[derive(Hash, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Addr(usize);

impl Addr {
    /// Address that never names real code, returned by lookups that found nothing
    ///
    /// Breakpoints refuse to be placed here.
    pub const UNRESOLVED: Addr = Addr(usize::MAX);

    /// The null address
    pub const NULL: Addr = Addr(0);

    pub fn usize(&self) -> usize {
        self.0
    }
    pub fn u64(&self) -> u64 {
        self.0 as u64
    }
    pub fn raw_pointer(&self) -> RawPointer {
        self.0 as RawPointer
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Adds `rhs`, returning [None] instead of wrapping around the address space
    pub fn checked_add(self, rhs: usize) -> Option<Addr> {
        self.0.checked_add(rhs).map(Addr)
    }

    /// Subtracts `rhs`, returning [None] instead of wrapping below zero
    pub fn checked_sub(self, rhs: usize) -> Option<Addr> {
        self.0.checked_sub(rhs).map(Addr)
    }

    /// Parses a numeric address literal
    ///
    /// Accepts decimal (`4198710`) and hexadecimal with a `0x` or `0X` prefix (`0x401136`).
    /// The whole token must be consumed: `12abc` or `0x` are not literals.
    ///
    /// # Examples
    ///
    /// ```
    /// use elfdbg::addr::Addr;
    ///
    /// assert_eq!(Addr::parse_literal("0x401000"), Some(Addr::from(0x401000usize)));
    /// assert_eq!(Addr::parse_literal("16"), Some(Addr::from(16usize)));
    /// assert_eq!(Addr::parse_literal("main"), None);
    /// ```
    pub fn parse_literal(token: &str) -> Option<Addr> {
        let (digits, radix) = match token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
        {
            Some(hex) => (hex, 16),
            None => (token, 10),
        };
        // from_str_radix would accept a leading '+'
        if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
            return None;
        }
        usize::from_str_radix(digits, radix).ok().map(Addr)
    }
}

impl Display for Addr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl std::fmt::Debug for Addr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl std::fmt::LowerHex for Addr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::LowerHex::fmt(&self.0, f)
    }
}

impl Add<usize> for Addr {
    type Output = Self;
    fn add(self, rhs: usize) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<usize> for Addr {
    fn add_assign(&mut self, rhs: usize) {
        self.0 += rhs
    }
}

impl Sub for Addr {
    type Output = usize;
    fn sub(self, rhs: Self) -> Self::Output {
        self.0 - rhs.0
    }
}

impl Sub<usize> for Addr {
    type Output = Self;
    fn sub(self, rhs: usize) -> Self::Output {
        Self(self.0 - rhs)
    }
}

impl SubAssign<usize> for Addr {
    fn sub_assign(&mut self, rhs: usize) {
        self.0 -= rhs
    }
}

impl From<usize> for Addr {
    fn from(value: usize) -> Self {
        Addr(value)
    }
}

impl From<u64> for Addr {
    fn from(value: u64) -> Self {
        Addr(value as usize)
    }
}

impl From<Word> for Addr {
    fn from(value: Word) -> Self {
        Addr(value as usize)
    }
}

impl From<Addr> for RawPointer {
    fn from(value: Addr) -> Self {
        value.0 as RawPointer
    }
}

impl From<Addr> for u64 {
    fn from(value: Addr) -> Self {
        value.0 as u64
    }
}

impl From<Addr> for Word {
    fn from(value: Addr) -> Self {
        value.0 as Word
    }
}
