//! Word-wise memory dumps of the debuggee.

use std::fmt::Display;

use tracing::debug;

use crate::addr::Addr;
use crate::consts::WORD_BYTES;
use crate::debuggee::Tracee;
use crate::errors::TraceError;
use crate::Word;

/// How the words of a [`MemoryDump`] are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryFormat {
    Hex,
    Signed,
    Unsigned,
}

impl MemoryFormat {
    /// Maps the dump commands `x`, `d` and `u` to their format
    pub fn from_command(cmd: &str) -> Option<Self> {
        match cmd {
            "x" => Some(MemoryFormat::Hex),
            "d" => Some(MemoryFormat::Signed),
            "u" => Some(MemoryFormat::Unsigned),
            _ => None,
        }
    }

    pub fn render(&self, word: Word) -> String {
        match self {
            MemoryFormat::Hex => format!("{:#018x}", word as u64),
            MemoryFormat::Signed => format!("{word}"),
            MemoryFormat::Unsigned => format!("{}", word as u64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryDump {
    start: Addr,
    format: MemoryFormat,
    words: Vec<Word>,
    /// Where reading stopped early, and why
    failure: Option<(Addr, TraceError)>,
}

impl MemoryDump {
    pub fn start(&self) -> Addr {
        self.start
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    pub fn failure(&self) -> Option<&(Addr, TraceError)> {
        self.failure.as_ref()
    }

    /// Address of the word at `idx`
    fn addr_of(&self, idx: usize) -> Addr {
        self.start + idx * WORD_BYTES
    }
}

impl Display for MemoryDump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (idx, w) in self.words.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{}: {}", self.addr_of(idx), self.format.render(*w))?;
        }
        if let Some((addr, err)) = &self.failure {
            if !self.words.is_empty() {
                writeln!(f)?;
            }
            write!(f, "cannot read memory at {addr}: {err}")?;
        }
        Ok(())
    }
}

/// Reads `count` consecutive words starting at `start`
///
/// A read failure ends the dump. The words read before it are kept and the failure is recorded
/// in the dump; this function itself does not fail.
pub fn dump_memory<T: Tracee>(
    tracee: &T,
    start: Addr,
    count: usize,
    format: MemoryFormat,
) -> MemoryDump {
    let mut dump = MemoryDump {
        start,
        format,
        words: Vec::with_capacity(count.min(512)),
        failure: None,
    };
    for idx in 0..count {
        let Some(addr) = idx
            .checked_mul(WORD_BYTES)
            .and_then(|off| start.checked_add(off))
        else {
            dump.failure = Some((start, TraceError::AddressOverflow));
            break;
        };
        match tracee.peek_word(addr) {
            Ok(w) => dump.words.push(w),
            Err(e) => {
                debug!("memory dump stopped at {addr}: {e}");
                dump.failure = Some((addr, e));
                break;
            }
        }
    }
    dump
}
