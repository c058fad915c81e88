//! # Unwind Module
//!
//! Walks the frame pointer chain of the stopped debuggee.
//!
//! On x86-64 a function built with frame pointers starts by pushing the caller's `rbp` and
//! pointing `rbp` at that slot. So `[rbp]` holds the caller's frame pointer and `[rbp + 8]` the
//! return address into the caller. Following that chain yields one return address per frame.
//! Code built without frame pointers breaks the chain, and the backtrace is cut short there.

use std::fmt::Display;

use tracing::{debug, trace};

use crate::addr::Addr;
use crate::consts::WORD_BYTES;
use crate::debuggee::Tracee;
use crate::elf::ElfImage;
use crate::errors::TraceError;

/// Upper bound on the frames of one backtrace
pub const MAX_FRAMES: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backtrace {
    pub frames: Vec<BacktraceFrame>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacktraceFrame {
    pub addr: Addr,
    /// Start of the function containing [`Self::addr`], if known
    pub start_addr: Option<Addr>,
    /// Demangled name of that function
    pub name: Option<String>,
}

impl BacktraceFrame {
    fn symbolicate(addr: Addr, image: Option<&ElfImage<'_>>) -> Self {
        match image.and_then(|img| img.resolve_address(addr)) {
            Some(sym) => BacktraceFrame {
                addr,
                start_addr: Some(sym.value),
                name: Some(format!("{:#}", rustc_demangle::demangle(sym.name))),
            },
            None => BacktraceFrame {
                addr,
                start_addr: None,
                name: None,
            },
        }
    }
}

impl Display for Backtrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (idx, frame) in self.frames.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "#{idx}  {}", frame.addr)?;
            if let Some(name) = &frame.name {
                write!(f, " in {name}")?;
            }
        }
        Ok(())
    }
}

/// Builds a backtrace of the stopped debuggee
///
/// Frame 0 is the current pc, and every further frame is a return address from the frame
/// pointer chain. The walk ends at a null frame pointer or return address, at memory that cannot
/// be read, when the next frame pointer does not lie strictly above the current one, or after
/// [`MAX_FRAMES`] frames.
///
/// # Errors
///
/// Fails only if the registers cannot be read. A broken chain shortens the backtrace instead.
pub fn backtrace<T: Tracee>(
    tracee: &T,
    image: Option<&ElfImage<'_>>,
) -> Result<Backtrace, TraceError> {
    let regs = tracee.read_registers()?;
    let mut frames = vec![BacktraceFrame::symbolicate(Addr::from(regs.pc()), image)];
    let mut fp = Addr::from(regs.fp());

    while frames.len() < MAX_FRAMES {
        if fp.is_null() {
            break;
        }
        let Some(ret_slot) = fp.checked_add(WORD_BYTES) else {
            break;
        };
        let ret = match tracee.peek_word(ret_slot) {
            Ok(w) => Addr::from(w as u64),
            Err(e) => {
                debug!("stopping unwind, cannot read return address at {ret_slot}: {e}");
                break;
            }
        };
        if ret.is_null() {
            break;
        }
        trace!("frame at {fp:?} returns to {ret}");
        frames.push(BacktraceFrame::symbolicate(ret, image));

        let next = match tracee.peek_word(fp) {
            Ok(w) => Addr::from(w as u64),
            Err(e) => {
                debug!("stopping unwind, cannot read saved frame pointer at {fp}: {e}");
                break;
            }
        };
        if next <= fp {
            debug!("stopping unwind, frame pointer {next:?} is not above {fp:?}");
            break;
        }
        fp = next;
    }

    Ok(Backtrace { frames })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::{ElfBuilder, FakeTracee};

    const STACK: usize = 0x7ffe_0000;

    fn image_bytes() -> Vec<u8> {
        ElfBuilder::new()
            .function("_start", 0x401020, 0x26)
            .function("main", 0x401136, 0x2a)
            .function("_ZN4demo6helper17h0123456789abcdefE", 0x401160, 0x20)
            .build()
    }

    /// helper (pc 0x401168) called from main, called from _start
    fn three_frames() -> FakeTracee {
        let mut t = FakeTracee::new();
        t.regs.rip = 0x401168;
        t.regs.rbp = STACK as u64;
        t.map_word(STACK, STACK as u64 + 0x20)
            .map_word(STACK + 8, 0x401150)
            .map_word(STACK + 0x20, STACK as u64 + 0x40)
            .map_word(STACK + 0x28, 0x401040)
            .map_word(STACK + 0x40, 0)
            .map_word(STACK + 0x48, 0);
        t
    }

    #[test]
    fn test_walk_and_symbolicate() {
        let data = image_bytes();
        let image = ElfImage::load(&data).unwrap();
        let bt = backtrace(&three_frames(), Some(&image)).unwrap();

        let names: Vec<Option<&str>> = bt.frames.iter().map(|f| f.name.as_deref()).collect();
        assert_eq!(names, vec![Some("demo::helper"), Some("main"), Some("_start")]);
        assert_eq!(bt.frames[1].start_addr, Some(Addr::from(0x401136usize)));
        assert_eq!(
            bt.to_string(),
            "#0  0x401168 in demo::helper\n#1  0x401150 in main\n#2  0x401040 in _start"
        );
    }

    #[test]
    fn test_without_image_only_addresses() {
        let bt = backtrace(&three_frames(), None).unwrap();
        assert_eq!(bt.frames.len(), 3);
        assert!(bt.frames.iter().all(|f| f.name.is_none()));
        assert_eq!(bt.to_string().lines().next(), Some("#0  0x401168"));
    }

    #[test]
    fn test_deep_recursion_keeps_levels_apart() {
        let mut t = FakeTracee::new();
        t.regs.rip = 0x401136;
        t.regs.rbp = STACK as u64;
        for i in 0..120 {
            let fp = STACK + i * 0x10;
            let next = if i == 119 { 0 } else { fp as u64 + 0x10 };
            t.map_word(fp, next).map_word(fp + 8, 0x401040);
        }
        let bt = backtrace(&t, None).unwrap();
        assert_eq!(bt.frames.len(), 121);

        let text = bt.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[9], "#9  0x401040");
        assert_eq!(lines[100], "#100  0x401040");
        assert_eq!(lines[120], "#120  0x401040");
    }

    #[test]
    fn test_null_frame_pointer() {
        let mut t = FakeTracee::new();
        t.regs.rip = 0x401136;
        let bt = backtrace(&t, None).unwrap();
        assert_eq!(bt.frames.len(), 1);
    }

    #[test]
    fn test_chain_pointing_down_stops() {
        let mut t = FakeTracee::new();
        t.regs.rip = 0x401136;
        t.regs.rbp = STACK as u64;
        // saved frame pointer below the current one
        t.map_word(STACK, STACK as u64 - 0x100)
            .map_word(STACK + 8, 0x401040);
        let bt = backtrace(&t, None).unwrap();
        assert_eq!(bt.frames.len(), 2);
        assert_eq!(bt.frames[1].addr, Addr::from(0x401040usize));
    }

    #[test]
    fn test_self_loop_stops() {
        let mut t = FakeTracee::new();
        t.regs.rip = 0x401136;
        t.regs.rbp = STACK as u64;
        t.map_word(STACK, STACK as u64).map_word(STACK + 8, 0x401040);
        let bt = backtrace(&t, None).unwrap();
        assert_eq!(bt.frames.len(), 2);
    }

    #[test]
    fn test_unreadable_frame_stops() {
        let mut t = FakeTracee::new();
        t.regs.rip = 0x401136;
        t.regs.rbp = 0xdead_0000;
        let bt = backtrace(&t, None).unwrap();
        assert_eq!(bt.frames.len(), 1);
    }

    #[test]
    fn test_dead_tracee_fails() {
        let mut t = FakeTracee::new();
        t.alive = false;
        assert_eq!(backtrace(&t, None), Err(TraceError::NotRunning));
    }
}
