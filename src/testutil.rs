//! Test helpers: a builder for small ELF64 images and an in-memory stand-in for a traced
//! process.

use std::collections::{BTreeMap, HashMap};

use nix::errno::Errno;
use nix::sys::signal::Signal;
use object::elf::{
    FileHeader64, Ident, SectionHeader64, Sym64, ELFCLASS64, ELFDATA2LSB, ELFMAG, ELFOSABI_NONE,
    EM_X86_64, ET_EXEC, EV_CURRENT, SHN_ABS, SHT_NULL, SHT_PROGBITS, SHT_STRTAB, SHT_SYMTAB,
    STB_GLOBAL, STB_LOCAL, STT_FILE, STT_FUNC, STT_OBJECT,
};
use object::endian::{U16, U32, U64};
use object::pod::{bytes_of, Pod};
use object::Endianness;

use crate::addr::Addr;
use crate::debuggee::{ResumeMode, StopReason, TrapCause, Tracee};
use crate::errors::TraceError;
use crate::registers::RegisterSet;
use crate::Word;

const LE: Endianness = Endianness::Little;

/// Opcode the fake cpu treats as "exit the process"
pub(crate) const EXIT_OPCODE: u8 = 0xf4;

const SHSTRTAB: &[u8] = b"\0.text\0.shstrtab\0.strtab\0.symtab\0";
const NAME_TEXT: u32 = 1;
const NAME_SHSTRTAB: u32 = 7;
const NAME_STRTAB: u32 = 17;
const NAME_SYMTAB: u32 = 25;

const TEXT_ADDR: u64 = 0x401000;

#[derive(Debug, Clone)]
pub(crate) struct TestSymbol {
    name: String,
    value: u64,
    size: u64,
    kind: u8,
    bind: u8,
    shndx: u16,
}

impl TestSymbol {
    pub(crate) fn function(name: &str, value: u64, size: u64) -> Self {
        Self {
            name: name.to_string(),
            value,
            size,
            kind: STT_FUNC,
            bind: STB_GLOBAL,
            shndx: 1,
        }
    }

    pub(crate) fn object(name: &str, value: u64, size: u64) -> Self {
        Self {
            name: name.to_string(),
            value,
            size,
            kind: STT_OBJECT,
            bind: STB_GLOBAL,
            shndx: 1,
        }
    }

    pub(crate) fn file(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: 0,
            size: 0,
            kind: STT_FILE,
            bind: STB_LOCAL,
            shndx: SHN_ABS,
        }
    }
}

/// Builds a little-endian ELF64 executable with the sections
/// `[null, .text, .shstrtab, .strtab, .symtab]`, section headers last
#[derive(Debug, Clone)]
pub(crate) struct ElfBuilder {
    symbols: Vec<TestSymbol>,
    with_symtab: bool,
}

impl ElfBuilder {
    pub(crate) fn new() -> Self {
        Self {
            symbols: Vec::new(),
            with_symtab: true,
        }
    }

    pub(crate) fn symbol(mut self, sym: TestSymbol) -> Self {
        self.symbols.push(sym);
        self
    }

    pub(crate) fn function(self, name: &str, value: u64, size: u64) -> Self {
        self.symbol(TestSymbol::function(name, value, size))
    }

    pub(crate) fn without_symtab(mut self) -> Self {
        self.with_symtab = false;
        self
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut strtab = vec![0u8];
        let mut syms = vec![sym(0, 0, 0, 0, 0, 0)];
        for s in &self.symbols {
            let name_off = strtab.len() as u32;
            strtab.extend_from_slice(s.name.as_bytes());
            strtab.push(0);
            syms.push(sym(
                name_off,
                (s.bind << 4) | (s.kind & 0xf),
                0,
                s.shndx,
                s.value,
                s.size,
            ));
        }

        let mut out = vec![0u8; std::mem::size_of::<FileHeader64<Endianness>>()];

        let text_off = out.len() as u64;
        out.extend_from_slice(&[0x90; 16]);
        let shstrtab_off = out.len() as u64;
        out.extend_from_slice(SHSTRTAB);
        let strtab_off = out.len() as u64;
        out.extend_from_slice(&strtab);
        align(&mut out);
        let symtab_off = out.len() as u64;
        for s in &syms {
            push(&mut out, s);
        }
        let symtab_size = out.len() as u64 - symtab_off;
        align(&mut out);

        let mut headers = vec![
            section(0, SHT_NULL, 0, 0, 0, 0, 0),
            section(NAME_TEXT, SHT_PROGBITS, TEXT_ADDR, text_off, 16, 0, 0),
            section(
                NAME_SHSTRTAB,
                SHT_STRTAB,
                0,
                shstrtab_off,
                SHSTRTAB.len() as u64,
                0,
                0,
            ),
            section(
                NAME_STRTAB,
                SHT_STRTAB,
                0,
                strtab_off,
                strtab.len() as u64,
                0,
                0,
            ),
        ];
        if self.with_symtab {
            headers.push(section(
                NAME_SYMTAB,
                SHT_SYMTAB,
                0,
                symtab_off,
                symtab_size,
                3,
                std::mem::size_of::<Sym64<Endianness>>() as u64,
            ));
        }

        let shoff = out.len() as u64;
        for h in &headers {
            push(&mut out, h);
        }

        let header = FileHeader64::<Endianness> {
            e_ident: Ident {
                magic: ELFMAG,
                class: ELFCLASS64,
                data: ELFDATA2LSB,
                version: EV_CURRENT,
                os_abi: ELFOSABI_NONE,
                abi_version: 0,
                padding: [0; 7],
            },
            e_type: U16::new(LE, ET_EXEC),
            e_machine: U16::new(LE, EM_X86_64),
            e_version: U32::new(LE, EV_CURRENT as u32),
            e_entry: U64::new(LE, TEXT_ADDR),
            e_phoff: U64::new(LE, 0),
            e_shoff: U64::new(LE, shoff),
            e_flags: U32::new(LE, 0),
            e_ehsize: U16::new(LE, std::mem::size_of::<FileHeader64<Endianness>>() as u16),
            e_phentsize: U16::new(LE, 0),
            e_phnum: U16::new(LE, 0),
            e_shentsize: U16::new(LE, std::mem::size_of::<SectionHeader64<Endianness>>() as u16),
            e_shnum: U16::new(LE, headers.len() as u16),
            e_shstrndx: U16::new(LE, 2),
        };
        let header_bytes = bytes_of(&header);
        out[..header_bytes.len()].copy_from_slice(header_bytes);
        out
    }
}

fn push<T: Pod>(out: &mut Vec<u8>, value: &T) {
    out.extend_from_slice(bytes_of(value));
}

fn align(out: &mut Vec<u8>) {
    while out.len() % 8 != 0 {
        out.push(0);
    }
}

fn sym(name: u32, info: u8, other: u8, shndx: u16, value: u64, size: u64) -> Sym64<Endianness> {
    Sym64 {
        st_name: U32::new(LE, name),
        st_info: info,
        st_other: other,
        st_shndx: U16::new(LE, shndx),
        st_value: U64::new(LE, value),
        st_size: U64::new(LE, size),
    }
}

fn section(
    name: u32,
    kind: u32,
    addr: u64,
    offset: u64,
    size: u64,
    link: u32,
    entsize: u64,
) -> SectionHeader64<Endianness> {
    SectionHeader64 {
        sh_name: U32::new(LE, name),
        sh_type: U32::new(LE, kind),
        sh_flags: U64::new(LE, 0),
        sh_addr: U64::new(LE, addr),
        sh_offset: U64::new(LE, offset),
        sh_size: U64::new(LE, size),
        sh_link: U32::new(LE, link),
        sh_info: U32::new(LE, 0),
        sh_addralign: U64::new(LE, if entsize == 0 { 1 } else { 8 }),
        sh_entsize: U64::new(LE, entsize),
    }
}

/// A traced process simulated in memory
///
/// Memory is sparse; reading or writing a word touching an unmapped byte fails with `EIO`.
/// Executing runs a toy cpu over the mapped bytes: the trap opcode advances the pc by one and
/// reports a breakpoint trap, [`EXIT_OPCODE`] exits with [`Self::exit_code`], an unmapped pc
/// raises `SIGSEGV`, and every other byte is a one-byte instruction.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeTracee {
    pub memory: BTreeMap<usize, u8>,
    pub regs: RegisterSet,
    pub alive: bool,
    pub exit_code: i32,
    /// Addresses of executed instructions, in order
    pub executed: Vec<Addr>,
    /// Signals raised when the pc reaches an address, before the instruction runs, one per
    /// attempt to execute it
    pub signals_at: HashMap<usize, Vec<Signal>>,
    /// Signals the program installed handlers for; any other delivered signal terminates it
    pub handled_signals: Vec<Signal>,
    pub delivered: Vec<Signal>,
    /// Makes every memory write fail
    pub read_only: bool,
    /// Trap cause reported when a single step finishes the instruction at an address, for
    /// instructions the kernel does not report as `TRAP_TRACE`
    pub step_causes: HashMap<usize, TrapCause>,
}

impl FakeTracee {
    pub(crate) fn new() -> Self {
        Self {
            alive: true,
            ..Default::default()
        }
    }

    pub(crate) fn map(&mut self, addr: usize, bytes: &[u8]) -> &mut Self {
        for (i, b) in bytes.iter().enumerate() {
            self.memory.insert(addr + i, *b);
        }
        self
    }

    pub(crate) fn map_word(&mut self, addr: usize, value: u64) -> &mut Self {
        self.map(addr, &value.to_le_bytes())
    }

    pub(crate) fn raise_at(&mut self, addr: usize, sig: Signal) -> &mut Self {
        self.signals_at.entry(addr).or_default().push(sig);
        self
    }

    pub(crate) fn byte(&self, addr: usize) -> Option<u8> {
        self.memory.get(&addr).copied()
    }

    fn err_if_dead(&self) -> Result<(), TraceError> {
        if self.alive {
            Ok(())
        } else {
            Err(TraceError::NotRunning)
        }
    }

    fn word_bytes(&self, addr: Addr) -> Result<[u8; 8], TraceError> {
        let mut buf = [0u8; 8];
        for (i, b) in buf.iter_mut().enumerate() {
            let at = addr.usize().checked_add(i).ok_or(TraceError::Os(Errno::EIO))?;
            *b = self.byte(at).ok_or(TraceError::Os(Errno::EIO))?;
        }
        Ok(buf)
    }

    /// Runs one instruction; returns the stop it caused, if any
    fn execute_one(&mut self) -> Option<StopReason> {
        let pc = self.regs.rip as usize;
        if let Some(queue) = self.signals_at.get_mut(&pc) {
            if !queue.is_empty() {
                return Some(StopReason::Signaled(queue.remove(0)));
            }
        }
        match self.byte(pc) {
            None => Some(StopReason::Signaled(Signal::SIGSEGV)),
            Some(0xcc) => {
                self.regs.rip += 1;
                Some(StopReason::Trapped(TrapCause::Breakpoint))
            }
            Some(EXIT_OPCODE) => {
                self.executed.push(Addr::from(pc));
                self.alive = false;
                Some(StopReason::Exited(self.exit_code))
            }
            Some(_) => {
                self.executed.push(Addr::from(pc));
                self.regs.rip += 1;
                None
            }
        }
    }
}

impl Tracee for FakeTracee {
    fn read_registers(&self) -> Result<RegisterSet, TraceError> {
        self.err_if_dead()?;
        Ok(self.regs)
    }

    fn write_registers(&mut self, regs: &RegisterSet) -> Result<(), TraceError> {
        self.err_if_dead()?;
        self.regs = *regs;
        Ok(())
    }

    fn peek_word(&self, addr: Addr) -> Result<Word, TraceError> {
        self.err_if_dead()?;
        Ok(Word::from_le_bytes(self.word_bytes(addr)?))
    }

    fn poke_word(&mut self, addr: Addr, value: Word) -> Result<(), TraceError> {
        self.err_if_dead()?;
        if self.read_only {
            return Err(TraceError::Os(Errno::EPERM));
        }
        self.word_bytes(addr)?;
        self.map(addr.usize(), &value.to_le_bytes());
        Ok(())
    }

    fn resume(
        &mut self,
        mode: ResumeMode,
        signal: Option<Signal>,
    ) -> Result<StopReason, TraceError> {
        self.err_if_dead()?;
        if let Some(sig) = signal {
            self.delivered.push(sig);
            if !self.handled_signals.contains(&sig) {
                self.alive = false;
                return Ok(StopReason::Terminated(sig));
            }
        }
        match mode {
            ResumeMode::SingleStep => {
                let pc = self.regs.rip as usize;
                let cause = self
                    .step_causes
                    .get(&pc)
                    .copied()
                    .unwrap_or(TrapCause::SingleStep);
                Ok(self.execute_one().unwrap_or(StopReason::Trapped(cause)))
            }
            ResumeMode::Continue => loop {
                if let Some(stop) = self.execute_one() {
                    return Ok(stop);
                }
            },
        }
    }

    fn kill(&mut self) -> Result<(), TraceError> {
        self.err_if_dead()?;
        self.alive = false;
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive
    }
}
