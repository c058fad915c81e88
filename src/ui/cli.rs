//! Line-oriented command interface on stdin and stdout.

use std::io::{BufRead, Stdout, StdinLock, Write};

use tracing::{debug, warn};

use super::{DebuggerUI, Status};
use crate::breakpoint::BreakpointId;
use crate::errors::Result;
use crate::feedback::Feedback;
use crate::memory::MemoryFormat;

pub const PROMPT: &str = "edb> ";

/// What a single input line asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    Command(Status),
    /// A known command with missing or invalid arguments
    Usage(&'static str),
    /// Empty or unknown lines
    Ignored,
}

/// Parses the words of one command line
pub fn parse_command(words: &[String]) -> Parsed {
    let Some(cmd) = words.first() else {
        return Parsed::Ignored;
    };
    let args = &words[1..];

    match cmd.as_str() {
        "quit" | "q" => Parsed::Command(Status::DebuggerQuit),
        "kill" | "k" => Parsed::Command(Status::Kill),
        "registers" | "r" => Parsed::Command(Status::DumpRegisters),
        "continue" | "c" => Parsed::Command(Status::Continue),
        "next" | "n" => match args.first() {
            None => Parsed::Command(Status::Step(1)),
            Some(count) => match count.parse() {
                Ok(count) => Parsed::Command(Status::Step(count)),
                Err(_) => Parsed::Usage("next [count]"),
            },
        },
        "x" | "d" | "u" => {
            let usage = match cmd.as_str() {
                "x" => "x <count> <address|symbol>",
                "d" => "d <count> <address|symbol>",
                _ => "u <count> <address|symbol>",
            };
            let Some(format) = MemoryFormat::from_command(cmd) else {
                return Parsed::Ignored;
            };
            match args {
                [count, target, ..] => match count.parse() {
                    Ok(count) => Parsed::Command(Status::ReadMem(format, count, target.clone())),
                    Err(_) => Parsed::Usage(usage),
                },
                _ => Parsed::Usage(usage),
            }
        }
        "break" | "b" => match args.first() {
            Some(target) => Parsed::Command(Status::SetBreakpoint(target.clone())),
            None => Parsed::Usage("break <address|symbol>"),
        },
        "blist" => Parsed::Command(Status::ListBreakpoints),
        "bdel" => match args.first().map(|id| id.parse::<u32>()) {
            Some(Ok(id)) => Parsed::Command(Status::DelBreakpoint(BreakpointId::from(id))),
            _ => Parsed::Usage("bdel <id>"),
        },
        "bt" | "backtrace" => Parsed::Command(Status::Backtrace),
        _ => Parsed::Ignored,
    }
}

/// Reads commands from `input` and writes feedback and prompts to `output`
pub struct CliUi<R: BufRead, W: Write> {
    input: R,
    output: W,
}

impl CliUi<StdinLock<'static>, Stdout> {
    pub fn build() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> CliUi<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Returns the next line, or [None] at the end of input
    pub fn get_line(&mut self) -> Result<Option<String>> {
        let mut buf = String::new();
        write!(self.output, "{PROMPT}")?;
        self.output.flush()?;
        if self.input.read_line(&mut buf)? == 0 {
            return Ok(None);
        }
        Ok(Some(buf))
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> DebuggerUI for CliUi<R, W> {
    fn process(&mut self, feedback: Feedback) -> Result<Status> {
        match feedback {
            Feedback::Ok => (),
            Feedback::Events(ref events) if events.is_empty() => (),
            other => writeln!(self.output, "{other}")?,
        }

        loop {
            let Some(line) = self.get_line()? else {
                writeln!(self.output)?;
                return Ok(Status::EndOfInput);
            };
            let Some(words) = shlex::split(&line) else {
                warn!("could not split line: {line:?}");
                continue;
            };
            debug!("command words: {words:?}");
            match parse_command(&words) {
                Parsed::Command(status) => return Ok(status),
                Parsed::Usage(usage) => writeln!(self.output, "usage: {usage}")?,
                Parsed::Ignored => (),
            }
        }
    }
}
