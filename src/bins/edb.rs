use std::path::PathBuf;
use std::process::ExitCode;

use elfdbg::debuggee::{check_executable, Debuggee};
use elfdbg::debugger::Debugger;
use elfdbg::elf::ElfImage;
use elfdbg::errors::{DebuggerError, ElfError};
use elfdbg::session::Session;
use elfdbg::ui::cli::CliUi;

use clap::Parser;
use tracing::{debug, warn};

/// Debug an ELF64 executable
///
/// Reads commands from stdin, one per line: quit, kill, registers, continue, next [count],
/// x|d|u <count> <address|symbol>, break <address|symbol>, blist, bdel <id>, bt.
#[derive(Parser, Debug)]
#[command(version, about, long_about)]
struct Args {
    /// The program to launch as debuggee
    program: PathBuf,

    /// Log more, repeat for even more (warn, info, debug, trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    human_panic::setup_panic!();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    setup_logger(args.verbose);
    debug!("set up the logger");

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("edb: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), DebuggerError> {
    check_executable(&args.program)?;

    let data = std::fs::read(&args.program)?;
    let image = match ElfImage::load(&data) {
        Ok(image) => Some(image),
        Err(ElfError::NoSymbolTable) => {
            warn!("{} has no symbol table", args.program.display());
            None
        }
        Err(e) => return Err(e.into()),
    };

    let debuggee = Debuggee::launch(&args.program)?;
    let session = Session::new(debuggee, image);
    let mut debugger = Debugger::build(session, CliUi::build());
    debugger.run_debugger()
}

fn setup_logger(verbosity: u8) {
    let level = match verbosity {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    // stdout belongs to the command output
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .without_time()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("could not set up the logger: {e}");
    }
}
