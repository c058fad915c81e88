use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use elfdbg::elf::ElfImage;
use elfdbg::errors::{DebuggerError, ElfError};
use elfdbg::symdump::write_symbols;

use clap::Parser;
use tracing::{debug, warn};

/// List the symbol table of an ELF64 file
///
/// Prints value, size, type, binding, visibility, section and name of every symbol, tab
/// separated. Source file symbols are skipped.
#[derive(Parser, Debug)]
#[command(version, about, long_about)]
struct Args {
    /// The ELF file to read
    file: PathBuf,

    /// Log more, repeat for even more
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

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("esyms: {}: {e}", args.file.display());
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), DebuggerError> {
    let data = std::fs::read(&args.file)?;
    let image = match ElfImage::load(&data) {
        Ok(image) => image,
        Err(ElfError::NoSymbolTable) => {
            warn!("{} has no symbol table", args.file.display());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let mut out = std::io::stdout().lock();
    let lines = write_symbols(&image, &mut out)?;
    out.flush()?;
    debug!("listed {lines} symbols");
    Ok(())
}

fn setup_logger(verbosity: u8) {
    let level = match verbosity {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .without_time()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("could not set up the logger: {e}");
    }
}
