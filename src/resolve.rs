//! Turns the address arguments of commands into addresses.

use tracing::trace;

use crate::addr::Addr;
use crate::debuggee::Tracee;
use crate::elf::ElfImage;
use crate::errors::ResolveError;

/// Resolves a command argument to an address
///
/// In order of precedence, `token` may be
///
/// 1. `$rip` or `$rsp`, read from the live registers,
/// 2. a numeric literal, see [`Addr::parse_literal`],
/// 3. the name of a function in the symbol table.
///
/// # Errors
///
/// [`ResolveError::Invalid`] if `token` is none of these, [`ResolveError::Trace`] if the registers
/// could not be read.
pub fn resolve<T: Tracee>(
    token: &str,
    tracee: &T,
    image: Option<&ElfImage<'_>>,
) -> Result<Addr, ResolveError> {
    let addr = match token {
        "$rip" => Addr::from(tracee.read_registers()?.pc()),
        "$rsp" => Addr::from(tracee.read_registers()?.sp()),
        _ => match Addr::parse_literal(token) {
            Some(addr) => addr,
            None => image
                .and_then(|img| img.resolve_name(token))
                .ok_or_else(|| ResolveError::Invalid(token.to_string()))?,
        },
    };
    trace!("resolved {token:?} to {addr}");
    Ok(addr)
}
