//! # Debuggee Module
//!
//! Provides the process controller: the representation of the traced process and the
//! [`Tracee`] contract the rest of the engine talks to.
//!
//! The [`Debuggee`] is the sole owner of the traced process. It is controlled through the
//! [ptrace](nix::sys::ptrace) API; every call is wrapped so that a failure comes back as a
//! [`TraceError`] for that one operation instead of an error code on the side.
//!
//! Engine components are generic over [`Tracee`] rather than tied to [`Debuggee`], so the
//! breakpoint protocol, the stepper and the unwinder can run against any process-like backend.

use std::ffi::{CStr, CString};
use std::fmt::Display;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use nix::sys::personality::{self, Persona};
use nix::sys::ptrace;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{access, execv, fork, AccessFlags, ForkResult, Pid};
use tracing::{debug, error, info, trace, warn};

use crate::addr::Addr;
use crate::consts::{SI_KERNEL, TRAP_BRKPT, TRAP_TRACE};
use crate::errors::{LaunchError, TraceError};
use crate::registers::RegisterSet;
use crate::Word;

/// Lifecycle of the traced process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Forked, but the first trace stop has not been seen yet
    Launched,
    Stopped,
    Running,
    Exited(i32),
    /// Terminated by a signal, including our own `SIGKILL`
    Killed,
}

/// How far a resumed debuggee may run before it stops again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    /// Until the next signal, trap or exit
    Continue,
    /// One instruction
    SingleStep,
}

/// What raised a `SIGTRAP` stop, taken from the siginfo `si_code`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapCause {
    /// A trap instruction was executed
    Breakpoint,
    /// A single-step completed
    SingleStep,
    Other,
}

impl TrapCause {
    /// Classifies a `SIGTRAP` by its `si_code` and the way the process was last resumed
    ///
    /// `int3` reports `SI_KERNEL`. A single step normally reports `TRAP_TRACE`, but a step over
    /// `syscall` comes back as `TRAP_BRKPT`.
    pub fn from_si_code(si_code: i32, last_resume: ResumeMode) -> Self {
        match (si_code, last_resume) {
            (SI_KERNEL, _) => TrapCause::Breakpoint,
            (TRAP_TRACE, _) => TrapCause::SingleStep,
            (TRAP_BRKPT, ResumeMode::SingleStep) => TrapCause::SingleStep,
            _ => TrapCause::Other,
        }
    }
}

/// Why a resumed debuggee stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Trapped(TrapCause),
    /// Stopped by a signal that has not been delivered yet
    Signaled(Signal),
    Exited(i32),
    /// Killed by a signal
    Terminated(Signal),
}

impl StopReason {
    /// Whether the process still exists after this stop
    pub fn is_alive(&self) -> bool {
        matches!(self, StopReason::Trapped(_) | StopReason::Signaled(_))
    }
}

impl Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Trapped(cause) => write!(f, "trapped ({cause:?})"),
            StopReason::Signaled(sig) => write!(f, "stopped by {sig}"),
            StopReason::Exited(code) => write!(f, "exited with code {code}"),
            StopReason::Terminated(sig) => write!(f, "terminated by {sig}"),
        }
    }
}

/// Everything the engine needs from a traced process
///
/// All operations require the process to be stopped, except [`Tracee::kill`].
pub trait Tracee {
    fn read_registers(&self) -> Result<RegisterSet, TraceError>;
    fn write_registers(&mut self, regs: &RegisterSet) -> Result<(), TraceError>;
    /// Reads one machine word at `addr`
    fn peek_word(&self, addr: Addr) -> Result<Word, TraceError>;
    /// Writes one machine word at `addr`
    ///
    /// Callers that want to change fewer bytes must read, merge and write back themselves.
    fn poke_word(&mut self, addr: Addr, value: Word) -> Result<(), TraceError>;
    /// Resumes the process, delivering `signal` if given, and blocks until it stops or exits
    fn resume(
        &mut self,
        mode: ResumeMode,
        signal: Option<Signal>,
    ) -> Result<StopReason, TraceError>;
    /// Terminates the process immediately
    fn kill(&mut self) -> Result<(), TraceError>;
    fn is_alive(&self) -> bool;

    /// Resumes the process with a signal it stopped on, so its own handlers still see it
    fn forward_signal(
        &mut self,
        sig: Signal,
        mode: ResumeMode,
    ) -> Result<StopReason, TraceError> {
        info!("forwarding {sig} to the debuggee");
        self.resume(mode, Some(sig))
    }
}

/// Checks that `path` names an executable regular file
///
/// # Errors
///
/// Fails if the path does not exist, is not a regular file, or is not executable for us.
pub fn check_executable(path: &Path) -> Result<(), LaunchError> {
    let shown = path.to_string_lossy().to_string();
    if !path.exists() {
        return Err(LaunchError::ExecutableDoesNotExist(shown));
    }
    if !path.is_file() {
        return Err(LaunchError::ExecutableIsNotAFile(shown));
    }
    if access(path, AccessFlags::X_OK).is_err() {
        return Err(LaunchError::NotExecutable(shown));
    }
    Ok(())
}

/// The traced process
#[derive(Debug)]
pub struct Debuggee {
    pid: Pid,
    state: ProcessState,
    last_resume: ResumeMode,
}

impl Debuggee {
    /// Starts `path` as a traced child process
    ///
    /// The child asks to be traced and replaces itself with the executable; no arguments are
    /// passed besides `argv[0]`. The exec raises a trap stop, after which the child is set to be
    /// killed should the debugger exit, so an aborted session never leaves an orphan.
    ///
    /// # Errors
    ///
    /// [`LaunchError::ExecFailed`] if the child never reached the executable, [`LaunchError::Fork`]
    /// if no child could be created.
    pub fn launch(path: &Path) -> Result<Self, LaunchError> {
        let cpath = CString::new(path.as_os_str().as_bytes())?;

        match unsafe { fork() }.map_err(LaunchError::Fork)? {
            ForkResult::Child => exec_child(&cpath),
            ForkResult::Parent { child } => {
                let mut dbge = Debuggee {
                    pid: child,
                    state: ProcessState::Launched,
                    last_resume: ResumeMode::Continue,
                };
                match waitpid(child, None)? {
                    WaitStatus::Stopped(_, Signal::SIGTRAP) => (),
                    WaitStatus::Exited(_, code) => {
                        return Err(LaunchError::ExecFailed(format!(
                            "{} (child exited with code {code})",
                            path.display()
                        )))
                    }
                    other => {
                        let _ = signal::kill(child, Signal::SIGKILL);
                        return Err(LaunchError::ExecFailed(format!(
                            "{} (unexpected status {other:?})",
                            path.display()
                        )));
                    }
                }
                ptrace::setoptions(child, ptrace::Options::PTRACE_O_EXITKILL)?;
                dbge.state = ProcessState::Stopped;
                info!("launched {} as pid {child}", path.display());
                Ok(dbge)
            }
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    fn err_if_dead(&self) -> Result<(), TraceError> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(TraceError::NotRunning)
        }
    }

    /// Blocks until the process changes state and classifies the change
    fn wait(&mut self) -> Result<StopReason, TraceError> {
        let status = waitpid(self.pid, None)?;
        trace!("wait status: {status:?}");
        let reason = match status {
            WaitStatus::Stopped(_, Signal::SIGTRAP) => StopReason::Trapped(self.trap_cause()?),
            WaitStatus::Stopped(_, sig) => StopReason::Signaled(sig),
            WaitStatus::Exited(_, code) => StopReason::Exited(code),
            WaitStatus::Signaled(_, sig, _) => StopReason::Terminated(sig),
            other => return Err(TraceError::UnexpectedStatus(format!("{other:?}"))),
        };
        self.state = match reason {
            StopReason::Trapped(_) | StopReason::Signaled(_) => ProcessState::Stopped,
            StopReason::Exited(code) => ProcessState::Exited(code),
            StopReason::Terminated(_) => ProcessState::Killed,
        };
        debug!("debuggee {reason}");
        Ok(reason)
    }

    fn trap_cause(&self) -> Result<TrapCause, TraceError> {
        let info = ptrace::getsiginfo(self.pid)?;
        trace!("SIGTRAP si_code: {:#x}", info.si_code);
        Ok(TrapCause::from_si_code(info.si_code, self.last_resume))
    }
}

impl Tracee for Debuggee {
    fn read_registers(&self) -> Result<RegisterSet, TraceError> {
        self.err_if_dead()?;
        Ok(ptrace::getregs(self.pid)?.into())
    }

    fn write_registers(&mut self, regs: &RegisterSet) -> Result<(), TraceError> {
        self.err_if_dead()?;
        ptrace::setregs(self.pid, (*regs).into())?;
        Ok(())
    }

    fn peek_word(&self, addr: Addr) -> Result<Word, TraceError> {
        self.err_if_dead()?;
        Ok(ptrace::read(self.pid, addr.raw_pointer())?)
    }

    fn poke_word(&mut self, addr: Addr, value: Word) -> Result<(), TraceError> {
        self.err_if_dead()?;
        ptrace::write(self.pid, addr.raw_pointer(), value)?;
        Ok(())
    }

    fn resume(
        &mut self,
        mode: ResumeMode,
        signal: Option<Signal>,
    ) -> Result<StopReason, TraceError> {
        self.err_if_dead()?;
        match mode {
            ResumeMode::Continue => ptrace::cont(self.pid, signal)?,
            ResumeMode::SingleStep => ptrace::step(self.pid, signal)?,
        }
        self.state = ProcessState::Running;
        self.last_resume = mode;
        self.wait()
    }

    fn kill(&mut self) -> Result<(), TraceError> {
        self.err_if_dead()?;
        signal::kill(self.pid, Signal::SIGKILL)?;
        let status = waitpid(self.pid, None)?;
        debug!("reaped killed debuggee: {status:?}");
        self.state = ProcessState::Killed;
        Ok(())
    }

    fn is_alive(&self) -> bool {
        !matches!(self.state, ProcessState::Exited(_) | ProcessState::Killed)
    }
}

/// Runs in the forked child: become traced and exec the target, or exit
fn exec_child(path: &CStr) -> ! {
    if let Err(e) = personality::set(Persona::ADDR_NO_RANDOMIZE) {
        warn!("could not disable address space randomization: {e}");
    }
    if let Err(e) = ptrace::traceme() {
        error!("could not request tracing: {e}");
        unsafe { nix::libc::_exit(127) }
    }
    let err = match execv(path, &[path]) {
        Err(e) => e,
        Ok(never) => match never {},
    };
    error!("could not execute {}: {err}", path.to_string_lossy());
    unsafe { nix::libc::_exit(127) }
}

#[cfg(test)]
mod test {
    use std::fs::{self, Permissions};
    use std::os::unix::fs::PermissionsExt;

    use super::*;
    use crate::breakpoint::BreakpointTable;
    use crate::stepper::{ExecEvent, Stepper};

    const TRUE: &str = "/bin/true";
    /// `syscall` (`0f 05`) as the low bytes of a little-endian word
    const SYSCALL_INSN: Word = 0x050f;

    /// Single-steps until the next instruction is a `syscall`, returns its address
    fn step_to_syscall(dbge: &mut Debuggee) -> Addr {
        for _ in 0..1_000_000 {
            let pc = Addr::from(dbge.read_registers().unwrap().pc());
            if dbge.peek_word(pc).unwrap() & 0xffff == SYSCALL_INSN {
                return pc;
            }
            let stop = dbge.resume(ResumeMode::SingleStep, None).unwrap();
            assert!(stop.is_alive(), "{stop} before any syscall");
        }
        panic!("no system call within a million instructions of {TRUE}");
    }

    #[test]
    fn test_launch_step_kill() {
        let mut dbge = Debuggee::launch(Path::new(TRUE)).unwrap();
        assert_eq!(dbge.state(), ProcessState::Stopped);

        let stop = dbge.resume(ResumeMode::SingleStep, None).unwrap();
        assert_eq!(stop, StopReason::Trapped(TrapCause::SingleStep));
        assert_eq!(dbge.state(), ProcessState::Stopped);

        dbge.kill().unwrap();
        assert_eq!(dbge.state(), ProcessState::Killed);
        assert!(!dbge.is_alive());
        assert_eq!(dbge.read_registers(), Err(TraceError::NotRunning));
    }

    #[test]
    fn test_single_step_over_syscall() {
        let mut dbge = Debuggee::launch(Path::new(TRUE)).unwrap();
        let pc = step_to_syscall(&mut dbge);

        let stop = dbge.resume(ResumeMode::SingleStep, None).unwrap();
        assert_eq!(stop, StopReason::Trapped(TrapCause::SingleStep));
        let after = Addr::from(dbge.read_registers().unwrap().pc());
        assert_eq!(Some(after), pc.checked_add(2));
        dbge.kill().unwrap();
    }

    #[test]
    fn test_continue_from_breakpoint_on_syscall() {
        let mut dbge = Debuggee::launch(Path::new(TRUE)).unwrap();
        let pc = step_to_syscall(&mut dbge);
        let mut bps = BreakpointTable::new();
        let mut stepper = Stepper::new();
        let id = bps.insert(&mut dbge, pc).unwrap();

        let events = stepper.cont(&mut dbge, &mut bps).unwrap();
        assert_eq!(events, vec![ExecEvent::BreakpointHit { id, addr: pc }]);

        // the same syscall site may be reached again before the program exits
        for _ in 0..10_000 {
            let events = stepper.cont(&mut dbge, &mut bps).unwrap();
            match events.as_slice() {
                [ExecEvent::BreakpointHit { addr, .. }] => assert_eq!(*addr, pc),
                [ExecEvent::Exited(code)] => {
                    assert_eq!(*code, 0);
                    return;
                }
                other => panic!("unexpected events: {other:?}"),
            }
        }
        panic!("{TRUE} did not exit");
    }

    #[test]
    fn test_launch_non_elf_fails() {
        let name = format!("elfdbg-not-an-elf-{}", std::process::id());
        let path = std::env::temp_dir().join(name);
        fs::write(&path, b"not an executable").unwrap();
        fs::set_permissions(&path, Permissions::from_mode(0o755)).unwrap();

        let res = Debuggee::launch(&path);
        fs::remove_file(&path).unwrap();
        assert!(matches!(res, Err(LaunchError::ExecFailed(_))), "{res:?}");
    }

    #[test]
    fn test_check_executable() {
        assert!(matches!(
            check_executable(Path::new("/definitely/not/here")),
            Err(LaunchError::ExecutableDoesNotExist(_))
        ));
        assert!(matches!(
            check_executable(Path::new("/")),
            Err(LaunchError::ExecutableIsNotAFile(_))
        ));
    }

    #[test]
    fn test_trap_cause_from_si_code() {
        let step = ResumeMode::SingleStep;
        let cont = ResumeMode::Continue;
        let cause = TrapCause::from_si_code;
        assert_eq!(cause(SI_KERNEL, cont), TrapCause::Breakpoint);
        assert_eq!(cause(SI_KERNEL, step), TrapCause::Breakpoint);
        assert_eq!(cause(TRAP_TRACE, step), TrapCause::SingleStep);
        assert_eq!(cause(TRAP_BRKPT, step), TrapCause::SingleStep);
        assert_eq!(cause(TRAP_BRKPT, cont), TrapCause::Other);
        assert_eq!(cause(0, cont), TrapCause::Other);
    }

    #[test]
    fn test_stop_reason_liveness() {
        assert!(StopReason::Trapped(TrapCause::SingleStep).is_alive());
        assert!(StopReason::Signaled(Signal::SIGUSR1).is_alive());
        assert!(!StopReason::Exited(0).is_alive());
        assert!(!StopReason::Terminated(Signal::SIGKILL).is_alive());
    }
}
