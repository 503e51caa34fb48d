//! Unix process launching with piped standard streams
//!
//! This module starts child programs with `fork`/`execvp` and wires two
//! one-directional pipes to the child's standard input and standard output.
//! The supervisor keeps the opposite ends.
//!
//! ## Descriptor hygiene
//!
//! - Every pipe is created close-on-exec, so a child never inherits the
//!   supervisor-side ends of any job, including jobs spawned earlier
//! - The child ends are `dup2`'d onto fds 0 and 1 (which clears close-on-exec
//!   on the copies) and dropped by the parent right after `fork`
//!
//! ## Exec failure
//!
//! A program that cannot be executed is not reported to the caller. The child
//! calls `_exit(99)` instead, and the failure shows up later as an
//! `exited(99)` status when the process is reaped.
//!
//! ## Signal dispositions
//!
//! The supervisor ignores SIGINT and SIGPIPE (see [`ignore_operator_signals`]).
//! Ignored dispositions survive `exec`, so the child restores the defaults for
//! both before replacing its image.

// Allow unsafe code for this module since fork/exec and sigaction require it
#![allow(unsafe_code)]

use crate::{CoreError, Result};
use nix::errno::Errno;
#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
use nix::fcntl::OFlag;
use nix::sys::signal::{kill, sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{dup2, fork, setpgid, ForkResult, Pid};
use std::ffi::CString;
use std::os::raw::c_char;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use tracing::{debug, error};

/// Exit status of a child whose program could not be executed
pub const EXEC_FAILURE_STATUS: i32 = 99;

/// Signals the supervisor ignores while it runs
const OPERATOR_SIGNALS: [Signal; 2] = [Signal::SIGINT, Signal::SIGPIPE];

/// Options applied to every child at spawn time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpawnOptions {
    /// Move the child into a new process group of its own before exec
    pub isolate_process_group: bool,
}

/// How a reaped child terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    /// Normal exit with the given exit code
    Exited(i32),
    /// Terminated by the given signal number
    Signalled(i32),
}

/// A child process identified by its PID
///
/// The handle does not own the process: dropping it neither kills nor reaps
/// the child. Reaping is done through [`ChildProcess::try_wait`] and
/// [`ChildProcess::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildProcess {
    pid: Pid,
}

impl ChildProcess {
    /// Get the process ID
    pub fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Poll the process without blocking
    ///
    /// Returns `Ok(None)` while the process is still running. The first call
    /// after the process terminated reaps it and returns its [`ExitState`];
    /// any later call fails with `ECHILD` because the PID is gone.
    pub fn try_wait(&self) -> Result<Option<ExitState>> {
        match waitpid(self.pid, Some(WaitPidFlag::WNOHANG)) {
            Ok(status) => Ok(exit_state(status)),
            Err(e) => Err(CoreError::ProcessWait(format!(
                "Failed to poll process {}: {}",
                self.pid, e
            ))),
        }
    }

    /// Block until the process terminates and reap it
    pub fn wait(&self) -> Result<ExitState> {
        loop {
            match waitpid(self.pid, None) {
                Ok(status) => {
                    if let Some(state) = exit_state(status) {
                        return Ok(state);
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(e) => {
                    return Err(CoreError::ProcessWait(format!(
                        "Failed to wait for process {}: {}",
                        self.pid, e
                    )))
                }
            }
        }
    }

    /// Deliver a signal to the process
    ///
    /// ## Error Handling
    ///
    /// - `ESRCH` (No such process) is treated as success since the process
    ///   has already exited
    /// - `EPERM` is treated as success since the PID no longer belongs to us
    /// - Other errors are propagated as `ProcessSignal` errors
    pub fn signal(&self, signal: Signal) -> Result<()> {
        debug!("Sending {} to process {}", signal, self.pid);

        match kill(self.pid, signal) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => {
                debug!("Process {} already exited", self.pid);
                Ok(())
            }
            Err(Errno::EPERM) => {
                debug!(
                    "Permission denied signaling process {} (likely already reaped)",
                    self.pid
                );
                Ok(())
            }
            Err(e) => {
                error!("Failed to send {} to process {}: {}", signal, self.pid, e);
                Err(CoreError::ProcessSignal(format!(
                    "Failed to send {} to process {}: {}",
                    signal, self.pid, e
                )))
            }
        }
    }

    /// Send SIGKILL to the process
    pub fn kill(&self) -> Result<()> {
        self.signal(Signal::SIGKILL)
    }
}

/// A freshly started child together with the supervisor's pipe ends
#[derive(Debug)]
pub struct PipedChild {
    /// The started process
    pub process: ChildProcess,
    /// Write end connected to the child's standard input
    pub stdin: OwnedFd,
    /// Read end connected to the child's standard output
    pub stdout: OwnedFd,
}

/// Start `program` with `args`, piping its standard input and output
///
/// `program` is looked up in `PATH` the way `execvp` does and also becomes
/// `argv[0]`. Standard error is inherited from the supervisor.
///
/// ## Errors
///
/// - `PipeCreation` if either pipe cannot be allocated
/// - `ProcessSpawn` if `fork` fails or an argument contains a NUL byte
///
/// A program that does not exist or cannot be executed is *not* an error;
/// the child exits with [`EXEC_FAILURE_STATUS`].
///
/// ## Example
///
/// ```rust,no_run
/// use hq_core::process::unix::{spawn_piped, SpawnOptions};
///
/// let child = spawn_piped("cat", &[], SpawnOptions::default())?;
/// println!("Spawned process with PID: {}", child.process.pid());
/// # Ok::<(), hq_core::CoreError>(())
/// ```
pub fn spawn_piped(program: &str, args: &[String], options: SpawnOptions) -> Result<PipedChild> {
    debug!("Spawning process: {} {:?}", program, args);

    // Everything the child needs is allocated before fork
    let argv = std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(CString::new)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| {
            CoreError::ProcessSpawn(format!("Invalid argument for '{}': {}", program, e))
        })?;
    let mut argv_ptrs: Vec<*const c_char> = argv.iter().map(|arg| arg.as_ptr()).collect();
    argv_ptrs.push(std::ptr::null());

    let (child_stdin, stdin) = cloexec_pipe()?;
    let (stdout, child_stdout) = cloexec_pipe()?;

    // Safety: between fork and exec the child only calls async-signal-safe
    // functions (sigaction, setpgid, dup2, execvp, _exit) and never returns.
    // The exec argument array is built above so the child never allocates.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => exec_child(
            &argv_ptrs,
            child_stdin.as_raw_fd(),
            child_stdout.as_raw_fd(),
            options,
        ),
        Ok(ForkResult::Parent { child }) => {
            drop(child_stdin);
            drop(child_stdout);
            debug!("Spawned process {} for '{}'", child, program);
            Ok(PipedChild {
                process: ChildProcess { pid: child },
                stdin,
                stdout,
            })
        }
        Err(e) => {
            error!("Failed to fork for '{}': {}", program, e);
            Err(CoreError::ProcessSpawn(format!(
                "Failed to fork for '{}': {}",
                program, e
            )))
        }
    }
}

/// Ignore SIGINT and SIGPIPE in the calling process
///
/// An operator interrupt must not take the supervisor down before its
/// children are reaped, and a write to a child that closed its input must
/// surface as `EPIPE` instead of killing the supervisor.
pub fn ignore_operator_signals() -> Result<()> {
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::SA_RESTART, SigSet::empty());
    for signal in OPERATOR_SIGNALS {
        // Safety: SIG_IGN installs no handler code.
        unsafe { sigaction(signal, &ignore) }.map_err(|e| {
            CoreError::SignalSetup(format!("Failed to ignore {}: {}", signal, e))
        })?;
    }
    debug!("Ignoring {:?}", OPERATOR_SIGNALS);
    Ok(())
}

/// Runs in the forked child; never returns
///
/// `argv` is a NUL-terminated array of pointers into strings owned by the
/// parent's copy of the address space.
fn exec_child(
    argv: &[*const c_char],
    stdin_fd: RawFd,
    stdout_fd: RawFd,
    options: SpawnOptions,
) -> ! {
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    for signal in OPERATOR_SIGNALS {
        // Safety: SIG_DFL installs no handler code.
        let _ = unsafe { sigaction(signal, &default) };
    }

    if options.isolate_process_group {
        let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
    }

    if dup2(stdin_fd, libc::STDIN_FILENO).is_ok() && dup2(stdout_fd, libc::STDOUT_FILENO).is_ok() {
        // Safety: argv[0] and every later entry point to live NUL-terminated
        // strings and the array ends with a null pointer.
        unsafe { libc::execvp(argv[0], argv.as_ptr()) };
    }

    // Safety: _exit terminates immediately without running the parent's
    // atexit handlers or flushing its inherited stdio buffers.
    unsafe { libc::_exit(EXEC_FAILURE_STATUS) }
}

/// Create a pipe whose both ends are close-on-exec, returned as (read, write)
#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
pub(crate) fn cloexec_pipe() -> Result<(OwnedFd, OwnedFd)> {
    nix::unistd::pipe2(OFlag::O_CLOEXEC)
        .map_err(|e| CoreError::PipeCreation(format!("Failed to create pipe: {}", e)))
}

/// Create a pipe whose both ends are close-on-exec, returned as (read, write)
#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
pub(crate) fn cloexec_pipe() -> Result<(OwnedFd, OwnedFd)> {
    use nix::fcntl::{fcntl, FcntlArg, FdFlag};

    let (read, write) = nix::unistd::pipe()
        .map_err(|e| CoreError::PipeCreation(format!("Failed to create pipe: {}", e)))?;
    for fd in [read.as_raw_fd(), write.as_raw_fd()] {
        fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))
            .map_err(|e| CoreError::PipeCreation(format!("Failed to set FD_CLOEXEC: {}", e)))?;
    }
    Ok((read, write))
}

/// Map a wait status to a terminal state; `None` while the process lives
fn exit_state(status: WaitStatus) -> Option<ExitState> {
    match status {
        WaitStatus::Exited(_, code) => Some(ExitState::Exited(code)),
        WaitStatus::Signaled(_, signal, _) => Some(ExitState::Signalled(signal as i32)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::{Read, Write};
    use std::time::{Duration, Instant};

    fn wait_for_exit(child: &ChildProcess) -> ExitState {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(state) = child.try_wait().expect("try_wait") {
                return state;
            }
            assert!(Instant::now() < deadline, "process {} did not exit", child.pid());
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn test_spawn_and_poll_exit_code() {
        let args = ["-c".to_string(), "exit 7".to_string()];
        let child = spawn_piped("sh", &args, SpawnOptions::default()).expect("Failed to spawn sh");
        assert!(child.process.pid() > 0);
        assert_eq!(wait_for_exit(&child.process), ExitState::Exited(7));
    }

    #[test]
    fn test_spawn_nonexistent_command_exits_99() {
        let child = spawn_piped("nonexistent_command_12345", &[], SpawnOptions::default())
            .expect("exec failure must not be reported synchronously");
        assert_eq!(child.process.wait().expect("wait"), ExitState::Exited(EXEC_FAILURE_STATUS));
    }

    #[test]
    fn test_spawn_rejects_nul_in_arguments() {
        let result = spawn_piped("echo", &["a\0b".to_string()], SpawnOptions::default());
        match result {
            Err(CoreError::ProcessSpawn(_)) => {}
            other => panic!("Expected ProcessSpawn error, got: {:?}", other.map(|c| c.process)),
        }
    }

    #[test]
    fn test_pipes_are_wired_to_child_streams() {
        let child = spawn_piped("cat", &[], SpawnOptions::default()).expect("Failed to spawn cat");
        let mut input = File::from(child.stdin);
        input.write_all(b"ping\n").expect("write");
        drop(input);

        assert_eq!(child.process.wait().expect("wait"), ExitState::Exited(0));

        let mut output = File::from(child.stdout);
        let mut text = String::new();
        output.read_to_string(&mut text).expect("read");
        assert_eq!(text, "ping\n");
    }

    #[test]
    fn test_signal_and_wait_reports_signal() {
        let child = spawn_piped("sleep", &["10".to_string()], SpawnOptions::default())
            .expect("Failed to spawn sleep");
        child.process.signal(Signal::SIGTERM).expect("signal");
        assert_eq!(
            child.process.wait().expect("wait"),
            ExitState::Signalled(libc::SIGTERM)
        );
    }

    #[test]
    fn test_poll_after_reap_fails() {
        let child =
            spawn_piped("true", &[], SpawnOptions::default()).expect("Failed to spawn true");
        assert_eq!(child.process.wait().expect("wait"), ExitState::Exited(0));
        assert!(matches!(child.process.try_wait(), Err(CoreError::ProcessWait(_))));
    }

    #[test]
    fn test_kill_reaped_process_is_ok() {
        let child =
            spawn_piped("true", &[], SpawnOptions::default()).expect("Failed to spawn true");
        let _ = child.process.wait();
        // ESRCH is treated as success
        assert!(child.process.kill().is_ok());
    }
}
