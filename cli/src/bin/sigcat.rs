//! sigcat: a test child for hq
//!
//! Copies every line of standard input to its current output stream and
//! reports each signal it can register a handler for. SIGUSR1 switches the
//! output stream to stdout and SIGUSR2 to stderr. Arguments are ignored.

#![cfg_attr(test, allow(unused_crate_dependencies))]

use anyhow::{Context, Result};
use libc::c_int;
use signal_hook::consts::FORBIDDEN;
use signal_hook::iterator::Signals;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Highest signal number sigcat listens for
const MAX_SIGNAL: c_int = 31;

/// Where output currently goes; shared by the echo loop and the signal thread
#[derive(Clone)]
struct Output {
    to_stderr: Arc<AtomicBool>,
    lock: Arc<Mutex<()>>,
}

impl Output {
    fn new() -> Self {
        Self {
            to_stderr: Arc::new(AtomicBool::new(false)),
            lock: Arc::new(Mutex::new(())),
        }
    }

    fn write(&self, bytes: &[u8]) -> io::Result<()> {
        // A poisoned lock only means another writer panicked mid-line
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if self.to_stderr.load(Ordering::SeqCst) {
            let mut err = io::stderr().lock();
            err.write_all(bytes)?;
            err.flush()
        } else {
            let mut out = io::stdout().lock();
            out.write_all(bytes)?;
            out.flush()
        }
    }

    fn switch_to_stderr(&self, to_stderr: bool) {
        self.to_stderr.store(to_stderr, Ordering::SeqCst);
    }
}

/// The text `strsignal` gives for `signal` on Linux
fn describe(signal: c_int) -> &'static str {
    match signal {
        libc::SIGHUP => "Hangup",
        libc::SIGINT => "Interrupt",
        libc::SIGQUIT => "Quit",
        libc::SIGILL => "Illegal instruction",
        libc::SIGTRAP => "Trace/breakpoint trap",
        libc::SIGABRT => "Aborted",
        libc::SIGBUS => "Bus error",
        libc::SIGFPE => "Floating point exception",
        libc::SIGKILL => "Killed",
        libc::SIGUSR1 => "User defined signal 1",
        libc::SIGSEGV => "Segmentation fault",
        libc::SIGUSR2 => "User defined signal 2",
        libc::SIGPIPE => "Broken pipe",
        libc::SIGALRM => "Alarm clock",
        libc::SIGTERM => "Terminated",
        #[cfg(any(target_os = "linux", target_os = "android"))]
        libc::SIGSTKFLT => "Stack fault",
        libc::SIGCHLD => "Child exited",
        libc::SIGCONT => "Continued",
        libc::SIGSTOP => "Stopped (signal)",
        libc::SIGTSTP => "Stopped",
        libc::SIGTTIN => "Stopped (tty input)",
        libc::SIGTTOU => "Stopped (tty output)",
        libc::SIGURG => "Urgent I/O condition",
        libc::SIGXCPU => "CPU time limit exceeded",
        libc::SIGXFSZ => "File size limit exceeded",
        libc::SIGVTALRM => "Virtual timer expired",
        libc::SIGPROF => "Profiling timer expired",
        libc::SIGWINCH => "Window changed",
        libc::SIGIO => "I/O possible",
        #[cfg(any(target_os = "linux", target_os = "android"))]
        libc::SIGPWR => "Power failure",
        libc::SIGSYS => "Bad system call",
        _ => "Unknown signal",
    }
}

/// Signals 1..=31 that a handler may be registered for
///
/// `signal-hook` refuses SIGKILL and SIGSTOP, which cannot be caught, and
/// also SIGILL, SIGFPE and SIGSEGV. Those three keep their default action,
/// so delivering one terminates sigcat instead of being reported.
fn catchable_signals() -> Vec<c_int> {
    (1..=MAX_SIGNAL)
        .filter(|signal| !FORBIDDEN.contains(signal))
        .collect()
}

fn spawn_signal_reporter(output: Output) -> Result<()> {
    let mut signals =
        Signals::new(catchable_signals()).context("failed to register signal handlers")?;
    std::thread::spawn(move || {
        for signal in signals.forever() {
            let message = format!("sigcat received {}\n", describe(signal));
            if output.write(message.as_bytes()).is_err() {
                continue;
            }
            match signal {
                libc::SIGUSR1 => output.switch_to_stderr(false),
                libc::SIGUSR2 => output.switch_to_stderr(true),
                _ => {}
            }
        }
    });
    Ok(())
}

fn main() -> Result<()> {
    let output = Output::new();
    spawn_signal_reporter(output.clone())?;

    let mut stdin = io::stdin().lock();
    let mut line = Vec::new();
    loop {
        line.clear();
        if stdin.read_until(b'\n', &mut line)? == 0 {
            return Ok(());
        }
        output.write(&line).context("failed to echo line")?;
    }
}
