//! Job supervisor
//!
//! The [`Supervisor`] owns the [`JobTable`] and runs one control command at a
//! time on the calling thread. Every operation except [`Supervisor::cleanup`]
//! and `sleep` returns promptly regardless of what the children are doing:
//! status polls use `WNOHANG` and receives poll before reading.
//!
//! Operator-visible output goes to the writer passed to
//! [`Supervisor::execute`]; diagnostics go through `tracing`.
//!
//! ## Teardown
//!
//! [`Supervisor::cleanup`] kills and reaps every job. It runs for the
//! `cleanup` command, at end of input, and when the supervisor is dropped
//! with jobs that were never observed to terminate.

use crate::command::Command;
use crate::job::{JobId, JobStatus, JobTable};
use crate::process::unix::{spawn_piped, SpawnOptions};
use crate::relay::Received;
use crate::Result;
use nix::sys::signal::Signal;
use std::io::{self, ErrorKind, Write};
use tracing::{debug, error, info, warn};

/// Header printed before status lines by `report`
pub const REPORT_HEADER: &str = "[Job] cmd:status";

/// Owns every job spawned during a session
#[derive(Debug, Default)]
pub struct Supervisor {
    jobs: JobTable,
    options: SpawnOptions,
}

impl Supervisor {
    /// Create a supervisor with no jobs
    pub fn new(options: SpawnOptions) -> Self {
        Self {
            jobs: JobTable::new(),
            options,
        }
    }

    pub fn jobs(&self) -> &JobTable {
        &self.jobs
    }

    /// Parse and run one tokenized control line
    ///
    /// Malformed commands print `Error: ...` and leave all state untouched.
    /// The returned error only reports failures writing to `out`.
    pub fn execute<W: Write>(&mut self, argv: &[String], out: &mut W) -> io::Result<()> {
        match Command::parse(argv, &self.jobs) {
            Ok(command) => self.run(command, out)?,
            Err(e) => writeln!(out, "Error: {}", e)?,
        }
        out.flush()
    }

    /// Run an already validated command
    pub fn run<W: Write>(&mut self, command: Command, out: &mut W) -> io::Result<()> {
        match command {
            Command::Spawn { program, args } => match self.spawn(&program, &args) {
                Ok(id) => writeln!(out, "New Job ID [{}] created", id)?,
                Err(e) => writeln!(out, "Error: {}", e)?,
            },
            Command::Report(job) => self.report(job, out)?,
            Command::Signal { job, signal } => self.signal(job, signal),
            Command::Sleep(duration) => std::thread::sleep(duration),
            Command::Send { job, text } => self.send(job, &text),
            Command::Receive(job) => writeln!(out, "{}", self.receive(job))?,
            Command::Eof(job) => self.close_input(job),
            Command::Cleanup => self.cleanup(),
        }
        Ok(())
    }

    /// Start a new job and return its id
    ///
    /// Only resource failures (pipes, fork) are errors; they leave the job
    /// table unchanged. A program that cannot be executed still becomes a
    /// job, which exits with status 99.
    pub fn spawn(&mut self, program: &str, args: &[String]) -> Result<JobId> {
        let child = spawn_piped(program, args, self.options).map_err(|e| {
            error!("Unable to spawn '{}': {}", program, e);
            e
        })?;
        let pid = child.process.pid();
        let id = self.jobs.insert(program, child)?;
        info!("Job {} started '{}' as process {}", id, program, pid);
        Ok(id)
    }

    /// Print the header and the status of one job, or of every job in id
    /// order
    pub fn report<W: Write>(&mut self, job: Option<JobId>, out: &mut W) -> io::Result<()> {
        writeln!(out, "{}", REPORT_HEADER)?;
        match job {
            Some(id) => {
                if let Some(job) = self.jobs.get_mut(id) {
                    let status = job.poll_status();
                    writeln!(out, "[{}] {}:{}", job.id(), job.program(), status)?;
                }
            }
            None => {
                for job in self.jobs.iter_mut() {
                    let status = job.poll_status();
                    writeln!(out, "[{}] {}:{}", job.id(), job.program(), status)?;
                }
            }
        }
        Ok(())
    }

    /// Poll one job's status without blocking
    pub fn status(&mut self, id: JobId) -> Option<JobStatus> {
        self.jobs.get_mut(id).map(|job| job.poll_status())
    }

    /// Deliver `signal` to a job's process, whether or not it is still alive
    pub fn signal(&mut self, id: JobId, signal: Signal) {
        if let Some(job) = self.jobs.get(id) {
            if let Err(e) = job.process().signal(signal) {
                debug!("Job {}: {}", id, e);
            }
        }
    }

    /// Write one newline-terminated line to a job's standard input
    pub fn send(&mut self, id: JobId, text: &str) {
        let Some(job) = self.jobs.get_mut(id) else {
            return;
        };
        match job.send_line(text) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::BrokenPipe && job.input_closed() => {
                debug!("Job {}: input already closed, dropping line", id);
            }
            Err(e) => warn!("Job {}: failed to send line: {}", id, e),
        }
    }

    /// Read one line from a job's standard output if one is ready
    pub fn receive(&mut self, id: JobId) -> Received {
        let Some(job) = self.jobs.get_mut(id) else {
            return Received::NoInput;
        };
        job.receive().unwrap_or_else(|e| {
            warn!("Job {}: failed to read output: {}", id, e);
            Received::Eof
        })
    }

    /// Close a job's standard input
    pub fn close_input(&mut self, id: JobId) {
        if let Some(job) = self.jobs.get_mut(id) {
            if !job.close_input() {
                debug!("Job {}: input already closed", id);
            }
        }
    }

    /// Kill and reap every job
    ///
    /// Jobs already known to be terminated are not signalled. The wait for
    /// each job blocks until it is gone.
    pub fn cleanup(&mut self) {
        for job in self.jobs.iter_mut() {
            job.terminate();
        }
        info!("Cleaned up {} job(s)", self.jobs.len());
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if self.jobs.iter().any(|job| !job.is_terminated()) {
            self.cleanup();
        }
    }
}
