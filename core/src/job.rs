//! Job records and the append-only job table
//!
//! A [`Job`] bundles a child process with the supervisor's ends of its
//! pipes and the terminal status once it has been observed. Jobs are never
//! removed from the [`JobTable`], so a [`JobId`] stays valid for the life of
//! the supervisor.

use crate::process::unix::{ChildProcess, ExitState, PipedChild};
use crate::relay::{InputChannel, OutputChannel, Received};
use std::fmt;
use std::io;
use tracing::debug;

/// Dense, zero-based job identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(usize);

impl JobId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Liveness of a job as shown by `report`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Exited(i32),
    Signalled(i32),
}

impl From<ExitState> for JobStatus {
    fn from(state: ExitState) -> Self {
        match state {
            ExitState::Exited(code) => JobStatus::Exited(code),
            ExitState::Signalled(signal) => JobStatus::Signalled(signal),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Running => f.write_str("running"),
            JobStatus::Exited(code) => write!(f, "exited({})", code),
            JobStatus::Signalled(signal) => write!(f, "signalled({})", signal),
        }
    }
}

/// One supervised child
#[derive(Debug)]
pub struct Job {
    id: JobId,
    program: String,
    process: ChildProcess,
    input: InputChannel,
    output: OutputChannel,
    /// Terminal state, set once when first observed
    terminal: Option<ExitState>,
}

impl Job {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn process(&self) -> &ChildProcess {
        &self.process
    }

    /// Whether a terminal status has been observed
    pub fn is_terminated(&self) -> bool {
        self.terminal.is_some()
    }

    /// Status last observed, without consulting the OS
    pub fn cached_status(&self) -> JobStatus {
        self.terminal.map_or(JobStatus::Running, JobStatus::from)
    }

    /// Poll the process without blocking and return its status
    ///
    /// The first poll that sees the process terminated reaps it and caches
    /// the result. Once reaped the PID can no longer be queried, so any poll
    /// error falls back to the cached status.
    pub fn poll_status(&mut self) -> JobStatus {
        if self.terminal.is_none() {
            match self.process.try_wait() {
                Ok(Some(state)) => self.record(state),
                Ok(None) => {}
                Err(e) => debug!("Job {}: {}; using cached status", self.id, e),
            }
        }
        self.cached_status()
    }

    /// Kill the process if it is not known to be dead, then block until it
    /// is reaped
    pub fn terminate(&mut self) {
        if self.terminal.is_none() {
            if let Err(e) = self.process.kill() {
                debug!("Job {}: {}", self.id, e);
            }
        }
        match self.process.wait() {
            Ok(state) => self.record(state),
            Err(e) => debug!("Job {}: {}; keeping cached status", self.id, e),
        }
    }

    /// Write one line to the job's standard input
    pub fn send_line(&mut self, text: &str) -> io::Result<usize> {
        self.input.send_line(text)
    }

    /// Read one line from the job's standard output if one is ready
    pub fn receive(&mut self) -> io::Result<Received> {
        self.output.receive()
    }

    /// Close the job's standard input; `false` if it was already closed
    pub fn close_input(&mut self) -> bool {
        self.input.close()
    }

    pub fn input_closed(&self) -> bool {
        self.input.is_closed()
    }

    fn record(&mut self, state: ExitState) {
        if self.terminal.is_none() {
            debug!("Job {} ({}) terminated: {:?}", self.id, self.process.pid(), state);
            self.terminal = Some(state);
        }
    }
}

/// Append-only registry of every job spawned by a supervisor
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: Vec<Job>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// The id the next inserted job will receive
    pub fn next_id(&self) -> JobId {
        JobId(self.jobs.len())
    }

    /// Record a freshly spawned child and return its id
    pub fn insert(&mut self, program: &str, child: PipedChild) -> io::Result<JobId> {
        let id = self.next_id();
        let PipedChild {
            process,
            stdin,
            stdout,
        } = child;
        let channels = InputChannel::new(stdin)
            .and_then(|input| Ok((input, OutputChannel::new(stdout)?)));
        let (input, output) = match channels {
            Ok(channels) => channels,
            Err(e) => {
                // Not recorded, so nothing else would ever reap it
                let _ = process.kill();
                let _ = process.wait();
                return Err(e);
            }
        };
        self.jobs.push(Job {
            id,
            program: program.to_string(),
            process,
            input,
            output,
            terminal: None,
        });
        Ok(id)
    }

    /// Resolve a numeric index to a valid job id
    pub fn lookup(&self, index: usize) -> Option<JobId> {
        (index < self.jobs.len()).then_some(JobId(index))
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(id.0)
    }

    pub fn get_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.jobs.get_mut(id.0)
    }

    /// Jobs in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Job> {
        self.jobs.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::unix::{spawn_piped, SpawnOptions};

    fn spawn_job(table: &mut JobTable, program: &str, args: &[&str]) -> JobId {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let child = spawn_piped(program, &args, SpawnOptions::default()).expect("spawn");
        table.insert(program, child).expect("insert")
    }

    #[test]
    fn test_status_display() {
        assert_eq!(JobStatus::Running.to_string(), "running");
        assert_eq!(JobStatus::Exited(0).to_string(), "exited(0)");
        assert_eq!(JobStatus::Exited(99).to_string(), "exited(99)");
        assert_eq!(JobStatus::Signalled(9).to_string(), "signalled(9)");
    }

    #[test]
    fn test_ids_are_dense_and_in_order() {
        let mut table = JobTable::new();
        assert!(table.is_empty());
        let first = spawn_job(&mut table, "true", &[]);
        let second = spawn_job(&mut table, "true", &[]);
        assert_eq!(first.index(), 0);
        assert_eq!(second.index(), 1);
        assert_eq!(table.next_id().index(), 2);

        assert_eq!(table.lookup(1), Some(second));
        assert_eq!(table.lookup(2), None);

        let ids: Vec<_> = table.iter().map(|job| job.id()).collect();
        assert_eq!(ids, vec![first, second]);

        for job in table.iter_mut() {
            job.terminate();
        }
    }

    #[test]
    fn test_terminal_status_is_cached_after_reap() {
        let mut table = JobTable::new();
        let id = spawn_job(&mut table, "sh", &["-c", "exit 3"]);
        let job = table.get_mut(id).expect("job");

        job.terminate();
        assert_eq!(job.cached_status(), JobStatus::Exited(3));
        // The PID is gone; the poll falls back to the cache
        assert_eq!(job.poll_status(), JobStatus::Exited(3));
        assert_eq!(job.poll_status(), JobStatus::Exited(3));
    }

    #[test]
    fn test_terminate_kills_running_job() {
        let mut table = JobTable::new();
        let id = spawn_job(&mut table, "sleep", &["30"]);
        let job = table.get_mut(id).expect("job");

        assert_eq!(job.poll_status(), JobStatus::Running);
        assert!(!job.is_terminated());
        job.terminate();
        assert_eq!(job.cached_status(), JobStatus::Signalled(libc::SIGKILL));

        // Idempotent
        job.terminate();
        assert_eq!(job.cached_status(), JobStatus::Signalled(libc::SIGKILL));
    }
}
