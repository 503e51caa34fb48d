//! Control commands and their argument validation
//!
//! [`Command::parse`] turns a tokenized control line into a [`Command`],
//! checking arity, job identifiers, signal numbers and sleep times in the
//! order the operator sees errors for each verb. Every failure is a
//! [`CommandError`] whose `Display` is the text printed after `Error: `.

use crate::job::{JobId, JobTable};
use nix::sys::signal::Signal;
use std::time::Duration;
use thiserror::Error;

/// Lowest signal number accepted by `signal`
pub const MIN_SIGNAL: i32 = 1;

/// Highest signal number accepted by `signal`
pub const MAX_SIGNAL: i32 = 31;

/// Operator-level errors; each aborts only the current command
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    #[error("Insufficient arguments")]
    InsufficientArguments,

    #[error("Invalid job")]
    InvalidJob,

    #[error("Invalid signal")]
    InvalidSignal,

    #[error("Invalid sleep time")]
    InvalidSleepTime,

    #[error("Invalid command")]
    InvalidCommand,
}

/// A validated control command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `spawn <program> [args...]`
    Spawn { program: String, args: Vec<String> },
    /// `report [jobId]`
    Report(Option<JobId>),
    /// `signal <jobId> <signum>`
    Signal { job: JobId, signal: Signal },
    /// `sleep <seconds>`
    Sleep(Duration),
    /// `send <jobId> <text>`
    Send { job: JobId, text: String },
    /// `rcv <jobId>`
    Receive(JobId),
    /// `eof <jobId>`
    Eof(JobId),
    /// `cleanup`
    Cleanup,
}

impl Command {
    /// Parse a tokenized control line against the current job table
    pub fn parse(argv: &[String], jobs: &JobTable) -> Result<Command, CommandError> {
        let (verb, args) = argv.split_first().ok_or(CommandError::InvalidCommand)?;

        match verb.as_str() {
            "spawn" => {
                let (program, rest) = args
                    .split_first()
                    .ok_or(CommandError::InsufficientArguments)?;
                Ok(Command::Spawn {
                    program: program.clone(),
                    args: rest.to_vec(),
                })
            }
            "report" => match args.first() {
                Some(arg) => Ok(Command::Report(Some(parse_job(arg, jobs)?))),
                None => Ok(Command::Report(None)),
            },
            "signal" => {
                if args.len() < 2 {
                    return Err(CommandError::InsufficientArguments);
                }
                let job = parse_job(&args[0], jobs)?;
                let signal = parse_signal(&args[1])?;
                Ok(Command::Signal { job, signal })
            }
            "sleep" => {
                let arg = args.first().ok_or(CommandError::InsufficientArguments)?;
                Ok(Command::Sleep(parse_sleep_time(arg)?))
            }
            "send" => {
                // The job is checked before the text is required
                let job = parse_job(
                    args.first().ok_or(CommandError::InsufficientArguments)?,
                    jobs,
                )?;
                let text = args.get(1).ok_or(CommandError::InsufficientArguments)?;
                Ok(Command::Send {
                    job,
                    text: text.clone(),
                })
            }
            "rcv" => {
                let arg = args.first().ok_or(CommandError::InsufficientArguments)?;
                Ok(Command::Receive(parse_job(arg, jobs)?))
            }
            "eof" => {
                let arg = args.first().ok_or(CommandError::InsufficientArguments)?;
                Ok(Command::Eof(parse_job(arg, jobs)?))
            }
            "cleanup" => Ok(Command::Cleanup),
            _ => Err(CommandError::InvalidCommand),
        }
    }
}

/// Leading spaces are tolerated; the rest must be ASCII digits only
fn unsigned_digits(arg: &str) -> Option<&str> {
    let digits = arg.trim_start_matches(' ');
    (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())).then_some(digits)
}

fn parse_job(arg: &str, jobs: &JobTable) -> Result<JobId, CommandError> {
    unsigned_digits(arg)
        .and_then(|digits| digits.parse::<usize>().ok())
        .and_then(|index| jobs.lookup(index))
        .ok_or(CommandError::InvalidJob)
}

fn parse_signal(arg: &str) -> Result<Signal, CommandError> {
    unsigned_digits(arg)
        .and_then(|digits| digits.parse::<i32>().ok())
        .filter(|number| (MIN_SIGNAL..=MAX_SIGNAL).contains(number))
        .and_then(|number| Signal::try_from(number).ok())
        .ok_or(CommandError::InvalidSignal)
}

/// Non-negative decimal seconds: digits with at most one `.`
pub fn parse_sleep_time(arg: &str) -> Result<Duration, CommandError> {
    let time = arg.trim_start_matches(' ');
    let well_formed = !time.is_empty()
        && time.bytes().all(|b| b.is_ascii_digit() || b == b'.')
        && time.bytes().filter(|&b| b == b'.').count() <= 1;
    if !well_formed {
        return Err(CommandError::InvalidSleepTime);
    }

    let seconds: f64 = time.parse().map_err(|_| CommandError::InvalidSleepTime)?;
    Duration::try_from_secs_f64(seconds).map_err(|_| CommandError::InvalidSleepTime)
}
