//! Line relay between the supervisor and a job's standard streams
//!
//! [`InputChannel`] writes newline-terminated lines into a child's standard
//! input. [`OutputChannel`] reads lines from a child's standard output
//! without ever blocking the control thread: readiness is checked with a
//! zero-timeout `poll` first, and the descriptor itself is non-blocking so a
//! partial line (no newline yet) is kept for the next call instead of
//! stalling the read.

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, ErrorKind, Write};
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use tracing::debug;

/// Result of one receive attempt on a job's output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// A complete line, without its terminator
    Line(String),
    /// The child closed its end of the output pipe
    Eof,
    /// Nothing is ready to read right now
    NoInput,
}

impl fmt::Display for Received {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Received::Line(line) => f.write_str(line),
            Received::Eof => f.write_str("<EOF>"),
            Received::NoInput => f.write_str("<no input>"),
        }
    }
}

/// Supervisor-side write end of a job's standard input
#[derive(Debug)]
pub struct InputChannel {
    writer: Option<File>,
}

impl InputChannel {
    /// Wrap a pipe write end, switching it to non-blocking mode
    ///
    /// A child that never reads its input must not stall the supervisor
    /// once the pipe buffer is full.
    pub fn new(fd: OwnedFd) -> io::Result<Self> {
        set_nonblocking(&fd)?;
        Ok(Self {
            writer: Some(File::from(fd)),
        })
    }

    /// Whether the channel was closed with [`InputChannel::close`]
    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    /// Write `text` followed by a newline
    ///
    /// The line goes out in a single `write` call; a short write is not
    /// retried. A full pipe fails with `WouldBlock`. Writing to a closed
    /// channel fails with `BrokenPipe`.
    pub fn send_line(&mut self, text: &str) -> io::Result<usize> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(ErrorKind::BrokenPipe, "input channel is closed"))?;

        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');

        let written = writer.write(line.as_bytes())?;
        if written < line.len() {
            debug!("Short write: {} of {} bytes", written, line.len());
        }
        Ok(written)
    }

    /// Close the write end so the child sees end of file
    ///
    /// Returns `false` if the channel was already closed.
    pub fn close(&mut self) -> bool {
        self.writer.take().is_some()
    }
}

/// Supervisor-side read end of a job's standard output
///
/// The buffered reader lives as long as the job, so consecutive receives
/// continue where the previous one stopped.
#[derive(Debug)]
pub struct OutputChannel {
    reader: BufReader<File>,
    /// Bytes of a line whose newline has not arrived yet
    pending: Vec<u8>,
}

impl OutputChannel {
    /// Wrap a pipe read end, switching it to non-blocking mode
    pub fn new(fd: OwnedFd) -> io::Result<Self> {
        set_nonblocking(&fd)?;
        Ok(Self {
            reader: BufReader::new(File::from(fd)),
            pending: Vec::new(),
        })
    }

    /// Check, without blocking, whether a receive would make progress
    ///
    /// A complete line already sitting in the buffer counts as ready. A hang
    /// up or error on the pipe also counts, since the next read reports it.
    pub fn is_ready(&self) -> io::Result<bool> {
        if self.reader.buffer().contains(&b'\n') {
            return Ok(true);
        }

        let mut fds = [PollFd::new(self.reader.get_ref().as_fd(), PollFlags::POLLIN)];
        loop {
            match poll(&mut fds, PollTimeout::ZERO) {
                Ok(0) => return Ok(false),
                Ok(_) => {
                    let ready = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;
                    return Ok(fds[0].revents().is_some_and(|r| r.intersects(ready)));
                }
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Receive one line if one is ready
    pub fn receive(&mut self) -> io::Result<Received> {
        if !self.is_ready()? {
            return Ok(Received::NoInput);
        }
        self.read_line()
    }

    fn read_line(&mut self) -> io::Result<Received> {
        match self.reader.read_until(b'\n', &mut self.pending) {
            Ok(0) if self.pending.is_empty() => Ok(Received::Eof),
            // A line, or the unterminated tail of the stream
            Ok(_) => Ok(Received::Line(self.take_pending())),
            // Partial bytes stay in `pending`
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(Received::NoInput),
            Err(e) => Err(e),
        }
    }

    fn take_pending(&mut self) -> String {
        if self.pending.last() == Some(&b'\n') {
            self.pending.pop();
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        line
    }
}

fn set_nonblocking(fd: &OwnedFd) -> io::Result<()> {
    let flags = fcntl(fd.as_raw_fd(), FcntlArg::F_GETFL)?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFL(flags))?;
    Ok(())
}
