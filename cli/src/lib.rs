//! Interactive front end for the hq supervisor
//!
//! The control loop reads one line at a time, splits it into an argument
//! vector and hands it to [`Supervisor::execute`]. End of input ends the loop
//! and every job is torn down.

pub mod error;

pub use error::{CliError, Result};

use hq_core::Supervisor;
use std::io::{BufRead, Write};
use tracing::{debug, info};

/// Split a control line into arguments
///
/// Words follow POSIX shell rules: whitespace separates them, single or
/// double quotes group a substring into one argument, a backslash escapes
/// the next character, and a word starting with `#` begins a comment that
/// runs to the end of the line. Quote `#` or `\` to pass them through. A
/// line with an unbalanced quote is split on whitespace alone.
pub fn tokenize(line: &str) -> Vec<String> {
    shlex::split(line).unwrap_or_else(|| {
        debug!("Unbalanced quotes in {:?}; splitting on whitespace", line);
        line.split_whitespace().map(str::to_string).collect()
    })
}

/// Run the control loop until `input` reaches end of file
///
/// `prompt` is printed before every read when set. Blank lines are skipped.
/// Bytes that are not valid UTF-8 are replaced before tokenizing.
pub fn run_session<R, W>(
    supervisor: &mut Supervisor,
    mut input: R,
    out: &mut W,
    prompt: Option<&str>,
) -> Result<()>
where
    R: BufRead,
    W: Write,
{
    let mut line = Vec::new();
    loop {
        if let Some(prompt) = prompt {
            write!(out, "{}", prompt)?;
            out.flush()?;
        }

        line.clear();
        if input.read_until(b'\n', &mut line)? == 0 {
            break;
        }

        let text = String::from_utf8_lossy(&line);
        let argv = tokenize(text.trim_end_matches('\n'));
        if argv.is_empty() {
            continue;
        }
        debug!("Control line: {:?}", argv);
        supervisor.execute(&argv, out)?;
    }

    info!("End of control input");
    supervisor.cleanup();
    Ok(())
}
