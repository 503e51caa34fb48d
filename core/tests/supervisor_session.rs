//! End-to-end command sequences against a real supervisor
//!
//! Each test drives [`Supervisor::execute`] with tokenized control lines
//! and checks the exact operator-visible output.

#![cfg(unix)]
#![allow(unused_crate_dependencies)]

use hq_core::{JobStatus, Supervisor};
use std::sync::mpsc;
use std::time::{Duration, Instant};

struct Session {
    supervisor: Supervisor,
}

impl Session {
    fn new() -> Self {
        Self {
            supervisor: Supervisor::default(),
        }
    }

    fn run(&mut self, argv: &[&str]) -> String {
        let argv: Vec<String> = argv.iter().map(|a| a.to_string()).collect();
        let mut out = Vec::new();
        self.supervisor.execute(&argv, &mut out).expect("write to Vec");
        String::from_utf8(out).expect("utf8 output")
    }

    /// Retry `rcv` until something other than `<no input>` arrives
    fn receive_eventually(&mut self, job: &str) -> String {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let out = self.run(&["rcv", job]);
            if out != "<no input>\n" || Instant::now() >= deadline {
                return out;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    /// Poll `report` until the job leaves the running state
    fn wait_terminated(&mut self, job: usize) -> JobStatus {
        let id = self.supervisor.jobs().lookup(job).expect("job exists");
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let status = self.supervisor.status(id).expect("job exists");
            if status != JobStatus::Running || Instant::now() >= deadline {
                return status;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}

#[test]
fn test_cat_echo_round_trip() {
    let mut session = Session::new();
    assert_eq!(session.run(&["spawn", "cat"]), "New Job ID [0] created\n");
    assert_eq!(session.run(&["rcv", "0"]), "<no input>\n");

    assert_eq!(session.run(&["send", "0", "hello world"]), "");
    assert_eq!(session.receive_eventually("0"), "hello world\n");
    assert_eq!(session.run(&["rcv", "0"]), "<no input>\n");

    assert_eq!(session.run(&["eof", "0"]), "");
    assert_eq!(session.receive_eventually("0"), "<EOF>\n");
    assert_eq!(session.wait_terminated(0), JobStatus::Exited(0));
    assert_eq!(
        session.run(&["report"]),
        "[Job] cmd:status\n[0] cat:exited(0)\n"
    );
}

#[test]
fn test_lines_are_delivered_one_per_receive() {
    let mut session = Session::new();
    session.run(&["spawn", "printf", "a\\nb\\n"]);
    assert_eq!(session.receive_eventually("0"), "a\n");
    assert_eq!(session.receive_eventually("0"), "b\n");
    assert_eq!(session.receive_eventually("0"), "<EOF>\n");
    assert_eq!(session.receive_eventually("0"), "<EOF>\n");
}

#[test]
fn test_signal_kill_shows_signalled() {
    let mut session = Session::new();
    session.run(&["spawn", "sleep", "30"]);
    assert_eq!(
        session.run(&["report", "0"]),
        "[Job] cmd:status\n[0] sleep:running\n"
    );

    assert_eq!(session.run(&["signal", "0", "9"]), "");
    assert_eq!(session.wait_terminated(0), JobStatus::Signalled(9));

    // Signalling a reaped job is accepted silently
    assert_eq!(session.run(&["signal", "0", "15"]), "");
    assert_eq!(
        session.run(&["report"]),
        "[Job] cmd:status\n[0] sleep:signalled(9)\n"
    );
}

#[test]
fn test_unknown_program_exits_99() {
    let mut session = Session::new();
    assert_eq!(
        session.run(&["spawn", "hq-no-such-program-4242"]),
        "New Job ID [0] created\n"
    );
    assert_eq!(session.wait_terminated(0), JobStatus::Exited(99));
    assert_eq!(session.receive_eventually("0"), "<EOF>\n");
}

#[test]
fn test_report_lists_jobs_in_id_order() {
    let mut session = Session::new();
    session.run(&["spawn", "sh", "-c", "exit 4"]);
    session.run(&["spawn", "sleep", "30"]);
    session.wait_terminated(0);

    assert_eq!(
        session.run(&["report"]),
        "[Job] cmd:status\n[0] sh:exited(4)\n[1] sleep:running\n"
    );
    assert_eq!(
        session.run(&["report", "1"]),
        "[Job] cmd:status\n[1] sleep:running\n"
    );
    assert_eq!(session.run(&["report", "2"]), "Error: Invalid job\n");
}

#[test]
fn test_errors_leave_state_untouched() {
    let mut session = Session::new();
    session.run(&["spawn", "cat"]);

    assert_eq!(session.run(&["signal", "0", "99"]), "Error: Invalid signal\n");
    assert_eq!(session.run(&["signal", "0"]), "Error: Insufficient arguments\n");
    assert_eq!(session.run(&["send", "7", "x"]), "Error: Invalid job\n");
    assert_eq!(session.run(&["sleep", "soon"]), "Error: Invalid sleep time\n");
    assert_eq!(session.run(&["launch"]), "Error: Invalid command\n");

    assert_eq!(session.supervisor.jobs().len(), 1);
    assert_eq!(
        session.run(&["report"]),
        "[Job] cmd:status\n[0] cat:running\n"
    );
}

#[test]
fn test_sleep_blocks_for_duration() {
    let mut session = Session::new();
    let start = Instant::now();
    assert_eq!(session.run(&["sleep", "0.2"]), "");
    assert!(start.elapsed() >= Duration::from_millis(200));
}

#[test]
fn test_cleanup_terminates_every_job() {
    let mut session = Session::new();
    session.run(&["spawn", "sleep", "30"]);
    session.run(&["spawn", "cat"]);
    session.run(&["spawn", "true"]);
    session.wait_terminated(2);

    assert_eq!(session.run(&["cleanup"]), "");
    assert!(session.supervisor.jobs().iter().all(|job| job.is_terminated()));
    assert_eq!(
        session.run(&["report"]),
        "[Job] cmd:status\n[0] sleep:signalled(9)\n[1] cat:signalled(9)\n[2] true:exited(0)\n"
    );

    // Ids keep counting after cleanup
    assert_eq!(session.run(&["spawn", "true"]), "New Job ID [3] created\n");
}

#[test]
fn test_send_to_job_that_never_reads_returns() {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut session = Session::new();
        session.run(&["spawn", "sleep", "30"]);
        let text = "x".repeat(100_000);
        let first = session.run(&["send", "0", text.as_str()]);
        let second = session.run(&["send", "0", text.as_str()]);
        let report = session.run(&["report", "0"]);
        let _ = tx.send((first, second, report));
    });

    let (first, second, report) = rx
        .recv_timeout(Duration::from_secs(10))
        .expect("send stalled the control thread");
    assert_eq!(first, "");
    assert_eq!(second, "");
    assert_eq!(report, "[Job] cmd:status\n[0] sleep:running\n");
}
