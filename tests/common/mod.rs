//! Test helpers for pidone's black-box scenarios.
//!
//! These spawn the real compiled binary against a temporary command
//! directory full of small shell scripts, mirroring the source's own
//! Docker-based scenarios but without the Docker dependency: what is under
//! test is pidone's own process-management logic, not containerization.

use std::fs;
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;

pub struct Harness {
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp command directory"),
        }
    }

    /// Writes an executable shell script fixture into the command directory.
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write fixture script");
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }

    /// Spawns the pidone binary pointed at this harness's command directory,
    /// with an optional argv override.
    pub fn spawn(&self, argv_override: &[&str]) -> RunningInit {
        let bin = env!("CARGO_BIN_EXE_pidone");
        let mut cmd = Command::new(bin);
        cmd.env("PIDONE_DIR", self.dir.path())
            .env("PIDONE_SHUTDOWN_MS", "500")
            .env("PIDONE_FORCE_GRACE_MS", "300")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for arg in argv_override {
            cmd.arg(arg);
        }
        let child = cmd.spawn().expect("spawn pidone binary");
        RunningInit { child }
    }
}

pub struct RunningInit {
    pub child: Child,
}

impl RunningInit {
    pub fn terminate(&self) {
        let _ = kill(Pid::from_raw(self.child.id() as i32), Signal::SIGTERM);
    }

    /// Waits for the process to exit, collecting stdout/stderr, up to `timeout`.
    pub fn wait(mut self, timeout: Duration) -> Output {
        let start = Instant::now();
        let status = loop {
            if let Some(status) = self.child.try_wait().expect("try_wait") {
                break status;
            }
            if start.elapsed() > timeout {
                let _ = self.child.kill();
                panic!("pidone did not exit within {timeout:?}");
            }
            std::thread::sleep(Duration::from_millis(20));
        };

        let mut stdout = String::new();
        let mut stderr = String::new();
        self.child
            .stdout
            .take()
            .unwrap()
            .read_to_string(&mut stdout)
            .unwrap();
        self.child
            .stderr
            .take()
            .unwrap()
            .read_to_string(&mut stderr)
            .unwrap();

        Output {
            code: status.code(),
            stdout,
            stderr,
        }
    }
}

pub struct Output {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// A script body that sleeps for `secs`, exiting 0 if it runs to completion
/// and trapping SIGTERM to exit 0 promptly instead (a graceful child).
pub fn graceful_sleep(secs: u32) -> String {
    format!("trap 'exit 0' TERM\nsleep {secs} &\nwait $!\n")
}

/// A script body that traps SIGTERM and kills itself with SIGKILL instead of
/// exiting normally, reproducing "guarded child killed by a signal."
pub fn dies_by_signal_on_term(secs: u32) -> String {
    format!("trap 'kill -KILL $$' TERM\nsleep {secs} &\nwait $!\n")
}

/// A script body that ignores SIGTERM entirely, forcing the drain deadline to
/// expire and the supervisor into the Forcing phase.
pub fn ignores_term(secs: u32) -> String {
    format!("trap '' TERM\nsleep {secs}\n")
}
