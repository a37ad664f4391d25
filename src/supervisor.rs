//! The state machine: launches guarded children, runs the event loop, and
//! drives Running -> Draining -> Forcing -> Exited to a single exit code.

use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use nix::sys::signal::{SigSet, SigmaskHow, Signal, kill, sigprocmask};
use nix::unistd::Pid;

use crate::child_table::{ChildRecord, ChildTable};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::launch::{format_command, format_commands};
use crate::reaper::{self, Outcome};
use crate::signals::{Event, SignalIntake};
use crate::{log_error, log_info, log_warn};

/// Exit code used when the reaper observes ECHILD while guarded children were
/// still believed alive. Kept outside the 0-23 range the normal contract uses
/// and outside the 126-165 range shells conventionally reserve for signals.
pub const REAP_INCONSISTENCY_EXIT_CODE: i32 = 71;
const FORCED_EXIT_CODE: i32 = 2;
const KILLED_BY_SIGNAL_EXIT_CODE: i32 = 23;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    Draining,
    Forcing,
    Exited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cause {
    ExternalSignal(Signal),
    GuardedExitZero,
    GuardedExitNonZero(i32),
    GuardedKilledBySignal(Signal),
}

impl Cause {
    fn is_abnormal(self) -> bool {
        matches!(self, Cause::GuardedExitNonZero(_) | Cause::GuardedKilledBySignal(_))
    }

    fn from_outcome(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Exited(0) => Cause::GuardedExitZero,
            Outcome::Exited(code) => Cause::GuardedExitNonZero(code),
            Outcome::KilledBy(sig) => Cause::GuardedKilledBySignal(sig),
        }
    }
}

pub struct Supervisor {
    table: ChildTable,
    intake: SignalIntake,
    config: Config,
    state: State,
    cause: Option<Cause>,
    forced: bool,
    deadline: Option<Instant>,
}

impl Supervisor {
    pub fn new(intake: SignalIntake, config: Config) -> Self {
        Self {
            table: ChildTable::new(),
            intake,
            config,
            state: State::Running,
            cause: None,
            forced: false,
            deadline: None,
        }
    }

    /// Spawns every resolved command, inserting a guarded record per PID.
    /// If any spawn fails, every sibling already started is killed outright
    /// so a partial startup never leaks orphans into Running.
    pub fn launch(&mut self, commands: &[Vec<String>]) -> Result<()> {
        log_info!(
            "Resolved configuration: dir={:?} shutdown={:?} force_grace={:?}",
            self.config.command_dir,
            self.config.shutdown,
            self.config.force_grace
        );
        log_info!("Starting commands: {}.", format_commands(commands));

        let mut started: Vec<i32> = Vec::new();
        for command in commands {
            match spawn(command) {
                Ok(pid) => {
                    log_info!("Command {} started as pid {}", format_command(command), pid);
                    self.table.insert(ChildRecord {
                        pid,
                        guarded: true,
                        command: command.clone(),
                        signaled: false,
                    });
                    started.push(pid);
                }
                Err(source) => {
                    for pid in started {
                        let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
                    }
                    return Err(Error::Spawn {
                        command: command.clone(),
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    /// Runs the event loop to completion and returns the final exit code.
    pub fn run(mut self) -> i32 {
        loop {
            if self.state == State::Exited {
                return self.exit_code();
            }

            let timeout_ms = self.remaining_timeout_ms();
            let event = match self.intake.next(timeout_ms) {
                Ok(event) => event,
                Err(err) => {
                    log_error!("Signal intake failed: {err}");
                    return self.exit_code();
                }
            };

            match event {
                None => self.on_deadline(),
                Some(Event::Term(sig)) => self.on_term(sig),
                Some(Event::Chld) => {
                    if let Err(err) = self.on_chld() {
                        log_error!("{err}");
                        self.state = State::Exited;
                        return REAP_INCONSISTENCY_EXIT_CODE;
                    }
                }
            }
        }
    }

    fn remaining_timeout_ms(&self) -> Option<u32> {
        let deadline = self.deadline?;
        let now = Instant::now();
        if now >= deadline {
            Some(0)
        } else {
            Some((deadline - now).as_millis().min(u32::MAX as u128) as u32)
        }
    }

    fn on_term(&mut self, sig: Signal) {
        match self.state {
            State::Running => {
                log_info!("Received signal {sig:?}, shutting down");
                self.note_cause(Cause::ExternalSignal(sig));
                self.enter_draining();
            }
            State::Draining | State::Forcing => {
                log_info!("Received signal {sig:?} during shutdown, ignoring");
            }
            State::Exited => {}
        }
    }

    fn on_chld(&mut self) -> Result<()> {
        let deaths = reaper::drain(&mut self.table)?;
        for death in deaths {
            self.on_guarded_death(death.pid, &death.command, death.outcome);
        }
        Ok(())
    }

    fn on_guarded_death(&mut self, pid: i32, command: &[String], outcome: Outcome) {
        log_info!("Guarded process {} (pid {}) {:?}", format_command(command), pid, outcome);

        let remaining = self.table.guarded_count();

        if self.state == State::Running && remaining == 0 && outcome == Outcome::Exited(0) {
            self.cause = Some(Cause::GuardedExitZero);
            self.state = State::Exited;
            return;
        }

        self.note_cause(Cause::from_outcome(outcome));

        match self.state {
            State::Running => self.enter_draining(),
            State::Draining | State::Forcing => {
                if remaining == 0 {
                    self.state = State::Exited;
                }
            }
            State::Exited => {}
        }
    }

    /// First write always wins. After that, a non-abnormal guarded placeholder
    /// can be superseded by a later abnormal guarded outcome, but an
    /// externally requested shutdown's cause is never superseded: the host
    /// asked us to stop, and any subsequent child death is the expected
    /// result of that request, not a fresh reason to fail.
    fn note_cause(&mut self, candidate: Cause) {
        match self.cause {
            None => self.cause = Some(candidate),
            Some(Cause::ExternalSignal(_)) => {}
            Some(existing) if !existing.is_abnormal() && candidate.is_abnormal() => {
                self.cause = Some(candidate);
            }
            Some(_) => {}
        }
    }

    fn enter_draining(&mut self) {
        self.state = State::Draining;
        let pids = self.table.live_guarded_pids();
        log_info!("Sending SIGTERM to guarded pids {pids:?}");
        for pid in &pids {
            send_signal(*pid, Signal::SIGTERM);
            self.table.mark_signaled(*pid);
        }
        if pids.is_empty() {
            self.state = State::Exited;
            return;
        }
        self.deadline = Some(Instant::now() + self.config.shutdown);
    }

    fn enter_forcing(&mut self) {
        self.state = State::Forcing;
        self.forced = true;
        let pids = self.table.live_guarded_pids();
        log_error!(
            "Shutdown failed, terminating even though some processes are still running. Pids: {pids:?}"
        );
        for pid in &pids {
            send_signal(*pid, Signal::SIGKILL);
            self.table.mark_signaled(*pid);
        }
        if pids.is_empty() {
            self.state = State::Exited;
            return;
        }
        self.deadline = Some(Instant::now() + self.config.force_grace);
    }

    fn on_deadline(&mut self) {
        match self.state {
            State::Draining => self.enter_forcing(),
            State::Forcing => {
                log_warn!("Force-grace window elapsed with children still outstanding");
                self.state = State::Exited;
            }
            State::Running | State::Exited => {}
        }
    }

    fn exit_code(&self) -> i32 {
        if self.forced {
            return FORCED_EXIT_CODE;
        }
        match self.cause {
            Some(Cause::GuardedExitZero) | None => 0,
            Some(Cause::GuardedExitNonZero(code)) => code,
            Some(Cause::GuardedKilledBySignal(_)) => KILLED_BY_SIGNAL_EXIT_CODE,
            Some(Cause::ExternalSignal(_)) => 0,
        }
    }
}

fn spawn(command: &[String]) -> std::result::Result<i32, std::io::Error> {
    let (program, args) = command.split_first().expect("command is never empty");
    // SAFETY: pre_exec runs in the forked child before exec, between fork and
    // exec where only async-signal-safe calls are allowed; sigprocmask is.
    // Without this, the child inherits the blocked mask SignalIntake::install
    // put in place on the whole process, and a guarded child that traps
    // SIGTERM never sees it fire because the signal just sits pending.
    let child = unsafe {
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .pre_exec(|| {
                sigprocmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None)
                    .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))
            })
            .spawn()?
    };
    Ok(child.id() as i32)
}

fn send_signal(pid: i32, signal: Signal) {
    // ESRCH means the child died between our decision and the signal: expected, swallowed.
    let _ = kill(Pid::from_raw(pid), signal);
}
