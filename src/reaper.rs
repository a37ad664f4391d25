//! Drains terminated children on every `Event::Chld` and classifies what each
//! one was: a guarded child whose outcome drives the state machine, or an
//! incidental reparented child that is reaped and forgotten.

use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;

use crate::child_table::ChildTable;
use crate::error::{Error, Result};
use crate::{log_debug, log_warn};

/// How a reaped process ended.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Exited(i32),
    KilledBy(nix::sys::signal::Signal),
}

/// A guarded child the Reaper just observed dying.
pub struct GuardedDeath {
    pub pid: i32,
    pub command: Vec<String>,
    pub outcome: Outcome,
}

/// Drains every currently-exited child from the kernel's zombie queue.
///
/// Returns the guarded deaths found, in wait-any return order. If the kernel
/// reports no children at all (`ECHILD`) while the table still believes some
/// guarded children are alive, that is the one condition this function treats
/// as fatal, since it means our bookkeeping has diverged from reality.
pub fn drain(table: &mut ChildTable) -> Result<Vec<GuardedDeath>> {
    let mut deaths = Vec::new();
    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => break,
            Ok(WaitStatus::Exited(pid, code)) => {
                handle_reaped(table, pid.as_raw(), Outcome::Exited(code), &mut deaths);
            }
            Ok(WaitStatus::Signaled(pid, signal, _core_dumped)) => {
                handle_reaped(table, pid.as_raw(), Outcome::KilledBy(signal), &mut deaths);
            }
            Ok(_other) => {
                // Stopped/Continued: not a termination, nothing to reap yet.
            }
            Err(nix::errno::Errno::ECHILD) => {
                let expected = table.guarded_count();
                if expected > 0 {
                    return Err(Error::ReapInconsistency { expected });
                }
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(deaths)
}

fn handle_reaped(table: &mut ChildTable, pid: i32, outcome: Outcome, deaths: &mut Vec<GuardedDeath>) {
    match table.remove(pid) {
        Some(record) if record.guarded => {
            log_debug!("Reaped guarded pid {pid}: {outcome:?}");
            deaths.push(GuardedDeath {
                pid,
                command: record.command,
                outcome,
            });
        }
        Some(_) => unreachable!("incidental children are never inserted into the table"),
        None => {
            log_warn!("Reaped unknown descendant {pid}");
        }
    }
}

impl std::fmt::Debug for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Exited(code) => write!(f, "exited with code {code}"),
            Outcome::KilledBy(sig) => write!(f, "killed by signal {sig}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::child_table::ChildRecord;

    #[test]
    fn unknown_pid_is_logged_not_reported() {
        let mut table = ChildTable::new();
        let mut deaths = Vec::new();
        handle_reaped(&mut table, 4242, Outcome::Exited(0), &mut deaths);
        assert!(deaths.is_empty());
    }

    #[test]
    fn guarded_pid_produces_a_death() {
        let mut table = ChildTable::new();
        table.insert(ChildRecord {
            pid: 10,
            guarded: true,
            command: vec!["/bin/true".into()],
            signaled: false,
        });
        let mut deaths = Vec::new();
        handle_reaped(&mut table, 10, Outcome::Exited(7), &mut deaths);
        assert_eq!(deaths.len(), 1);
        assert_eq!(deaths[0].pid, 10);
        assert_eq!(deaths[0].outcome, Outcome::Exited(7));
        assert!(table.remove(10).is_none());
    }
}
