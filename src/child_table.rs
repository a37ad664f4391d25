use std::collections::HashMap;

/// One live descendant known to the supervisor.
#[derive(Debug, Clone)]
pub struct ChildRecord {
    pub pid: i32,
    pub guarded: bool,
    pub command: Vec<String>,
    pub signaled: bool,
}

/// Registry of live children keyed by PID.
///
/// Owned exclusively by the supervisor loop; nothing here is thread-safe because
/// nothing here needs to be. The whole program is single-threaded.
#[derive(Debug, Default)]
pub struct ChildTable {
    records: HashMap<i32, ChildRecord>,
}

impl ChildTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a newly launched guarded child. Panics on a duplicate PID: the kernel
    /// guarantees PIDs are unique among live processes, so a collision means the
    /// Reaper failed to remove a prior record before this PID was recycled.
    pub fn insert(&mut self, record: ChildRecord) {
        let pid = record.pid;
        if self.records.insert(pid, record).is_some() {
            panic!("duplicate child record for pid {pid}");
        }
    }

    /// Removes and returns the record for `pid`, if one exists. A miss is not an
    /// error: it means `pid` was an incidental child we never launched.
    pub fn remove(&mut self, pid: i32) -> Option<ChildRecord> {
        self.records.remove(&pid)
    }

    /// Flags `pid` as signaled, idempotently. A miss is not an error: the
    /// child may have been reaped between the live-pid snapshot and the
    /// signal send.
    pub fn mark_signaled(&mut self, pid: i32) {
        if let Some(record) = self.records.get_mut(&pid) {
            record.signaled = true;
        }
    }

    /// PIDs of all tracked guarded children, in no particular order.
    pub fn live_guarded_pids(&self) -> Vec<i32> {
        self.records
            .values()
            .filter(|r| r.guarded)
            .map(|r| r.pid)
            .collect()
    }

    pub fn guarded_count(&self) -> usize {
        self.records.values().filter(|r| r.guarded).count()
    }
}
