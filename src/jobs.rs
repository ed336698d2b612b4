//! The shell's job table.
//!
//! A fixed number of slots, each either free (`None`) or owned by one job.
//! Job ids are small positive integers; a new job always gets the smallest id
//! not held by any occupied slot, so ids are recycled once a job is removed.

use std::fmt;
use std::num::NonZeroUsize;

use thiserror::Error;

pub type Pid = libc::pid_t;

/// Identifier of an occupied slot, as shown in `[n]` and selected by `%n`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct JobId(NonZeroUsize);

impl JobId {
    pub fn new(n: usize) -> Option<Self> {
        NonZeroUsize::new(n).map(JobId)
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of a tracked job.
///
/// There is no "done" state: a finished job is removed from the table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobState {
    Running,
    Stopped,
    Foreground,
}

impl JobState {
    pub fn label(self) -> &'static str {
        match self {
            JobState::Running => "Running",
            JobState::Stopped => "Stopped",
            JobState::Foreground => "Foreground",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("job table full")]
    TableFull,

    #[error("no such job")]
    NotFound,

    #[error("invalid job id")]
    InvalidToken,

    #[error("process {pid} is not the leader of group {pgid}")]
    NotGroupLeader { pid: Pid, pgid: Pid },

    #[error("job [{0}] already holds the foreground")]
    ForegroundBusy(JobId),
}

/// One shell-launched unit of work: a single process or a whole pipeline,
/// keyed by its leader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Job {
    id: JobId,
    pid: Pid,
    pgid: Pid,
    state: JobState,
    command: String,
}

impl Job {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Pid of the leader (first pipeline stage).
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Process group of the job. Always equal to [`Job::pid`].
    pub fn pgid(&self) -> Pid {
        self.pgid
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

/// `[<id>] <pid> <state> <command>`, the `jobs` listing line.
impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {} {}", self.id, self.pid, self.state, self.command)
    }
}

/// Fixed-capacity registry of active jobs.
#[derive(Debug)]
pub struct JobTable {
    slots: Vec<Option<Job>>,
    max_command: usize,
}

impl JobTable {
    /// Create a table with `capacity` slots, storing at most `max_command`
    /// bytes of each job's command text.
    pub fn new(capacity: usize, max_command: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            max_command,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Register a new job and return its id.
    ///
    /// Each job owns its own process group, so `pgid` must equal `pid`.
    pub fn allocate(
        &mut self,
        pid: Pid,
        pgid: Pid,
        state: JobState,
        command: &str,
    ) -> Result<JobId, JobError> {
        if pid != pgid {
            return Err(JobError::NotGroupLeader { pid, pgid });
        }
        self.check_room(state)?;
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(JobError::TableFull)?;
        let id = self.lowest_free_id().ok_or(JobError::TableFull)?;

        self.slots[slot] = Some(Job {
            id,
            pid,
            pgid,
            state,
            command: truncate(command, self.max_command).to_string(),
        });
        tracing::debug!(job = %id, pid, ?state, "job registered");
        Ok(id)
    }

    /// Whether a job in `state` could be registered right now.
    pub fn check_room(&self, state: JobState) -> Result<(), JobError> {
        if state == JobState::Foreground {
            if let Some(fg) = self.find_foreground() {
                return Err(JobError::ForegroundBusy(fg.id));
            }
        }
        if self.is_full() {
            return Err(JobError::TableFull);
        }
        Ok(())
    }

    /// Smallest id in `1..=capacity` not held by an occupied slot.
    fn lowest_free_id(&self) -> Option<JobId> {
        let mut used = vec![false; self.capacity() + 1];
        for job in self.iter() {
            if let Some(flag) = used.get_mut(job.id.get()) {
                *flag = true;
            }
        }
        (1..=self.capacity())
            .find(|&n| !used[n])
            .and_then(JobId::new)
    }

    pub fn remove_by_pid(&mut self, pid: Pid) -> Result<Job, JobError> {
        self.take_where(|job| job.pid == pid)
    }

    pub fn remove_by_id(&mut self, id: JobId) -> Result<Job, JobError> {
        self.take_where(|job| job.id == id)
    }

    fn take_where(&mut self, pred: impl Fn(&Job) -> bool) -> Result<Job, JobError> {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| matches!(slot, Some(job) if pred(job)))
            .ok_or(JobError::NotFound)?;
        let job = slot.take().ok_or(JobError::NotFound)?;
        tracing::debug!(job = %job.id, pid = job.pid, "job removed");
        Ok(job)
    }

    pub fn find_by_pid(&self, pid: Pid) -> Option<&Job> {
        self.iter().find(|job| job.pid == pid)
    }

    pub fn find_by_id(&self, id: JobId) -> Option<&Job> {
        self.iter().find(|job| job.id == id)
    }

    pub fn find_foreground(&self) -> Option<&Job> {
        self.iter().find(|job| job.state == JobState::Foreground)
    }

    /// Change a job's state.
    ///
    /// Moving a job to the foreground fails while a different job holds it.
    pub fn set_state(&mut self, id: JobId, state: JobState) -> Result<(), JobError> {
        if state == JobState::Foreground {
            if let Some(fg) = self.find_foreground().filter(|fg| fg.id != id) {
                return Err(JobError::ForegroundBusy(fg.id));
            }
        }
        let job = self
            .slots
            .iter_mut()
            .flatten()
            .find(|job| job.id == id)
            .ok_or(JobError::NotFound)?;
        tracing::trace!(job = %id, from = ?job.state, to = ?state, "job state change");
        job.state = state;
        Ok(())
    }

    /// Resolve a user-supplied job token.
    ///
    /// `%<n>` selects the job with id `n`; a bare positive integer selects
    /// the job whose leader has that pid. Anything else is invalid.
    pub fn resolve_token(&self, token: &str) -> Result<JobId, JobError> {
        let job = match token.strip_prefix('%') {
            Some(digits) => parse_positive(digits)?
                .and_then(JobId::new)
                .and_then(|id| self.find_by_id(id)),
            None => parse_positive(token)?
                .and_then(|n| Pid::try_from(n).ok())
                .and_then(|pid| self.find_by_pid(pid)),
        };
        job.map(Job::id).ok_or(JobError::NotFound)
    }

    /// Occupied slots, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.slots.iter().flatten()
    }
}

/// Parse a string of ASCII digits denoting a positive integer.
///
/// A well-formed number too large for `usize` is `Ok(None)`: it names no job.
fn parse_positive(s: &str) -> Result<Option<usize>, JobError> {
    let digits = !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !digits || s.bytes().all(|b| b == b'0') {
        return Err(JobError::InvalidToken);
    }
    Ok(s.parse::<usize>().ok())
}

/// Cut `s` to at most `max` bytes without splitting a character.
fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
