//! Session state owned by the top-level controller: the working set, the
//! latest job per operation and the stored results.
//!
//! Results are keyed by operation, not by submission order, since a job
//! started later may finish first.

use std::{collections::BTreeMap, sync::Arc};

use crate::{
    error::{CaptureError, Result},
    jobs::{Job, JobStatus},
    materializer::ResultPayload,
    media::{PreviewRegistry, WorkingSet},
    operation::Operation,
};

#[derive(Default)]
pub struct Session {
    pub working_set: WorkingSet,
    jobs: BTreeMap<Operation, Job>,
    results: BTreeMap<Operation, Arc<ResultPayload>>,
}

impl Session {
    pub fn new(previews: PreviewRegistry) -> Self {
        Self {
            working_set: WorkingSet::new(previews),
            ..Default::default()
        }
    }

    /// Mark `op` pending. Refused while a job for `op` is still pending.
    pub fn begin(&mut self, op: Operation) -> Result<&Job> {
        if self.is_pending(op) {
            return Err(CaptureError::AlreadyPending {
                operation: op.label().to_string(),
            });
        }
        let job = Job::new(op, self.working_set.len());
        tracing::debug!("session: {} pending", op);
        self.jobs.insert(op, job);
        Ok(&self.jobs[&op])
    }

    /// Update the estimate of a pending job. Never lowers it; ignored once terminal.
    pub fn progress(&mut self, op: Operation, value: u8) {
        if let Some(job) = self.jobs.get_mut(&op)
            && job.status == JobStatus::Pending
        {
            job.progress = job.progress.max(value.min(100));
        }
    }

    /// Record a terminal job. A failure keeps whatever result `op` already had.
    pub fn finish(&mut self, job: Job) {
        debug_assert!(job.status.is_terminal());
        if let Some(payload) = &job.result {
            self.results.insert(job.operation, Arc::clone(payload));
        }
        self.jobs.insert(job.operation, job);
    }

    pub fn is_pending(&self, op: Operation) -> bool {
        self.jobs
            .get(&op)
            .is_some_and(|j| j.status == JobStatus::Pending)
    }

    pub fn job(&self, op: Operation) -> Option<&Job> {
        self.jobs.get(&op)
    }

    pub fn pending(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values().filter(|j| j.status == JobStatus::Pending)
    }

    pub fn result(&self, op: Operation) -> Option<&Arc<ResultPayload>> {
        self.results.get(&op)
    }

    /// Stored results in operation order.
    pub fn results(&self) -> impl Iterator<Item = (Operation, &Arc<ResultPayload>)> {
        self.results.iter().map(|(op, p)| (*op, p))
    }
}
