use std::time::Duration;

use super::{
	job::{DynJob, ExecStatus},
	scheduler::SchedulerState,
};

/// Everything observable about the background queue, published through
/// [`Scheduler::subscribe`](crate::Scheduler::subscribe).
#[derive(Debug, Clone)]
pub enum JobEvent {
	/// The worker finished executing a queued job and removed it from the queue.
	Completed { job: DynJob, status: ExecStatus },
	/// A pending job was evicted from the queue without running.
	Discarded { job: DynJob },
	/// The job panicked while executing, every other pending job was discarded and the worker restarted.
	Faulted { job: DynJob },
	/// The worker has nothing to do, emitted periodically while it stays that way.
	Idle { idle_for: Duration },
	StateChanged(SchedulerState),
}
