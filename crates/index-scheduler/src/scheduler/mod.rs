use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use tokio::{sync::broadcast, task::JoinHandle};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, error, instrument, trace, warn};

use super::{
	config::SchedulerConfig,
	error::Error,
	event::JobEvent,
	job::{same_job, DynJob},
	progress::{NoopReporter, ProgressHandle, ProgressReporter},
};

mod shared;
mod worker;

use shared::{Inner, Shared};
use worker::spawn_worker;

/// Whether the background worker is allowed to take jobs from the queue.
///
/// Jobs are always accepted into the queue, no matter the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
	Enabled,
	Disabled,
	/// Paused by an operator, usually by canceling the progress display. A newly requested job,
	/// [`Scheduler::enable`] or a forced concurrent job takes the scheduler out of it.
	Waiting,
}

/// How a job executed on the caller's task negotiates with the background queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrentPolicy {
	/// Run right away, holding off the worker until the job finishes.
	ForceImmediate,
	/// Fail with [`Error::ConcurrentJobCanceled`] if there are jobs pending.
	CancelIfNotReady,
	/// Wait for the queue to drain, escalating to [`ConcurrentPolicy::ForceImmediate`] if the
	/// scheduler gets paused meanwhile.
	WaitUntilReady,
}

/// Single worker job scheduler for background indexing.
///
/// Jobs requested through [`Scheduler::request`] run one at a time, in request order, on a background
/// task, while [`Scheduler::run_concurrent`] lets a caller run a job right away on its own task
/// under a [`ConcurrentPolicy`].
///
/// Must be created inside a tokio runtime.
pub struct Scheduler {
	shared: Arc<Shared>,
	handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
	#[must_use]
	pub fn new() -> Self {
		Self::with_config(SchedulerConfig::default())
	}

	#[must_use]
	pub fn with_config(config: SchedulerConfig) -> Self {
		Self::with_reporter(config, Arc::new(NoopReporter))
	}

	#[must_use]
	pub fn with_reporter(config: SchedulerConfig, reporter: Arc<dyn ProgressReporter>) -> Self {
		let shared = Arc::new(Shared::new(config, reporter));

		Self {
			handle: Mutex::new(Some(spawn_worker(Arc::clone(&shared)))),
			shared,
		}
	}

	/// Enqueues a job for the background worker, never blocking.
	///
	/// Jobs that aren't ready to run are silently dropped.
	#[instrument(skip_all, fields(job_id = %job.id()))]
	pub fn request(&self, job: DynJob) -> Result<(), Error> {
		if !job.is_ready_to_run() {
			trace!("Job isn't ready to run, dropping it");
			return Ok(());
		}

		let mut inner = self.shared.inner.lock();

		if inner.is_shutdown {
			warn!("Job requested after the index scheduler was shutdown");
			return Err(Error::Shutdown);
		}

		inner.queue.enqueue(job);

		trace!(pending = inner.queue.count(), "Job requested");

		if inner.state == SchedulerState::Waiting {
			self.shared.transition(&mut inner, SchedulerState::Enabled);
		}

		if let Some(tracker) = inner.tracker.as_mut() {
			let tick = tracker.tick_up();
			inner.apply_tick(tick);
		} else if inner.state == SchedulerState::Enabled {
			inner.start_tracker();
		}

		drop(inner);

		self.shared.flush_progress();
		self.shared.wake.notify_one();

		Ok(())
	}

	/// Cancels and evicts every job of the given family, or every job at all if no family is given.
	///
	/// If the executing job is part of it, this waits until it stops, so once this returns no job of
	/// the family is pending or executing.
	///
	/// The worker is held off meanwhile, and the state from before the first of any overlapping discards
	/// is restored once the last of them finishes.
	#[instrument(skip(self))]
	pub async fn discard_family(&self, family: Option<&str>) {
		let matches = |job: &DynJob| family.map_or(true, |family| job.belongs_to(family));

		let (discarding, executing) = Discarding::begin(&self.shared);

		if let Some(job) = executing.filter(|job| matches(job)) {
			debug!(job_id = %job.id(), "Canceling executing job");

			job.cancel();

			self.shared
				.wait_until(|inner| {
					!inner
						.executing
						.as_ref()
						.is_some_and(|executing| same_job(executing, &job))
				})
				.await;
		}

		let discarded = self.shared.evict(&mut self.shared.inner.lock(), |job| matches(job));

		debug!(discarded, "Discarded jobs");

		drop(discarding);

		self.shared.flush_progress();
	}

	/// Runs the job on the calling task, out of the queue, following the given policy.
	///
	/// Returns whether the job succeeded, with jobs that aren't ready to run failing right away.
	#[instrument(skip_all, fields(job_id = %job.id(), ?policy))]
	pub async fn run_concurrent(
		&self,
		job: DynJob,
		mut policy: ConcurrentPolicy,
		job_to_ignore: Option<&DynJob>,
	) -> Result<bool, Error> {
		if !job.is_ready_to_run() {
			trace!("Concurrent job isn't ready to run");
			return Ok(false);
		}

		{
			let inner = self.shared.inner.lock();

			if inner.is_shutdown {
				return Err(Error::Shutdown);
			}

			if policy == ConcurrentPolicy::CancelIfNotReady && !inner.queue.is_empty() {
				debug!(
					pending = inner.queue.count(),
					"Background queue not ready, canceling concurrent job"
				);
				return Err(Error::ConcurrentJobCanceled(job.id()));
			}
		}

		if policy == ConcurrentPolicy::WaitUntilReady && self.wait_until_ready(job_to_ignore).await {
			debug!("Index scheduler paused while waiting, forcing concurrent job");
			policy = ConcurrentPolicy::ForceImmediate;
		}

		if self.shared.inner.lock().is_shutdown {
			return Err(Error::Shutdown);
		}

		let progress = ProgressHandle::detached();

		let status = if policy == ConcurrentPolicy::ForceImmediate {
			let _forced = ForcedRun::begin(&self.shared).await;

			job.execute(&progress).await
		} else {
			job.execute(&progress).await
		};

		trace!(?status, "Concurrent job finished");

		Ok(status.is_success())
	}

	/// Blocks until the queue drains or only `job_to_ignore` is left in it, returning `true` if the
	/// scheduler got paused meanwhile.
	async fn wait_until_ready(&self, job_to_ignore: Option<&DynJob>) -> bool {
		let _client = AwaitingClient::new(&self.shared);

		let is_ready = |inner: &Inner| match inner.queue.count() {
			0 => true,
			1 => job_to_ignore.is_some_and(|ignored| {
				inner
					.queue
					.peek_head()
					.is_some_and(|head| same_job(head, ignored))
			}),
			_ => inner.is_shutdown,
		};

		self.shared
			.wait_until(|inner| inner.state == SchedulerState::Waiting || is_ready(inner))
			.await;

		let inner = self.shared.inner.lock();

		inner.state == SchedulerState::Waiting && !is_ready(&inner)
	}

	/// Lets the worker take jobs again, re-syncing the progress display with the pending jobs.
	#[instrument(skip(self))]
	pub fn enable(&self) {
		let mut inner = self.shared.inner.lock();

		if inner.is_shutdown {
			warn!("Trying to enable the index scheduler after it was shutdown");
			return;
		}

		let was_waiting = inner.state == SchedulerState::Waiting;

		self.shared.transition(&mut inner, SchedulerState::Enabled);

		if !inner.queue.is_empty() {
			let pending = inner.queue.count();

			match inner.tracker.as_mut() {
				Some(tracker) if was_waiting => {
					let tick = tracker.set_ticks(pending);
					inner.apply_tick(tick);
				}
				Some(_) => {}
				None => inner.start_tracker(),
			}
		}

		drop(inner);

		self.shared.flush_progress();
		self.shared.wake.notify_one();
	}

	#[instrument(skip(self))]
	pub fn disable(&self) {
		let mut inner = self.shared.inner.lock();
		self.shared.transition(&mut inner, SchedulerState::Disabled);
	}

	#[instrument(skip(self))]
	pub fn pause(&self) {
		let mut inner = self.shared.inner.lock();
		self.shared.transition(&mut inner, SchedulerState::Waiting);
	}

	/// Discards every job and enables the scheduler again.
	pub async fn reset(&self) {
		self.discard_family(None).await;
		self.enable();
	}

	/// Cancels and discards every job, waiting for the worker to stop. The scheduler can't be used afterwards.
	///
	/// Calling it again is a no-op, although a call overlapping the first one still waits for the worker.
	#[instrument(skip(self))]
	pub async fn shutdown(&self) {
		let maybe_handle = self.handle.lock().take();
		let Some(handle) = maybe_handle else {
			if !self.shared.inner.lock().worker_exited {
				debug!("Index scheduler shutdown already in progress, waiting for the worker to stop");
				self.shared.wait_until(|inner| inner.worker_exited).await;
			}

			warn!("Trying to shutdown the index scheduler that was already shutdown");
			return;
		};

		{
			let mut inner = self.shared.inner.lock();
			inner.is_shutdown = true;
			self.shared.transition(&mut inner, SchedulerState::Disabled);
		}

		self.discard_family(None).await;

		self.shared.wake.notify_one();
		self.shared.changed.notify_waiters();

		if let Err(e) = handle.await {
			error!(?e, "Index scheduler worker failed to shutdown on handle await");
		}

		debug!("Index scheduler shutdown");
	}

	#[must_use]
	pub fn state(&self) -> SchedulerState {
		self.shared.inner.lock().state
	}

	/// Count of jobs on the queue, including the one being executed.
	#[must_use]
	pub fn awaiting_jobs_count(&self) -> usize {
		self.shared.inner.lock().queue.count()
	}

	/// The executing job, or the job that runs next if the scheduler is enabled.
	#[must_use]
	pub fn current_job(&self) -> Option<DynJob> {
		let inner = self.shared.inner.lock();

		inner.executing.clone().or_else(|| {
			if inner.state == SchedulerState::Enabled {
				inner.queue.peek_head().cloned()
			} else {
				None
			}
		})
	}

	/// Callers currently waiting for the queue to drain.
	#[must_use]
	pub fn awaiting_clients(&self) -> usize {
		self.shared.inner.lock().awaiting_clients
	}

	#[must_use]
	pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
		self.shared.events_tx.subscribe()
	}

	#[must_use]
	pub fn events(&self) -> BroadcastStream<JobEvent> {
		BroadcastStream::new(self.subscribe())
	}
}

impl Default for Scheduler {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for Scheduler {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let inner = self.shared.inner.lock();

		f.debug_struct("Scheduler")
			.field("state", &inner.state)
			.field("executing", &inner.executing)
			.field("queue", &inner.queue)
			.field("awaiting_clients", &inner.awaiting_clients)
			.field("is_shutdown", &inner.is_shutdown)
			.finish_non_exhaustive()
	}
}

impl Drop for Scheduler {
	fn drop(&mut self) {
		if self.handle.get_mut().is_none() {
			return;
		}

		warn!("Index scheduler dropped without being shutdown, canceling every job");

		let mut inner = self.shared.inner.lock();
		inner.is_shutdown = true;
		self.shared.transition(&mut inner, SchedulerState::Disabled);

		if let Some(job) = &inner.executing {
			job.cancel();
		}

		self.shared.evict(&mut inner, |_| true);

		drop(inner);

		self.shared.flush_progress();
		self.shared.wake.notify_one();
	}
}

/// Holds the worker off while jobs are discarded, restoring the previous state when the last
/// overlapping discard is done, even if its future gets dropped halfway.
struct Discarding<'shared> {
	shared: &'shared Shared,
}

impl<'shared> Discarding<'shared> {
	fn begin(shared: &'shared Shared) -> (Self, Option<DynJob>) {
		let mut inner = shared.inner.lock();

		if inner.discards_in_flight == 0 {
			inner.state_before_discard = inner.state;
		}
		inner.discards_in_flight += 1;

		shared.transition(&mut inner, SchedulerState::Disabled);

		(Self { shared }, inner.executing.clone())
	}
}

impl Drop for Discarding<'_> {
	fn drop(&mut self) {
		let mut inner = self.shared.inner.lock();
		inner.discards_in_flight -= 1;

		if inner.discards_in_flight == 0 && !inner.is_shutdown {
			let previous_state = inner.state_before_discard;
			self.shared.transition(&mut inner, previous_state);
		}
	}
}

/// Holds off the worker while a forced concurrent job runs.
struct ForcedRun<'shared> {
	shared: &'shared Shared,
}

impl<'shared> ForcedRun<'shared> {
	async fn begin(shared: &'shared Shared) -> ForcedRun<'shared> {
		shared.inner.lock().forced_runs += 1;

		let forced = Self { shared };

		// The worker may be in the middle of a queued job, which we let finish
		shared.wait_until(|inner| inner.executing.is_none()).await;

		forced
	}
}

impl Drop for ForcedRun<'_> {
	fn drop(&mut self) {
		let mut inner = self.shared.inner.lock();
		inner.forced_runs -= 1;

		if inner.forced_runs == 0 {
			drop(inner);
			self.shared.wake.notify_one();
		}
	}
}

struct AwaitingClient<'shared> {
	shared: &'shared Shared,
}

impl<'shared> AwaitingClient<'shared> {
	fn new(shared: &'shared Shared) -> Self {
		shared.inner.lock().awaiting_clients += 1;
		Self { shared }
	}
}

impl Drop for AwaitingClient<'_> {
	fn drop(&mut self) {
		self.shared.inner.lock().awaiting_clients -= 1;
	}
}
