use std::{mem, pin::pin, sync::Arc};

use parking_lot::Mutex;
use tokio::{
	sync::{broadcast, Notify},
	time::timeout,
};
use tracing::{debug, error, trace};

use super::{
	super::{
		config::SchedulerConfig,
		event::JobEvent,
		job::{same_job, DynJob},
		progress::{ProgressReporter, ProgressTracker, Tick, WorkReport, TOTAL_WORK},
		queue::JobQueue,
	},
	SchedulerState,
};

/// Reporter calls recorded while holding the lock, delivered by [`Shared::flush_progress`] once it's released.
#[derive(Debug)]
enum ProgressCall {
	Begin,
	Worked(WorkReport),
	/// Asks the reporter if the operator canceled the given batch.
	CheckCanceled { batch: u64 },
	Done,
}

/// Everything guarded by the scheduler lock, it must never be held across an `.await`.
#[derive(Debug)]
pub(super) struct Inner {
	pub state: SchedulerState,
	pub queue: JobQueue,
	pub tracker: Option<ProgressTracker>,
	/// Bumped on every new tracker, so late cancel checks don't pause a newer batch.
	batch: u64,
	progress_calls: Vec<ProgressCall>,
	/// The queue head while the worker is executing it.
	pub executing: Option<DynJob>,
	/// Forced concurrent jobs currently running, the worker doesn't dequeue while there are any.
	pub forced_runs: usize,
	/// Callers blocked until the queue drains.
	pub awaiting_clients: usize,
	/// Overlapping `discard_family` calls, only the last one to finish restores `state_before_discard`.
	pub discards_in_flight: usize,
	pub state_before_discard: SchedulerState,
	pub is_shutdown: bool,
	pub worker_exited: bool,
}

impl Inner {
	pub const fn can_dequeue(&self) -> bool {
		matches!(self.state, SchedulerState::Enabled) && self.forced_runs == 0 && !self.is_shutdown
	}

	pub fn start_tracker(&mut self) {
		self.finish_tracker();
		self.batch += 1;
		self.tracker = Some(ProgressTracker::new(self.queue.count()));
		self.progress_calls.push(ProgressCall::Begin);
	}

	/// Records a tracker update, closing the progress display once the batch drained.
	pub fn apply_tick(&mut self, tick: Tick) {
		if let Some(report) = tick.report {
			self.progress_calls.push(ProgressCall::Worked(report));
		}

		if tick.remaining == 0 {
			self.finish_tracker();
		} else {
			self.progress_calls.push(ProgressCall::CheckCanceled { batch: self.batch });
		}
	}

	pub fn finish_tracker(&mut self) {
		if self.tracker.take().is_some() {
			self.progress_calls.push(ProgressCall::Done);
		}
	}
}

pub(super) struct Shared {
	pub inner: Mutex<Inner>,
	/// Wakes up the idle worker, permits are stored so a wake up is never lost.
	pub wake: Notify,
	/// Broadcasts that the executing job, the queue or the state changed.
	pub changed: Notify,
	pub events_tx: broadcast::Sender<JobEvent>,
	pub reporter: Arc<dyn ProgressReporter>,
	/// Held while delivering progress calls, keeping them ordered.
	delivering: Mutex<()>,
	pub config: SchedulerConfig,
}

impl Shared {
	pub fn new(config: SchedulerConfig, reporter: Arc<dyn ProgressReporter>) -> Self {
		let (events_tx, _) = broadcast::channel(config.events_capacity.max(1));

		Self {
			inner: Mutex::new(Inner {
				state: SchedulerState::Enabled,
				queue: JobQueue::with_capacity(config.initial_queue_capacity),
				tracker: None,
				batch: 0,
				progress_calls: Vec::new(),
				executing: None,
				forced_runs: 0,
				awaiting_clients: 0,
				discards_in_flight: 0,
				state_before_discard: SchedulerState::Enabled,
				is_shutdown: false,
				worker_exited: false,
			}),
			wake: Notify::new(),
			changed: Notify::new(),
			events_tx,
			reporter,
			delivering: Mutex::new(()),
			config,
		}
	}

	pub fn emit(&self, event: JobEvent) {
		// Having no subscribers is the common case
		if self.events_tx.send(event).is_err() {
			trace!("No subscribers for index scheduler events");
		}
	}

	pub fn transition(&self, inner: &mut Inner, state: SchedulerState) {
		if inner.state == state {
			return;
		}

		debug!(from = ?inner.state, to = ?state, "Index scheduler state transition");

		inner.state = state;
		self.emit(JobEvent::StateChanged(state));
		self.changed.notify_waiters();

		if state == SchedulerState::Enabled {
			self.wake.notify_one();
		}
	}

	/// Delivers the recorded progress calls to the reporter, must be called without holding the lock.
	///
	/// If someone else is already delivering we just leave, they pick up whatever we recorded.
	pub fn flush_progress(&self) {
		loop {
			{
				let Some(_delivering) = self.delivering.try_lock() else {
					return;
				};

				loop {
					let calls = mem::take(&mut self.inner.lock().progress_calls);
					if calls.is_empty() {
						break;
					}

					for call in calls {
						self.deliver(call);
					}
				}
			}

			// Calls recorded by someone that gave up right before we let go of delivering
			if self.inner.lock().progress_calls.is_empty() {
				return;
			}
		}
	}

	fn deliver(&self, call: ProgressCall) {
		match call {
			ProgressCall::Begin => self.reporter.begin(TOTAL_WORK),
			ProgressCall::Worked(WorkReport { work, label }) => self.reporter.worked(work, &label),
			ProgressCall::CheckCanceled { batch } => {
				if self.reporter.is_canceled() {
					self.pause_canceled_batch(batch);
				}
			}
			ProgressCall::Done => self.reporter.done(),
		}
	}

	/// An operator canceled the progress display, so we pause instead of dropping jobs.
	fn pause_canceled_batch(&self, batch: u64) {
		let mut inner = self.inner.lock();

		if inner.tracker.is_none() || inner.batch != batch {
			return;
		}

		debug!(batch, "Progress display canceled, pausing index scheduler");

		if inner.state == SchedulerState::Enabled {
			self.transition(&mut inner, SchedulerState::Waiting);
		} else if inner.discards_in_flight > 0
			&& inner.state_before_discard == SchedulerState::Enabled
		{
			// Applied once the discard restores the previous state
			inner.state_before_discard = SchedulerState::Waiting;
		}

		inner.finish_tracker();
	}

	/// Evicts every pending job matching `predicate`, updating progress for each one.
	pub fn evict(&self, inner: &mut Inner, predicate: impl FnMut(&DynJob) -> bool) -> usize {
		let removed = inner.queue.remove_where(predicate);
		let count = removed.len();

		for job in removed {
			if let Some(tracker) = inner.tracker.as_mut() {
				let tick = tracker.tick_down(None);
				inner.apply_tick(tick);
			}

			self.emit(JobEvent::Discarded { job });
		}

		if inner.queue.is_empty() {
			inner.finish_tracker();
		}

		if count > 0 {
			self.changed.notify_waiters();
		}

		count
	}

	/// Resolves once `condition` holds, re-checking whenever something changes and
	/// at least once every poll interval.
	pub async fn wait_until(&self, condition: impl Fn(&Inner) -> bool) {
		loop {
			let mut changed = pin!(self.changed.notified());
			changed.as_mut().enable();

			let done = condition(&self.inner.lock());
			if done {
				return;
			}

			// Timing out is fine, we just check again
			let _ = timeout(self.config.poll_interval, changed).await;
		}
	}

	/// Called by the worker supervisor once a job panicked, losing the whole batch but keeping
	/// the scheduler alive.
	pub fn recover_from_fault(&self) {
		let mut inner = self.inner.lock();

		let faulted = inner.executing.take();

		if let Some(job) = &faulted {
			if inner
				.queue
				.peek_head()
				.is_some_and(|head| same_job(head, job))
			{
				inner.queue.advance();
			}
		}

		let discarded = self.evict(&mut inner, |_| true);

		error!(
			faulted_job = ?faulted,
			discarded,
			"Index scheduler worker faulted, every pending job was discarded",
		);

		inner.finish_tracker();

		if let Some(job) = faulted {
			self.emit(JobEvent::Faulted { job });
		}

		drop(inner);

		self.flush_progress();
		self.changed.notify_waiters();
	}

	/// Called by the worker supervisor right before it returns.
	pub fn mark_worker_exited(&self) {
		self.inner.lock().worker_exited = true;
		self.changed.notify_waiters();
	}
}
