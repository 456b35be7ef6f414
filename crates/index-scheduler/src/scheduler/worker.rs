use std::sync::Arc;

use tokio::{
	spawn,
	task::{yield_now, JoinHandle},
	time::{timeout, Instant},
};
use tracing::{error, info, instrument, trace, Instrument};

use super::{
	super::{
		event::JobEvent,
		job::{same_job, DynJob},
		progress::ProgressHandle,
	},
	shared::Shared,
};

/// Spawns the worker under a supervisor that brings it back whenever a job panics.
#[instrument(name = "index_scheduler_worker", skip_all)]
pub(super) fn spawn_worker(shared: Arc<Shared>) -> JoinHandle<()> {
	spawn(
		async move {
			trace!("Index scheduler worker starting...");

			while let Err(e) = spawn(run(Arc::clone(&shared)).in_current_span()).await {
				if e.is_panic() {
					error!(?e, "Index scheduler worker critically failed and will restart;");
					shared.recover_from_fault();
				} else {
					trace!("Index scheduler worker was cancelled and will exit...");
					break;
				}
			}

			shared.mark_worker_exited();

			info!("Index scheduler worker gracefully shutdown");
		}
		.in_current_span(),
	)
}

async fn run(shared: Arc<Shared>) {
	let mut idle_since = Instant::now();

	loop {
		let Some((job, progress)) = next_job(&shared) else {
			if shared.inner.lock().is_shutdown {
				trace!("Index scheduler worker received shutdown signal");
				return;
			}

			if timeout(shared.config.idle_interval, shared.wake.notified())
				.await
				.is_err()
			{
				let is_idle = {
					let inner = shared.inner.lock();
					inner.queue.is_empty() && inner.executing.is_none()
				};

				if is_idle {
					shared.emit(JobEvent::Idle {
						idle_for: idle_since.elapsed(),
					});
				}
			}

			continue;
		};

		let job_id = job.id();
		let description = job.describe();

		trace!(%job_id, %description, "Executing job");

		progress.sub_task(&description);

		let status = job.execute(&progress).await;

		trace!(%job_id, ?status, "Job finished");

		let awaiting_clients = {
			let mut inner = shared.inner.lock();
			inner.executing = None;

			if inner
				.queue
				.peek_head()
				.is_some_and(|head| same_job(head, &job))
			{
				inner.queue.advance();

				if let Some(tracker) = inner.tracker.as_mut() {
					let tick = tracker.tick_down(Some(&description));
					inner.apply_tick(tick);
				}
			}

			inner.awaiting_clients
		};

		shared.flush_progress();
		shared.emit(JobEvent::Completed { job, status });
		shared.changed.notify_waiters();

		// Someone is blocked until we drain the queue, so we don't give way to other tasks
		if awaiting_clients == 0 {
			yield_now().await;
		}

		idle_since = Instant::now();
	}
}

/// Marks the queue head as executing, if the worker is allowed to run it.
fn next_job(shared: &Shared) -> Option<(DynJob, ProgressHandle)> {
	let mut inner = shared.inner.lock();

	if !inner.can_dequeue() {
		return None;
	}

	let job = inner.queue.peek_head().cloned()?;

	inner.executing = Some(Arc::clone(&job));

	let progress = if inner.tracker.is_some() {
		ProgressHandle::new(Arc::clone(&shared.reporter))
	} else {
		ProgressHandle::detached()
	};

	Some((job, progress))
}
