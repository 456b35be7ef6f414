use std::sync::{
	atomic::{AtomicBool, AtomicUsize, Ordering},
	Arc, OnceLock, Weak,
};

use sd_index_scheduler::{ProgressReporter, Scheduler, SchedulerState};

use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct RecordingReporter {
	pub batches_begun: AtomicUsize,
	pub batches_done: AtomicUsize,
	pub canceled: AtomicBool,
	pub reports: Mutex<Vec<(u32, String)>>,
	pub sub_tasks: Mutex<Vec<String>>,
}

impl RecordingReporter {
	pub fn total_work(&self) -> u32 {
		self.reports.lock().iter().map(|(work, _)| work).sum()
	}
}

impl ProgressReporter for RecordingReporter {
	fn begin(&self, _total_work: u32) {
		self.batches_begun.fetch_add(1, Ordering::AcqRel);
		self.canceled.store(false, Ordering::Release);
		self.reports.lock().clear();
	}

	fn worked(&self, work: u32, label: &str) {
		self.reports.lock().push((work, label.to_string()));
	}

	fn sub_task(&self, label: &str) {
		self.sub_tasks.lock().push(label.to_string());
	}

	fn done(&self) {
		self.batches_done.fetch_add(1, Ordering::AcqRel);
	}

	fn is_canceled(&self) -> bool {
		self.canceled.load(Ordering::Acquire)
	}
}

/// Renders by reading the scheduler back, like a status bar showing the pending jobs count would.
#[derive(Debug, Default)]
pub struct InspectingReporter {
	pub scheduler: OnceLock<Weak<Scheduler>>,
	pub pending_seen: Mutex<Vec<usize>>,
	pub states_seen: Mutex<Vec<SchedulerState>>,
}

impl InspectingReporter {
	fn scheduler(&self) -> Option<Arc<Scheduler>> {
		self.scheduler.get().and_then(Weak::upgrade)
	}
}

impl ProgressReporter for InspectingReporter {
	fn worked(&self, _work: u32, _label: &str) {
		if let Some(scheduler) = self.scheduler() {
			self.pending_seen.lock().push(scheduler.awaiting_jobs_count());
		}
	}

	fn is_canceled(&self) -> bool {
		if let Some(scheduler) = self.scheduler() {
			self.states_seen.lock().push(scheduler.state());
		}

		false
	}
}
