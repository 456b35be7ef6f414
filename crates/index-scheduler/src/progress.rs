use std::{fmt, sync::Arc};

use tracing::trace;

/// Every batch is reported as this many units of work, so each unit is one percent.
pub const TOTAL_WORK: u32 = 100;

/// Receives progress of the background queue, implemented by whoever wants to render it,
/// be it a status bar, a log line or nothing at all.
///
/// A reporter lives across batches: [`ProgressReporter::begin`] is called whenever a new batch starts
/// and [`ProgressReporter::done`] once the queue drains.
///
/// Batch calls are made once the scheduler released its lock, so a reporter is free to inspect the
/// [`Scheduler`](crate::Scheduler) or request more jobs from within them. `begin`, `worked`, `done`
/// and `is_canceled` are never called concurrently and always arrive in order, while `sub_task` comes
/// straight from the executing job.
pub trait ProgressReporter: Send + Sync + 'static {
	/// Starts a new batch, which is also a fresh cancellation scope: implementors must clear any
	/// cancel flag raised for a previous batch, otherwise the new one gets paused on its first tick.
	fn begin(&self, _total_work: u32) {}

	/// `work` is the amount of units completed since the last call, never zero.
	fn worked(&self, work: u32, label: &str);

	fn sub_task(&self, _label: &str) {}

	fn done(&self) {}

	/// An operator canceling the progress display pauses the scheduler instead of dropping jobs.
	///
	/// Checked after every tick of the current batch, until the next [`ProgressReporter::begin`].
	fn is_canceled(&self) -> bool {
		false
	}
}

/// Default reporter, discarding everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
	fn worked(&self, _work: u32, _label: &str) {}
}

/// Handed to [`Job::execute`](crate::Job::execute), giving the job access to the progress
/// display of the batch it belongs to.
#[derive(Clone, Default)]
pub struct ProgressHandle {
	reporter: Option<Arc<dyn ProgressReporter>>,
}

impl ProgressHandle {
	pub(crate) fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
		Self {
			reporter: Some(reporter),
		}
	}

	/// A handle not connected to any display, used for jobs running out of the queue.
	#[must_use]
	pub const fn detached() -> Self {
		Self { reporter: None }
	}

	pub fn sub_task(&self, label: &str) {
		if let Some(reporter) = &self.reporter {
			reporter.sub_task(label);
		}
	}

	#[must_use]
	pub fn is_canceled(&self) -> bool {
		self.reporter
			.as_ref()
			.is_some_and(|reporter| reporter.is_canceled())
	}
}

impl fmt::Debug for ProgressHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ProgressHandle")
			.field("detached", &self.reporter.is_none())
			.finish()
	}
}

/// Percentage units completed since the last report, along with the label to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkReport {
	pub work: u32,
	pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Tick {
	pub remaining: usize,
	/// Progress to hand to the [`ProgressReporter`], if the percentage moved.
	pub report: Option<WorkReport>,
}

/// Turns the count of outstanding jobs into percentage complete.
///
/// The percentage is computed against the biggest backlog seen on this batch instead of the current one,
/// so jobs discovered mid batch never make the reported progress go backwards.
///
/// The tracker only does the math, delivering its [`WorkReport`]s is up to the caller.
#[derive(Debug)]
pub struct ProgressTracker {
	ticks: usize,
	max_ticks: usize,
	work_done: u32,
}

impl ProgressTracker {
	pub fn new(ticks: usize) -> Self {
		trace!(ticks, "Starting progress tracking for a new batch");

		Self {
			ticks,
			max_ticks: ticks,
			work_done: 0,
		}
	}

	pub fn tick_up(&mut self) -> Tick {
		self.ticks += 1;
		self.max_ticks = self.max_ticks.max(self.ticks);

		self.report(None)
	}

	/// `label` is shown before the remaining items count on the progress display.
	pub fn tick_down(&mut self, label: Option<&str>) -> Tick {
		self.ticks = self.ticks.saturating_sub(1);

		self.report(label)
	}

	pub fn set_ticks(&mut self, ticks: usize) -> Tick {
		self.ticks = ticks;
		self.max_ticks = self.max_ticks.max(ticks);

		self.report(None)
	}

	#[must_use]
	pub const fn ticks(&self) -> usize {
		self.ticks
	}

	#[must_use]
	pub const fn work_done(&self) -> u32 {
		self.work_done
	}

	fn report(&mut self, label: Option<&str>) -> Tick {
		let percent = if self.max_ticks == 0 {
			TOTAL_WORK
		} else {
			u32::try_from((self.max_ticks - self.ticks) * TOTAL_WORK as usize / self.max_ticks)
				.unwrap_or(TOTAL_WORK)
		};

		let report = (percent > self.work_done).then(|| {
			let work = percent - self.work_done;
			self.work_done = percent;

			let remaining = remaining_label(self.ticks);

			WorkReport {
				work,
				label: match label {
					Some(label) => format!("{label}, {remaining}"),
					None => remaining,
				},
			}
		});

		Tick {
			remaining: self.ticks,
			report,
		}
	}
}

#[must_use]
pub fn remaining_label(remaining: usize) -> String {
	if remaining == 1 {
		"1 item remaining".to_string()
	} else {
		format!("{remaining} items remaining")
	}
}
