use std::fmt;

use tracing::trace;

use super::job::DynJob;

pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// FIFO of pending jobs, with the head being the job that runs next (or is running right now).
///
/// Jobs live on `slots[start..end]`. Once the backing storage is filled up to its end it doubles in size
/// and the pending jobs are packed back to the start, and whenever the queue drains both cursors go back
/// to zero, so intermittent load doesn't keep pushing the cursors forward.
///
/// There is no internal locking, the scheduler only touches it while holding its own lock.
pub struct JobQueue {
	slots: Vec<Option<DynJob>>,
	start: usize,
	end: usize,
}

impl Default for JobQueue {
	fn default() -> Self {
		Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
	}
}

impl JobQueue {
	#[must_use]
	pub fn with_capacity(capacity: usize) -> Self {
		Self {
			slots: vec![None; capacity.max(1)],
			start: 0,
			end: 0,
		}
	}

	pub fn enqueue(&mut self, job: DynJob) {
		if self.end == self.slots.len() {
			self.grow();
		}

		self.slots[self.end] = Some(job);
		self.end += 1;
	}

	fn grow(&mut self) {
		let new_capacity = self.slots.len() * 2;
		let mut slots = Vec::with_capacity(new_capacity);

		slots.extend(self.slots[self.start..self.end].iter_mut().map(Option::take));
		slots.resize(new_capacity, None);

		trace!(
			old_capacity = self.slots.len(),
			new_capacity,
			"Growing job queue"
		);

		self.end -= self.start;
		self.start = 0;
		self.slots = slots;
	}

	#[must_use]
	pub fn peek_head(&self) -> Option<&DynJob> {
		if self.is_empty() {
			None
		} else {
			self.slots[self.start].as_ref()
		}
	}

	/// Removes the head of the queue, returning it.
	pub fn advance(&mut self) -> Option<DynJob> {
		if self.is_empty() {
			return None;
		}

		let job = self.slots[self.start].take();
		self.start += 1;

		if self.is_empty() {
			self.start = 0;
			self.end = 0;
		}

		job
	}

	/// Compacts the queue in place, evicting every job matching `predicate` while keeping the relative
	/// order of the remaining ones. Evicted jobs are canceled and handed back to the caller in queue order.
	pub fn remove_where(&mut self, mut predicate: impl FnMut(&DynJob) -> bool) -> Vec<DynJob> {
		let mut removed = Vec::new();
		let mut kept = self.start;

		for idx in self.start..self.end {
			let Some(job) = self.slots[idx].take() else {
				continue;
			};

			if predicate(&job) {
				trace!(job_id = %job.id(), "Evicting job from queue");
				job.cancel();
				removed.push(job);
			} else {
				self.slots[kept] = Some(job);
				kept += 1;
			}
		}

		self.end = kept;

		if self.is_empty() {
			self.start = 0;
			self.end = 0;
		}

		removed
	}

	#[must_use]
	pub const fn count(&self) -> usize {
		self.end - self.start
	}

	#[must_use]
	pub const fn is_empty(&self) -> bool {
		self.start >= self.end
	}

	#[must_use]
	pub fn capacity(&self) -> usize {
		self.slots.len()
	}

	pub fn iter(&self) -> impl Iterator<Item = &DynJob> {
		self.slots[self.start..self.end].iter().flatten()
	}
}

impl fmt::Debug for JobQueue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("JobQueue")
			.field("start", &self.start)
			.field("end", &self.end)
			.field("capacity", &self.slots.len())
			.field(
				"jobs",
				&self.iter().map(|job| job.describe()).collect::<Vec<_>>(),
			)
			.finish()
	}
}
