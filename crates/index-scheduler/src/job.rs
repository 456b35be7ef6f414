use std::{
	fmt,
	future::{Future, IntoFuture},
	pin::Pin,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
	task::{Context, Poll},
};

use async_trait::async_trait;
use downcast_rs::{impl_downcast, DowncastSync};
use tokio::sync::{futures::Notified, Notify};
use tracing::trace;
use uuid::Uuid;

use super::progress::ProgressHandle;

/// A unique identifier for a job using the [`uuid`](https://docs.rs/uuid) crate.
///
/// It is only used to identify jobs on logs and events, the scheduler itself compares jobs
/// by reference, see [`same_job`].
pub type JobId = Uuid;

/// Jobs are shared between the producer, the queue and the worker, so they always travel behind an [`Arc`].
pub type DynJob = Arc<dyn Job>;

/// The outcome of a single [`Job::execute`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
	Done,
	Failed,
	/// The job noticed a cancellation request and stopped before finishing its work.
	Canceled,
}

impl ExecStatus {
	#[must_use]
	pub const fn is_success(self) -> bool {
		matches!(self, Self::Done)
	}
}

impl From<bool> for ExecStatus {
	fn from(success: bool) -> Self {
		if success {
			Self::Done
		} else {
			Self::Failed
		}
	}
}

/// The unit of work handled by the [`Scheduler`](crate::Scheduler).
///
/// Every method receives `&self` as a job can be canceled from any thread while it is executing,
/// so implementors are expected to keep their mutable state behind interior mutability,
/// usually a [`CancelSignal`] for the cancellation flag.
///
/// We're currently using the [`async_trait`](https://docs.rs/async-trait) crate to allow dyn async traits.
#[async_trait]
pub trait Job: DowncastSync + Send + Sync + 'static {
	fn id(&self) -> JobId;

	/// Whether this job is part of the given family, used to discard jobs in bulk.
	fn belongs_to(&self, _family: &str) -> bool {
		false
	}

	/// Best effort cancellation request, the job must stop at its next safe point but
	/// nothing is forcefully interrupted.
	fn cancel(&self);

	/// Checked once at submission time, jobs that aren't ready are dropped without ever being queued.
	fn is_ready_to_run(&self) -> bool {
		true
	}

	/// Human readable label shown on progress reports.
	fn describe(&self) -> String {
		format!("job <id='{}'>", self.id())
	}

	async fn execute(&self, progress: &ProgressHandle) -> ExecStatus;
}

impl_downcast!(sync Job);

impl fmt::Debug for dyn Job {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "<Job id='{}' description='{}'>", self.id(), self.describe())
	}
}

/// Jobs have no identity besides the allocation holding them.
#[inline]
#[must_use]
pub fn same_job(lhs: &DynJob, rhs: &DynJob) -> bool {
	// Comparing data pointers only, as vtable pointers for the same type may differ between codegen units
	std::ptr::addr_eq(Arc::as_ptr(lhs), Arc::as_ptr(rhs))
}

/// An embeddable cancellation flag that jobs can use to implement [`Job::cancel`].
///
/// Besides the non-blocking [`CancelSignal::is_canceled`] check, a `&CancelSignal` can be awaited,
/// resolving once cancellation is requested, which is handy to race against some long IO.
#[derive(Debug, Default)]
pub struct CancelSignal {
	canceled: AtomicBool,
	notify: Notify,
}

impl CancelSignal {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		if !self.canceled.swap(true, Ordering::AcqRel) {
			trace!("Cancel signal raised");
			self.notify.notify_waiters();
		}
	}

	#[must_use]
	pub fn is_canceled(&self) -> bool {
		self.canceled.load(Ordering::Acquire)
	}
}

pin_project_lite::pin_project! {
	/// Resolves when the [`CancelSignal`] it came from gets canceled.
	#[must_use = "`CancelSignalFuture` does nothing unless polled"]
	pub struct CancelSignalFuture<'signal> {
		signal: &'signal CancelSignal,
		#[pin]
		notified: Notified<'signal>,
	}
}

impl Future for CancelSignalFuture<'_> {
	type Output = ();

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let this = self.project();

		if this.signal.is_canceled() {
			return Poll::Ready(());
		}

		this.notified.poll(cx)
	}
}

impl<'signal> IntoFuture for &'signal CancelSignal {
	type Output = ();

	type IntoFuture = CancelSignalFuture<'signal>;

	fn into_future(self) -> Self::IntoFuture {
		CancelSignalFuture {
			signal: self,
			notified: self.notify.notified(),
		}
	}
}

/// Returns [`ExecStatus::Canceled`] from the enclosing [`Job::execute`] if the given
/// [`CancelSignal`] was raised.
#[macro_export]
macro_rules! check_cancellation {
	($signal:expr) => {
		let signal: &$crate::CancelSignal = &$signal;

		if signal.is_canceled() {
			::tracing::trace!("Job was canceled");
			return $crate::ExecStatus::Canceled;
		}
	};
}
