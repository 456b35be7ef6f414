//!
//! # Index Scheduler
//!
//! Spacedrive's Index Scheduler runs long lived background jobs, like indexing a location, one at a time
//! on a single worker, while still letting foreground callers get their own work done right away.
//!
//! Producers on any task just [`request`](Scheduler::request) jobs and forget about them, the worker runs them
//! in request order. Aside from that:
//! - Jobs are grouped in families, which can be discarded in bulk, canceling the executing one if needed;
//! - The worker can be enabled, disabled or paused, a paused scheduler resumes on the next request;
//! - A caller that needs up to date results can run a job on its own task with a [`ConcurrentPolicy`],
//!   forcing it ahead of the queue, giving up if the queue is busy or waiting for it to drain;
//! - Progress of each batch is reported as a monotonic percentage to a [`ProgressReporter`];
//! - A job panicking loses the current batch, but the worker is restarted and the scheduler keeps going.
//!
//! ## Basic example
//!
//! ```
//! use std::sync::Arc;
//!
//! use sd_index_scheduler::{
//! 	async_trait, CancelSignal, ExecStatus, Job, JobEvent, JobId, ProgressHandle, Scheduler,
//! };
//!
//! #[derive(Debug, Default)]
//! struct IndexLocation {
//! 	id: JobId,
//! 	signal: CancelSignal,
//! }
//!
//! #[async_trait]
//! impl Job for IndexLocation {
//! 	fn id(&self) -> JobId {
//! 		self.id
//! 	}
//!
//! 	fn belongs_to(&self, family: &str) -> bool {
//! 		family == "location"
//! 	}
//!
//! 	fn cancel(&self) {
//! 		self.signal.cancel();
//! 	}
//!
//! 	async fn execute(&self, _progress: &ProgressHandle) -> ExecStatus {
//! 		sd_index_scheduler::check_cancellation!(self.signal);
//!
//! 		ExecStatus::Done
//! 	}
//! }
//!
//! #[tokio::main]
//! async fn main() {
//! 	let scheduler = Scheduler::new();
//! 	let mut events = scheduler.subscribe();
//!
//! 	scheduler
//! 		.request(Arc::new(IndexLocation::default()))
//! 		.expect("scheduler is running");
//!
//! 	loop {
//! 		if let Ok(JobEvent::Completed { status, .. }) = events.recv().await {
//! 			assert!(status.is_success());
//! 			break;
//! 		}
//! 	}
//!
//! 	scheduler.shutdown().await;
//! }
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

mod config;
mod error;
mod event;
mod job;
mod progress;
mod queue;
mod scheduler;

pub use async_trait::async_trait;

pub use config::SchedulerConfig;
pub use error::Error as SchedulerError;
pub use event::JobEvent;
pub use job::{same_job, CancelSignal, CancelSignalFuture, DynJob, ExecStatus, Job, JobId};
pub use progress::{
	remaining_label, NoopReporter, ProgressHandle, ProgressReporter, ProgressTracker, Tick,
	WorkReport, TOTAL_WORK,
};
pub use queue::JobQueue;
pub use scheduler::{ConcurrentPolicy, Scheduler, SchedulerState};
