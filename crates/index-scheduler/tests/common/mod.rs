#![allow(dead_code)]

pub mod jobs;
pub mod reporter;

use std::time::Duration;

use sd_index_scheduler::{DynJob, ExecStatus, JobEvent};

use tokio::{sync::broadcast, time::timeout};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Waits for the next `count` completed jobs, skipping every other event.
pub async fn wait_completed(
	events: &mut broadcast::Receiver<JobEvent>,
	count: usize,
) -> Vec<(DynJob, ExecStatus)> {
	let mut completed = Vec::with_capacity(count);

	while completed.len() < count {
		match timeout(TIMEOUT, events.recv())
			.await
			.expect("timed out waiting for completed jobs")
		{
			Ok(JobEvent::Completed { job, status }) => completed.push((job, status)),
			Ok(_) => {}
			Err(e) => panic!("events channel failed: {e:#?}"),
		}
	}

	completed
}

/// Waits until an event matching `predicate` shows up.
pub async fn wait_event(
	events: &mut broadcast::Receiver<JobEvent>,
	predicate: impl Fn(&JobEvent) -> bool,
) -> JobEvent {
	timeout(TIMEOUT, async {
		loop {
			match events.recv().await {
				Ok(event) if predicate(&event) => return event,
				Ok(_) => {}
				Err(e) => panic!("events channel failed: {e:#?}"),
			}
		}
	})
	.await
	.expect("timed out waiting for event")
}
