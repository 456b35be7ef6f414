use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::queue::DEFAULT_QUEUE_CAPACITY;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_EVENTS_CAPACITY: usize = 256;

/// Tuning knobs for a [`Scheduler`](crate::Scheduler), meant to be embedded on the node config.
///
/// Every field is optional when deserializing, durations are expressed in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
	/// Starting size of the pending jobs storage, it doubles whenever it fills up.
	pub initial_queue_capacity: usize,
	/// How often callers waiting for the queue to drain re-check it, even without being notified.
	#[serde(with = "millis", rename = "poll_interval_ms")]
	pub poll_interval: Duration,
	/// How long the worker must be idle between [`JobEvent::Idle`](crate::JobEvent::Idle) notifications.
	#[serde(with = "millis", rename = "idle_interval_ms")]
	pub idle_interval: Duration,
	/// Buffer of the events channel, slow subscribers lag behind instead of blocking the worker.
	pub events_capacity: usize,
}

impl Default for SchedulerConfig {
	fn default() -> Self {
		Self {
			initial_queue_capacity: DEFAULT_QUEUE_CAPACITY,
			poll_interval: DEFAULT_POLL_INTERVAL,
			idle_interval: DEFAULT_IDLE_INTERVAL,
			events_capacity: DEFAULT_EVENTS_CAPACITY,
		}
	}
}

impl SchedulerConfig {
	#[must_use]
	pub const fn with_initial_queue_capacity(mut self, initial_queue_capacity: usize) -> Self {
		self.initial_queue_capacity = initial_queue_capacity;
		self
	}

	#[must_use]
	pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
		self.poll_interval = poll_interval;
		self
	}

	#[must_use]
	pub const fn with_idle_interval(mut self, idle_interval: Duration) -> Self {
		self.idle_interval = idle_interval;
		self
	}

	#[must_use]
	pub const fn with_events_capacity(mut self, events_capacity: usize) -> Self {
		self.events_capacity = events_capacity;
		self
	}
}

mod millis {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
		u64::deserialize(deserializer).map(Duration::from_millis)
	}
}
