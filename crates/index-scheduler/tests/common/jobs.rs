use std::{
	future::pending,
	sync::{
		atomic::{AtomicBool, AtomicUsize, Ordering},
		Arc,
	},
	time::Duration,
};

use sd_index_scheduler::{
	async_trait, check_cancellation, CancelSignal, ExecStatus, Job, JobId, ProgressHandle,
};

use async_channel as chan;
use futures_concurrency::future::Race;
use parking_lot::Mutex;
use tokio::{sync::oneshot, time::sleep};
use tracing::info;

/// Names of the jobs in the order they started executing.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog(Arc<Mutex<Vec<String>>>);

impl ExecutionLog {
	pub fn push(&self, name: &str) {
		self.0.lock().push(name.to_string());
	}

	pub fn entries(&self) -> Vec<String> {
		self.0.lock().clone()
	}
}

/// Tracks how many jobs are executing at the same time.
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
	running: AtomicUsize,
	max_running: AtomicUsize,
}

impl ConcurrencyProbe {
	pub fn enter(&self) -> ProbeGuard<'_> {
		let running = self.running.fetch_add(1, Ordering::AcqRel) + 1;
		self.max_running.fetch_max(running, Ordering::AcqRel);

		ProbeGuard(self)
	}

	pub fn max_running(&self) -> usize {
		self.max_running.load(Ordering::Acquire)
	}
}

pub struct ProbeGuard<'probe>(&'probe ConcurrencyProbe);

impl Drop for ProbeGuard<'_> {
	fn drop(&mut self) {
		self.0.running.fetch_sub(1, Ordering::AcqRel);
	}
}

#[derive(Debug)]
pub struct SampleJob {
	id: JobId,
	name: String,
	family: &'static str,
	delay: Duration,
	log: ExecutionLog,
	probe: Option<Arc<ConcurrencyProbe>>,
	signal: CancelSignal,
}

impl SampleJob {
	pub fn new(name: impl Into<String>, family: &'static str, log: &ExecutionLog) -> Arc<Self> {
		Self::build(name, family, log, Duration::ZERO, None)
	}

	pub fn slow(
		name: impl Into<String>,
		delay: Duration,
		log: &ExecutionLog,
		probe: &Arc<ConcurrencyProbe>,
	) -> Arc<Self> {
		Self::build(name, "slow", log, delay, Some(Arc::clone(probe)))
	}

	fn build(
		name: impl Into<String>,
		family: &'static str,
		log: &ExecutionLog,
		delay: Duration,
		probe: Option<Arc<ConcurrencyProbe>>,
	) -> Arc<Self> {
		Arc::new(Self {
			id: JobId::new_v4(),
			name: name.into(),
			family,
			delay,
			log: log.clone(),
			probe,
			signal: CancelSignal::new(),
		})
	}

	pub fn was_canceled(&self) -> bool {
		self.signal.is_canceled()
	}
}

#[async_trait]
impl Job for SampleJob {
	fn id(&self) -> JobId {
		self.id
	}

	fn belongs_to(&self, family: &str) -> bool {
		self.family == family
	}

	fn cancel(&self) {
		self.signal.cancel();
	}

	fn describe(&self) -> String {
		format!("indexing {}", self.name)
	}

	async fn execute(&self, _progress: &ProgressHandle) -> ExecStatus {
		check_cancellation!(self.signal);

		self.log.push(&self.name);

		let _guard = self.probe.as_deref().map(ConcurrencyProbe::enter);

		(
			async {
				sleep(self.delay).await;
				ExecStatus::Done
			},
			async {
				(&self.signal).await;
				ExecStatus::Canceled
			},
		)
			.race()
			.await
	}
}

/// Runs until released or canceled, letting the test know once it started.
#[derive(Debug)]
pub struct GatedJob {
	id: JobId,
	family: &'static str,
	began_tx: Mutex<Option<oneshot::Sender<()>>>,
	release_rx: chan::Receiver<()>,
	executions: AtomicUsize,
	signal: CancelSignal,
}

impl GatedJob {
	pub fn new(family: &'static str) -> (Arc<Self>, oneshot::Receiver<()>, chan::Sender<()>) {
		let (began_tx, began_rx) = oneshot::channel();
		let (release_tx, release_rx) = chan::bounded(1);

		(
			Arc::new(Self {
				id: JobId::new_v4(),
				family,
				began_tx: Mutex::new(Some(began_tx)),
				release_rx,
				executions: AtomicUsize::new(0),
				signal: CancelSignal::new(),
			}),
			began_rx,
			release_tx,
		)
	}

	pub fn was_canceled(&self) -> bool {
		self.signal.is_canceled()
	}

	pub fn executions(&self) -> usize {
		self.executions.load(Ordering::Acquire)
	}
}

#[async_trait]
impl Job for GatedJob {
	fn id(&self) -> JobId {
		self.id
	}

	fn belongs_to(&self, family: &str) -> bool {
		self.family == family
	}

	fn cancel(&self) {
		info!("Canceling GatedJob <id='{}'>", self.id);
		self.signal.cancel();
	}

	async fn execute(&self, _progress: &ProgressHandle) -> ExecStatus {
		self.executions.fetch_add(1, Ordering::AcqRel);

		let began_tx = self.began_tx.lock().take();
		if let Some(began_tx) = began_tx {
			if began_tx.send(()).is_err() {
				info!("Nobody waiting for GatedJob <id='{}'> to begin", self.id);
			}
		}

		(
			async {
				if self.release_rx.recv().await.is_err() {
					// Never released, only a cancel gets us out
					return pending().await;
				}
				ExecStatus::Done
			},
			async {
				(&self.signal).await;
				ExecStatus::Canceled
			},
		)
			.race()
			.await
	}
}

#[derive(Debug, Default)]
pub struct PanickingJob {
	id: JobId,
}

impl PanickingJob {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			id: JobId::new_v4(),
		})
	}
}

#[async_trait]
impl Job for PanickingJob {
	fn id(&self) -> JobId {
		self.id
	}

	fn cancel(&self) {}

	async fn execute(&self, _progress: &ProgressHandle) -> ExecStatus {
		panic!("PanickingJob <id='{}'> blew up", self.id);
	}
}

#[derive(Debug, Default)]
pub struct NotReadyJob {
	id: JobId,
	executed: AtomicBool,
}

impl NotReadyJob {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			id: JobId::new_v4(),
			executed: AtomicBool::new(false),
		})
	}

	pub fn executed(&self) -> bool {
		self.executed.load(Ordering::Acquire)
	}
}

#[async_trait]
impl Job for NotReadyJob {
	fn id(&self) -> JobId {
		self.id
	}

	fn cancel(&self) {}

	fn is_ready_to_run(&self) -> bool {
		false
	}

	async fn execute(&self, _progress: &ProgressHandle) -> ExecStatus {
		self.executed.store(true, Ordering::Release);
		ExecStatus::Done
	}
}
