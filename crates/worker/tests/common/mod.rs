//! Shared fakes for dispatcher integration tests.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use kiln_workers::{
	CallerContext, Cause, DaemonProvisioner, DispatchConfig, ForkProfile, InProcessProvisioner, Message, ModulePathIntrospector, Param, Provisioners,
	TransportError, WorkAction, WorkDispatcher, WorkResult, WorkSpec, WorkerLauncher, WorkerProcess,
};

/// Installs a test subscriber once per test binary.
pub fn init_tracing() {
	let _ = tracing_subscriber::fmt::try_init();
}

/// Fails the surrounding test instead of hanging on `fut`.
pub async fn within<F: std::future::Future>(fut: F) -> F::Output {
	tokio::time::timeout(Duration::from_secs(5), fut).await.expect("work should not hang")
}

pub struct Succeeds;

impl WorkAction for Succeeds {
	fn execute(&self, _params: &[Param]) -> Result<(), Cause> {
		Ok(())
	}
}

pub struct FailsWith(pub &'static str);

impl WorkAction for FailsWith {
	fn execute(&self, _params: &[Param]) -> Result<(), Cause> {
		Err(Message::cause(self.0))
	}
}

/// Sleeps for the given duration before succeeding.
pub struct Sleeps(pub Duration);

impl WorkAction for Sleeps {
	fn execute(&self, _params: &[Param]) -> Result<(), Cause> {
		std::thread::sleep(self.0);
		Ok(())
	}
}

/// Launcher for simulated daemons that run units on the calling thread.
///
/// Every `fail_every`-th execution across all daemons breaks the connection.
#[derive(Clone, Default)]
pub struct FakeLauncher {
	launches: Arc<AtomicUsize>,
	stops: Arc<AtomicUsize>,
	executions: Arc<AtomicUsize>,
	fail_every: Option<usize>,
}

impl FakeLauncher {
	pub fn failing_every(n: usize) -> Self {
		Self {
			fail_every: Some(n),
			..Self::default()
		}
	}

	pub fn launches(&self) -> usize {
		self.launches.load(Ordering::SeqCst)
	}

	pub fn stops(&self) -> usize {
		self.stops.load(Ordering::SeqCst)
	}
}

struct FakeProcess {
	launcher: FakeLauncher,
}

impl WorkerProcess for FakeProcess {
	fn execute(&self, spec: &WorkSpec, _ctx: &CallerContext) -> Result<WorkResult, TransportError> {
		let n = self.launcher.executions.fetch_add(1, Ordering::SeqCst) + 1;
		if self.launcher.fail_every.is_some_and(|every| n % every == 0) {
			return Err(TransportError::new(Message::cause("connection reset by worker")));
		}
		Ok(WorkResult::from(spec.run()))
	}

	fn stop(&self) {
		self.launcher.stops.fetch_add(1, Ordering::SeqCst);
	}
}

impl WorkerLauncher for FakeLauncher {
	fn launch(&self, _profile: &ForkProfile, _working_dir: &Path) -> Result<Box<dyn WorkerProcess>, Cause> {
		self.launches.fetch_add(1, Ordering::SeqCst);
		Ok(Box::new(FakeProcess { launcher: self.clone() }))
	}
}

/// Dispatcher over `launcher`, returning the daemon provisioner for inspection.
pub fn dispatcher(config: DispatchConfig, launcher: FakeLauncher) -> (WorkDispatcher, Arc<DaemonProvisioner<FakeLauncher>>) {
	let daemons = Arc::new(DaemonProvisioner::from_config(launcher, &config));
	let provisioners = Provisioners::new(daemons.clone(), Arc::new(InProcessProvisioner::new()));
	let dispatcher = WorkDispatcher::new(config, provisioners, Arc::new(ModulePathIntrospector::new()));
	(dispatcher, daemons)
}
