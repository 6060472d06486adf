use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::{WorkerHandle, WorkerProvisioner};
use crate::error::{ProvisionError, TransportError};
use crate::profile::ForkProfile;
use crate::result::WorkResult;
use crate::scope::CallerContext;
use crate::spec::WorkSpec;

#[derive(Debug, Default)]
struct InProcessWorker {
	executions: AtomicU64,
}

struct InProcessHandle {
	worker: Arc<InProcessWorker>,
}

impl WorkerHandle for InProcessHandle {
	fn execute(&self, spec: &WorkSpec, ctx: &CallerContext) -> Result<WorkResult, TransportError> {
		self.worker.executions.fetch_add(1, Ordering::Relaxed);
		tracing::trace!(description = spec.description(), scope = %ctx.scope(), "workers.in_process.execute");
		Ok(WorkResult::from(spec.run()))
	}
}

/// Runs units on the calling pool thread.
///
/// One worker is kept per distinct profile so that executions can be
/// attributed to the isolation they were requested with.
#[derive(Debug, Default)]
pub struct InProcessProvisioner {
	workers: Mutex<HashMap<ForkProfile, Arc<InProcessWorker>>>,
}

impl InProcessProvisioner {
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of distinct profiles a worker has been created for.
	pub fn worker_count(&self) -> usize {
		self.workers.lock().len()
	}

	/// Total units executed across all in-process workers.
	pub fn executions(&self) -> u64 {
		self.workers.lock().values().map(|w| w.executions.load(Ordering::Relaxed)).sum()
	}
}

impl WorkerProvisioner for InProcessProvisioner {
	fn obtain(&self, profile: &ForkProfile, _working_dir: &Path) -> Result<Box<dyn WorkerHandle>, ProvisionError> {
		let worker = Arc::clone(self.workers.lock().entry(profile.clone()).or_default());
		Ok(Box::new(InProcessHandle { worker }))
	}

	fn stop(&self) {
		self.workers.lock().clear();
	}
}
