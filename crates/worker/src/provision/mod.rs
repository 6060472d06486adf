//! Worker provisioning: choosing and obtaining the worker that runs a unit.
//!
//! Reuse policy belongs to each provisioner. The dispatcher only relies on
//! [`WorkerProvisioner::obtain`] returning a usable handle or failing with a
//! [`ProvisionError`], possibly after blocking while a worker starts.

use std::path::Path;
use std::sync::Arc;

use crate::error::{ProvisionError, TransportError};
use crate::profile::ForkProfile;
use crate::result::WorkResult;
use crate::scope::CallerContext;
use crate::spec::{ForkMode, WorkSpec};

mod daemon;
mod in_process;

pub use daemon::{DaemonProvisioner, WorkerLauncher, WorkerProcess};
pub use in_process::InProcessProvisioner;

/// A worker able to execute units of work.
pub trait WorkerHandle: Send + Sync {
	/// Executes `spec`, returning its result or a transport failure.
	fn execute(&self, spec: &WorkSpec, ctx: &CallerContext) -> Result<WorkResult, TransportError>;
}

/// Source of workers for one execution mode.
pub trait WorkerProvisioner: Send + Sync {
	/// Returns a worker compatible with `profile`. May block while one starts.
	fn obtain(&self, profile: &ForkProfile, working_dir: &Path) -> Result<Box<dyn WorkerHandle>, ProvisionError>;

	/// Releases every retained worker.
	fn stop(&self) {}
}

/// Pair of provisioners selected between by [`ForkMode`].
#[derive(Clone)]
pub struct Provisioners {
	daemon: Arc<dyn WorkerProvisioner>,
	in_process: Arc<dyn WorkerProvisioner>,
}

impl Provisioners {
	pub fn new(daemon: Arc<dyn WorkerProvisioner>, in_process: Arc<dyn WorkerProvisioner>) -> Self {
		Self { daemon, in_process }
	}

	/// Provisioner responsible for `mode`.
	pub fn select(&self, mode: ForkMode) -> &Arc<dyn WorkerProvisioner> {
		if mode.forks() { &self.daemon } else { &self.in_process }
	}

	pub fn stop(&self) {
		self.daemon.stop();
		self.in_process.stop();
	}
}
