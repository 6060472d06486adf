use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use super::{WorkerHandle, WorkerProvisioner};
use crate::error::{Cause, ProvisionError, TransportError};
use crate::profile::ForkProfile;
use crate::config::DispatchConfig;
use crate::registry::WorkerRegistry;
use crate::result::WorkResult;
use crate::scope::CallerContext;
use crate::spec::WorkSpec;

/// Starts worker processes. Process creation and the wire protocol live here.
pub trait WorkerLauncher: Send + Sync + 'static {
	fn launch(&self, profile: &ForkProfile, working_dir: &Path) -> Result<Box<dyn WorkerProcess>, Cause>;
}

/// A running worker process.
pub trait WorkerProcess: Send + Sync {
	fn execute(&self, spec: &WorkSpec, ctx: &CallerContext) -> Result<WorkResult, TransportError>;

	/// Terminates the process.
	fn stop(&self) {}
}

struct Daemon {
	id: u64,
	process: Box<dyn WorkerProcess>,
}

#[derive(Default)]
struct DaemonPool {
	idle: HashMap<ForkProfile, Vec<Daemon>>,
	stopped: bool,
}

struct Shared {
	pool: Mutex<DaemonPool>,
	registry: WorkerRegistry,
	max_idle_per_profile: usize,
}

impl Shared {
	/// Returns a daemon to the idle set, or stops it when it cannot be kept.
	fn release(&self, profile: ForkProfile, daemon: Daemon, broken: bool) {
		let rejected = {
			let mut pool = self.pool.lock();
			if broken || pool.stopped {
				Some(daemon)
			} else {
				let idle = pool.idle.entry(profile).or_default();
				if idle.len() >= self.max_idle_per_profile {
					Some(daemon)
				} else {
					self.registry.set_busy(daemon.id, false);
					idle.push(daemon);
					None
				}
			}
		};

		if let Some(daemon) = rejected {
			tracing::info!(daemon = daemon.id, broken, "workers.daemon.stop");
			daemon.process.stop();
			self.registry.stopped(daemon.id);
		}
	}
}

/// Provisioner keeping idle worker daemons for reuse, keyed by profile.
pub struct DaemonProvisioner<L> {
	launcher: L,
	shared: Arc<Shared>,
	next_id: AtomicU64,
}

impl<L: WorkerLauncher> DaemonProvisioner<L> {
	pub fn new(launcher: L) -> Self {
		Self::with_max_idle(launcher, 4)
	}

	/// Creates a provisioner retaining at most `max_idle_per_profile` idle daemons per profile.
	pub fn with_max_idle(launcher: L, max_idle_per_profile: usize) -> Self {
		Self {
			launcher,
			shared: Arc::new(Shared {
				pool: Mutex::new(DaemonPool::default()),
				registry: WorkerRegistry::new(),
				max_idle_per_profile,
			}),
			next_id: AtomicU64::new(1),
		}
	}

	/// Creates a provisioner retaining idle daemons as `config` allows.
	pub fn from_config(launcher: L, config: &DispatchConfig) -> Self {
		Self::with_max_idle(launcher, config.max_idle_daemons_per_profile)
	}

	/// Live daemon snapshots.
	pub fn registry(&self) -> &WorkerRegistry {
		&self.shared.registry
	}

	/// Number of idle daemons across all profiles.
	pub fn idle_count(&self) -> usize {
		self.shared.pool.lock().idle.values().map(Vec::len).sum()
	}

	fn launch(&self, profile: &ForkProfile, working_dir: &Path) -> Result<Daemon, ProvisionError> {
		let process = self.launcher.launch(profile, working_dir).map_err(|err| {
			tracing::debug!(error = %err, dir = %working_dir.display(), "workers.daemon.launch_failed");
			ProvisionError::with_source(format!("failed to start worker daemon in {}", working_dir.display()), err)
		})?;
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		tracing::info!(daemon = id, profile = %profile.summary(), "workers.daemon.started");
		self.shared.registry.started(id, profile, working_dir);
		Ok(Daemon { id, process })
	}
}

impl<L: WorkerLauncher> WorkerProvisioner for DaemonProvisioner<L> {
	fn obtain(&self, profile: &ForkProfile, working_dir: &Path) -> Result<Box<dyn WorkerHandle>, ProvisionError> {
		let reused = {
			let mut pool = self.shared.pool.lock();
			if pool.stopped {
				return Err(ProvisionError::new("worker daemons have been stopped"));
			}
			pool.idle.get_mut(profile).and_then(Vec::pop)
		};

		let daemon = match reused {
			Some(daemon) => {
				tracing::debug!(daemon = daemon.id, "workers.daemon.reuse");
				self.shared.registry.set_busy(daemon.id, true);
				daemon
			}
			None => self.launch(profile, working_dir)?,
		};

		Ok(Box::new(DaemonLease {
			daemon: Some(daemon),
			profile: profile.clone(),
			broken: AtomicBool::new(false),
			shared: Arc::clone(&self.shared),
		}))
	}

	fn stop(&self) {
		let idle: Vec<Daemon> = {
			let mut pool = self.shared.pool.lock();
			pool.stopped = true;
			pool.idle.drain().flat_map(|(_, daemons)| daemons).collect()
		};
		for daemon in idle {
			tracing::info!(daemon = daemon.id, "workers.daemon.stop");
			daemon.process.stop();
			self.shared.registry.stopped(daemon.id);
		}
	}
}

/// Exclusive use of one daemon; returns it to the pool on drop.
struct DaemonLease {
	daemon: Option<Daemon>,
	profile: ForkProfile,
	broken: AtomicBool,
	shared: Arc<Shared>,
}

impl WorkerHandle for DaemonLease {
	fn execute(&self, spec: &WorkSpec, ctx: &CallerContext) -> Result<WorkResult, TransportError> {
		let Some(daemon) = self.daemon.as_ref() else {
			return Err(TransportError::new(crate::error::Message::cause("daemon lease already released")));
		};
		let result = daemon.process.execute(spec, ctx);
		let failure = match &result {
			Err(err) => {
				self.broken.store(true, Ordering::Release);
				Some(err.to_string())
			}
			Ok(res) => res.failure().map(ToString::to_string),
		};
		self.shared.registry.executed(daemon.id, failure);
		result
	}
}

impl Drop for DaemonLease {
	fn drop(&mut self) {
		if let Some(daemon) = self.daemon.take() {
			let profile = self.profile.clone();
			self.shared.release(profile, daemon, self.broken.load(Ordering::Acquire));
		}
	}
}
