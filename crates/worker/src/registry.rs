use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::profile::ForkProfile;

/// Status of one worker daemon process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonRecord {
	pub id: u64,
	/// [`ForkProfile::summary`] of the profile the daemon was started for.
	pub profile: String,
	pub working_dir: PathBuf,
	/// Units executed, including failed ones.
	pub uses: u64,
	/// Leased to a unit right now.
	pub busy: bool,
	pub last_failure: Option<String>,
}

/// Live worker daemons, ordered by id. Clones share state.
#[derive(Debug, Default, Clone)]
pub struct WorkerRegistry {
	daemons: Arc<RwLock<BTreeMap<u64, DaemonRecord>>>,
}

impl WorkerRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Records a freshly launched daemon, leased to the unit that launched it.
	pub(crate) fn started(&self, id: u64, profile: &ForkProfile, working_dir: &Path) {
		let record = DaemonRecord {
			id,
			profile: profile.summary(),
			working_dir: working_dir.to_path_buf(),
			uses: 0,
			busy: true,
			last_failure: None,
		};
		self.daemons.write().insert(id, record);
	}

	pub(crate) fn set_busy(&self, id: u64, busy: bool) {
		if let Some(record) = self.daemons.write().get_mut(&id) {
			record.busy = busy;
		}
	}

	/// Counts one execution and remembers its failure, clearing any earlier one on success.
	pub(crate) fn executed(&self, id: u64, failure: Option<String>) {
		if let Some(record) = self.daemons.write().get_mut(&id) {
			record.uses = record.uses.saturating_add(1);
			record.last_failure = failure;
		}
	}

	pub(crate) fn stopped(&self, id: u64) {
		self.daemons.write().remove(&id);
	}

	pub fn snapshots(&self) -> Vec<DaemonRecord> {
		self.daemons.read().values().cloned().collect()
	}

	/// Daemons currently leased to a unit.
	pub fn busy_count(&self) -> usize {
		self.daemons.read().values().filter(|r| r.busy).count()
	}
}
