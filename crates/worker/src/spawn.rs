use std::future::Future;
use std::sync::OnceLock;

use tokio::runtime::{Handle, Runtime};
use tokio::task::AbortHandle;

/// Runtime that drives dispatch tasks and completion listeners.
#[derive(Debug, Clone)]
pub(crate) struct DispatchRuntime {
	handle: Handle,
	fallback: bool,
}

impl DispatchRuntime {
	/// The caller's runtime, or the shared fallback when called outside tokio.
	///
	/// Running on the caller's runtime puts actions on its blocking pool.
	pub(crate) fn resolve() -> Self {
		match Handle::try_current() {
			Ok(handle) => Self { handle, fallback: false },
			Err(_) => Self {
				handle: fallback().handle().clone(),
				fallback: true,
			},
		}
	}

	pub(crate) fn from_handle(handle: Handle) -> Self {
		Self { handle, fallback: false }
	}

	pub(crate) fn handle(&self) -> &Handle {
		&self.handle
	}

	/// Spawns the driver task for one unit of work.
	pub(crate) fn spawn_unit<F>(&self, description: &str, fut: F) -> AbortHandle
	where
		F: Future<Output = ()> + Send + 'static,
	{
		tracing::trace!(description, fallback = self.fallback, "workers.spawn");
		self.handle.spawn(fut).abort_handle()
	}
}

fn fallback() -> &'static Runtime {
	static FALLBACK: OnceLock<Runtime> = OnceLock::new();
	FALLBACK.get_or_init(|| {
		let threads = std::thread::available_parallelism().map_or(2, |n| n.get().min(4));
		tokio::runtime::Builder::new_multi_thread()
			.worker_threads(threads)
			.thread_name("kiln-dispatch")
			.enable_all()
			.build()
			.expect("failed to build fallback dispatch runtime")
	})
}
