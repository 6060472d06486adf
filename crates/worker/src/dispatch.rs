//! Submission entry point.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::aggregate;
use crate::config::DispatchConfig;
use crate::error::{AggregateFailure, ProvisionError, WorkError, WorkFailure};
use crate::future::{Completion, Outcome, RawWork, WorkFuture};
use crate::profile::{ForkProfile, IsolationProfileBuilder, TypeIntrospector};
use crate::provision::{Provisioners, WorkerProvisioner};
use crate::result::WorkResult;
use crate::scope::{CallerContext, OperationScope};
use crate::spec::{ForkMode, WorkAction, WorkSpec, WorkerConfiguration};
use crate::spawn::DispatchRuntime;
use crate::tracker::CompletionTracker;

/// Accepts units of work and runs them on isolated workers.
///
/// Submission never blocks on execution: it builds the unit's isolation
/// profile, queues the unit on a bounded pool, registers the returned future
/// with the [`CompletionTracker`] under the caller's scope and returns.
pub struct WorkDispatcher {
	config: DispatchConfig,
	provisioners: Provisioners,
	isolation: IsolationProfileBuilder,
	tracker: Arc<CompletionTracker>,
	permits: Arc<Semaphore>,
	runtime: DispatchRuntime,
}

impl WorkDispatcher {
	pub fn new(config: DispatchConfig, provisioners: Provisioners, introspector: Arc<dyn TypeIntrospector>) -> Self {
		let permits = Arc::new(Semaphore::new(config.max_parallel_workers.max(1)));
		Self {
			config,
			provisioners,
			isolation: IsolationProfileBuilder::new(introspector),
			tracker: Arc::new(CompletionTracker::new()),
			permits,
			runtime: DispatchRuntime::resolve(),
		}
	}

	/// Shares `tracker` with the operation registry instead of a private one.
	#[must_use]
	pub fn with_tracker(mut self, tracker: Arc<CompletionTracker>) -> Self {
		self.tracker = tracker;
		self
	}

	/// Runs pool tasks on `runtime` instead of the one current at construction.
	#[must_use]
	pub fn with_runtime(mut self, runtime: Handle) -> Self {
		self.runtime = DispatchRuntime::from_handle(runtime);
		self
	}

	pub fn config(&self) -> &DispatchConfig {
		&self.config
	}

	pub fn tracker(&self) -> &Arc<CompletionTracker> {
		&self.tracker
	}

	/// Submits `action` under `scope`, configured by `configure`.
	pub fn submit<A>(&self, scope: &OperationScope, action: A, configure: impl FnOnce(&mut WorkerConfiguration)) -> WorkFuture
	where
		A: WorkAction,
	{
		let mut config = WorkerConfiguration::with_fork_mode(self.config.default_fork_mode);
		configure(&mut config);

		let action: Arc<dyn WorkAction> = Arc::new(action);
		let action_type = action.type_ref();
		let description = config.display_name.take().unwrap_or_else(|| action_type.name().to_string());
		let profile = self
			.isolation
			.build(&action_type, &config.params, &config.fork_options, &config.classpath);
		let spec = WorkSpec::new(description, action, config.params);

		self.dispatch(scope, spec, config.fork_mode, profile)
	}

	fn dispatch(&self, scope: &OperationScope, spec: WorkSpec, fork_mode: ForkMode, profile: ForkProfile) -> WorkFuture {
		let description = spec.description().to_string();
		let span = tracing::debug_span!(
			"workers.unit",
			description = %description,
			action = spec.action_type().simple_name(),
			scope = %scope,
			fork_mode = fork_mode.as_str()
		);
		tracing::debug!(parent: &span, profile = %profile.summary(), "workers.dispatch.submit");

		let completion = Completion::new();
		let cancel = CancellationToken::new();
		let unit = Unit {
			spec,
			profile,
			ctx: CallerContext::new(scope.clone(), cancel.clone()),
			provisioner: Arc::clone(self.provisioners.select(fork_mode)),
		};
		let publisher = Publisher {
			completion: completion.clone(),
		};
		let abort = self
			.runtime
			.spawn_unit(&description, drive(unit, Arc::clone(&self.permits), publisher).instrument(span));

		let raw = RawWork { completion, cancel, abort };
		let future = WorkFuture::new(description, raw, self.runtime.handle().clone());
		self.tracker.register(scope, future.clone());
		future
	}

	/// Waits on every future in `futures`, reporting all failures together.
	pub async fn await_all<'a, I>(&self, futures: I) -> Result<(), AggregateFailure>
	where
		I: IntoIterator<Item = &'a WorkFuture>,
	{
		aggregate::await_all(futures).await
	}

	/// Waits for all work submitted under `scope`, for use when it closes.
	pub async fn close_scope(&self, scope: &OperationScope) -> Result<(), WorkError> {
		self.tracker.await_all(scope).await
	}

	/// Refuses further work and stops retained workers.
	///
	/// Units already running finish; queued units fail as unavailable.
	pub fn stop(&self) {
		tracing::info!("workers.dispatch.stop");
		self.permits.close();
		self.provisioners.stop();
	}
}

/// Everything a pool task needs to run one unit.
struct Unit {
	spec: WorkSpec,
	profile: ForkProfile,
	ctx: CallerContext,
	provisioner: Arc<dyn WorkerProvisioner>,
}

impl Unit {
	/// Obtains a worker and executes on it. Never fails: every error becomes a failed result.
	fn run(self) -> WorkResult {
		let worker = match self.provisioner.obtain(&self.profile, self.profile.working_dir()) {
			Ok(worker) => worker,
			Err(err) => {
				tracing::debug!(error = %err, "workers.dispatch.unavailable");
				return WorkResult::failed(WorkFailure::WorkerUnavailable(err));
			}
		};
		match worker.execute(&self.spec, &self.ctx) {
			Ok(result) => result,
			Err(err) => {
				tracing::debug!(error = %err, "workers.dispatch.transport_failed");
				WorkResult::failed(WorkFailure::Transport(err))
			}
		}
	}
}

/// Publishes a unit's outcome. Dropped unpublished, it fails the unit.
///
/// The driver task can be dropped before it ever runs, for instance when the
/// runtime it was spawned on shuts down; waiters must still be released.
struct Publisher {
	completion: Completion,
}

impl Publisher {
	fn publish(&self, outcome: Outcome) {
		self.completion.complete(outcome);
	}
}

impl Drop for Publisher {
	fn drop(&mut self) {
		let dropped = WorkResult::failed(WorkFailure::WorkerUnavailable(ProvisionError::new("dispatch task dropped before the unit finished")));
		if self.completion.complete(Outcome::Finished(dropped)) {
			tracing::warn!("workers.dispatch.dropped");
		}
	}
}

async fn drive(unit: Unit, permits: Arc<Semaphore>, publisher: Publisher) {
	let Ok(permit) = permits.acquire_owned().await else {
		publisher.publish(Outcome::Finished(WorkResult::failed(WorkFailure::WorkerUnavailable(ProvisionError::new(
			"work dispatcher has been stopped",
		)))));
		return;
	};
	if unit.ctx.is_cancelled() {
		return;
	}

	let span = tracing::Span::current();
	let joined = tokio::task::spawn_blocking(move || {
		let _permit = permit;
		let _entered = span.enter();
		unit.run()
	})
	.await;

	let outcome = match joined {
		Ok(result) => Outcome::Finished(result),
		Err(err) => match crate::join_error_panic_message(err) {
			Some(message) => Outcome::Finished(WorkResult::failed(WorkFailure::Panicked(message))),
			None => Outcome::Cancelled,
		},
	};
	if let Outcome::Finished(result) = &outcome {
		if let Some(failure) = result.failure() {
			tracing::debug!(error = %failure, "workers.dispatch.failed");
		}
	}
	publisher.publish(outcome);
}
