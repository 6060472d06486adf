use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::{AggregateFailure, WorkError};
use crate::future::WorkFuture;
use crate::scope::{OperationScope, ScopeId};

const SINGLE_FAILURE: &str = "There was a failure while executing asynchronous work";
const MULTIPLE_FAILURES: &str = "There were multiple failures while executing asynchronous work";

/// Binds submitted work to the operation scope it was submitted under.
///
/// Closing a scope waits for every unit registered under it. Child scopes are
/// tracked independently and awaited when they close.
#[derive(Debug, Default)]
pub struct CompletionTracker {
	pending: Mutex<HashMap<ScopeId, Vec<WorkFuture>>>,
}

impl CompletionTracker {
	pub fn new() -> Self {
		Self::default()
	}

	/// Associates `future` with `scope`.
	pub fn register(&self, scope: &OperationScope, future: WorkFuture) {
		tracing::trace!(scope = %scope, description = future.description(), "workers.tracker.register");
		self.pending.lock().entry(scope.id()).or_default().push(future);
	}

	/// Whether any unit registered under `scope` has not yet finished.
	pub fn has_uncompleted_work(&self, scope: &OperationScope) -> bool {
		self.pending
			.lock()
			.get(&scope.id())
			.is_some_and(|futures| futures.iter().any(|f| !f.is_done()))
	}

	/// Number of units registered under `scope` and not yet drained.
	pub fn registered(&self, scope: &OperationScope) -> usize {
		self.pending.lock().get(&scope.id()).map_or(0, Vec::len)
	}

	/// Waits for every unit registered under `scope` as of this call.
	///
	/// Every unit is waited on even after an earlier one fails. Failures that
	/// no caller observed are combined into one [`WorkError::Aggregate`].
	///
	/// Units stay registered until all of them have settled, so dropping the
	/// returned future part way leaves the scope intact for a later close.
	pub async fn await_all(&self, scope: &OperationScope) -> Result<(), WorkError> {
		let Some(futures) = self.pending.lock().get(&scope.id()).cloned() else {
			return Ok(());
		};
		tracing::debug!(scope = %scope, count = futures.len(), "workers.tracker.await_all");

		let mut outcomes = Vec::with_capacity(futures.len());
		for future in &futures {
			outcomes.push(future.settled().await);
		}

		self.drain(scope, &futures);
		let mut failures = Vec::new();
		for (future, outcome) in futures.iter().zip(outcomes) {
			if let Err(err) = future.claim(outcome) {
				tracing::warn!(scope = %scope, description = future.description(), error = %err, "workers.tracker.unobserved_failure");
				failures.push(err);
			}
		}

		match AggregateFailure::from_causes(failures, SINGLE_FAILURE, MULTIPLE_FAILURES) {
			None => Ok(()),
			Some(aggregate) => Err(aggregate.into()),
		}
	}

	/// Removes `settled` from the scope, keeping units registered since.
	fn drain(&self, scope: &OperationScope, settled: &[WorkFuture]) {
		let mut pending = self.pending.lock();
		let Some(futures) = pending.get_mut(&scope.id()) else {
			return;
		};
		futures.retain(|f| !settled.iter().any(|s| s.same_unit(f)));
		if futures.is_empty() {
			pending.remove(&scope.id());
		}
	}
}

#[cfg(test)]
mod tests;
