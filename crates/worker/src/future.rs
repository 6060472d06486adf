//! Futures returned from work submission.
//!
//! A [`WorkFuture`] can be awaited by the submitting caller and, later, by the
//! [`crate::CompletionTracker`] when the enclosing operation scope closes. The
//! `observed` flag decides which of the two reports a failure: whoever waits
//! first claims it, so a failure is reported once when the caller looked at
//! it and still reported when nobody did.

use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

use crate::error::WorkError;
use crate::result::WorkResult;

/// Terminal state of a submitted unit.
#[derive(Debug, Clone)]
pub enum Outcome {
	Finished(WorkResult),
	Cancelled,
}

/// Single-assignment completion cell shared by a pool task and its waiters.
#[derive(Debug, Clone)]
pub(crate) struct Completion {
	tx: Arc<watch::Sender<Option<Outcome>>>,
}

impl Completion {
	pub(crate) fn new() -> Self {
		let (tx, _rx) = watch::channel(None);
		Self { tx: Arc::new(tx) }
	}

	/// Publishes `outcome` unless one was already published.
	pub(crate) fn complete(&self, outcome: Outcome) -> bool {
		self.tx.send_if_modified(move |slot| {
			if slot.is_some() {
				return false;
			}
			*slot = Some(outcome);
			true
		})
	}

	pub(crate) fn peek(&self) -> Option<Outcome> {
		self.tx.borrow().clone()
	}

	pub(crate) async fn wait(&self) -> Outcome {
		let mut rx = self.tx.subscribe();
		loop {
			if let Some(outcome) = rx.borrow_and_update().clone() {
				return outcome;
			}
			if rx.changed().await.is_err() {
				return Outcome::Cancelled;
			}
		}
	}
}

/// The pool-side half of a submission: completion cell plus task control.
pub(crate) struct RawWork {
	pub(crate) completion: Completion,
	pub(crate) cancel: CancellationToken,
	pub(crate) abort: AbortHandle,
}

struct FutureState {
	description: String,
	observed: AtomicBool,
	raw: RawWork,
	runtime: Handle,
}

/// Handle on one submitted unit of work.
///
/// Clones share state: awaiting any clone counts as observing the result.
#[derive(Clone)]
pub struct WorkFuture {
	state: Arc<FutureState>,
}

impl WorkFuture {
	pub(crate) fn new(description: String, raw: RawWork, runtime: Handle) -> Self {
		Self {
			state: Arc::new(FutureState {
				description,
				observed: AtomicBool::new(false),
				raw,
				runtime,
			}),
		}
	}

	pub fn description(&self) -> &str {
		&self.state.description
	}

	pub fn is_done(&self) -> bool {
		self.state.raw.completion.peek().is_some()
	}

	pub fn is_cancelled(&self) -> bool {
		matches!(self.state.raw.completion.peek(), Some(Outcome::Cancelled))
	}

	/// Whether some party already took responsibility for the outcome.
	pub fn is_observed(&self) -> bool {
		self.state.observed.load(Ordering::Acquire)
	}

	/// Attempts to cancel the unit. Returns false if it had already finished.
	///
	/// The unit stays registered with its scope and resolves as cancelled.
	pub fn cancel(&self) -> bool {
		let raw = &self.state.raw;
		if !raw.completion.complete(Outcome::Cancelled) {
			return false;
		}
		tracing::debug!(description = %self.state.description, "workers.future.cancel");
		raw.cancel.cancel();
		raw.abort.abort();
		true
	}

	/// Waits for the unit and surfaces its failure, if any.
	///
	/// The caller claims the outcome as soon as it starts waiting, so a scope
	/// closing concurrently does not report the same failure again.
	pub async fn get(&self) -> Result<(), WorkError> {
		self.state.observed.store(true, Ordering::Release);
		let outcome = self.state.raw.completion.wait().await;
		self.surface(outcome)
	}

	/// Like [`Self::get`], bounded by `timeout`.
	///
	/// A timeout does not count as observing the result.
	pub async fn get_timeout(&self, timeout: Duration) -> Result<(), WorkError> {
		match tokio::time::timeout(timeout, self.state.raw.completion.wait()).await {
			Ok(outcome) => {
				self.state.observed.store(true, Ordering::Release);
				self.surface(outcome)
			}
			Err(_) => Err(WorkError::Timeout {
				description: self.state.description.clone(),
				timeout,
			}),
		}
	}

	/// Runs `listener` once the unit reaches a terminal state.
	pub fn add_listener<F>(&self, listener: F)
	where
		F: FnOnce() + Send + 'static,
	{
		if self.is_done() {
			listener();
			return;
		}
		let completion = self.state.raw.completion.clone();
		self.state.runtime.spawn(async move {
			completion.wait().await;
			listener();
		});
	}

	/// Waits for completion on behalf of the scope tracker.
	///
	/// Surfaces the failure only when no caller observed it first.
	#[cfg(test)]
	pub(crate) async fn resolve_quietly(&self) -> Result<(), WorkError> {
		let outcome = self.settled().await;
		self.claim(outcome)
	}

	/// Waits for a terminal state without claiming the outcome.
	pub(crate) async fn settled(&self) -> Outcome {
		self.state.raw.completion.wait().await
	}

	/// Claims a settled `outcome` for the tracker, unless a caller already did.
	pub(crate) fn claim(&self, outcome: Outcome) -> Result<(), WorkError> {
		if self.state.observed.swap(true, Ordering::AcqRel) {
			return Ok(());
		}
		self.surface(outcome)
	}

	/// Whether `self` and `other` are handles on the same unit.
	pub(crate) fn same_unit(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.state, &other.state)
	}

	fn surface(&self, outcome: Outcome) -> Result<(), WorkError> {
		match outcome {
			Outcome::Finished(result) => match result.into_failure() {
				None => Ok(()),
				Some(failure) => Err(WorkError::Execution {
					description: self.state.description.clone(),
					failure,
				}),
			},
			Outcome::Cancelled => Err(WorkError::Cancelled {
				description: self.state.description.clone(),
			}),
		}
	}
}

impl fmt::Debug for WorkFuture {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WorkFuture")
			.field("description", &self.state.description)
			.field("done", &self.is_done())
			.field("observed", &self.is_observed())
			.finish()
	}
}

impl<'a> IntoFuture for &'a WorkFuture {
	type Output = Result<(), WorkError>;
	type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send + 'a>>;

	fn into_future(self) -> Self::IntoFuture {
		Box::pin(self.get())
	}
}

impl IntoFuture for WorkFuture {
	type Output = Result<(), WorkError>;
	type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

	fn into_future(self) -> Self::IntoFuture {
		Box::pin(async move { self.get().await })
	}
}

/// Pending future driven by hand through the returned completion cell.
#[cfg(test)]
pub(crate) fn pending(description: &str) -> (WorkFuture, Completion) {
	let completion = Completion::new();
	let task = tokio::spawn(std::future::pending::<()>());
	let raw = RawWork {
		completion: completion.clone(),
		cancel: CancellationToken::new(),
		abort: task.abort_handle(),
	};
	(WorkFuture::new(description.to_string(), raw, Handle::current()), completion)
}
