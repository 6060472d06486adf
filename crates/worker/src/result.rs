use crate::error::{Cause, WorkFailure};

/// Terminal outcome of executing one unit of work.
///
/// A failed result always carries its cause.
#[derive(Debug, Clone)]
pub struct WorkResult {
	failure: Option<WorkFailure>,
}

impl WorkResult {
	pub const fn success() -> Self {
		Self { failure: None }
	}

	pub const fn failed(failure: WorkFailure) -> Self {
		Self { failure: Some(failure) }
	}

	/// Failed result for an action that raised `cause`.
	pub fn action_failed(cause: Cause) -> Self {
		Self::failed(WorkFailure::Action(cause))
	}

	pub const fn is_success(&self) -> bool {
		self.failure.is_none()
	}

	pub fn failure(&self) -> Option<&WorkFailure> {
		self.failure.as_ref()
	}

	pub fn into_failure(self) -> Option<WorkFailure> {
		self.failure
	}
}

impl From<Result<(), Cause>> for WorkResult {
	fn from(result: Result<(), Cause>) -> Self {
		match result {
			Ok(()) => Self::success(),
			Err(cause) => Self::action_failed(cause),
		}
	}
}
