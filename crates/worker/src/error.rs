//! Error vocabulary for work dispatch.
//!
//! Failures inside a unit of work are carried as [`WorkFailure`] values in a
//! [`crate::WorkResult`]. They only become a [`WorkError`] at the public
//! boundary, when somebody waits on a [`crate::WorkFuture`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Shared, cloneable error cause.
pub type Cause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Wraps any error into a [`Cause`].
pub fn cause<E>(error: E) -> Cause
where
	E: std::error::Error + Send + Sync + 'static,
{
	Arc::new(error)
}

/// Plain message error, for actions that fail without a richer type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct Message(pub String);

impl Message {
	pub fn cause(msg: impl Into<String>) -> Cause {
		Arc::new(Self(msg.into()))
	}
}

/// Why one unit of work did not succeed.
#[derive(Debug, Clone, Error)]
pub enum WorkFailure {
	/// No worker could be obtained for the unit.
	#[error(transparent)]
	WorkerUnavailable(ProvisionError),
	/// The action itself raised.
	#[error(transparent)]
	Action(Cause),
	/// The worker accepted the unit but communication with it broke down.
	#[error(transparent)]
	Transport(TransportError),
	/// The action panicked on the pool thread.
	#[error("work panicked: {0}")]
	Panicked(String),
}

impl WorkFailure {
	pub fn action<E>(error: E) -> Self
	where
		E: std::error::Error + Send + Sync + 'static,
	{
		Self::Action(cause(error))
	}

	pub fn is_worker_unavailable(&self) -> bool {
		matches!(self, Self::WorkerUnavailable(_))
	}
}

/// A worker process or in-process executor could not be obtained.
#[derive(Debug, Clone, Error)]
#[error("worker unavailable: {reason}")]
pub struct ProvisionError {
	reason: String,
	#[source]
	source: Option<Cause>,
}

impl ProvisionError {
	pub fn new(reason: impl Into<String>) -> Self {
		Self {
			reason: reason.into(),
			source: None,
		}
	}

	pub fn with_source(reason: impl Into<String>, source: Cause) -> Self {
		Self {
			reason: reason.into(),
			source: Some(source),
		}
	}

	pub fn reason(&self) -> &str {
		&self.reason
	}
}

/// Communication with a worker failed while executing a unit.
#[derive(Debug, Clone, Error)]
#[error("worker transport failed: {source}")]
pub struct TransportError {
	#[source]
	source: Cause,
}

impl TransportError {
	pub fn new(source: Cause) -> Self {
		Self { source }
	}
}

/// Error observed by whoever waits on submitted work.
#[derive(Debug, Clone, Error)]
pub enum WorkError {
	/// The unit finished with a failed result.
	#[error("A failure occurred while executing {description}: {failure}")]
	Execution {
		description: String,
		#[source]
		failure: WorkFailure,
	},
	/// The unit was cancelled before producing a result.
	#[error("{description} was cancelled")]
	Cancelled { description: String },
	/// A timed wait elapsed first. The work itself keeps running.
	#[error("timed out after {timeout:?} waiting for {description}")]
	Timeout { description: String, timeout: Duration },
	/// Several failures merged into one report.
	#[error(transparent)]
	Aggregate(#[from] AggregateFailure),
}

impl WorkError {
	/// Failure carried by an [`WorkError::Execution`], if any.
	pub fn failure(&self) -> Option<&WorkFailure> {
		match self {
			Self::Execution { failure, .. } => Some(failure),
			_ => None,
		}
	}

	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout { .. })
	}

	pub fn is_cancelled(&self) -> bool {
		matches!(self, Self::Cancelled { .. })
	}
}

/// One reported error wrapping every collected cause, in collection order.
#[derive(Debug, Clone)]
pub struct AggregateFailure {
	message: &'static str,
	causes: Vec<WorkError>,
}

impl AggregateFailure {
	/// Builds an aggregate over `causes` using singular or plural wording.
	///
	/// Returns `None` when there is nothing to report.
	pub fn from_causes(causes: Vec<WorkError>, singular: &'static str, plural: &'static str) -> Option<Self> {
		let message = match causes.len() {
			0 => return None,
			1 => singular,
			_ => plural,
		};
		Some(Self { message, causes })
	}

	pub fn message(&self) -> &str {
		self.message
	}

	pub fn causes(&self) -> &[WorkError] {
		&self.causes
	}
}

impl fmt::Display for AggregateFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.message)?;
		for (idx, cause) in self.causes.iter().enumerate() {
			write!(f, "\n  {}. {cause}", idx + 1)?;
		}
		Ok(())
	}
}

impl std::error::Error for AggregateFailure {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		self.causes.first().map(|c| c as &(dyn std::error::Error + 'static))
	}
}

/// Errors raised while loading dispatch configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}")]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// The TOML document did not match the expected shape.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	/// A value was syntactically valid but out of range.
	#[error("invalid value for {field}: {reason}")]
	Invalid { field: &'static str, reason: String },
}
