//! Logical operation scopes that submitted work is attributed to.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of one operation scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
	fn next() -> Self {
		Self(NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed))
	}
}

impl fmt::Display for ScopeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "op#{}", self.0)
	}
}

#[derive(Debug)]
struct ScopeInner {
	id: ScopeId,
	parent: Option<ScopeId>,
	name: String,
}

/// Handle for a logical, possibly nested, unit of build activity.
///
/// Cloning is cheap; clones refer to the same scope.
#[derive(Debug, Clone)]
pub struct OperationScope {
	inner: Arc<ScopeInner>,
}

impl OperationScope {
	/// Opens a top-level scope.
	pub fn root(name: impl Into<String>) -> Self {
		Self::with_parent(None, name.into())
	}

	/// Opens a scope nested under `self`.
	pub fn child(&self, name: impl Into<String>) -> Self {
		Self::with_parent(Some(self.inner.id), name.into())
	}

	fn with_parent(parent: Option<ScopeId>, name: String) -> Self {
		Self {
			inner: Arc::new(ScopeInner {
				id: ScopeId::next(),
				parent,
				name,
			}),
		}
	}

	pub fn id(&self) -> ScopeId {
		self.inner.id
	}

	pub fn parent(&self) -> Option<ScopeId> {
		self.inner.parent
	}

	pub fn name(&self) -> &str {
		&self.inner.name
	}
}

impl PartialEq for OperationScope {
	fn eq(&self, other: &Self) -> bool {
		self.inner.id == other.inner.id
	}
}

impl Eq for OperationScope {}

impl fmt::Display for OperationScope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} ({})", self.inner.name, self.inner.id)
	}
}

/// Caller context handed to a worker alongside the unit it executes.
#[derive(Debug, Clone)]
pub struct CallerContext {
	scope: OperationScope,
	cancel: CancellationToken,
}

impl CallerContext {
	pub(crate) fn new(scope: OperationScope, cancel: CancellationToken) -> Self {
		Self { scope, cancel }
	}

	/// Scope the unit was submitted under.
	pub fn scope(&self) -> &OperationScope {
		&self.scope
	}

	/// Returns true once the submitting future was cancelled.
	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn child_scopes_record_parent() {
		let build = OperationScope::root("build");
		let task = build.child(":compileJava");

		assert_eq!(task.parent(), Some(build.id()));
		assert_ne!(task.id(), build.id());
		assert_eq!(build.clone(), build);
		assert!(task.to_string().starts_with(":compileJava (op#"));
	}
}
