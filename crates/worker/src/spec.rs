//! Units of work and the configuration a caller attaches to them.

use std::any::Any;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::Cause;

/// Runtime type identity of an action or parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef {
	name: &'static str,
}

impl TypeRef {
	pub fn of<T: ?Sized>() -> Self {
		Self {
			name: std::any::type_name::<T>(),
		}
	}

	/// Fully qualified type path, e.g. `my_plugin::tasks::Compile`.
	pub fn name(&self) -> &'static str {
		self.name
	}

	/// Type path with generic arguments removed.
	pub fn base_path(&self) -> &'static str {
		match self.name.find('<') {
			Some(idx) => &self.name[..idx],
			None => self.name,
		}
	}

	/// Last path segment of [`Self::base_path`].
	pub fn simple_name(&self) -> &'static str {
		let base = self.base_path();
		base.rsplit("::").next().unwrap_or(base)
	}
}

impl fmt::Display for TypeRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name)
	}
}

/// One parameter value handed to an action.
#[derive(Clone)]
pub struct Param {
	ty: TypeRef,
	value: Arc<dyn Any + Send + Sync>,
}

impl Param {
	pub fn new<T>(value: T) -> Self
	where
		T: Any + Send + Sync,
	{
		Self {
			ty: TypeRef::of::<T>(),
			value: Arc::new(value),
		}
	}

	pub fn type_ref(&self) -> &TypeRef {
		&self.ty
	}

	pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
		self.value.downcast_ref::<T>()
	}
}

impl fmt::Debug for Param {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Param").field("type", &self.ty.name()).finish_non_exhaustive()
	}
}

/// Executable body of a unit of work.
pub trait WorkAction: Send + Sync + 'static {
	/// Runs the action with its parameters.
	fn execute(&self, params: &[Param]) -> Result<(), Cause>;

	/// Type identity used for isolation and as the fallback description.
	fn type_ref(&self) -> TypeRef {
		TypeRef {
			name: std::any::type_name::<Self>(),
		}
	}
}

/// Immutable description, action and parameters of one unit of work.
#[derive(Clone)]
pub struct WorkSpec {
	description: String,
	action: Arc<dyn WorkAction>,
	params: Vec<Param>,
}

impl WorkSpec {
	pub fn new(description: impl Into<String>, action: Arc<dyn WorkAction>, params: Vec<Param>) -> Self {
		Self {
			description: description.into(),
			action,
			params,
		}
	}

	pub fn description(&self) -> &str {
		&self.description
	}

	pub fn action_type(&self) -> TypeRef {
		self.action.type_ref()
	}

	pub fn params(&self) -> &[Param] {
		&self.params
	}

	/// Runs the action in the current thread.
	pub fn run(&self) -> Result<(), Cause> {
		self.action.execute(&self.params)
	}
}

impl fmt::Debug for WorkSpec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WorkSpec")
			.field("description", &self.description)
			.field("action", &self.action.type_ref().name())
			.field("params", &self.params)
			.finish()
	}
}

/// Whether a unit runs in an external worker process or in-process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForkMode {
	/// Always run in a worker daemon process.
	Always,
	/// Never fork; run in-process.
	Never,
	/// Let the dispatcher decide. Resolves to in-process execution.
	#[default]
	Auto,
}

impl ForkMode {
	pub const fn forks(self) -> bool {
		matches!(self, Self::Always)
	}

	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Always => "always",
			Self::Never => "never",
			Self::Auto => "auto",
		}
	}
}

/// Process settings requested for a forked worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForkOptions {
	pub min_heap_size: Option<String>,
	pub max_heap_size: Option<String>,
	pub process_args: Vec<String>,
	pub working_dir: PathBuf,
}

impl ForkOptions {
	#[must_use]
	pub fn min_heap_size(mut self, size: impl Into<String>) -> Self {
		self.min_heap_size = Some(size.into());
		self
	}

	#[must_use]
	pub fn max_heap_size(mut self, size: impl Into<String>) -> Self {
		self.max_heap_size = Some(size.into());
		self
	}

	#[must_use]
	pub fn arg(mut self, arg: impl Into<String>) -> Self {
		self.process_args.push(arg.into());
		self
	}

	#[must_use]
	pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.working_dir = dir.into();
		self
	}
}

/// Mutable configuration a caller fills in before submission.
#[derive(Debug, Clone, Default)]
pub struct WorkerConfiguration {
	pub display_name: Option<String>,
	pub params: Vec<Param>,
	pub fork_mode: ForkMode,
	pub fork_options: ForkOptions,
	/// Extra classpath entries, in addition to what isolation derives.
	pub classpath: Vec<PathBuf>,
}

impl WorkerConfiguration {
	pub(crate) fn with_fork_mode(fork_mode: ForkMode) -> Self {
		Self {
			fork_mode,
			..Self::default()
		}
	}

	pub fn param<T>(&mut self, value: T) -> &mut Self
	where
		T: Any + Send + Sync,
	{
		self.params.push(Param::new(value));
		self
	}

	pub fn display_name(&mut self, name: impl Into<String>) -> &mut Self {
		self.display_name = Some(name.into());
		self
	}

	pub fn fork_mode(&mut self, mode: ForkMode) -> &mut Self {
		self.fork_mode = mode;
		self
	}
}
