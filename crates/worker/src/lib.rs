//! Dispatch of build work onto isolated worker processes.
//!
//! [`WorkDispatcher::submit`] turns an action and its parameters into a unit
//! of work, derives the minimal [`ForkProfile`] the unit needs, runs it on a
//! pooled worker daemon or in-process, and hands back a [`WorkFuture`]. Every
//! future is also registered with the [`CompletionTracker`] under the
//! submitting [`OperationScope`], so closing the scope waits for the work and
//! reports failures the caller never looked at.

mod aggregate;
mod config;
mod dispatch;
mod error;
mod future;
mod profile;
mod provision;
mod registry;
mod result;
mod scope;
mod spawn;
mod spec;
mod tracker;

pub use aggregate::await_all;
pub use config::DispatchConfig;
pub use dispatch::WorkDispatcher;
pub use error::{AggregateFailure, Cause, ConfigError, Message, ProvisionError, TransportError, WorkError, WorkFailure, cause};
pub use future::{Outcome, WorkFuture};
pub use profile::{DEFAULT_PACKAGE, ForkProfile, IsolationProfileBuilder, ModulePathIntrospector, TypeIntrospector};
pub use provision::{DaemonProvisioner, InProcessProvisioner, Provisioners, WorkerHandle, WorkerLauncher, WorkerProcess, WorkerProvisioner};
pub use registry::{DaemonRecord, WorkerRegistry};
pub use result::WorkResult;
pub use scope::{CallerContext, OperationScope, ScopeId};
pub use spec::{ForkMode, ForkOptions, Param, TypeRef, WorkAction, WorkSpec, WorkerConfiguration};
pub use tracker::CompletionTracker;

/// Extracts the panic message from a failed pool task, or `None` if it was cancelled.
pub(crate) fn join_error_panic_message(err: tokio::task::JoinError) -> Option<String> {
	if !err.is_panic() {
		return None;
	}
	let payload = err.into_panic();
	if let Some(msg) = payload.downcast_ref::<&'static str>() {
		return Some((*msg).to_string());
	}
	if let Some(msg) = payload.downcast_ref::<String>() {
		return Some(msg.clone());
	}
	Some("non-string panic payload".to_string())
}
