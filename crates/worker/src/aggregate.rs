use std::future::IntoFuture;

use crate::error::{AggregateFailure, WorkError};

const SINGLE_FAILURE: &str = "There was a failure while executing work items";
const MULTIPLE_FAILURES: &str = "There were multiple failures while executing work items";

/// Waits on every future in order and reports all failures together.
///
/// A failing element does not stop the wait: later elements are still awaited.
/// Causes keep the iteration order of `futures`.
pub async fn await_all<I, F, T>(futures: I) -> Result<(), AggregateFailure>
where
	I: IntoIterator<Item = F>,
	F: IntoFuture<Output = Result<T, WorkError>>,
{
	let mut failures = Vec::new();
	for future in futures {
		if let Err(err) = future.await {
			failures.push(err);
		}
	}

	match AggregateFailure::from_causes(failures, SINGLE_FAILURE, MULTIPLE_FAILURES) {
		None => Ok(()),
		Some(aggregate) => {
			tracing::debug!(failures = aggregate.causes().len(), "workers.await_all.failed");
			Err(aggregate)
		}
	}
}
