use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::error::{Message, WorkFailure};
use crate::future::{Completion, Outcome, pending};
use crate::result::WorkResult;

fn fail(completion: &Completion, msg: &str) {
	completion.complete(Outcome::Finished(WorkResult::failed(WorkFailure::Action(Message::cause(msg)))));
}

fn succeed(completion: &Completion) {
	completion.complete(Outcome::Finished(WorkResult::success()));
}

#[tokio::test]
async fn await_all_blocks_until_late_unit_finishes() {
	let tracker = Arc::new(CompletionTracker::new());
	let scope = OperationScope::root("build");
	let (early, early_done) = pending("early");
	let (late, late_done) = pending("late");
	tracker.register(&scope, early);
	tracker.register(&scope, late);
	succeed(&early_done);

	let closing = tokio::spawn({
		let tracker = Arc::clone(&tracker);
		let scope = scope.clone();
		async move { tracker.await_all(&scope).await }
	});
	tokio::time::sleep(Duration::from_millis(20)).await;
	assert!(!closing.is_finished());
	assert_eq!(tracker.registered(&scope), 2);

	succeed(&late_done);
	assert!(closing.await.expect("join").is_ok());
	assert_eq!(tracker.registered(&scope), 0);
}

#[tokio::test]
async fn abandoned_close_keeps_units_for_next_close() {
	let tracker = CompletionTracker::new();
	let scope = OperationScope::root("build");
	let (future, done) = pending("slow");
	tracker.register(&scope, future);

	let abandoned = tokio::time::timeout(Duration::from_millis(10), tracker.await_all(&scope)).await;
	assert!(abandoned.is_err());
	assert_eq!(tracker.registered(&scope), 1);

	fail(&done, "late failure");
	let err = tracker.await_all(&scope).await.expect_err("failure still reported");
	let WorkError::Aggregate(agg) = err else {
		panic!("expected aggregate");
	};
	assert_eq!(agg.causes().len(), 1);
	assert_eq!(tracker.registered(&scope), 0);
}

#[tokio::test]
async fn unit_registered_during_close_survives_it() {
	let tracker = Arc::new(CompletionTracker::new());
	let scope = OperationScope::root("build");
	let (first, first_done) = pending("first");
	tracker.register(&scope, first);

	let closing = tokio::spawn({
		let tracker = Arc::clone(&tracker);
		let scope = scope.clone();
		async move { tracker.await_all(&scope).await }
	});
	tokio::time::sleep(Duration::from_millis(10)).await;
	let (late, late_done) = pending("late");
	tracker.register(&scope, late);
	succeed(&first_done);

	assert!(closing.await.expect("join").is_ok());
	assert_eq!(tracker.registered(&scope), 1);
	fail(&late_done, "registered late");
	assert!(tracker.await_all(&scope).await.is_err());
}

#[tokio::test]
async fn caller_waiting_during_close_keeps_the_failure() {
	let tracker = Arc::new(CompletionTracker::new());
	for _ in 0..20 {
		let scope = OperationScope::root("build");
		let (future, done) = pending("raced");
		tracker.register(&scope, future.clone());

		let caller = tokio::spawn(async move { future.get().await });
		tokio::time::sleep(Duration::from_millis(2)).await;
		let closing = tokio::spawn({
			let tracker = Arc::clone(&tracker);
			async move { tracker.await_all(&scope).await }
		});
		tokio::task::yield_now().await;
		fail(&done, "seen by caller");

		assert!(caller.await.expect("join").is_err());
		assert!(closing.await.expect("join").is_ok(), "failure reported twice");
	}
}

#[tokio::test]
async fn unobserved_failures_aggregate_without_fail_fast() {
	let tracker = CompletionTracker::new();
	let scope = OperationScope::root("build");
	let (a, a_done) = pending("a");
	let (b, b_done) = pending("b");
	let (c, c_done) = pending("c");
	for f in [a, b, c.clone()] {
		tracker.register(&scope, f);
	}
	fail(&a_done, "first");
	succeed(&b_done);
	fail(&c_done, "third");

	let err = tracker.await_all(&scope).await.expect_err("two failures");
	let WorkError::Aggregate(agg) = err else {
		panic!("expected aggregate");
	};
	assert_eq!(agg.message(), MULTIPLE_FAILURES);
	let messages: Vec<String> = agg.causes().iter().map(ToString::to_string).collect();
	assert_eq!(
		messages,
		[
			"A failure occurred while executing a: first".to_string(),
			"A failure occurred while executing c: third".to_string()
		]
	);
	assert!(c.is_observed());
}

#[tokio::test]
async fn observed_failure_is_not_reported_at_scope_close() {
	let tracker = CompletionTracker::new();
	let scope = OperationScope::root("build");
	let (future, done) = pending("checked");
	tracker.register(&scope, future.clone());
	fail(&done, "nope");

	assert!(future.get().await.is_err());
	assert!(tracker.await_all(&scope).await.is_ok());
}

#[tokio::test]
async fn single_unobserved_failure_uses_singular_message() {
	let tracker = CompletionTracker::new();
	let scope = OperationScope::root("build");
	let (future, done) = pending("lonely");
	tracker.register(&scope, future);
	fail(&done, "nope");

	match tracker.await_all(&scope).await {
		Err(WorkError::Aggregate(agg)) => {
			assert_eq!(agg.message(), SINGLE_FAILURE);
			assert_eq!(agg.causes().len(), 1);
		}
		other => panic!("unexpected result: {other:?}"),
	}
}

#[tokio::test]
async fn child_scope_is_awaited_separately() {
	let tracker = CompletionTracker::new();
	let parent = OperationScope::root("build");
	let child = parent.child("task");
	let (in_child, child_done) = pending("child-work");
	let (in_parent, parent_done) = pending("parent-work");
	tracker.register(&child, in_child);
	tracker.register(&parent, in_parent);
	succeed(&parent_done);

	assert!(tracker.await_all(&parent).await.is_ok());
	assert!(tracker.has_uncompleted_work(&child));

	fail(&child_done, "child failed");
	assert!(!tracker.has_uncompleted_work(&child));
	assert!(tracker.await_all(&child).await.is_err());
	assert_eq!(tracker.registered(&child), 0);
}

#[tokio::test]
async fn cancelled_unobserved_unit_contributes_to_aggregate() {
	let tracker = CompletionTracker::new();
	let scope = OperationScope::root("build");
	let (future, _done) = pending("cancelled");
	tracker.register(&scope, future.clone());
	assert!(future.cancel());

	let err = tracker.await_all(&scope).await.expect_err("cancellation surfaces");
	let WorkError::Aggregate(agg) = err else {
		panic!("expected aggregate");
	};
	assert!(agg.causes()[0].is_cancelled());
}

#[tokio::test]
async fn closing_unknown_scope_is_a_no_op() {
	let tracker = CompletionTracker::new();
	assert!(tracker.await_all(&OperationScope::root("empty")).await.is_ok());
}
