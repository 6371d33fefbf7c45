//! End-to-end mapper behavior under a deterministic host.

use std::cell::Cell;
use std::rc::Rc;

use idlemap_core::{
    lazy_map, lazy_map_with, try_lazy_map, try_lazy_map_with, BatchPolicy, RunPhase,
};
use idlemap_testing::{poll_once, TestHost};

#[test]
fn maps_in_input_order() {
    let host = TestHost::new();
    let handle = host.handle();
    let source: Vec<i32> = (0..100).collect();
    let expected: Vec<i32> = source.iter().map(|value| value * 3).collect();

    let future = lazy_map(&handle, "triple", source, |item, _, _| item * 3);

    assert_eq!(host.settle(future), expected);
}

#[test]
fn batch_size_never_changes_the_output() {
    let host = TestHost::new();
    let handle = host.handle();
    let expected: Vec<i32> = (0..50).map(|value| value * 7).collect();

    for batch_size in [1, 7, 24, 50, 64] {
        let future = lazy_map_with(
            &handle,
            "resize",
            (0..50).collect::<Vec<i32>>(),
            BatchPolicy::new(batch_size),
            |item, _, _| item * 7,
        );
        assert_eq!(host.settle(future), expected, "batch size {batch_size}");
    }
}

#[test]
fn transform_sees_index_and_full_source() {
    let host = TestHost::new();
    let handle = host.handle();
    let source = vec![10u32, 20, 30];

    let future = lazy_map_with(
        &handle,
        "context",
        source,
        BatchPolicy::new(2),
        |item, index, all| (index, *item, all.len()),
    );

    assert_eq!(
        host.settle(future),
        vec![(0, 10, 3), (1, 20, 3), (2, 30, 3)]
    );
}

#[test]
fn empty_input_resolves_immediately() {
    let host = TestHost::new();
    let handle = host.handle();

    let future = lazy_map(&handle, "empty", Vec::<i32>::new(), |item, _, _| *item);

    assert!(future.is_resolved());
    assert!(!handle.needs_grant());
    assert_eq!(host.idle_requests(), 0);
    assert_eq!(host.settle(future), Vec::<i32>::new());
}

#[test]
fn empty_input_still_supersedes_a_scheduled_run() {
    let host = TestHost::new();
    let handle = host.handle();
    let first_calls = Rc::new(Cell::new(0));

    let counter = Rc::clone(&first_calls);
    let mut first = lazy_map(&handle, "refresh", vec![1, 2, 3], move |item, _, _| {
        counter.set(counter.get() + 1);
        item * 2
    });
    let empty = lazy_map(&handle, "refresh", Vec::<i32>::new(), |item, _, _| *item);

    assert_eq!(host.settle(empty), Vec::<i32>::new());
    assert_eq!(host.grants_until_idle(), 0);
    assert!(poll_once(&mut first).is_pending());
    assert_eq!(first_calls.get(), 0);
    assert_eq!(handle.run_records("refresh")[0].phase, RunPhase::Superseded);
}

#[test]
fn five_items_batch_two_suspend_per_batch() {
    let host = TestHost::new();
    let handle = host.handle();
    let calls = Rc::new(Cell::new(0));

    let counter = Rc::clone(&calls);
    let mut future = lazy_map_with(
        &handle,
        "double",
        vec![1, 2, 3, 4, 5],
        BatchPolicy::new(2),
        move |item, _, _| {
            counter.set(counter.get() + 1);
            item * 2
        },
    );

    assert!(poll_once(&mut future).is_pending());
    host.grant();
    assert_eq!(calls.get(), 0, "starter grant maps nothing");
    host.grant();
    assert_eq!(calls.get(), 2);
    host.grant();
    assert_eq!(calls.get(), 4);
    host.grant();
    assert_eq!(calls.get(), 5);
    assert!(future.is_resolved());
    assert_eq!(host.settle(future), vec![2, 4, 6, 8, 10]);
}

#[test]
fn default_policy_maps_twenty_four_items_per_grant() {
    let host = TestHost::new();
    let handle = host.handle();
    let calls = Rc::new(Cell::new(0));

    let counter = Rc::clone(&calls);
    let future = lazy_map(
        &handle,
        "bulk",
        (0..30).collect::<Vec<i32>>(),
        move |item, _, _| {
            counter.set(counter.get() + 1);
            *item
        },
    );

    host.grant();
    host.grant();
    assert_eq!(calls.get(), 24);
    assert_eq!(host.grants_until_idle(), 1);
    assert_eq!(calls.get(), 30);
    assert_eq!(host.settle(future).len(), 30);
}

#[test]
fn newer_call_supersedes_a_scheduled_run() {
    let host = TestHost::new();
    let handle = host.handle();
    let first_calls = Rc::new(Cell::new(0));

    let counter = Rc::clone(&first_calls);
    let mut first = lazy_map(&handle, "latest", vec![1, 2, 3], move |item, _, _| {
        counter.set(counter.get() + 1);
        item + 1
    });
    let second = lazy_map(&handle, "latest", vec![10, 20], |item, _, _| item + 1);

    assert_eq!(host.settle(second), vec![11, 21]);
    assert!(poll_once(&mut first).is_pending());
    assert_eq!(first_calls.get(), 0);

    let records = handle.run_records("latest");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].phase, RunPhase::Superseded);
    assert_eq!(records[1].phase, RunPhase::Finished);
}

#[test]
fn independent_keys_never_interfere() {
    let host = TestHost::new();
    let handle = host.handle();

    let first = lazy_map(&handle, "a", vec![1, 2, 3], |item, _, _| item * 10);
    let second = lazy_map(&handle, "b", vec![4, 5], |item, _, _| item * 10);

    assert_eq!(host.settle(first), vec![10, 20, 30]);
    assert_eq!(host.settle(second), vec![40, 50]);
    assert_eq!(handle.run_records("a").len(), 1);
    assert_eq!(handle.run_records("b").len(), 1);
}

#[test]
fn same_key_call_mid_run_starts_a_second_run() {
    let host = TestHost::new();
    let handle = host.handle();

    let first = lazy_map_with(
        &handle,
        "overlap",
        (0..6).collect::<Vec<i32>>(),
        BatchPolicy::new(1),
        |item, _, _| item * 2,
    );
    host.grant();
    let second = lazy_map_with(
        &handle,
        "overlap",
        vec![100, 200],
        BatchPolicy::new(1),
        |item, _, _| item * 2,
    );

    // The first run already started, so the second does not cancel it;
    // both execute to completion.
    assert_eq!(host.settle(first), vec![0, 2, 4, 6, 8, 10]);
    assert_eq!(host.settle(second), vec![200, 400]);

    let records = handle.run_records("overlap");
    assert_eq!(records.len(), 2);
    assert!(records
        .iter()
        .all(|record| record.phase == RunPhase::Finished));
}

#[test]
fn try_map_returns_all_results_on_success() {
    let host = TestHost::new();
    let handle = host.handle();

    let future = try_lazy_map(&handle, "checked", vec![2u32, 4, 6], |item, _, _| {
        Ok::<_, &str>(item / 2)
    });

    assert_eq!(host.settle(future), Ok(vec![1, 2, 3]));
}

#[test]
fn try_map_stops_at_the_first_failure() {
    let host = TestHost::new();
    let handle = host.handle();
    let calls = Rc::new(Cell::new(0));

    let counter = Rc::clone(&calls);
    let future = try_lazy_map_with(
        &handle,
        "checked",
        (0..10).collect::<Vec<i32>>(),
        BatchPolicy::new(2),
        move |item, index, _| {
            counter.set(counter.get() + 1);
            if index == 3 {
                Err("bad item")
            } else {
                Ok(item * 2)
            }
        },
    );

    let error = host.settle(future).unwrap_err();
    assert_eq!(error.index(), 3);
    assert_eq!(*error.inner(), "bad item");
    assert_eq!(calls.get(), 4, "items after the failure are never visited");
    assert_eq!(host.grants_until_idle(), 0, "remaining batches are abandoned");
}

#[test]
fn registry_records_follow_the_run_lifecycle() {
    let host = TestHost::new();
    let handle = host.handle();

    let future = lazy_map(&handle, "lifecycle", vec![1, 2], |item, _, _| *item);
    let scheduled = handle.pending_run("lifecycle").expect("starter pending");
    assert_eq!(handle.run_records("lifecycle")[0].phase, RunPhase::Scheduled);

    host.grant();
    assert_eq!(handle.run_records("lifecycle")[0].phase, RunPhase::Running);
    assert!(handle.pending_run("lifecycle").is_none());

    host.grants_until_idle();
    let records = handle.run_records("lifecycle");
    assert_eq!(records[0].idle_id, scheduled);
    assert_eq!(records[0].phase, RunPhase::Finished);
    assert!(future.is_resolved());
}

#[test]
fn cancelling_the_pending_starter_prevents_the_run() {
    let host = TestHost::new();
    let handle = host.handle();

    let mut future = lazy_map(&handle, "cancelled", vec![1, 2, 3], |item, _, _| *item);
    let starter = handle.pending_run("cancelled").expect("starter pending");
    handle.cancel_idle_callback(starter);

    assert_eq!(host.grants_until_idle(), 0);
    assert!(poll_once(&mut future).is_pending());
}

#[test]
fn registration_pings_the_scheduler() {
    let host = TestHost::new();
    let handle = host.handle();

    let _future = lazy_map(&handle, "ping", vec![1], |item, _, _| *item);

    assert!(host.idle_requests() >= 1);
}

#[test]
fn dead_runtime_leaves_future_unresolved() {
    let host = TestHost::new();
    let handle = host.handle();
    drop(host);

    let mut future = lazy_map(&handle, "orphan", vec![1, 2], |item, _, _| *item);
    assert!(poll_once(&mut future).is_pending());

    // Empty input never needs the runtime, so it still resolves.
    let empty = lazy_map(&handle, "orphan", Vec::<i32>::new(), |item, _, _| *item);
    assert!(empty.is_resolved());
}
