//! Scheduler behaviour: bounded parallelism, dynamic enrollment, deferred
//! failures and completion order

mod common;

use common::sh;
use pexec::future::{
    CallError, Deferred, FutureIterator, FutureKey, FutureProxy, MethodCallFuture, Step,
};
use pexec::subprocess::{ExecCommand, ExecError, ExecFuture, ExecOutput};
use std::cell::Cell;
use std::collections::HashSet;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// A child that records how many marked siblings are alive while it runs
fn counting_child(markers: &TempDir) -> ExecFuture {
    let script = r#"touch "$MARKERS/$$"; ls "$MARKERS" | wc -l; sleep 0.2; rm -f "$MARKERS/$$""#;
    ExecFuture::new(
        ExecCommand::new("sh")
            .args(["-c", script])
            .env("MARKERS", &markers.path().to_string_lossy())
            .build(),
    )
}

#[test]
fn test_parallelism_never_exceeds_limit() {
    for limit in 1..=3 {
        let markers = TempDir::new().unwrap();
        let futures: Vec<_> = (0..6).map(|_| counting_child(&markers)).collect();
        let mut iter = FutureIterator::with_limit(futures, limit).unwrap();

        let mut keys = HashSet::new();
        let mut max_seen = 0;
        while let Some(mut future) = iter.next() {
            assert!(iter.active_count() <= limit);
            assert!(keys.insert(future.key().clone()), "future yielded twice");

            let output = future.resolve().unwrap();
            let seen: usize = output.stdout_lossy().trim().parse().unwrap();
            max_seen = max_seen.max(seen);
        }

        assert_eq!(keys.len(), 6);
        assert!(
            max_seen <= limit,
            "saw {} concurrent children with limit {}",
            max_seen,
            limit
        );
    }
}

#[test]
fn test_backlog_drains_as_slots_free() {
    let futures: Vec<_> = (0..7).map(|_| sh("sleep 0.05")).collect();
    let mut iter = FutureIterator::new(futures).unwrap().limit(3);
    assert_eq!(iter.backlog_len(), 7);
    assert_eq!(iter.active_count(), 0);

    let mut yielded = 0;
    while let Some(_future) = iter.next() {
        yielded += 1;
        assert!(iter.active_count() <= 2);
        assert_eq!(iter.active_count() + iter.backlog_len() + yielded, 7);
    }
    assert_eq!(yielded, 7);
}

#[test]
fn test_futures_added_while_iterating_are_yielded() {
    let mut iter = FutureIterator::new(vec![sh("echo first")]).unwrap().limit(2);

    let mut outputs = Vec::new();
    let mut added = false;
    while let Some(mut future) = iter.next() {
        if !added {
            iter.add_future(sh("echo second")).unwrap();
            added = true;
        }
        outputs.push(future.resolve().unwrap().stdout_lossy());
    }

    assert_eq!(outputs, vec!["first\n", "second\n"]);
}

#[test]
fn test_failures_surface_only_on_resolve() {
    let failing: MethodCallFuture<i64, CallError> =
        MethodCallFuture::new(|| Err(CallError::new("bad input")));
    let mut iter = FutureIterator::new(vec![failing]).unwrap();
    let mut future = iter.next().expect("failing call is still yielded");
    assert_eq!(future.resolve(), Err(CallError::new("bad input")));

    let futures = vec![
        sh("exit 7"),
        ExecFuture::new(ExecCommand::new("pexec-test-no-such-binary").build()),
    ];
    let mut failures = 0;
    for mut future in FutureIterator::new(futures).unwrap() {
        assert!(future.resolve().is_err());
        failures += 1;
    }
    assert_eq!(failures, 2);
}

#[test]
fn test_resolve_replays_without_rerunning() {
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let mut future = MethodCallFuture::new(move || {
        counter.set(counter.get() + 1);
        Ok::<_, CallError>(42)
    });
    assert_eq!(future.resolve(), Ok(42));
    assert_eq!(future.resolve(), Ok(42));
    assert_eq!(calls.get(), 1);

    let dir = TempDir::new().unwrap();
    let log = dir.path().join("runs.log");
    let mut future = sh(&format!("echo run >> '{}'; exit 3", log.display()));
    let first = future.resolve().unwrap_err();
    let second = future.resolve().unwrap_err();
    assert_eq!(first.to_string(), second.to_string());
    assert_eq!(std::fs::read_to_string(&log).unwrap(), "run\n");
}

#[test]
fn test_variadic_adapter_arity() {
    let sum = |args: &[i32]| Ok::<_, CallError>(args.iter().sum::<i32>());
    let futures = vec![
        MethodCallFuture::call(sum, vec![1, 2, 3]),
        MethodCallFuture::call(sum, vec![]),
    ];

    let mut results = FutureIterator::new(futures)
        .unwrap()
        .map(|mut future| future.resolve().unwrap())
        .collect::<Vec<_>>();
    results.sort();
    assert_eq!(results, vec![0, 6]);
}

#[test]
fn test_results_arrive_in_completion_order() {
    let mut slow = sh("sleep 0.5");
    slow.set_key(FutureKey::new("slow")).unwrap();
    let mut fast = sh("true");
    fast.set_key(FutureKey::new("fast")).unwrap();

    let order: Vec<String> = FutureIterator::new(vec![slow, fast])
        .unwrap()
        .map(|future| future.key().to_string())
        .collect();
    assert_eq!(order, vec!["fast", "slow"]);
}

#[test]
fn test_in_process_calls_do_not_wait_on_processes() {
    type Job = Box<dyn Deferred<Output = String, Error = String>>;

    let slow: Job = Box::new(FutureProxy::new(
        sh("sleep 5; echo slow"),
        |outcome: Result<ExecOutput, ExecError>| {
            outcome
                .map(|output| output.stdout_lossy())
                .map_err(|e| e.to_string())
        },
    ));
    let quick: Job = Box::new(FutureProxy::new(
        MethodCallFuture::new(|| Ok::<_, CallError>("quick".to_string())),
        |outcome: Result<String, CallError>| outcome.map_err(|e| e.to_string()),
    ));

    let started = Instant::now();
    let mut iter = FutureIterator::new(vec![slow, quick]).unwrap();
    let mut first = iter.next().unwrap();
    assert_eq!(first.resolve(), Ok("quick".to_string()));
    assert!(started.elapsed() < Duration::from_secs(2));
    // Dropping the iterator abandons the sleeper
}

#[test]
fn test_update_interval_returns_timeout_steps() {
    let mut iter = FutureIterator::new(vec![sh("sleep 5")]).unwrap();
    iter.set_update_interval(Some(Duration::from_millis(50)));

    let started = Instant::now();
    assert!(matches!(iter.next_step(), Step::Timeout));
    assert!(matches!(iter.next_step(), Step::Timeout));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(iter.active_count(), 1);
}

#[test]
fn test_stand_alone_resolve_uses_private_iterator() {
    let started = Instant::now();
    let output = sh("sleep 0.1; echo done").resolve().unwrap();
    assert_eq!(output.stdout_lossy(), "done\n");
    assert!(started.elapsed() >= Duration::from_millis(100));
}
