use super::*;
use crate::error::ErrorCode;
use std::cell::Cell;
use std::rc::Rc;

fn ok_call(value: i64) -> MethodCallFuture<i64, CallError> {
    MethodCallFuture::new(move || Ok(value))
}

#[test]
fn test_generated_keys_are_unique() {
    let a = ok_call(1);
    let b = ok_call(2);
    assert_ne!(a.key(), b.key());
    assert!(a.key().as_str().starts_with("future/"));
}

#[test]
fn test_key_can_be_assigned_once() {
    let mut future = ok_call(1);
    future.set_key(FutureKey::new("first")).unwrap();
    assert_eq!(future.key().as_str(), "first");

    let err = future.set_key(FutureKey::new("second")).unwrap_err();
    assert_eq!(err.code(), ErrorCode::SCHED_KEY_ALREADY_SET);
    assert_eq!(future.key().as_str(), "first");
}

#[test]
fn test_core_lifecycle() {
    let mut core: FutureCore<i32, String> = FutureCore::new("test");
    assert_eq!(core.state(), FutureState::Pending);
    assert!(!core.has_started());

    assert!(core.mark_started());
    assert!(!core.mark_started());
    assert_eq!(core.state(), FutureState::Active);

    core.set_outcome(Ok(7));
    assert_eq!(core.state(), FutureState::Ready);
    assert!(core.state().is_complete());

    // The first outcome is final
    core.set_outcome(Err("late".to_string()));
    assert_eq!(core.resolved(), Ok(7));
    assert_eq!(core.state(), FutureState::Resolved);
}

#[test]
fn test_method_call_runs_lazily_once() {
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let mut future = MethodCallFuture::new(move || {
        counter.set(counter.get() + 1);
        Ok::<_, CallError>("done")
    });

    assert_eq!(calls.get(), 0);
    assert!(future.is_ready());
    assert_eq!(calls.get(), 1);

    assert_eq!(future.resolve(), Ok("done"));
    assert_eq!(future.resolve(), Ok("done"));
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_method_call_failure_is_deferred() {
    let mut future: MethodCallFuture<i64, CallError> =
        MethodCallFuture::new(|| Err(CallError::new("nope")));
    assert!(future.is_ready());
    assert_eq!(future.resolve(), Err(CallError::new("nope")));
    assert_eq!(future.resolve(), Err(CallError::new("nope")));
}

#[test]
fn test_variadic_call() {
    let sum = |args: &[i64]| Ok::<_, CallError>(args.iter().sum::<i64>());
    assert_eq!(MethodCallFuture::call(sum, vec![1, 2, 3]).resolve(), Ok(6));
    assert_eq!(MethodCallFuture::call(sum, Vec::new()).resolve(), Ok(0));
}

#[test]
fn test_proxy_maps_outcome() {
    let mut proxy = FutureProxy::new(ok_call(20), |outcome: Result<i64, CallError>| {
        outcome.map(|n| format!("n={}", n))
    });
    assert_eq!(proxy.resolve(), Ok("n=20".to_string()));
    assert_eq!(proxy.inner().state(), FutureState::Resolved);
}

#[test]
fn test_proxy_can_turn_failure_into_value() {
    let failing: MethodCallFuture<i64, CallError> =
        MethodCallFuture::new(|| Err(CallError::new("missing")));
    let mut proxy = FutureProxy::new(failing, |outcome| {
        Ok::<_, CallError>(outcome.unwrap_or(-1))
    });
    assert_eq!(proxy.resolve(), Ok(-1));
}

#[test]
fn test_iterator_yields_every_future_once() {
    let futures = (0..5).map(ok_call).collect::<Vec<_>>();
    let mut iter = FutureIterator::new(futures).unwrap().limit(2);

    let mut values = Vec::new();
    while let Some(mut future) = iter.next() {
        assert!(iter.active_count() <= 2);
        values.push(future.resolve().unwrap());
    }
    values.sort();
    assert_eq!(values, vec![0, 1, 2, 3, 4]);
    assert!(iter.next().is_none());
}

#[test]
fn test_iterator_ties_go_to_lowest_slot() {
    let futures = (0..3).map(ok_call).collect::<Vec<_>>();
    let order = FutureIterator::new(futures)
        .unwrap()
        .map(|mut future| future.resolve().unwrap())
        .collect::<Vec<_>>();
    assert_eq!(order, vec![0, 1, 2]);
}

#[test]
fn test_iterator_rejects_duplicate_keys() {
    let mut a = ok_call(1);
    a.set_key(FutureKey::new("same")).unwrap();
    let mut b = ok_call(2);
    b.set_key(FutureKey::new("same")).unwrap();

    let err = FutureIterator::new(vec![a, b]).err().unwrap();
    assert_eq!(err.code(), ErrorCode::SCHED_DUPLICATE_KEY);
}

#[test]
fn test_yielded_key_can_be_reused_on_next_step() {
    let mut first = ok_call(1);
    first.set_key(FutureKey::new("job")).unwrap();
    let mut iter = FutureIterator::new(vec![first]).unwrap();

    let yielded = iter.next().unwrap();
    assert_eq!(yielded.key().as_str(), "job");

    let mut again = ok_call(2);
    again.set_key(FutureKey::new("job")).unwrap();
    // Still held by the caller until the next step releases it
    assert!(iter.add_future(again).is_err());
}

#[test]
fn test_add_future_after_exhaustion() {
    let mut iter = FutureIterator::new(vec![ok_call(1)]).unwrap();
    assert_eq!(iter.resolve_all(), 1);
    assert!(iter.next().is_none());

    iter.add_future(ok_call(2)).unwrap();
    assert_eq!(iter.next().map(|mut f| f.resolve()), Some(Ok(2)));
}

#[test]
fn test_empty_iterator() {
    let mut iter: FutureIterator<MethodCallFuture<i64, CallError>> = FutureIterator::empty();
    assert!(iter.is_exhausted());
    assert!(matches!(iter.next_step(), Step::Exhausted));
    assert_eq!(iter.resolve_all(), 0);
}

#[test]
fn test_limit_zero_is_unbounded() {
    let iter = FutureIterator::new(vec![ok_call(1)]).unwrap().limit(0);
    assert_eq!(iter.current_limit(), None);
}

#[test]
fn test_boxed_heterogeneous_futures() {
    type Boxed = Box<dyn Deferred<Output = i64, Error = CallError>>;

    let plain: Boxed = Box::new(ok_call(1));
    let proxied: Boxed = Box::new(FutureProxy::new(ok_call(2), |outcome: Result<i64, CallError>| {
        outcome.map(|n| n * 10)
    }));

    let mut total = 0;
    for mut future in FutureIterator::new(vec![plain, proxied]).unwrap() {
        total += future.resolve().unwrap();
    }
    assert_eq!(total, 21);
}

#[test]
fn test_zero_update_interval_is_none() {
    let mut iter = FutureIterator::new(vec![ok_call(1)]).unwrap();
    iter.set_update_interval(Some(Duration::ZERO));
    assert_eq!(iter.update_interval(), None);

    iter.set_update_interval(Some(Duration::from_millis(5)));
    assert_eq!(iter.update_interval(), Some(Duration::from_millis(5)));
}
