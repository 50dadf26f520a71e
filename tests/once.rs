#![allow(missing_docs)]

use std::sync::{
    atomic::{AtomicU32, Ordering},
    mpsc, Arc, Mutex,
};
use std::time::Duration;
use workgraph::{
    error::{SelfDependencyError, UnresolvedError},
    once::{once_func, Once},
    types::{Outcome, SharedError},
    worker::{spawn_worker, Worker},
};

#[test]
fn concurrent_callers_share_one_execution() {
    let once = Arc::new(Once::<String>::new());
    let calls = Arc::new(AtomicU32::new(0));
    let (done_tx, done_rx) = mpsc::channel();

    for _ in 0..2 {
        let once = Arc::clone(&once);
        let calls = Arc::clone(&calls);
        let done = done_tx.clone();
        spawn_worker(&[], move |worker| {
            let outcome = once.call(&worker, move |_inner| {
                calls.fetch_add(1, Ordering::Relaxed);
                ("Hello, world!".to_owned(), None)
            });
            done.send(outcome).unwrap();
        });
    }

    for _ in 0..2 {
        let (value, error) = done_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("caller did not finish");
        assert_eq!(value, "Hello, world!");
        assert!(error.is_none(), "unexpected error: {error:?}");
    }
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[test]
fn nested_call_is_a_self_dependency() {
    let once = Arc::new(Once::<String>::new());
    let main_worker = Worker::new(&[]);

    let nested = Arc::clone(&once);
    let (value, error) = once.call(&main_worker, move |worker| {
        nested.call(worker, |_| {
            // Only the first call on an instance runs its function.
            unreachable!("inner function was called")
        })
    });

    assert_eq!(value, String::default());
    let error = error.expect("want a self-dependency error, got success");
    let self_dep = error
        .downcast_ref::<SelfDependencyError>()
        .unwrap_or_else(|| panic!("wrong error type: {error}"));
    let request_id = once.request_id().expect("the first call opened a request");
    assert_eq!(self_dep.request_ids, vec![request_id]);
}

#[test]
fn once_func_memoizes_value_and_error() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let get_result = once_func(move |_worker: &Worker| {
        counter.fetch_add(1, Ordering::Relaxed);
        let error: SharedError = Arc::new(std::io::Error::other("expected failure"));
        ("hello".to_owned(), Some(error))
    });

    let (value1, error1) = get_result(&Worker::new(&[]));
    assert_eq!(value1, "hello");
    assert_eq!(error1.expect("want an error").to_string(), "expected failure");

    let (value2, error2) = get_result(&Worker::new(&[]));
    assert_eq!(value2, "hello");
    assert_eq!(error2.expect("want an error").to_string(), "expected failure");

    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[test]
fn once_func_self_recursion_is_detected() {
    // The function calls itself through the slot immediately, which must
    // surface as a self-dependency rather than as infinite recursion.
    type Greeting = Arc<dyn Fn(&Worker) -> Outcome<String> + Send + Sync>;
    let slot: Arc<Mutex<Option<Greeting>>> = Arc::new(Mutex::new(None));

    let reentry = Arc::clone(&slot);
    let get_result = once_func(move |worker: &Worker| {
        let target = reentry
            .lock()
            .unwrap()
            .clone()
            .expect("recursion target installed before the first call");
        (&*target)(worker)
    });
    *slot.lock().unwrap() = Some(Arc::new(get_result.clone()));

    let (value, error) = get_result(&Worker::new(&[]));

    assert_eq!(value, String::default());
    let error = error.expect("want a self-dependency error, got success");
    let self_dep = error
        .downcast_ref::<SelfDependencyError>()
        .unwrap_or_else(|| panic!("wrong error type: {error}"));
    assert_eq!(self_dep.request_ids.len(), 1);
}

#[test]
fn panicking_function_fails_callers_instead_of_hanging() {
    let once = Once::<String>::new();
    let main_worker = Worker::new(&[]);

    // The spawned worker unwinds before reporting, so its handle is dropped
    // and the internal request must fail.
    let (value, error) = once.call(&main_worker, |_worker| panic!("outcome never produced"));

    assert_eq!(value, String::default());
    let error = error.expect("want an unresolved error, got success");
    let unresolved = error
        .downcast_ref::<UnresolvedError>()
        .unwrap_or_else(|| panic!("wrong error type: {error}"));
    assert_eq!(
        unresolved.request_id,
        once.request_id().expect("the call opened a request")
    );
}
