//! Property-based tests for scope finalizer ordering.

use std::sync::{Arc, Mutex};

use millrace::scope::{Scope, ScopeExit};
use proptest::prelude::*;

fn register_all(scope: &Scope, count: usize, log: &Arc<Mutex<Vec<usize>>>) {
    for i in 0..count {
        let log = log.clone();
        scope
            .add_finalizer(move |_| async move {
                log.lock().unwrap().push(i);
                Ok::<_, std::io::Error>(())
            })
            .unwrap();
    }
}

proptest! {
    #[test]
    fn prop_finalizers_run_newest_first(count in 0usize..64) {
        let scope = Scope::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        register_all(&scope, count, &log);

        futures::executor::block_on(scope.close(ScopeExit::Success)).unwrap();

        let expected: Vec<usize> = (0..count).rev().collect();
        prop_assert_eq!(log.lock().unwrap().clone(), expected);
    }

    #[test]
    fn prop_failing_finalizers_do_not_skip_others(
        count in 1usize..32,
        failing in prop::collection::btree_set(0usize..32, 0..8),
    ) {
        let scope = Scope::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..count {
            let log = log.clone();
            let fails = failing.contains(&i);
            scope
                .add_finalizer(move |_| async move {
                    log.lock().unwrap().push(i);
                    if fails {
                        Err(std::io::Error::other(format!("finalizer {} failed", i)))
                    } else {
                        Ok(())
                    }
                })
                .unwrap();
        }

        let result = futures::executor::block_on(scope.close(ScopeExit::Failure));

        let expected_failures = failing.iter().filter(|i| **i < count).count();
        match result {
            Ok(()) => prop_assert_eq!(expected_failures, 0),
            Err(errors) => prop_assert_eq!(errors.len(), expected_failures),
        }
        let expected: Vec<usize> = (0..count).rev().collect();
        prop_assert_eq!(log.lock().unwrap().clone(), expected);
    }

    #[test]
    fn prop_child_scope_closes_in_lifo_position(before in 0usize..16, after in 0usize..16) {
        let parent = Scope::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        register_all(&parent, before, &log);

        let child = parent.fork().unwrap();
        let child_log = log.clone();
        child
            .add_finalizer(move |_| async move {
                child_log.lock().unwrap().push(usize::MAX);
                Ok::<_, std::io::Error>(())
            })
            .unwrap();

        for i in before..before + after {
            let log = log.clone();
            parent
                .add_finalizer(move |_| async move {
                    log.lock().unwrap().push(i);
                    Ok::<_, std::io::Error>(())
                })
                .unwrap();
        }

        futures::executor::block_on(parent.close(ScopeExit::Success)).unwrap();

        let mut expected: Vec<usize> = (before..before + after).rev().collect();
        expected.push(usize::MAX);
        expected.extend((0..before).rev());
        prop_assert_eq!(log.lock().unwrap().clone(), expected);
        prop_assert!(child.is_closed());
    }

    #[test]
    fn prop_close_is_idempotent(count in 0usize..16) {
        let scope = Scope::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        register_all(&scope, count, &log);

        futures::executor::block_on(scope.close(ScopeExit::Interrupted)).unwrap();
        futures::executor::block_on(scope.close(ScopeExit::Interrupted)).unwrap();

        prop_assert_eq!(log.lock().unwrap().len(), count);
        let rejected = scope
            .add_finalizer(|_| async { Ok::<_, std::io::Error>(()) })
            .is_err();
        prop_assert!(rejected);
    }
}
