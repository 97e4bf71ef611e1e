//! Propagation across threads with built-in and third-party providers

use std::sync::{Arc, Barrier};
use std::thread;
use threadctx_core::providers::class_resolution::{self, ClassResolutionScope};
use threadctx_core::providers::naming::{self, NamingScope};
use threadctx_core::providers::security::{self, Principal};
use threadctx_core::providers::transaction::{self, TransactionId};
use threadctx_core::{ContextError, ContextPolicy, ContextServiceDefinition, ContextType, TaskError};
use threadctx_integration_tests::{context_a, context_b, registry, service, set_third_party, third_party};
use threadctx_spi::int_context::INT_CONTEXT;
use threadctx_spi::string_context::STRING_CONTEXT;

#[derive(Debug, Clone, PartialEq)]
struct Observed {
    int: i32,
    string: String,
    component: Option<String>,
    loader: String,
    principal: Option<String>,
    transaction: Option<TransactionId>,
}

fn observe() -> Observed {
    let (int, string) = third_party();
    Observed {
        int,
        string,
        component: naming::current().map(|s| s.component().to_string()),
        loader: class_resolution::current().loader().to_string(),
        principal: security::current_principal().map(|p| p.name().to_string()),
        transaction: transaction::current(),
    }
}

fn in_application<R>(f: impl FnOnce() -> R) -> R {
    naming::run_in_scope(NamingScope::new("orders").with_binding("env/queue", "orders-q"), || {
        class_resolution::run_in_scope(
            ClassResolutionScope::new("orders-app").with_class("OrderHandler"),
            f,
        )
    })
}

/// Run `f` on a fresh worker thread that has its own third-party values
fn on_worker<R: Send + 'static>(f: impl FnOnce() -> R + Send + 'static) -> R {
    thread::Builder::new()
        .name("propagation-worker".into())
        .spawn(move || {
            set_third_party(0, "worker-default");
            f()
        })
        .unwrap()
        .join()
        .unwrap()
}

#[test]
fn test_context_a_policies_on_worker() {
    let svc = service(&context_a()).unwrap();

    set_third_party(42, "secret");
    let task = in_application(|| {
        security::run_as(Principal::new("submitter"), || {
            let _tx = transaction::begin();
            svc.contextualize(observe).unwrap()
        })
    });

    let (during, worker_tx, after) = on_worker(move || {
        security::run_as(Principal::new("worker"), || {
            let tx = transaction::begin();
            let during = task.call().unwrap();
            (during, tx.id(), observe())
        })
    });

    // Application and IntContext propagated
    assert_eq!(during.int, 42);
    assert_eq!(during.component.as_deref(), Some("orders"));
    assert_eq!(during.loader, "orders-app");
    // StringContext cleared
    assert_eq!(during.string, "");
    // Security and Transaction left as the worker had them
    assert_eq!(during.principal.as_deref(), Some("worker"));
    assert_eq!(during.transaction, Some(worker_tx));

    // Worker state restored afterwards
    assert_eq!(after.int, 0);
    assert_eq!(after.string, "worker-default");
    assert_eq!(after.component, None);
    assert_eq!(after.loader, class_resolution::SYSTEM_LOADER);
    assert_eq!(after.principal.as_deref(), Some("worker"));
    assert_eq!(after.transaction, Some(worker_tx));
}

#[test]
fn test_context_b_scopes_third_party_differently() {
    let b = service(&context_b()).unwrap();

    set_third_party(7, "shared");
    let task = b.contextualize(third_party).unwrap();

    let (during, after) = on_worker(move || (task.call().unwrap(), third_party()));
    // IntContext unchanged, StringContext propagated via Remaining
    assert_eq!(during, (0, "shared".to_string()));
    assert_eq!(after, (0, "worker-default".to_string()));
}

#[test]
fn test_resolved_policies_of_both_definitions() {
    let a = service(&context_a()).unwrap();
    let expected_a = [
        (ContextType::NAMING, ContextPolicy::Propagated),
        (ContextType::CLASS_RESOLUTION, ContextPolicy::Propagated),
        (ContextType::SECURITY, ContextPolicy::Unchanged),
        (ContextType::TRANSACTION, ContextPolicy::Unchanged),
        (INT_CONTEXT, ContextPolicy::Propagated),
        (STRING_CONTEXT, ContextPolicy::Cleared),
    ];
    for (context_type, policy) in expected_a {
        assert_eq!(a.policy().get(&context_type), Some(policy), "{}", context_type);
    }

    let b = service(&context_b()).unwrap();
    assert_eq!(b.policy().get(&INT_CONTEXT), Some(ContextPolicy::Unchanged));
    assert_eq!(b.policy().get(&STRING_CONTEXT), Some(ContextPolicy::Propagated));
    assert_eq!(b.policy().get(&ContextType::TRANSACTION), Some(ContextPolicy::Propagated));
}

#[test]
fn test_default_service_clears_transaction_only() {
    let svc = service(&ContextServiceDefinition::default()).unwrap();

    set_third_party(5, "five");
    let task = security::run_as(Principal::new("operator"), || {
        let _tx = transaction::begin();
        svc.contextualize(observe).unwrap()
    });

    let during = on_worker(move || {
        let _worker_tx = transaction::begin();
        task.call().unwrap()
    });
    assert_eq!(during.int, 5);
    assert_eq!(during.string, "five");
    assert_eq!(during.principal.as_deref(), Some("operator"));
    assert_eq!(during.transaction, None);
}

#[test]
fn test_work_error_resurfaces_and_state_is_restored() {
    let svc = service(&context_a()).unwrap();
    set_third_party(9, "nine");
    let task = svc
        .contextualize(|| -> Result<(), String> { Err(format!("failed with {}", third_party().0)) })
        .unwrap();

    let (outcome, after) = on_worker(move || (task.try_call(), third_party()));
    match outcome {
        Err(TaskError::Work(message)) => assert_eq!(message, "failed with 9"),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(after, (0, "worker-default".to_string()));
}

#[test]
fn test_panicking_work_resumes_after_restore() {
    let svc = service(&context_b()).unwrap();
    set_third_party(1, "propagated");
    let task = svc
        .contextualize(|| {
            assert_eq!(third_party().1, "propagated");
            panic!("work blew up");
        })
        .unwrap();

    let after = on_worker(move || {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| task.call::<()>()));
        assert!(outcome.is_err());
        third_party()
    });
    assert_eq!(after, (0, "worker-default".to_string()));
}

#[test]
fn test_nested_invocations_across_services() {
    let a = service(&context_a()).unwrap();
    let b = service(&context_b()).unwrap();

    set_third_party(11, "outer");
    let inner = b.contextualize(third_party).unwrap();

    set_third_party(22, "middle");
    let outer = a
        .contextualize(move || {
            let before = third_party();
            let nested = inner.call().unwrap();
            (before, nested, third_party())
        })
        .unwrap();

    let ((before, nested, after_nested), after) = on_worker(move || (outer.call().unwrap(), third_party()));
    assert_eq!(before, (22, String::new()));
    // B leaves IntContext as the outer task set it and propagates its own string
    assert_eq!(nested, (22, "outer".to_string()));
    assert_eq!(after_nested, (22, String::new()));
    assert_eq!(after, (0, "worker-default".to_string()));
}

#[test]
fn test_one_capture_shared_by_many_threads() {
    let svc = service(&context_a()).unwrap();
    set_third_party(100, "ignored");
    let task = Arc::new(svc.contextualize(|| third_party().0).unwrap());

    const WORKERS: usize = 8;
    let barrier = Arc::new(Barrier::new(WORKERS));
    let handles: Vec<_> = (0..WORKERS)
        .map(|i| {
            let task = Arc::clone(&task);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                set_third_party(i as i32, "own");
                barrier.wait();
                let seen = task.call().unwrap();
                (seen, third_party())
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let (seen, after) = handle.join().unwrap();
        assert_eq!(seen, 100);
        assert_eq!(after, (i as i32, "own".to_string()));
    }
}

#[test]
fn test_conflicting_definition_rejected_before_capture() {
    let definition = ContextServiceDefinition::new("app/Broken")
        .with_propagated(["IntContext"])
        .with_cleared(["IntContext"]);
    assert!(matches!(
        service(&definition),
        Err(ContextError::ConflictingPolicy { category }) if category == "IntContext"
    ));
}

#[test]
fn test_registry_lists_builtins_before_third_party() {
    let registry = registry().unwrap();
    let names: Vec<_> = registry.context_types().map(|t| t.as_str().to_string()).collect();
    assert_eq!(
        names,
        vec!["Naming", "ClassResolution", "Security", "Transaction", "IntContext", "StringContext"]
    );
}
