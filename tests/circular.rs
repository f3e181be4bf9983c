use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tessera_di::{keys, key_of_type, BoxError, DiError, Resolver, ServiceCollection};

struct A;
struct B;
struct C;

#[tokio::test]
async fn two_node_cycle_reports_path() {
    let mut sc = ServiceCollection::new();
    sc.add_transient_factory::<A, _>(keys![B], |_| Ok(A));
    sc.add_transient_factory::<B, _>(keys![A], |_| Ok(B));
    let sp = sc.build();

    match sp.get::<A>().await {
        Err(DiError::Circular(path)) => {
            assert_eq!(path, vec![key_of_type::<A>(), key_of_type::<B>(), key_of_type::<A>()]);
        }
        other => panic!("expected Circular, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn cycle_is_detected_before_any_factory_runs() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut sc = ServiceCollection::new();

    let counter = calls.clone();
    sc.add_singleton_factory::<A, _>(keys![B], move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(A)
    });
    let counter = calls.clone();
    sc.add_singleton_factory::<B, _>(keys![C], move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(B)
    });
    let counter = calls.clone();
    sc.add_singleton_factory::<C, _>(keys![A], move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(C)
    });
    let sp = sc.build();

    let error = sp.get::<B>().await.err().unwrap();
    assert!(matches!(
        &error,
        DiError::Circular(path)
            if *path == vec![key_of_type::<B>(), key_of_type::<C>(), key_of_type::<A>(), key_of_type::<B>()]
    ));
    assert_eq!(error.to_string(), format!(
        "Circular dependency: {} -> {} -> {} -> {}",
        key_of_type::<B>(),
        key_of_type::<C>(),
        key_of_type::<A>(),
        key_of_type::<B>()
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(sp.singleton_count(), 0);
}

#[tokio::test]
async fn self_dependency_is_a_cycle() {
    let mut sc = ServiceCollection::new();
    sc.add_scoped_factory::<A, _>(keys![A], |_| Ok(A));
    let sp = sc.build();
    let scope = sp.create_scope();

    assert!(matches!(
        scope.get::<A>().await,
        Err(DiError::Circular(path)) if path == vec![key_of_type::<A>(), key_of_type::<A>()]
    ));
    scope.close().await.unwrap();
}

#[tokio::test]
async fn lazy_resolution_back_into_an_ancestor_is_a_cycle() {
    let mut sc = ServiceCollection::new();
    sc.add_transient_factory::<A, _>(keys![B], |_| Ok(A));
    sc.add_transient_async::<B, _, _>(keys![], |deps| async move {
        // A is still being built further up the chain
        deps.resolver().get::<A>().await?;
        Ok::<_, BoxError>(B)
    });
    let sp = sc.build();

    match sp.get::<A>().await {
        Err(DiError::Circular(path)) => {
            assert_eq!(path, vec![key_of_type::<A>(), key_of_type::<B>(), key_of_type::<A>()]);
        }
        other => panic!("expected Circular, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn diamond_is_not_a_cycle() {
    struct D;

    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();

    let mut sc = ServiceCollection::new();
    sc.add_transient_factory::<D, _>(keys![], move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(D)
    });
    sc.add_transient_factory::<B, _>(keys![D], |_| Ok(B));
    sc.add_transient_factory::<C, _>(keys![D], |_| Ok(C));
    sc.add_transient_factory::<A, _>(keys![B, C], |_| Ok(A));
    let sp = sc.build();

    sp.get::<A>().await.unwrap();
    assert_eq!(built.load(Ordering::SeqCst), 1);
}
