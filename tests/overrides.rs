use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tessera_di::{key_of_trait, key_of_type, keys, Implementation, Lifetime, Resolver, ServiceCollection};

trait Mailer: Send + Sync {
    fn name(&self) -> &'static str;
}

struct Smtp;
impl Mailer for Smtp {
    fn name(&self) -> &'static str {
        "smtp"
    }
}

struct Fake;
impl Mailer for Fake {
    fn name(&self) -> &'static str {
        "fake"
    }
}

struct Notifier {
    mailer: Arc<dyn Mailer>,
}

fn services() -> ServiceCollection {
    let mut sc = ServiceCollection::new();
    sc.add_singleton_trait(Arc::new(Smtp) as Arc<dyn Mailer>);
    sc.add_transient_factory::<Notifier, _>(vec![key_of_trait::<dyn Mailer>()], |deps| {
        Ok(Notifier {
            mailer: deps.get_trait::<dyn Mailer>()?,
        })
    });
    sc
}

#[tokio::test]
async fn override_is_visible_only_in_its_session() {
    let sp = services().build();
    let overridden = sp.create_scope();
    let plain = sp.create_scope();

    let _guard = overridden.override_trait(Arc::new(Fake) as Arc<dyn Mailer>);

    assert_eq!(overridden.get::<Notifier>().await.unwrap().mailer.name(), "fake");
    assert_eq!(plain.get::<Notifier>().await.unwrap().mailer.name(), "smtp");
    assert_eq!(sp.get::<Notifier>().await.unwrap().mailer.name(), "smtp");

    overridden.close().await.unwrap();
    plain.close().await.unwrap();

    let fresh = sp.create_scope();
    assert_eq!(fresh.get::<Notifier>().await.unwrap().mailer.name(), "smtp");
    fresh.close().await.unwrap();
}

#[tokio::test]
async fn dropping_the_guard_restores_the_binding() {
    let sp = services().build();
    let scope = sp.create_scope();

    let guard = scope.override_trait(Arc::new(Fake) as Arc<dyn Mailer>);
    assert!(guard.is_active());
    assert_eq!(scope.get_trait::<dyn Mailer>().await.unwrap().name(), "fake");

    drop(guard);
    assert_eq!(scope.get_trait::<dyn Mailer>().await.unwrap().name(), "smtp");
    scope.close().await.unwrap();
}

#[tokio::test]
async fn closing_the_session_removes_its_overrides() {
    let sp = services().build();
    let scope = sp.create_scope();
    let guard = scope.override_instance(5u8);
    assert!(guard.is_active());

    scope.close().await.unwrap();
    assert!(!guard.is_active());
}

#[tokio::test]
async fn newest_override_wins_and_stacks_unwind() {
    let sp = ServiceCollection::new().build();
    let scope = sp.create_scope();

    let outer = scope.override_instance(1u32);
    let inner = scope.override_instance(2u32);
    assert_eq!(*scope.get::<u32>().await.unwrap(), 2);

    inner.release();
    assert_eq!(*scope.get::<u32>().await.unwrap(), 1);

    drop(outer);
    assert!(scope.get::<u32>().await.is_err());
    scope.close().await.unwrap();
}

#[tokio::test]
async fn child_scope_sees_parent_overrides() {
    let sp = services().build();
    let parent = sp.create_scope();
    let _guard = parent.override_trait(Arc::new(Fake) as Arc<dyn Mailer>);

    let child = parent.create_child();
    assert_eq!(child.get::<Notifier>().await.unwrap().mailer.name(), "fake");

    let _child_guard = child.override_trait(Arc::new(Smtp) as Arc<dyn Mailer>);
    assert_eq!(child.get::<Notifier>().await.unwrap().mailer.name(), "smtp");

    child.close().await.unwrap();
    parent.close().await.unwrap();
}

#[tokio::test]
async fn override_shadows_a_live_singleton_without_touching_it() {
    struct Clock(u64);

    let mut sc = ServiceCollection::new();
    sc.add_singleton_factory::<Clock, _>(keys![], |_| Ok(Clock(1)));
    let sp = sc.build();

    let real = sp.get::<Clock>().await.unwrap();
    let scope = sp.create_scope();
    let guard = scope.with_override(
        key_of_type::<Clock>(),
        Lifetime::Singleton,
        Implementation::factory::<Clock, _>(keys![], |_| Ok(Clock(2))),
    );

    let first = scope.get::<Clock>().await.unwrap();
    let second = scope.get::<Clock>().await.unwrap();
    assert_eq!(first.0, 2);
    assert!(Arc::ptr_eq(&first, &second));

    drop(guard);
    let restored = scope.get::<Clock>().await.unwrap();
    assert!(Arc::ptr_eq(&real, &restored));
    scope.close().await.unwrap();
}

#[tokio::test]
async fn ambient_override_applies_to_every_session() {
    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();

    let sp = services().build();
    let guard = sp.with_override(
        key_of_trait::<dyn Mailer>(),
        Lifetime::Transient,
        Implementation::trait_factory::<dyn Mailer, _>(keys![], move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Fake) as Arc<dyn Mailer>)
        }),
    );

    let scope = sp.create_scope();
    assert_eq!(scope.get::<Notifier>().await.unwrap().mailer.name(), "fake");
    assert_eq!(sp.get::<Notifier>().await.unwrap().mailer.name(), "fake");
    assert_eq!(built.load(Ordering::SeqCst), 2);

    drop(guard);
    assert_eq!(sp.get::<Notifier>().await.unwrap().mailer.name(), "smtp");
    scope.close().await.unwrap();
}

fn singleton_notifier() -> ServiceCollection {
    let mut sc = ServiceCollection::new();
    sc.add_singleton_trait(Arc::new(Smtp) as Arc<dyn Mailer>);
    sc.add_singleton_factory::<Notifier, _>(vec![key_of_trait::<dyn Mailer>()], |deps| {
        Ok(Notifier {
            mailer: deps.get_trait::<dyn Mailer>()?,
        })
    });
    sc
}

#[tokio::test]
async fn singleton_built_on_an_override_does_not_outlive_it() {
    let sp = singleton_notifier().build();
    let session = sp.create_scope();
    let guard = session.override_trait(Arc::new(Fake) as Arc<dyn Mailer>);

    let first = session.get::<Notifier>().await.unwrap();
    let second = session.get::<Notifier>().await.unwrap();
    assert_eq!(first.mailer.name(), "fake");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(sp.singleton_count(), 0);

    let plan = sp.plan(&key_of_type::<Notifier>(), Some(&session)).unwrap();
    assert_eq!(plan.len(), 1);
    assert!(plan.root().unwrap().depends_on_override());

    drop(guard);
    session.close().await.unwrap();

    let fresh = sp.create_scope();
    assert_eq!(fresh.get::<Notifier>().await.unwrap().mailer.name(), "smtp");
    assert_eq!(sp.get::<Notifier>().await.unwrap().mailer.name(), "smtp");
    fresh.close().await.unwrap();
}

#[tokio::test]
async fn live_singleton_is_rebuilt_for_a_session_overriding_its_dependency() {
    let sp = singleton_notifier().build();
    let real = sp.get::<Notifier>().await.unwrap();

    let session = sp.create_scope();
    let other = sp.create_scope();
    let _guard = session.override_trait(Arc::new(Fake) as Arc<dyn Mailer>);

    assert_eq!(session.get::<Notifier>().await.unwrap().mailer.name(), "fake");
    assert!(Arc::ptr_eq(&real, &other.get::<Notifier>().await.unwrap()));
    assert!(Arc::ptr_eq(&real, &sp.get::<Notifier>().await.unwrap()));

    session.close().await.unwrap();
    other.close().await.unwrap();
}

#[tokio::test]
async fn unrelated_live_singletons_stay_cache_hits_under_an_override() {
    struct Tick;
    struct Clock;

    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = ticks.clone();
    let mut sc = singleton_notifier();
    sc.add_transient_factory::<Tick, _>(keys![], move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Tick)
    });
    sc.add_singleton_factory::<Clock, _>(keys![Tick], |_| Ok(Clock));
    let sp = sc.build();

    let clock = sp.get::<Clock>().await.unwrap();
    let session = sp.create_scope();
    let _guard = session.override_trait(Arc::new(Fake) as Arc<dyn Mailer>);

    let plan = sp.plan(&key_of_type::<Clock>(), Some(&session)).unwrap();
    assert_eq!(plan.keys(), vec![&key_of_type::<Clock>()]);
    assert!(!plan.root().unwrap().depends_on_override());
    assert!(Arc::ptr_eq(&clock, &session.get::<Clock>().await.unwrap()));
    assert_eq!(ticks.load(Ordering::SeqCst), 1);

    session.close().await.unwrap();
}

#[tokio::test]
async fn child_sessions_share_singletons_built_on_a_parent_override() {
    let sp = singleton_notifier().build();
    let parent = sp.create_scope();
    let _guard = parent.override_trait(Arc::new(Fake) as Arc<dyn Mailer>);

    let child = parent.create_child();
    let from_child = child.get::<Notifier>().await.unwrap();
    child.close().await.unwrap();

    let from_parent = parent.get::<Notifier>().await.unwrap();
    assert!(Arc::ptr_eq(&from_child, &from_parent));
    assert_eq!(from_parent.mailer.name(), "fake");
    parent.close().await.unwrap();
}
