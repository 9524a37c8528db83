#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Scope and failure semantics of `ExtensionLoader`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use rpckit::ext::{
    Capability, Catalog, ExtensionError, ExtensionLoaderFactory, ExtensionRegistration, Scope,
    StaticSource,
};

trait Setter: Send + Sync {
    fn id(&self) -> usize;
}

impl Capability for dyn Setter {
    const NAME: &'static str = "setter";
    type Args = ();
}

struct Numbered(usize);

impl Setter for Numbered {
    fn id(&self) -> usize {
        self.0
    }
}

static SHARED_BUILDS: AtomicUsize = AtomicUsize::new(0);

fn shared(_: &()) -> anyhow::Result<Arc<dyn Setter>> {
    let n = SHARED_BUILDS.fetch_add(1, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(30));
    Ok(Arc::new(Numbered(n)))
}

static FRESH_BUILDS: AtomicUsize = AtomicUsize::new(0);

#[allow(clippy::unnecessary_wraps)]
fn fresh(_: &()) -> anyhow::Result<Arc<dyn Setter>> {
    Ok(Arc::new(Numbered(FRESH_BUILDS.fetch_add(1, Ordering::SeqCst))))
}

static FLAKY_BUILDS: AtomicUsize = AtomicUsize::new(0);

fn flaky(_: &()) -> anyhow::Result<Arc<dyn Setter>> {
    let n = FLAKY_BUILDS.fetch_add(1, Ordering::SeqCst);
    if n == 0 {
        anyhow::bail!("backend not ready");
    }
    Ok(Arc::new(Numbered(n)))
}

static GATED_ENTERED: AtomicBool = AtomicBool::new(false);
static GATED_RELEASE: AtomicBool = AtomicBool::new(false);
static GATED_BUILDS: AtomicUsize = AtomicUsize::new(0);

fn gated(_: &()) -> anyhow::Result<Arc<dyn Setter>> {
    GATED_BUILDS.fetch_add(1, Ordering::SeqCst);
    GATED_ENTERED.store(true, Ordering::SeqCst);
    while !GATED_RELEASE.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(1));
    }
    anyhow::bail!("gate refused")
}

const SHARED: ExtensionRegistration = rpckit::extension! {
    capability: dyn Setter,
    alias: "shared",
    scope: Singleton,
    constructor: shared,
};

const FRESH: ExtensionRegistration = rpckit::extension! {
    capability: dyn Setter,
    alias: "fresh",
    scope: PerResolution,
    constructor: fresh,
};

const FLAKY: ExtensionRegistration = rpckit::extension! {
    capability: dyn Setter,
    alias: "flaky",
    scope: Singleton,
    constructor: flaky,
};

const GATED: ExtensionRegistration = rpckit::extension! {
    capability: dyn Setter,
    alias: "gated",
    scope: Singleton,
    constructor: gated,
};

fn factory() -> ExtensionLoaderFactory {
    let catalog = Catalog::build(&StaticSource::new([SHARED, FRESH, FLAKY, GATED])).unwrap();
    ExtensionLoaderFactory::new(Arc::new(catalog))
}

#[test]
fn unknown_alias_fails_with_not_found() {
    let loader = factory().get_loader::<dyn Setter>().unwrap();

    let err = loader.get_extension("no-such-setter").err().unwrap();
    match err {
        ExtensionError::NotFound { capability, alias } => {
            assert_eq!(capability, "setter");
            assert_eq!(alias, "no-such-setter");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!loader.has_extension("no-such-setter"));
}

#[test]
fn singleton_is_constructed_once_for_concurrent_callers() {
    let loader = factory().get_loader::<dyn Setter>().unwrap();
    let callers = 16;
    let barrier = Arc::new(Barrier::new(callers));

    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let loader = Arc::clone(&loader);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                loader.get_extension("shared").unwrap()
            })
        })
        .collect();

    let instances: Vec<Arc<dyn Setter>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(SHARED_BUILDS.load(Ordering::SeqCst), 1);
    assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));

    let later = loader.get_extension("shared").unwrap();
    assert!(Arc::ptr_eq(&later, &instances[0]));
}

#[test]
fn per_resolution_yields_distinct_instances() {
    let loader = factory().get_loader::<dyn Setter>().unwrap();

    let a = loader.get_extension("fresh").unwrap();
    let b = loader.get_extension("fresh").unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    assert_ne!(a.id(), b.id());
    assert_eq!(loader.scope_of("fresh"), Some(Scope::PerResolution));
}

#[test]
fn failed_singleton_construction_is_retried_on_next_call() {
    let loader = factory().get_loader::<dyn Setter>().unwrap();

    let err = loader.get_extension("flaky").err().unwrap();
    assert!(matches!(err, ExtensionError::Instantiation { .. }));
    assert!(err.to_string().contains("backend not ready"));

    let first = loader.get_extension("flaky").unwrap();
    let second = loader.get_extension("flaky").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(FLAKY_BUILDS.load(Ordering::SeqCst), 2);
}

#[test]
fn waiters_of_a_failed_construction_share_the_failure() {
    let loader = factory().get_loader::<dyn Setter>().unwrap();

    let leader = {
        let loader = Arc::clone(&loader);
        thread::spawn(move || loader.get_extension("gated").err())
    };
    while !GATED_ENTERED.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(1));
    }

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let loader = Arc::clone(&loader);
            thread::spawn(move || loader.get_extension("gated").err())
        })
        .collect();
    thread::sleep(Duration::from_millis(100));
    GATED_RELEASE.store(true, Ordering::SeqCst);

    let leader_err = leader.join().unwrap().expect("leader must fail");
    for waiter in waiters {
        let err = waiter.join().unwrap().expect("waiter must fail");
        assert_eq!(err.to_string(), leader_err.to_string());
    }
    assert_eq!(GATED_BUILDS.load(Ordering::SeqCst), 1);
}

#[test]
fn aliases_with_equal_order_are_listed_by_name() {
    let loader = factory().get_loader::<dyn Setter>().unwrap();
    assert_eq!(loader.aliases(), ["flaky", "fresh", "gated", "shared"]);
}

trait Router: Send + Sync {
    fn prefix(&self) -> &str;
}

impl Capability for dyn Router {
    const NAME: &'static str = "router";
    type Args = String;
}

struct PrefixRouter(String);

impl Router for PrefixRouter {
    fn prefix(&self) -> &str {
        &self.0
    }
}

#[allow(clippy::unnecessary_wraps, clippy::ptr_arg)]
fn prefix_router(prefix: &String) -> anyhow::Result<Arc<dyn Router>> {
    Ok(Arc::new(PrefixRouter(prefix.clone())))
}

#[test]
fn constructor_arguments_reach_the_implementation() {
    let catalog = Catalog::build(&StaticSource::new([rpckit::extension! {
        capability: dyn Router,
        alias: "prefix",
        scope: PerResolution,
        constructor: prefix_router,
    }]))
    .unwrap();
    let factory = ExtensionLoaderFactory::new(Arc::new(catalog));

    let router = factory
        .get_loader::<dyn Router>()
        .unwrap()
        .get_extension_with("prefix", &"/api".to_owned())
        .unwrap();
    assert_eq!(router.prefix(), "/api");
}
