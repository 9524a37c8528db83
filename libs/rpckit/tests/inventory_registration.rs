#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Compiled-in registrations and the process-wide factory.

use std::sync::Arc;

use rpckit::ext::{self, Capability, Catalog, ExtensionError, ExtensionLoaderFactory, StaticSource};

trait Serializer: Send + Sync {
    fn content_type(&self) -> &'static str;
}

impl Capability for dyn Serializer {
    const NAME: &'static str = "serializer";
    type Args = ();
}

struct Hessian;

impl Serializer for Hessian {
    fn content_type(&self) -> &'static str {
        "application/x-hessian"
    }
}

struct Json;

impl Serializer for Json {
    fn content_type(&self) -> &'static str {
        "application/json"
    }
}

#[allow(clippy::unnecessary_wraps)]
fn hessian(_: &()) -> anyhow::Result<Arc<dyn Serializer>> {
    Ok(Arc::new(Hessian))
}

#[allow(clippy::unnecessary_wraps)]
fn json(_: &()) -> anyhow::Result<Arc<dyn Serializer>> {
    Ok(Arc::new(Json))
}

const HESSIAN: rpckit::ExtensionRegistration = rpckit::extension! {
    capability: dyn Serializer,
    alias: "hessian2",
    scope: Singleton,
    constructor: hessian,
    order: 1,
};

rpckit::register_extension!(HESSIAN);

rpckit::register_extension! {
    capability: dyn Serializer,
    alias: "json",
    scope: PerResolution,
    constructor: json,
    order: 2,
}

// One test owns the process-wide factory so parallel tests never race on it.
#[test]
fn global_factory_lifecycle() {
    ExtensionLoaderFactory::reset_global();

    let global = ExtensionLoaderFactory::global().unwrap();
    let loader = global.get_loader::<dyn Serializer>().unwrap();
    assert_eq!(loader.aliases(), ["hessian2", "json"]);

    let a = ext::resolve::<dyn Serializer>("hessian2").unwrap();
    let b = ext::resolve::<dyn Serializer>("hessian2").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.content_type(), "application/x-hessian");

    let x = ext::resolve::<dyn Serializer>("json").unwrap();
    let y = ext::resolve::<dyn Serializer>("json").unwrap();
    assert!(!Arc::ptr_eq(&x, &y));

    let err = ext::resolve::<dyn Serializer>("protobuf").err().unwrap();
    assert!(matches!(err, ExtensionError::NotFound { .. }));

    // An explicitly installed catalog replaces the compiled-in one.
    let only_json = Catalog::build(&StaticSource::new([rpckit::extension! {
        capability: dyn Serializer,
        alias: "json",
        scope: Singleton,
        constructor: json,
    }]))
    .unwrap();
    ExtensionLoaderFactory::install_global(only_json);
    assert!(ext::resolve::<dyn Serializer>("hessian2").is_err());
    let j1 = ext::resolve::<dyn Serializer>("json").unwrap();
    let j2 = ext::resolve::<dyn Serializer>("json").unwrap();
    assert!(Arc::ptr_eq(&j1, &j2));

    // Reset drops cached loaders and singletons; the inventory table is rebuilt.
    ExtensionLoaderFactory::reset_global();
    let rebuilt = ExtensionLoaderFactory::global().unwrap();
    assert!(!Arc::ptr_eq(&global, &rebuilt));
    let c = ext::resolve::<dyn Serializer>("hessian2").unwrap();
    assert!(!Arc::ptr_eq(&a, &c));

    let bootstrapped = ext::bootstrap().unwrap();
    assert!(Arc::ptr_eq(
        &bootstrapped,
        &ExtensionLoaderFactory::global().unwrap()
    ));
}
