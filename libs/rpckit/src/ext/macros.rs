/// Builds a `const`-evaluable [`ExtensionRegistration`](crate::ext::ExtensionRegistration).
///
/// ```ignore
/// pub const RANDOM: ExtensionRegistration = rpckit::extension! {
///     capability: dyn LoadBalancer,
///     alias: "random",
///     scope: Singleton,
///     constructor: RandomBalancer::create,
///     order: 10,
/// };
/// ```
///
/// The constructor must have the signature
/// `fn(&<dyn Cap as Capability>::Args) -> anyhow::Result<Arc<dyn Cap>>`.
#[macro_export]
macro_rules! extension {
    (
        capability: $cap:ty,
        alias: $alias:expr,
        scope: $scope:ident,
        constructor: $ctor:path
        $(, order: $order:expr)?
        $(,)?
    ) => {{
        fn __rpckit_construct(
            args: &(dyn ::std::any::Any + ::std::marker::Send + ::std::marker::Sync),
        ) -> ::std::result::Result<$crate::ext::ErasedInstance, $crate::ext::ConstructError> {
            $crate::ext::erase::<$cap>(args, $ctor)
        }

        $crate::ext::ExtensionRegistration {
            capability: $crate::ext::CapabilityKey::of::<$cap>,
            alias: $alias,
            scope: $crate::ext::Scope::$scope,
            order: $crate::extension!(@order $($order)?),
            construct: __rpckit_construct,
        }
    }};
    (@order) => {
        0
    };
    (@order $order:expr) => {
        $order
    };
}

/// Submits an extension to the compiled-in registration table.
///
/// Accepts either a path to an `ExtensionRegistration` constant or the same
/// keyword form as [`extension!`](crate::extension):
///
/// ```ignore
/// rpckit::register_extension!(RANDOM);
///
/// rpckit::register_extension! {
///     capability: dyn LoadBalancer,
///     alias: "round_robin",
///     scope: Singleton,
///     constructor: RoundRobin::create,
/// }
/// ```
#[macro_export]
macro_rules! register_extension {
    (capability: $($rest:tt)*) => {
        $crate::inventory::submit! {
            $crate::extension!(capability: $($rest)*)
        }
    };
    ($registration:path) => {
        $crate::inventory::submit! {
            $registration
        }
    };
}
