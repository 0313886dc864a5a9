use parking_lot::Mutex;
use std::collections::BTreeSet;
use tracing::{debug, error};

use crate::{
    any::Instance,
    context::{Context, Source},
    declaration::{Declaration, Provider},
    errors::ResolveErrorKind,
    instantiator::{BoxedCast, BoxedInstantiator},
    lock::MemoCell,
    Identifier,
};

/// Strategy turning one identifier into an instance.
pub(crate) trait Resolver: Send + Sync {
    fn identifier(&self) -> &Identifier;

    fn resolve(&self, source: &dyn Source, requester: Option<&Identifier>) -> Result<Instance, ResolveErrorKind>;

    /// Identifiers this resolver needed so far. Only filled once the resolver ran, used for introspection.
    fn requirements(&self) -> Vec<Identifier>;

    fn is_alias(&self) -> bool;
}

#[must_use]
pub(crate) fn resolver_of(declaration: &Declaration) -> Box<dyn Resolver> {
    match &declaration.provider {
        Provider::Factory(instantiator) => Box::new(CanonicalResolver::new(declaration.identifier.clone(), instantiator.clone())),
        Provider::Alias { target, cast } => Box::new(AliasResolver {
            identifier: declaration.identifier.clone(),
            target: target.clone(),
            cast: cast.clone(),
        }),
    }
}

/// Runs the factory of `identifier` once, without caching.
pub(crate) fn instantiate(
    source: &dyn Source,
    identifier: &Identifier,
    instantiator: &BoxedInstantiator,
    requester: Option<&Identifier>,
    requirements: Option<&Mutex<BTreeSet<Identifier>>>,
) -> Result<Instance, ResolveErrorKind> {
    let context = Context {
        source,
        identifier,
        requester,
        requirements,
    };

    instantiator(&context).map_err(|source| {
        let err = ResolveErrorKind::Instantiate {
            identifier: identifier.clone(),
            source,
        };
        error!("{}", err);
        err
    })
}

/// Resolver backed by a factory. The instance is created on the first resolution and kept for the environment lifetime.
pub(crate) struct CanonicalResolver {
    identifier: Identifier,
    instantiator: BoxedInstantiator,
    instance: MemoCell<Instance>,
    requirements: Mutex<BTreeSet<Identifier>>,
}

impl CanonicalResolver {
    #[inline]
    #[must_use]
    pub(crate) fn new(identifier: Identifier, instantiator: BoxedInstantiator) -> Self {
        Self {
            identifier,
            instantiator,
            instance: MemoCell::new(),
            requirements: Mutex::new(BTreeSet::new()),
        }
    }
}

impl Resolver for CanonicalResolver {
    fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    fn resolve(&self, source: &dyn Source, requester: Option<&Identifier>) -> Result<Instance, ResolveErrorKind> {
        if let Some(instance) = self.instance.get() {
            debug!("Found in cache");
            return Ok(instance);
        }
        debug!("Not found in cache");

        self.instance.get_or_try_init(|| {
            instantiate(
                source,
                &self.identifier,
                &self.instantiator,
                requester,
                Some(&self.requirements),
            )
        })
    }

    fn requirements(&self) -> Vec<Identifier> {
        self.requirements.lock().iter().cloned().collect()
    }

    fn is_alias(&self) -> bool {
        false
    }
}

/// Resolver forwarding to the resolver of another identifier in the same environment.
pub(crate) struct AliasResolver {
    identifier: Identifier,
    target: Identifier,
    cast: BoxedCast,
}

impl Resolver for AliasResolver {
    fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    fn resolve(&self, source: &dyn Source, requester: Option<&Identifier>) -> Result<Instance, ResolveErrorKind> {
        debug!(target = %self.target, "Forwarding alias");

        let Some(instance) = source.lookup(&self.target, requester)? else {
            let err = ResolveErrorKind::FailedToResolve {
                alias: self.identifier.clone(),
                target: self.target.clone(),
                reason: "target isn't declared",
            };
            error!("{}", err);
            return Err(err);
        };

        (self.cast)(&instance).ok_or_else(|| {
            let err = ResolveErrorKind::FailedToResolve {
                alias: self.identifier.clone(),
                target: self.target.clone(),
                reason: "target instance has an incompatible type",
            };
            error!("{}", err);
            err
        })
    }

    fn requirements(&self) -> Vec<Identifier> {
        vec![self.target.clone()]
    }

    fn is_alias(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::{resolver_of, Resolver};
    use crate::{
        any::{self, Instance},
        context::Source,
        declaration::Declaration,
        errors::ResolveErrorKind,
        Identifier,
    };

    use std::{
        collections::BTreeMap,
        sync::{
            atomic::{AtomicU8, Ordering},
            Arc, Weak,
        },
    };
    use tracing_test::traced_test;

    /// Source over a fixed set of resolvers, without an environment around it.
    struct Resolvers {
        resolvers: BTreeMap<Identifier, Box<dyn Resolver>>,
        this: Weak<Resolvers>,
    }

    impl Resolvers {
        fn new(declarations: Vec<Declaration>) -> Arc<Self> {
            Arc::new_cyclic(|this| Self {
                resolvers: declarations
                    .iter()
                    .map(|declaration| (declaration.identifier.clone(), resolver_of(declaration)))
                    .collect(),
                this: this.clone(),
            })
        }
    }

    impl Source for Resolvers {
        fn lookup(&self, identifier: &Identifier, requester: Option<&Identifier>) -> Result<Option<Instance>, ResolveErrorKind> {
            match self.resolvers.get(identifier) {
                Some(resolver) => resolver.resolve(self, requester).map(Some),
                None => Ok(None),
            }
        }

        fn downgrade(&self) -> Weak<dyn Source> {
            self.this.clone()
        }

        fn memoizes_injections(&self) -> bool {
            true
        }
    }

    struct Request(u8);
    struct Response(u8);

    #[test]
    #[traced_test]
    fn test_canonical_resolves_once() {
        let calls = Arc::new(AtomicU8::new(0));
        let source = Resolvers::new(vec![Declaration::component({
            let calls = calls.clone();
            move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Request(1))
            }
        })]);

        let first = source.lookup(&Identifier::of::<Request>(), None).unwrap().unwrap();
        let second = source.lookup(&Identifier::of::<Request>(), None).unwrap().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(
            &any::downcast::<Request>(&first).unwrap(),
            &any::downcast::<Request>(&second).unwrap()
        ));
        assert!(logs_contain("Found in cache"));
    }

    #[test]
    #[traced_test]
    fn test_canonical_records_requirements() {
        use crate::Lookup as _;

        let source = Resolvers::new(vec![
            Declaration::component(|_| Ok(Request(1))),
            Declaration::component(|context| {
                let request = context.get::<Request>()?;
                Ok(Response(request.0 + 1))
            }),
        ]);

        let response = source.lookup(&Identifier::of::<Response>(), None).unwrap().unwrap();
        assert_eq!(any::downcast::<Response>(&response).unwrap().0, 2);
        assert_eq!(
            source.resolvers[&Identifier::of::<Response>()].requirements(),
            [Identifier::of::<Request>()]
        );
        assert!(source.resolvers[&Identifier::of::<Request>()].requirements().is_empty());
    }

    #[test]
    #[traced_test]
    fn test_failed_factory_isnt_cached() {
        let calls = Arc::new(AtomicU8::new(0));
        let source = Resolvers::new(vec![Declaration::component({
            let calls = calls.clone();
            move |_| {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(anyhow::anyhow!("not ready").into())
                } else {
                    Ok(Request(1))
                }
            }
        })]);

        assert!(matches!(
            source.lookup(&Identifier::of::<Request>(), None),
            Err(ResolveErrorKind::Instantiate { .. })
        ));
        assert!(source.lookup(&Identifier::of::<Request>(), None).unwrap().is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    #[traced_test]
    fn test_alias_missing_target() {
        let source = Resolvers::new(vec![Declaration::alias_of::<Request>("primary").qualified("secondary")]);

        match source.lookup(&Identifier::qualified::<Request>("secondary"), None) {
            Err(ResolveErrorKind::FailedToResolve { alias, target, .. }) => {
                assert_eq!(alias, Identifier::qualified::<Request>("secondary"));
                assert_eq!(target, Identifier::qualified::<Request>("primary"));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let resolver = &source.resolvers[&Identifier::qualified::<Request>("secondary")];
        assert!(resolver.is_alias());
        assert_eq!(resolver.requirements(), [Identifier::qualified::<Request>("primary")]);
    }

    #[test]
    #[traced_test]
    fn test_alias_shares_instance() {
        let source = Resolvers::new(vec![
            Declaration::component(|_| Ok(Request(1))).qualified("primary"),
            Declaration::alias_of::<Request>("primary"),
        ]);

        let alias = source.lookup(&Identifier::of::<Request>(), None).unwrap().unwrap();
        let target = source.lookup(&Identifier::qualified::<Request>("primary"), None).unwrap().unwrap();

        assert!(Arc::ptr_eq(
            &any::downcast::<Request>(&alias).unwrap(),
            &any::downcast::<Request>(&target).unwrap()
        ));
    }
}
