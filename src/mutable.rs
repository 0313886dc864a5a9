use core::fmt::{self, Debug, Formatter};
use parking_lot::RwLock;
use std::{
    collections::BTreeMap,
    sync::{Arc, Weak},
};
use tracing::{debug, error, info, info_span, warn};

use crate::{
    any::Instance,
    context::Source,
    declaration::{Declaration, Provider},
    environment::Environment,
    errors::{BuildErrorKind, ResolveErrorKind},
    inject::Inject,
    lifecycle::{ServiceManager, Services},
    lookup::Lookup,
    registry::{validate, EnvironmentContext},
    resolver::{instantiate, resolver_of, Resolver as _},
    Identifier, Qualifier,
};

pub(crate) struct MutableInner {
    declarations: RwLock<BTreeMap<Identifier, Declaration>>,
    instances: RwLock<BTreeMap<Identifier, Instance>>,
    meta: Option<Environment>,
    this: Weak<MutableInner>,
}

impl Source for MutableInner {
    fn lookup(&self, identifier: &Identifier, requester: Option<&Identifier>) -> Result<Option<Instance>, ResolveErrorKind> {
        if let Some(instance) = self.instances.read().get(identifier) {
            debug!("Found live instance");
            return Ok(Some(instance.clone()));
        }

        // Locks are released before any factory runs, factories may read this environment
        let Some(declaration) = self.declarations.read().get(identifier).cloned() else {
            return Ok(None);
        };

        match &declaration.provider {
            Provider::Factory(instantiator) => {
                let instance = instantiate(self, identifier, instantiator, requester, None)?;
                let instance = self.instances.write().entry(identifier.clone()).or_insert(instance).clone();
                Ok(Some(instance))
            }
            Provider::Alias { .. } => resolver_of(&declaration).resolve(self, requester).map(Some),
        }
    }

    fn downgrade(&self) -> Weak<dyn Source> {
        self.this.clone()
    }

    fn memoizes_injections(&self) -> bool {
        false
    }
}

/// Unsafe environment for tests.
///
/// Components are created eagerly when the environment is built, declarations can be replaced afterwards
/// and injection handles re-resolve against the live components on every read, so a replaced component
/// is observed by every handle pointing to it.
///
/// # Warning
/// Nothing guarantees a factory runs once under concurrent access. Don't use it outside tests.
#[derive(Clone)]
pub struct MutableEnvironment {
    inner: Arc<MutableInner>,
}

impl MutableEnvironment {
    pub(crate) fn new(context: EnvironmentContext, meta: Option<Environment>) -> Result<Self, BuildErrorKind> {
        let span = info_span!("build_mutable");
        let _guard = span.enter();

        warn!("Mutable environment built, components aren't cached for injection handles");

        let declarations = context
            .declarations()
            .iter()
            .map(|declaration| (declaration.identifier.clone(), declaration.clone()))
            .collect();
        let environment = Self {
            inner: Arc::new_cyclic(|this| MutableInner {
                declarations: RwLock::new(declarations),
                instances: RwLock::new(BTreeMap::new()),
                meta,
                this: this.clone(),
            }),
        };

        for declaration in context.declarations() {
            if declaration.alias_target().is_none() {
                environment.inner.lookup(&declaration.identifier, None)?;
            }
        }

        info!(declarations = context.len(), "Components created");

        Ok(environment)
    }

    /// Declares a component after construction, replacing any declaration and instance at the same identifier.
    /// Factories run right away.
    ///
    /// # Errors
    /// - Returns [`BuildErrorKind::InvalidDeclaration`] for malformed declarations
    /// - Returns [`BuildErrorKind::Resolve`] if the factory failed. The previous component is gone in that case
    pub fn declare(&self, declaration: Declaration) -> Result<&Self, BuildErrorKind> {
        validate(&declaration)?;

        let identifier = declaration.identifier.clone();
        let is_alias = declaration.alias_target().is_some();

        if self.inner.declarations.write().insert(identifier.clone(), declaration).is_some() {
            debug!(%identifier, "Declaration replaced");
        }
        self.inner.instances.write().remove(&identifier);

        if !is_alias {
            if let Err(err) = self.inner.lookup(&identifier, None) {
                error!("{}", err);
                return Err(err.into());
            }
        }
        Ok(self)
    }

    /// Creates a handle that resolves the unqualified `T` against the live components on every read.
    #[inline]
    #[must_use]
    pub fn inject<T>(&self) -> Inject<T>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Inject::new(&*self.inner, Identifier::of::<T>(), None)
    }

    #[inline]
    #[must_use]
    pub fn inject_qualified<T>(&self, qualifier: impl Into<Qualifier>) -> Inject<T>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Inject::new(&*self.inner, Identifier::qualified::<T>(qualifier), None)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.inner.declarations.read().contains_key(identifier)
    }

    /// # Errors
    /// Returns [`ResolveErrorKind::NotExtensible`] if the environment was built without a meta tier.
    pub fn meta(&self) -> Result<&Environment, ResolveErrorKind> {
        self.inner.meta.as_ref().ok_or_else(|| {
            let err = ResolveErrorKind::NotExtensible;
            error!("{}", err);
            err
        })
    }

    /// Lifecycle operations over the services declared when the environment was built.
    /// Services declared later aren't managed.
    ///
    /// # Errors
    /// The same as [`Environment::services`].
    pub fn services(&self) -> Result<Services<'_>, ResolveErrorKind> {
        let manager = ServiceManager::installed_in(self.meta()?)?;
        Ok(Services::new(manager, &*self.inner))
    }
}

impl Lookup for MutableEnvironment {
    fn lookup_erased(&self, identifier: &Identifier) -> Result<Option<Instance>, ResolveErrorKind> {
        let span = info_span!("get", %identifier);
        let _guard = span.enter();

        self.inner.lookup(identifier, None)
    }
}

impl Debug for MutableEnvironment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableEnvironment")
            .field("declarations", &self.inner.declarations.read().len())
            .field("instances", &self.inner.instances.read().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        config::{Config, UnstableFeatures},
        declaration::Declaration,
        environment::EnvironmentBuilder,
        errors::BuildErrorKind,
        inject::Inject,
        registry::Declare as _,
        Lookup as _,
    };

    use std::sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    };
    use tracing_test::traced_test;

    fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::with_config(Config {
            unstable: UnstableFeatures { mutable_environment: true },
            ..Config::default()
        })
    }

    struct Clock(u64);

    struct Scheduler {
        clock: Inject<Clock>,
    }

    #[test]
    #[traced_test]
    fn test_eager_creation() {
        let calls = Arc::new(AtomicU8::new(0));

        let mut builder = builder();
        builder
            .provide({
                let calls = calls.clone();
                move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Clock(1))
                }
            })
            .unwrap();
        let environment = builder.build_mutable().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(environment.get::<Clock>().unwrap().0, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[traced_test]
    fn test_replace_is_observed_by_handles() {
        let mut builder = builder();
        builder
            .provide(|_| Ok(Clock(1)))
            .unwrap()
            .provide(|context| Ok(Scheduler { clock: context.inject() }))
            .unwrap();
        let environment = builder.build_mutable().unwrap();

        let scheduler = environment.get::<Scheduler>().unwrap();
        assert_eq!(scheduler.clock.get().unwrap().0, 1);

        environment.declare(Declaration::component(|_| Ok(Clock(2)))).unwrap();

        assert_eq!(scheduler.clock.get().unwrap().0, 2);
        assert!(!scheduler.clock.is_resolved());
        assert_eq!(environment.get::<Clock>().unwrap().0, 2);
    }

    #[test]
    #[traced_test]
    fn test_declare_new_component() {
        let environment = builder().build_mutable().unwrap();
        assert!(environment.get_or_none::<Clock>().unwrap().is_none());

        environment.declare(Declaration::instance(Clock(3))).unwrap();
        assert_eq!(environment.get::<Clock>().unwrap().0, 3);
    }

    #[test]
    #[traced_test]
    fn test_alias_follows_replaced_target() {
        let mut builder = builder();
        builder
            .provide_qualified("system", |_| Ok(Clock(1)))
            .unwrap()
            .declare(Declaration::alias_of::<Clock>("system"))
            .unwrap();
        let environment = builder.build_mutable().unwrap();

        assert_eq!(environment.get::<Clock>().unwrap().0, 1);

        environment.declare(Declaration::component(|_| Ok(Clock(5))).qualified("system")).unwrap();
        assert_eq!(environment.get::<Clock>().unwrap().0, 5);
    }

    #[test]
    #[traced_test]
    fn test_failed_eager_factory() {
        let mut builder = builder();
        builder
            .provide::<Clock, _>(|_| Err(anyhow::anyhow!("no clock").into()))
            .unwrap();

        assert!(matches!(builder.build_mutable(), Err(BuildErrorKind::Resolve(_))));
    }
}
