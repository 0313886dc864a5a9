use core::fmt::{self, Debug, Formatter};
use std::{
    collections::BTreeMap,
    sync::{Arc, Weak},
};
use tracing::{debug, error, info_span};

use crate::{
    any::Instance,
    config::Config,
    context::Source,
    declaration::Declaration,
    errors::{BuildErrorKind, ResolveErrorKind},
    extension,
    inject::Inject,
    lifecycle::{ServiceManager, Services},
    lookup::Lookup,
    mutable::MutableEnvironment,
    registry::{Declare, EnvironmentContext, Module},
    resolver::{resolver_of, Resolver},
    Identifier, Qualifier,
};

pub(crate) struct EnvironmentInner {
    context: EnvironmentContext,
    resolvers: BTreeMap<Identifier, Box<dyn Resolver>>,
    meta: Option<Environment>,
    this: Weak<EnvironmentInner>,
}

impl Source for EnvironmentInner {
    fn lookup(&self, identifier: &Identifier, requester: Option<&Identifier>) -> Result<Option<Instance>, ResolveErrorKind> {
        match self.resolvers.get(identifier) {
            Some(resolver) => resolver.resolve(self, requester).map(Some),
            None => {
                debug!(%identifier, "Resolver not found");
                Ok(None)
            }
        }
    }

    fn downgrade(&self) -> Weak<dyn Source> {
        self.this.clone()
    }

    fn memoizes_injections(&self) -> bool {
        true
    }
}

/// Built environment: every component is created on its first resolution and kept for the environment lifetime.
///
/// Cloning is cheap, clones share the components.
#[derive(Clone)]
pub struct Environment {
    pub(crate) inner: Arc<EnvironmentInner>,
}

impl Environment {
    #[inline]
    #[must_use]
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::new()
    }

    #[must_use]
    pub(crate) fn new(context: EnvironmentContext, meta: Option<Environment>) -> Self {
        let resolvers = context
            .declarations()
            .iter()
            .map(|declaration| (declaration.identifier.clone(), resolver_of(declaration)))
            .collect();

        Self {
            inner: Arc::new_cyclic(|this| EnvironmentInner {
                context,
                resolvers,
                meta,
                this: this.clone(),
            }),
        }
    }

    /// Creates a lazy handle to the unqualified `T`. Nothing is resolved until the handle is read.
    #[inline]
    #[must_use]
    pub fn inject<T>(&self) -> Inject<T>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.inject_by(Identifier::of::<T>())
    }

    #[inline]
    #[must_use]
    pub fn inject_qualified<T>(&self, qualifier: impl Into<Qualifier>) -> Inject<T>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.inject_by(Identifier::qualified::<T>(qualifier))
    }

    #[inline]
    #[must_use]
    pub fn inject_by<T>(&self, identifier: Identifier) -> Inject<T>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Inject::new(&*self.inner, identifier, None)
    }

    /// Identifiers the component at `identifier` needed so far.
    /// A canonical component reports what its factory requested, an alias reports its target.
    /// A handle created by the factory counts as soon as it's created, even if it's never read.
    ///
    /// # Errors
    /// - Returns [`ResolveErrorKind::ComponentNotFound`] if nothing is declared at `identifier`
    /// - Returns [`ResolveErrorKind::Internal`] if an alias doesn't report exactly its target
    pub fn requirements(&self, identifier: &Identifier) -> Result<Vec<Identifier>, ResolveErrorKind> {
        let Some(resolver) = self.inner.resolvers.get(identifier) else {
            let err = ResolveErrorKind::ComponentNotFound {
                identifier: identifier.clone(),
            };
            error!("{}", err);
            return Err(err);
        };

        let requirements = resolver.requirements();
        if resolver.is_alias() && requirements.len() != 1 {
            let err = ResolveErrorKind::Internal {
                message: format!("alias {} reports {} requirements", resolver.identifier(), requirements.len()),
            };
            error!("{}", err);
            return Err(err);
        }
        Ok(requirements)
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

    /// Lifecycle operations over the services declared in this environment.
    ///
    /// # Errors
    /// - Returns [`ResolveErrorKind::NotExtensible`] if the environment was built without a meta tier
    /// - Returns [`ResolveErrorKind::ExtensionNotInstalled`] if no [`ServiceManager`] is declared in the meta tier
    pub fn services(&self) -> Result<Services<'_>, ResolveErrorKind> {
        let manager = ServiceManager::installed_in(self.meta()?)?;
        Ok(Services::new(manager, &*self.inner))
    }

    #[inline]
    #[must_use]
    pub fn is_extensible(&self) -> bool {
        self.inner.meta.is_some()
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.inner.context.contains(identifier)
    }

    #[inline]
    pub fn identifiers(&self) -> impl Iterator<Item = &Identifier> {
        self.inner.context.identifiers()
    }

    #[inline]
    #[must_use]
    pub fn context(&self) -> &EnvironmentContext {
        &self.inner.context
    }
}

impl Lookup for Environment {
    fn lookup_erased(&self, identifier: &Identifier) -> Result<Option<Instance>, ResolveErrorKind> {
        let span = info_span!("get", %identifier);
        let _guard = span.enter();

        self.inner.lookup(identifier, None)
    }
}

impl Debug for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("declarations", &self.inner.context.len())
            .field("extensible", &self.is_extensible())
            .finish_non_exhaustive()
    }
}

/// Collects main and meta declarations, then builds them in one pass.
#[derive(Debug, Clone)]
pub struct EnvironmentBuilder {
    config: Config,
    main: Module,
    meta: Module,
}

impl Default for EnvironmentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvironmentBuilder {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    #[inline]
    #[must_use]
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            main: Module::new("main"),
            meta: Module::new("meta"),
        }
    }

    #[inline]
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Runs `action` against the meta declarations.
    ///
    /// # Errors
    /// - Returns [`BuildErrorKind::NotExtensible`] if the config isn't extensible
    /// - Returns the error of `action`
    pub fn meta<F>(&mut self, action: F) -> Result<&mut Self, BuildErrorKind>
    where
        F: FnOnce(&mut Module) -> Result<(), BuildErrorKind>,
    {
        if !self.config.extensible {
            let err = BuildErrorKind::NotExtensible;
            error!("{}", err);
            return Err(err);
        }

        action(&mut self.meta)?;
        Ok(self)
    }

    /// Declares the [`ServiceManager`] in the meta tier, which enables [`Environment::services`].
    ///
    /// # Errors
    /// Returns the errors of [`EnvironmentBuilder::meta`], including a duplicate if it's already installed.
    pub fn install_services(&mut self) -> Result<&mut Self, BuildErrorKind> {
        self.meta(|meta| meta.declare(ServiceManager::declaration()).map(|_| ()))
    }

    /// Builds the meta environment, hands the main declarations to its processors, then builds the main environment.
    ///
    /// # Errors
    /// - Returns [`BuildErrorKind::InvalidDeclaration`] for malformed declarations
    /// - Returns [`BuildErrorKind::Resolve`] if a meta processor failed to construct
    pub fn build(self) -> Result<Environment, BuildErrorKind> {
        let (context, meta) = extension::build_tiers(&self.config, self.main.into_declarations(), self.meta.into_declarations())?;
        Ok(Environment::new(context, meta))
    }

    /// Builds the unsafe, mutable environment meant for tests.
    ///
    /// # Errors
    /// - Returns [`BuildErrorKind::FeatureDisabled`] unless `Config::unstable.mutable_environment` is set
    /// - Returns the errors of [`EnvironmentBuilder::build`]
    /// - Returns [`BuildErrorKind::Resolve`] if an eager factory failed
    pub fn build_mutable(self) -> Result<MutableEnvironment, BuildErrorKind> {
        if !self.config.unstable.mutable_environment {
            let err = BuildErrorKind::FeatureDisabled {
                feature: "mutable_environment",
            };
            error!("{}", err);
            return Err(err);
        }

        let (context, meta) = extension::build_tiers(&self.config, self.main.into_declarations(), self.meta.into_declarations())?;
        MutableEnvironment::new(context, meta)
    }
}

impl Declare for EnvironmentBuilder {
    fn declare(&mut self, declaration: Declaration) -> Result<&mut Self, BuildErrorKind> {
        self.main.declare(declaration)?;
        Ok(self)
    }
}
