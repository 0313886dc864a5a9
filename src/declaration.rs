use core::fmt::{self, Debug, Formatter};
use std::{borrow::Cow, sync::Arc};

use crate::{
    context::Context,
    errors::InstantiateErrorKind,
    extension::{cast_processor, DeclarationsProcessor, ProcessorCast},
    instantiator::{boxed_cast, boxed_instantiator, BoxedCast, BoxedInstantiator},
    lifecycle::{cast_service, IgnorePolicy, Service, ServiceCast},
    Identifier, Qualifier,
};

/// Opaque marker attached to a declaration. Tags never affect resolution,
/// they are read by declarations processors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Ignore(IgnorePolicy),
    Label(Cow<'static, str>),
}

#[derive(Clone)]
pub(crate) enum Provider {
    Factory(BoxedInstantiator),
    Alias { target: Identifier, cast: BoxedCast },
}

/// Capabilities of the declared type that can't be discovered at runtime, recorded at declaration.
#[derive(Clone, Copy, Default)]
pub(crate) struct Capabilities {
    pub(crate) service: Option<ServiceCast>,
    pub(crate) processor: Option<ProcessorCast>,
}

/// Identifier, factory and tags of a component that isn't materialized yet.
#[derive(Clone)]
pub struct Declaration {
    pub(crate) identifier: Identifier,
    pub(crate) provider: Provider,
    pub(crate) tags: Vec<Tag>,
    pub(crate) capabilities: Capabilities,
}

impl Declaration {
    #[inline]
    #[must_use]
    fn new(identifier: Identifier, provider: Provider) -> Self {
        Self {
            identifier,
            provider,
            tags: Vec::new(),
            capabilities: Capabilities::default(),
        }
    }

    /// Declares the unqualified component produced by `factory`.
    #[inline]
    #[must_use]
    pub fn component<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Context<'_>) -> Result<T, InstantiateErrorKind> + Send + Sync + 'static,
    {
        Self::component_arc(move |context| factory(context).map(Arc::new))
    }

    /// Same as [`Declaration::component`] for factories returning shared values, which also covers unsized `T`.
    #[inline]
    #[must_use]
    pub fn component_arc<T, F>(factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Context<'_>) -> Result<Arc<T>, InstantiateErrorKind> + Send + Sync + 'static,
    {
        Self::new(Identifier::of::<T>(), Provider::Factory(boxed_instantiator(factory)))
    }

    /// Declares a value created outside the environment.
    #[inline]
    #[must_use]
    pub fn instance<T>(value: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        Self::component_arc(crate::instantiator::instance(value))
    }

    /// Declares a component implementing [`Service`], managed by [`crate::ServiceManager`].
    #[inline]
    #[must_use]
    pub fn service<T, F>(factory: F) -> Self
    where
        T: Service,
        F: Fn(&Context<'_>) -> Result<T, InstantiateErrorKind> + Send + Sync + 'static,
    {
        let mut declaration = Self::component(factory);
        declaration.capabilities.service = Some(cast_service::<T>);
        declaration
    }

    /// Declares a meta component that receives the main declarations at build.
    #[inline]
    #[must_use]
    pub fn processor<T, F>(factory: F) -> Self
    where
        T: DeclarationsProcessor,
        F: Fn(&Context<'_>) -> Result<T, InstantiateErrorKind> + Send + Sync + 'static,
    {
        let mut declaration = Self::component(factory);
        declaration.capabilities.processor = Some(cast_processor::<T>);
        declaration
    }

    /// Declares the unqualified `U` as an alias of the `T` declared with `target` qualifier.
    /// `cast` converts the target instance, typically coercing `Arc<Impl>` into `Arc<dyn Trait>`.
    #[inline]
    #[must_use]
    pub fn alias<U, T, C>(target: impl Into<Qualifier>, cast: C) -> Self
    where
        U: ?Sized + Send + Sync + 'static,
        T: ?Sized + Send + Sync + 'static,
        C: Fn(Arc<T>) -> Arc<U> + Send + Sync + 'static,
    {
        Self::new(
            Identifier::of::<U>(),
            Provider::Alias {
                target: Identifier::qualified::<T>(target),
                cast: boxed_cast(cast),
            },
        )
    }

    /// Declares the unqualified `T` as an alias of the `T` declared with `target` qualifier.
    #[inline]
    #[must_use]
    pub fn alias_of<T>(target: impl Into<Qualifier>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        Self::alias::<T, T, _>(target, |value| value)
    }

    #[inline]
    #[must_use]
    pub fn qualified(mut self, qualifier: impl Into<Qualifier>) -> Self {
        self.identifier = self.identifier.with_qualifier(qualifier.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn tagged(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    #[inline]
    #[must_use]
    pub fn ignore(self, policy: IgnorePolicy) -> Self {
        self.tagged(Tag::Ignore(policy))
    }

    #[inline]
    #[must_use]
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    #[inline]
    #[must_use]
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Identifier this declaration forwards to, if it's an alias.
    #[inline]
    #[must_use]
    pub fn alias_target(&self) -> Option<&Identifier> {
        match &self.provider {
            Provider::Alias { target, .. } => Some(target),
            Provider::Factory(_) => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_service(&self) -> bool {
        self.capabilities.service.is_some()
    }

    #[inline]
    #[must_use]
    pub fn is_processor(&self) -> bool {
        self.capabilities.processor.is_some()
    }

    /// Ignore policies of all tags folded into one, `None` if there are none.
    #[inline]
    #[must_use]
    pub fn ignore_policy(&self) -> Option<IgnorePolicy> {
        IgnorePolicy::fold(self.tags.iter().filter_map(|tag| match tag {
            Tag::Ignore(policy) => Some(*policy),
            Tag::Label(_) => None,
        }))
    }
}

impl Debug for Declaration {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Declaration")
            .field("identifier", &self.identifier)
            .field("alias_target", &self.alias_target())
            .field("tags", &self.tags)
            .field("service", &self.is_service())
            .field("processor", &self.is_processor())
            .finish()
    }
}
