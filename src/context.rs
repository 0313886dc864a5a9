use parking_lot::Mutex;
use std::{
    collections::BTreeSet,
    sync::{Arc, Weak},
};
use tracing::debug;

use crate::{
    any::Instance,
    errors::ResolveErrorKind,
    inject::Inject,
    lookup::Lookup,
    Identifier, Qualifier,
};

/// Anything resolvers and injection handles can read components from.
pub(crate) trait Source: Send + Sync {
    /// Resolves the instance declared at `identifier`, `Ok(None)` if nothing is declared there.
    fn lookup(&self, identifier: &Identifier, requester: Option<&Identifier>) -> Result<Option<Instance>, ResolveErrorKind>;

    fn downgrade(&self) -> Weak<dyn Source>;

    /// Whether injection handles created against this source keep the first resolved value.
    fn memoizes_injections(&self) -> bool;
}

/// Construction context handed to a factory.
///
/// Gives access to the environment being built and to the identity of the requester.
/// Prefer [`Context::inject`] for dependencies that may form cycles:
/// the returned handle is only resolved when read, eager [`Lookup::get`] resolves right away.
pub struct Context<'a> {
    pub(crate) source: &'a dyn Source,
    pub(crate) identifier: &'a Identifier,
    pub(crate) requester: Option<&'a Identifier>,
    pub(crate) requirements: Option<&'a Mutex<BTreeSet<Identifier>>>,
}

impl Context<'_> {
    /// Identifier of the component being constructed.
    #[inline]
    #[must_use]
    pub fn identifier(&self) -> &Identifier {
        self.identifier
    }

    /// Identifier of the component whose resolution triggered this construction,
    /// `None` for root-level lookups.
    #[inline]
    #[must_use]
    pub fn requester(&self) -> Option<&Identifier> {
        self.requester
    }

    /// Creates a lazy handle to the unqualified component of type `T`.
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

    fn inject_by<T>(&self, identifier: Identifier) -> Inject<T>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.record(&identifier);
        Inject::new(self.source, identifier, Some(self.identifier.clone()))
    }

    fn record(&self, identifier: &Identifier) {
        if let Some(requirements) = self.requirements {
            if requirements.lock().insert(identifier.clone()) {
                debug!(requirement = %identifier, "Requirement recorded");
            }
        }
    }
}

impl Lookup for Context<'_> {
    fn lookup_erased(&self, identifier: &Identifier) -> Result<Option<Arc<dyn core::any::Any + Send + Sync>>, ResolveErrorKind> {
        self.record(identifier);
        self.source.lookup(identifier, Some(self.identifier))
    }
}
