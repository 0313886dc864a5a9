use core::fmt::{self, Debug, Formatter};
use std::sync::{Arc, Weak};
use tracing::{debug, debug_span, error};

use crate::{
    any,
    context::Source,
    errors::ResolveErrorKind,
    lock::MemoCell,
    Identifier,
};

/// Deferred reference to a component.
///
/// Creating a handle never resolves its referent, only [`Inject::get`] does.
/// That is what makes cycles possible: two components may hold handles to each other,
/// as long as neither reads its handle before both constructors have returned.
///
/// Handles created by a standard environment keep the first resolved value;
/// handles created by a [`crate::MutableEnvironment`] resolve against the live components on every read.
///
/// # Warning
/// Reading handles of a genuine construction-time cycle (both sides read during construction) recurses until the stack overflows.
pub struct Inject<T: ?Sized> {
    source: Weak<dyn Source>,
    identifier: Identifier,
    requester: Option<Identifier>,
    memoize: bool,
    cell: MemoCell<Arc<T>>,
}

impl<T> Inject<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    #[inline]
    #[must_use]
    pub(crate) fn new(source: &dyn Source, identifier: Identifier, requester: Option<Identifier>) -> Self {
        Self {
            source: source.downgrade(),
            identifier,
            requester,
            memoize: source.memoizes_injections(),
            cell: MemoCell::new(),
        }
    }

    /// Resolves the referent on first read, later reads return the same instance.
    ///
    /// # Errors
    /// - Returns [`ResolveErrorKind::EnvironmentClosed`] if the environment was dropped
    /// - Returns [`ResolveErrorKind::ComponentNotFound`] if nothing is declared at the identifier
    /// - Returns the error of the failed resolution, if any. Failed reads aren't cached
    pub fn get(&self) -> Result<Arc<T>, ResolveErrorKind> {
        if self.memoize {
            self.cell.get_or_try_init(|| self.resolve())
        } else {
            self.resolve()
        }
    }

    #[inline]
    #[must_use]
    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    /// Whether a value is kept by the handle, always `false` for handles that don't memoize.
    #[inline]
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.cell.is_set()
    }

    fn resolve(&self) -> Result<Arc<T>, ResolveErrorKind> {
        let span = debug_span!("inject", identifier = %self.identifier);
        let _guard = span.enter();

        let Some(source) = self.source.upgrade() else {
            let err = ResolveErrorKind::EnvironmentClosed {
                identifier: self.identifier.clone(),
            };
            error!("{}", err);
            return Err(err);
        };

        let Some(instance) = source.lookup(&self.identifier, self.requester.as_ref())? else {
            let err = ResolveErrorKind::ComponentNotFound {
                identifier: self.identifier.clone(),
            };
            error!("{}", err);
            return Err(err);
        };

        match any::downcast::<T>(&instance) {
            Some(dependency) => {
                debug!("Injected");
                Ok(dependency)
            }
            None => {
                let err = ResolveErrorKind::Internal {
                    message: format!("{} resolved to an instance of another type", self.identifier),
                };
                error!("{}", err);
                Err(err)
            }
        }
    }
}

impl<T: ?Sized> Debug for Inject<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inject")
            .field("identifier", &self.identifier)
            .field("requester", &self.requester)
            .field("resolved", &self.cell.is_set())
            .finish_non_exhaustive()
    }
}
