use std::sync::Arc;
use tracing::debug;

use crate::{
    any::{self, Instance},
    context::Context,
    errors::InstantiateErrorKind,
};

/// Type-erased factory of one declaration, shared between clones of the declaration.
pub(crate) type BoxedInstantiator = Arc<dyn Fn(&Context<'_>) -> Result<Instance, InstantiateErrorKind> + Send + Sync>;

/// Type-erased conversion of an alias target into the alias type. `None` if the target has another type.
pub(crate) type BoxedCast = Arc<dyn Fn(&Instance) -> Option<Instance> + Send + Sync>;

#[inline]
#[must_use]
pub(crate) fn boxed_instantiator<T, F>(factory: F) -> BoxedInstantiator
where
    T: ?Sized + Send + Sync + 'static,
    F: Fn(&Context<'_>) -> Result<Arc<T>, InstantiateErrorKind> + Send + Sync + 'static,
{
    erased(move |context| {
        let dependency = factory(context)?;

        debug!("Instantiated");

        Ok(any::erase(dependency))
    })
}

#[inline]
fn erased<F>(instantiator: F) -> BoxedInstantiator
where
    F: Fn(&Context<'_>) -> Result<Instance, InstantiateErrorKind> + Send + Sync + 'static,
{
    Arc::new(instantiator)
}

#[inline]
#[must_use]
pub(crate) fn boxed_cast<U, T, C>(cast: C) -> BoxedCast
where
    U: ?Sized + Send + Sync + 'static,
    T: ?Sized + Send + Sync + 'static,
    C: Fn(Arc<T>) -> Arc<U> + Send + Sync + 'static,
{
    Arc::new(move |instance: &Instance| any::downcast::<T>(instance).map(|target| any::erase(cast(target))))
}

/// Wrapper to create a factory that just returns passed value.
/// It can be used when the value was created outside the environment.
#[inline]
#[must_use]
pub fn instance<T>(value: T) -> impl Fn(&Context<'_>) -> Result<Arc<T>, InstantiateErrorKind> + Send + Sync + 'static
where
    T: Send + Sync + 'static,
{
    let value = Arc::new(value);
    move |_| Ok(value.clone())
}
