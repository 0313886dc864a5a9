use core::any::Any;
use std::sync::Arc;
use tracing::error;

use crate::{any::TypeInfo, errors::ResolveErrorKind, Identifier, Qualifier};

/// Read access to components.
///
/// Only [`Lookup::lookup_erased`] has to be implemented, [`Lookup::get_by`] and [`Lookup::get_or_none_by`]
/// are the two lookup shapes and every other method is sugar over them.
pub trait Lookup {
    /// Resolves the type-erased component declared at `identifier`. The erased value is an `Arc<T>`
    /// for the identifier type `T`. Returns `Ok(None)` if nothing is declared there.
    ///
    /// # Errors
    /// Returns the error of the failed resolution, if any.
    fn lookup_erased(&self, identifier: &Identifier) -> Result<Option<Arc<dyn Any + Send + Sync>>, ResolveErrorKind>;

    /// # Errors
    /// - Returns [`ResolveErrorKind::TypeMismatch`] if `identifier` doesn't declare a `T`
    /// - Returns the error of the failed resolution, if any
    fn get_or_none_by<T>(&self, identifier: &Identifier) -> Result<Option<Arc<T>>, ResolveErrorKind>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        if !identifier.is_type::<T>() {
            let err = ResolveErrorKind::TypeMismatch {
                identifier: identifier.clone(),
                requested: TypeInfo::of::<T>(),
            };
            error!("{}", err);
            return Err(err);
        }

        match self.lookup_erased(identifier)? {
            Some(instance) => match (*instance).downcast_ref::<Arc<T>>() {
                Some(dependency) => Ok(Some(dependency.clone())),
                None => {
                    let err = ResolveErrorKind::Internal {
                        message: format!("{identifier} resolved to an instance of another type"),
                    };
                    error!("{}", err);
                    Err(err)
                }
            },
            None => Ok(None),
        }
    }

    /// # Errors
    /// - Returns [`ResolveErrorKind::ComponentNotFound`] if nothing is declared at `identifier`
    /// - Returns the errors of [`Lookup::get_or_none_by`]
    fn get_by<T>(&self, identifier: &Identifier) -> Result<Arc<T>, ResolveErrorKind>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        match self.get_or_none_by(identifier)? {
            Some(dependency) => Ok(dependency),
            None => {
                let err = ResolveErrorKind::ComponentNotFound {
                    identifier: identifier.clone(),
                };
                error!("{}", err);
                Err(err)
            }
        }
    }

    #[allow(clippy::missing_errors_doc)]
    fn get<T>(&self) -> Result<Arc<T>, ResolveErrorKind>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get_by(&Identifier::of::<T>())
    }

    #[allow(clippy::missing_errors_doc)]
    fn get_qualified<T>(&self, qualifier: impl Into<Qualifier>) -> Result<Arc<T>, ResolveErrorKind>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get_by(&Identifier::qualified::<T>(qualifier))
    }

    #[allow(clippy::missing_errors_doc)]
    fn get_or_none<T>(&self) -> Result<Option<Arc<T>>, ResolveErrorKind>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get_or_none_by(&Identifier::of::<T>())
    }

    #[allow(clippy::missing_errors_doc)]
    fn get_or_none_qualified<T>(&self, qualifier: impl Into<Qualifier>) -> Result<Option<Arc<T>>, ResolveErrorKind>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.get_or_none_by(&Identifier::qualified::<T>(qualifier))
    }
}
