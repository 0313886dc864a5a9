use std::{future::Future, sync::Arc};

use crate::{
    any::{self, Instance},
    utils::future::BoxFuture,
};

/// Component with explicit start and stop operations, managed in bulk by [`crate::ServiceManager`].
///
/// Failures are reported to the caller of the bulk operation, never retried.
pub trait Service: Send + Sync + 'static {
    fn start(&self) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn stop(&self) -> impl Future<Output = anyhow::Result<()>> + Send;
}

pub(crate) trait DynService: Send + Sync {
    fn start(&self) -> BoxFuture<'_, anyhow::Result<()>>;

    fn stop(&self) -> BoxFuture<'_, anyhow::Result<()>>;
}

impl<T: Service> DynService for T {
    fn start(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(<T as Service>::start(self))
    }

    fn stop(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(<T as Service>::stop(self))
    }
}

pub(crate) type ServiceCast = fn(&Instance) -> Option<Arc<dyn DynService>>;

pub(crate) fn cast_service<T: Service>(instance: &Instance) -> Option<Arc<dyn DynService>> {
    any::downcast::<T>(instance).map(|service| service as Arc<dyn DynService>)
}

/// State of a managed service, it never moves back to `Initialized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ServiceState {
    #[default]
    Initialized,
    Started,
    Stopped,
}
