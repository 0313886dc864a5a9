use core::fmt::{self, Debug, Formatter};
use parking_lot::{Mutex, RwLock};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
    time::Duration,
};
use tokio::{
    task::{Id, JoinError, JoinSet},
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument as _};

use super::{
    policy::IgnorePolicy,
    service::{DynService, ServiceCast, ServiceState},
};
use crate::{
    context::Source,
    declaration::Declaration,
    environment::Environment,
    errors::{LifecycleErrorKind, ResolveErrorKind, Verb},
    extension::DeclarationsProcessor,
    lookup::Lookup as _,
    Identifier,
};

struct ServiceEntry {
    identifier: Identifier,
    aliases: Vec<Identifier>,
    cast: ServiceCast,
    policy: Option<IgnorePolicy>,
}

/// Meta component that discovers services among the main declarations and runs their lifecycle operations.
///
/// A service reachable through aliases is managed once, under the identifier of its factory declaration.
/// Ignore policies of the service and all its aliases are folded together.
#[derive(Default)]
pub struct ServiceManager {
    entries: RwLock<Vec<ServiceEntry>>,
    states: Mutex<BTreeMap<Identifier, ServiceState>>,
}

impl ServiceManager {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Meta declaration of the manager, see also [`crate::EnvironmentBuilder::install_services`].
    #[inline]
    #[must_use]
    pub fn declaration() -> Declaration {
        Declaration::processor(|_| Ok(Self::new()))
    }

    pub(crate) fn installed_in(meta: &Environment) -> Result<Arc<Self>, ResolveErrorKind> {
        match meta.get_or_none::<Self>()? {
            Some(manager) => Ok(manager),
            None => {
                let err = ResolveErrorKind::ExtensionNotInstalled {
                    extension: Identifier::of::<Self>(),
                };
                error!("{}", err);
                Err(err)
            }
        }
    }

    /// Identifiers of the managed services.
    #[must_use]
    pub fn identifiers(&self) -> Vec<Identifier> {
        self.entries.read().iter().map(|entry| entry.identifier.clone()).collect()
    }

    /// Aliases through which the service at `identifier` is also reachable.
    #[must_use]
    pub fn aliases(&self, identifier: &Identifier) -> Vec<Identifier> {
        self.entries
            .read()
            .iter()
            .find(|entry| entry.identifier == *identifier)
            .map(|entry| entry.aliases.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn policy(&self, identifier: &Identifier) -> Option<IgnorePolicy> {
        self.entries
            .read()
            .iter()
            .find(|entry| entry.identifier == *identifier)
            .and_then(|entry| entry.policy)
    }

    /// `None` if the service at `identifier` isn't managed.
    #[must_use]
    pub fn state(&self, identifier: &Identifier) -> Option<ServiceState> {
        self.states.lock().get(identifier).copied()
    }

    async fn run(
        &self,
        source: &dyn Source,
        verb: Verb,
        mut handler: impl FnMut(&str) + Send,
        token: CancellationToken,
    ) -> Result<BTreeMap<Identifier, Duration>, LifecycleErrorKind> {
        if token.is_cancelled() {
            let err = LifecycleErrorKind::Cancelled;
            error!("{}", err);
            return Err(err);
        }

        let targets = self
            .entries
            .read()
            .iter()
            .filter(|entry| match entry.policy {
                Some(policy) if policy.ignores(verb) => {
                    debug!(identifier = %entry.identifier, ?policy, "Excluded");
                    false
                }
                _ => true,
            })
            .map(|entry| (entry.identifier.clone(), entry.cast))
            .collect::<Vec<_>>();

        let mut services: Vec<(Identifier, Arc<dyn DynService>)> = Vec::with_capacity(targets.len());
        for (identifier, cast) in targets {
            let Some(instance) = source.lookup(&identifier, None)? else {
                let err = ResolveErrorKind::ComponentNotFound { identifier };
                error!("{}", err);
                return Err(err.into());
            };
            let Some(service) = cast(&instance) else {
                let err = ResolveErrorKind::Internal {
                    message: format!("{identifier} doesn't implement its declared service capability"),
                };
                error!("{}", err);
                return Err(err.into());
            };
            services.push((identifier, service));
        }

        info!(services = services.len(), "Running");

        let mut tasks = JoinSet::new();
        let mut identifiers = HashMap::with_capacity(services.len());
        for (identifier, service) in services {
            let handle = tasks.spawn(async move {
                let started = Instant::now();
                let result = match verb {
                    Verb::Start => service.start().await,
                    Verb::Stop => service.stop().await,
                };
                result.map(|()| started.elapsed())
            });
            identifiers.insert(handle.id(), identifier);
        }

        let mut elapsed = BTreeMap::new();
        let mut failure = None;
        loop {
            let joined = tokio::select! {
                biased;
                () = token.cancelled() => {
                    tasks.abort_all();
                    // Operations finished before the abort still count
                    while let Some(joined) = tasks.join_next_with_id().await {
                        if let Ok((id, Ok(duration))) = joined {
                            if let Some(identifier) = identifiers.remove(&id) {
                                self.complete(verb, &identifier, duration, &mut handler);
                            }
                        }
                    }

                    let err = LifecycleErrorKind::Cancelled;
                    error!("{}", err);
                    return Err(err);
                }
                joined = tasks.join_next_with_id() => joined,
            };

            let err = match joined {
                None => break,
                Some(Ok((id, Ok(duration)))) => match identifiers.remove(&id) {
                    Some(identifier) => {
                        self.complete(verb, &identifier, duration, &mut handler);
                        elapsed.insert(identifier, duration);
                        continue;
                    }
                    None => unknown_task(id),
                },
                Some(Ok((id, Err(source)))) => match identifiers.remove(&id) {
                    Some(identifier) => LifecycleErrorKind::ServiceOperationFailed { identifier, verb, source },
                    None => unknown_task(id),
                },
                Some(Err(err)) => match identifiers.remove(&err.id()) {
                    Some(_) if err.is_cancelled() => LifecycleErrorKind::Cancelled,
                    Some(identifier) => LifecycleErrorKind::ServiceOperationFailed {
                        identifier,
                        verb,
                        source: anyhow::anyhow!("panicked: {}", panic_message(err)),
                    },
                    None => unknown_task(err.id()),
                },
            };

            error!("{}", err);
            failure.get_or_insert(err);
        }

        match failure {
            Some(err) => Err(err),
            None => {
                info!(services = elapsed.len(), "Completed");
                Ok(elapsed)
            }
        }
    }

    fn complete(&self, verb: Verb, identifier: &Identifier, duration: Duration, handler: &mut impl FnMut(&str)) {
        let state = match verb {
            Verb::Start => ServiceState::Started,
            Verb::Stop => ServiceState::Stopped,
        };
        self.states.lock().insert(identifier.clone(), state);

        let message = format!("{} {identifier} in {}ms", verb.past(), duration.as_millis());
        info!("{}", message);
        handler(&message);
    }
}

fn unknown_task(id: Id) -> LifecycleErrorKind {
    ResolveErrorKind::Internal {
        message: format!("lifecycle task {id} has no service"),
    }
    .into()
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|message| (*message).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_owned()),
        Err(err) => err.to_string(),
    }
}

/// Follows alias targets to the declaration that isn't an alias, or to the first undeclared target.
fn root_of(declaration: &Declaration, declarations: &BTreeMap<&Identifier, &Declaration>) -> Identifier {
    let mut current = declaration;
    let mut visited = BTreeSet::new();
    while let Some(target) = current.alias_target() {
        if !visited.insert(&current.identifier) {
            debug!(identifier = %current.identifier, "Alias loop");
            break;
        }
        match declarations.get(target) {
            Some(next) => current = next,
            None => return target.clone(),
        }
    }
    current.identifier.clone()
}

impl DeclarationsProcessor for ServiceManager {
    fn process(&self, declarations: &[Declaration]) {
        let by_identifier = declarations
            .iter()
            .map(|declaration| (&declaration.identifier, declaration))
            .collect::<BTreeMap<_, _>>();

        let mut groups: BTreeMap<Identifier, Vec<&Declaration>> = BTreeMap::new();
        for declaration in declarations {
            groups.entry(root_of(declaration, &by_identifier)).or_default().push(declaration);
        }

        let mut entries = Vec::new();
        let mut states = BTreeMap::new();
        for members in groups.into_values() {
            let Some((canonical, cast)) = members
                .iter()
                .find_map(|member| member.capabilities.service.map(|cast| (*member, cast)))
            else {
                continue;
            };

            let policy = IgnorePolicy::fold(members.iter().filter_map(|member| member.ignore_policy()));
            let aliases = members
                .iter()
                .filter(|member| member.identifier != canonical.identifier)
                .map(|member| member.identifier.clone())
                .collect::<Vec<_>>();

            debug!(identifier = %canonical.identifier, aliases = aliases.len(), ?policy, "Service discovered");

            states.insert(canonical.identifier.clone(), ServiceState::Initialized);
            entries.push(ServiceEntry {
                identifier: canonical.identifier.clone(),
                aliases,
                cast,
                policy,
            });
        }

        info!(services = entries.len(), "Services discovered");

        *self.entries.write() = entries;
        *self.states.lock() = states;
    }
}

impl Debug for ServiceManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceManager")
            .field("services", &self.identifiers())
            .field("states", &*self.states.lock())
            .finish()
    }
}

/// Lifecycle operations of one environment. Operations run concurrently on the current tokio runtime.
pub struct Services<'a> {
    manager: Arc<ServiceManager>,
    source: &'a dyn Source,
}

impl<'a> Services<'a> {
    #[inline]
    #[must_use]
    pub(crate) fn new(manager: Arc<ServiceManager>, source: &'a dyn Source) -> Self {
        Self { manager, source }
    }

    #[inline]
    #[must_use]
    pub fn manager(&self) -> &ServiceManager {
        &self.manager
    }

    #[inline]
    #[must_use]
    pub fn identifiers(&self) -> Vec<Identifier> {
        self.manager.identifiers()
    }

    #[inline]
    #[must_use]
    pub fn state(&self, identifier: &Identifier) -> Option<ServiceState> {
        self.manager.state(identifier)
    }

    /// Starts every service not excluded from starting, all at once.
    /// `handler` gets one line per completed start.
    ///
    /// Returns the elapsed time of every start. Dropping the returned future aborts the starts in flight.
    ///
    /// # Errors
    /// - Returns [`LifecycleErrorKind::Resolve`] if a service can't be resolved. Nothing is started in that case
    /// - Returns [`LifecycleErrorKind::ServiceOperationFailed`] for the first failed start,
    ///   once every other start has finished
    /// - Returns [`LifecycleErrorKind::Cancelled`] if a start was cancelled
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub async fn start_all(&self, handler: impl FnMut(&str) + Send) -> Result<BTreeMap<Identifier, Duration>, LifecycleErrorKind> {
        self.run(Verb::Start, handler, CancellationToken::new()).await
    }

    /// Stops every service not excluded from stopping, all at once. Mirrors [`Services::start_all`].
    ///
    /// # Errors
    /// The same as [`Services::start_all`].
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub async fn stop_all(&self, handler: impl FnMut(&str) + Send) -> Result<BTreeMap<Identifier, Duration>, LifecycleErrorKind> {
        self.run(Verb::Stop, handler, CancellationToken::new()).await
    }

    /// [`Services::start_all`] that aborts every start in flight once `token` is cancelled
    /// and returns [`LifecycleErrorKind::Cancelled`].
    ///
    /// # Errors
    /// The same as [`Services::start_all`].
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub async fn start_all_with_cancellation(
        &self,
        handler: impl FnMut(&str) + Send,
        token: CancellationToken,
    ) -> Result<BTreeMap<Identifier, Duration>, LifecycleErrorKind> {
        self.run(Verb::Start, handler, token).await
    }

    /// # Errors
    /// The same as [`Services::start_all_with_cancellation`].
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub async fn stop_all_with_cancellation(
        &self,
        handler: impl FnMut(&str) + Send,
        token: CancellationToken,
    ) -> Result<BTreeMap<Identifier, Duration>, LifecycleErrorKind> {
        self.run(Verb::Stop, handler, token).await
    }

    async fn run(
        &self,
        verb: Verb,
        handler: impl FnMut(&str) + Send,
        token: CancellationToken,
    ) -> Result<BTreeMap<Identifier, Duration>, LifecycleErrorKind> {
        self.manager
            .run(self.source, verb, handler, token)
            .instrument(info_span!("services", op = %verb))
            .await
    }
}

impl Debug for Services<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").field("manager", &self.manager).finish_non_exhaustive()
    }
}
