pub(crate) mod any;
pub(crate) mod config;
pub(crate) mod context;
pub(crate) mod declaration;
pub(crate) mod environment;
pub(crate) mod errors;
pub(crate) mod extension;
pub(crate) mod identifier;
pub(crate) mod inject;
pub(crate) mod instantiator;
pub(crate) mod lifecycle;
pub(crate) mod lock;
pub(crate) mod lookup;
pub(crate) mod mutable;
pub(crate) mod registry;
pub(crate) mod resolver;
pub(crate) mod utils;

pub use any::TypeInfo;
pub use config::{Config, UnstableFeatures};
pub use context::Context;
pub use declaration::{Declaration, Tag};
pub use environment::{Environment, EnvironmentBuilder};
pub use errors::{BuildErrorKind, InstantiateErrorKind, LifecycleErrorKind, ResolveErrorKind, Verb};
pub use extension::DeclarationsProcessor;
pub use identifier::{Identifier, Qualifier};
pub use inject::Inject;
pub use instantiator::instance;
pub use lifecycle::{IgnorePolicy, Service, ServiceManager, ServiceState, Services};
pub use lookup::Lookup;
pub use mutable::MutableEnvironment;
pub use registry::{Declare, EnvironmentContext, Module};

pub use tokio_util::sync::CancellationToken;
