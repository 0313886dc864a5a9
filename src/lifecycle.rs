mod manager;
mod policy;
mod service;

pub use manager::{ServiceManager, Services};
pub use policy::IgnorePolicy;
pub use service::{Service, ServiceState};

pub(crate) use service::{cast_service, ServiceCast};
