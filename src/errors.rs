mod build;
mod instantiate;
mod lifecycle;
mod resolve;

pub use build::BuildErrorKind;
pub use instantiate::InstantiateErrorKind;
pub use lifecycle::{LifecycleErrorKind, Verb};
pub use resolve::ResolveErrorKind;
