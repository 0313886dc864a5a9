use core::fmt::{self, Display, Formatter};

use super::resolve::ResolveErrorKind;
use crate::Identifier;

/// Lifecycle operation applied to every managed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Start,
    Stop,
}

impl Verb {
    #[inline]
    #[must_use]
    pub const fn progressive(self) -> &'static str {
        match self {
            Verb::Start => "starting",
            Verb::Stop => "stopping",
        }
    }

    #[inline]
    #[must_use]
    pub const fn past(self) -> &'static str {
        match self {
            Verb::Start => "Started",
            Verb::Stop => "Stopped",
        }
    }
}

impl Display for Verb {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.progressive())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LifecycleErrorKind {
    #[error("Error while {verb} service {identifier}: {source}")]
    ServiceOperationFailed {
        identifier: Identifier,
        verb: Verb,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Resolve(#[from] ResolveErrorKind),
    #[error("Lifecycle operation was cancelled")]
    Cancelled,
}
