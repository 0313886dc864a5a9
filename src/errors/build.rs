use super::resolve::ResolveErrorKind;
use crate::Identifier;

#[derive(thiserror::Error, Debug)]
pub enum BuildErrorKind {
    #[error("Invalid declaration of {identifier}: {reason}")]
    InvalidDeclaration { identifier: Identifier, reason: &'static str },
    #[error("Environment isn't extensible, meta declarations are unavailable. Enable `Config::extensible` to use them")]
    NotExtensible,
    #[error("Feature `{feature}` is disabled. Opt in through `Config::unstable` to use it")]
    FeatureDisabled { feature: &'static str },
    #[error("Meta environment failed to build: {0}")]
    Resolve(#[from] ResolveErrorKind),
}

impl BuildErrorKind {
    #[inline]
    #[must_use]
    pub(crate) fn duplicate(identifier: Identifier) -> Self {
        Self::InvalidDeclaration {
            identifier,
            reason: "identifier is already declared",
        }
    }
}
