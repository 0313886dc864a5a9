use super::instantiate::InstantiateErrorKind;
use crate::{any::TypeInfo, Identifier};

#[derive(thiserror::Error, Debug)]
pub enum ResolveErrorKind {
    #[error("Component {identifier} not found in environment")]
    ComponentNotFound { identifier: Identifier },
    #[error(
        "\
        Failed to resolve alias {alias} to {target}: {reason}. \
        Make sure {target} is declared in the same environment as {alias} and provides the aliased type\
        "
    )]
    FailedToResolve {
        alias: Identifier,
        target: Identifier,
        reason: &'static str,
    },
    #[error("Component {identifier} was requested as {requested:?}, which isn't its declared type")]
    TypeMismatch { identifier: Identifier, requested: TypeInfo },
    #[error("Environment isn't extensible, it has no meta environment")]
    NotExtensible,
    #[error("Extension {extension} isn't installed in the meta environment")]
    ExtensionNotInstalled { extension: Identifier },
    #[error("Factory of {identifier} failed: {source}")]
    Instantiate {
        identifier: Identifier,
        #[source]
        source: InstantiateErrorKind,
    },
    #[error("Environment was dropped before the injection handle of {identifier} was read")]
    EnvironmentClosed { identifier: Identifier },
    #[error("Internal container error: {message}. This is a bug, please report it")]
    Internal { message: String },
}
