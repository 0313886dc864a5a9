use super::resolve::ResolveErrorKind;

/// Error returned by a factory.
///
/// Both a failed dependency read and any custom error convert into it, so factories can use `?` on either.
#[derive(thiserror::Error, Debug)]
pub enum InstantiateErrorKind {
    #[error(transparent)]
    Resolve(Box<ResolveErrorKind>),
    #[error(transparent)]
    Custom(#[from] anyhow::Error),
}

impl From<ResolveErrorKind> for InstantiateErrorKind {
    fn from(err: ResolveErrorKind) -> Self {
        Self::Resolve(Box::new(err))
    }
}
