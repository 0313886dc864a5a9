use core::fmt::{self, Display, Formatter};
use std::borrow::Cow;

use crate::any::TypeInfo;

/// Tag distinguishing components that share a type.
///
/// The variants form a closed set, so two qualifiers are equal iff they are the same variant
/// with equal payloads. [`Qualifier::Empty`] is what an unqualified identifier carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Qualifier {
    #[default]
    Empty,
    Named(Cow<'static, str>),
    /// A marker type used as a tag, e.g. `struct Primary;`.
    Typed(TypeInfo),
}

impl Qualifier {
    #[inline]
    #[must_use]
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Named(name.into())
    }

    #[inline]
    #[must_use]
    pub fn typed<T: ?Sized + 'static>() -> Self {
        Self::Typed(TypeInfo::of::<T>())
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl From<&'static str> for Qualifier {
    fn from(name: &'static str) -> Self {
        Self::Named(Cow::Borrowed(name))
    }
}

impl From<String> for Qualifier {
    fn from(name: String) -> Self {
        Self::Named(Cow::Owned(name))
    }
}

impl Display for Qualifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Qualifier::Empty => Ok(()),
            Qualifier::Named(name) => write!(f, "\"{name}\""),
            Qualifier::Typed(type_info) => write!(f, "{type_info}"),
        }
    }
}

/// Unique key of a component inside one environment: the component type plus a qualifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier {
    type_info: TypeInfo,
    qualifier: Qualifier,
}

impl Identifier {
    #[inline]
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_info: TypeInfo::of::<T>(),
            qualifier: Qualifier::Empty,
        }
    }

    #[inline]
    #[must_use]
    pub fn qualified<T: ?Sized + 'static>(qualifier: impl Into<Qualifier>) -> Self {
        Self {
            type_info: TypeInfo::of::<T>(),
            qualifier: qualifier.into(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn type_info(&self) -> &TypeInfo {
        &self.type_info
    }

    #[inline]
    #[must_use]
    pub const fn qualifier(&self) -> &Qualifier {
        &self.qualifier
    }

    #[inline]
    #[must_use]
    pub fn is_type<T: ?Sized + 'static>(&self) -> bool {
        self.type_info == TypeInfo::of::<T>()
    }

    #[inline]
    #[must_use]
    pub(crate) fn with_qualifier(self, qualifier: Qualifier) -> Self {
        Self { qualifier, ..self }
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.qualifier.is_empty() {
            write!(f, "{}", self.type_info)
        } else {
            write!(f, "{}[{}]", self.type_info, self.qualifier)
        }
    }
}
