use crate::errors::Verb;

/// Exclusion of a service from bulk lifecycle operations, attached to its declaration as a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IgnorePolicy {
    All,
    Start,
    Stop,
}

impl IgnorePolicy {
    /// Combines policies of declarations that share one service: equal policies stay, different ones become [`IgnorePolicy::All`].
    #[inline]
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        if self == other {
            self
        } else {
            Self::All
        }
    }

    /// [`IgnorePolicy::merge`] over any number of policies, `None` if there are none.
    #[inline]
    #[must_use]
    pub fn fold(policies: impl IntoIterator<Item = Self>) -> Option<Self> {
        policies.into_iter().reduce(Self::merge)
    }

    #[inline]
    #[must_use]
    pub const fn ignores(self, verb: Verb) -> bool {
        matches!(
            (self, verb),
            (Self::All, _) | (Self::Start, Verb::Start) | (Self::Stop, Verb::Stop)
        )
    }
}
