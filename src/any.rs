use core::{
    any::{type_name, Any, TypeId},
    cmp::Ordering,
    fmt::{self, Debug, Display, Formatter},
    hash::{Hash, Hasher},
};
use std::{borrow::Cow, sync::Arc};

/// Runtime description of a component type.
///
/// Equality, ordering and hashing only look at the [`TypeId`], the name is kept for diagnostics.
#[derive(Clone, Copy)]
pub struct TypeInfo {
    pub name: &'static str,
    pub id: TypeId,
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeInfo {}

impl PartialOrd for TypeInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl Hash for TypeInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Debug for TypeInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl Display for TypeInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_name())
    }
}

impl TypeInfo {
    #[inline]
    #[must_use]
    pub fn of<T>() -> Self
    where
        T: ?Sized + 'static,
    {
        Self {
            name: type_name::<T>(),
            id: TypeId::of::<T>(),
        }
    }

    /// Type name with module paths stripped from every path inside it,
    /// so `dyn a::Storage` is `dyn Storage` and `(a::B, c::D)` is `(B, D)`.
    #[must_use]
    pub fn short_name(&self) -> Cow<'static, str> {
        if !self.name.contains("::") {
            return Cow::Borrowed(self.name);
        }

        let mut short = String::with_capacity(self.name.len());
        let mut segment_start = 0;
        for (index, character) in self.name.char_indices() {
            if character.is_alphanumeric() || character == '_' || character == ':' {
                continue;
            }
            short.push_str(strip_path(&self.name[segment_start..index]));
            short.push(character);
            segment_start = index + character.len_utf8();
        }
        short.push_str(strip_path(&self.name[segment_start..]));

        Cow::Owned(short)
    }
}

fn strip_path(path: &str) -> &str {
    path.rsplit_once("::").map_or(path, |(_, name)| name)
}

/// Type-erased component. The erased value is always an `Arc<T>` for the declared `T`,
/// which lets unsized components (trait objects) be stored next to sized ones.
pub(crate) type Instance = Arc<dyn Any + Send + Sync>;

#[inline]
#[must_use]
pub(crate) fn erase<T>(value: Arc<T>) -> Instance
where
    T: ?Sized + Send + Sync + 'static,
{
    Arc::new(value)
}

#[inline]
#[must_use]
pub(crate) fn downcast<T>(instance: &Instance) -> Option<Arc<T>>
where
    T: ?Sized + Send + Sync + 'static,
{
    (**instance).downcast_ref::<Arc<T>>().cloned()
}
