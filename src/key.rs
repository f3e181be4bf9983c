//! Capability keys for the dependency injection container.

use std::any::TypeId;
use std::fmt;

/// Key identifying a capability in the registry and in every instance cache.
///
/// A key names either a concrete type or a trait, optionally discriminated by a
/// service name so that several bindings for the same capability can coexist
/// next to the default (unnamed) one.
///
/// # Examples
///
/// ```rust
/// use tessera_di::{key_of_type, key_of_trait, Key};
///
/// trait Clock: Send + Sync {}
///
/// let port = key_of_type::<u16>();
/// let admin_port = port.named("admin");
///
/// assert_ne!(port, admin_port);
/// assert_eq!(admin_port.service_name(), Some("admin"));
/// assert_eq!(admin_port.unnamed(), port);
/// assert!(matches!(key_of_trait::<dyn Clock>(), Key::Trait(_)));
/// ```
#[derive(Debug, Clone)]
pub enum Key {
    /// Concrete type key with TypeId and name for diagnostics
    Type(TypeId, &'static str),
    /// Trait object key, identified by the trait's type name
    Trait(&'static str),
    /// Named concrete type key with TypeId, type name and service name
    TypeNamed(TypeId, &'static str, &'static str),
    /// Named trait key with trait name and service name
    TraitNamed(&'static str, &'static str),
}

impl Key {
    /// Get the type or trait name for display
    pub fn display_name(&self) -> &'static str {
        match self {
            Key::Type(_, name) => name,
            Key::Trait(name) => name,
            Key::TypeNamed(_, name, _) => name,
            Key::TraitNamed(name, _) => name,
        }
    }

    /// Get the service name for named bindings, or None for the default binding
    pub fn service_name(&self) -> Option<&'static str> {
        match self {
            Key::Type(_, _) | Key::Trait(_) => None,
            Key::TypeNamed(_, _, name) => Some(name),
            Key::TraitNamed(_, name) => Some(name),
        }
    }

    /// Whether this key carries a service name.
    pub fn is_named(&self) -> bool {
        self.service_name().is_some()
    }

    /// The same capability under the given service name.
    ///
    /// Calling this on a key that already carries a name replaces it.
    pub fn named(&self, name: &'static str) -> Key {
        match *self {
            Key::Type(id, type_name) | Key::TypeNamed(id, type_name, _) => {
                Key::TypeNamed(id, type_name, name)
            }
            Key::Trait(trait_name) | Key::TraitNamed(trait_name, _) => {
                Key::TraitNamed(trait_name, name)
            }
        }
    }

    /// The default binding of the same capability.
    pub fn unnamed(&self) -> Key {
        match *self {
            Key::Type(id, type_name) | Key::TypeNamed(id, type_name, _) => Key::Type(id, type_name),
            Key::Trait(trait_name) | Key::TraitNamed(trait_name, _) => Key::Trait(trait_name),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Key::Type(_, _) => 0,
            Key::TypeNamed(_, _, _) => 1,
            Key::Trait(_) => 2,
            Key::TraitNamed(_, _) => 3,
        }
    }
}

// TypeId-only comparison for concrete types; the type name is diagnostic only
impl PartialEq for Key {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Key::Type(a, _), Key::Type(b, _)) => a == b,
            (Key::TypeNamed(a, _, name_a), Key::TypeNamed(b, _, name_b)) => {
                a == b && name_a == name_b
            }
            (Key::Trait(a), Key::Trait(b)) => a == b,
            (Key::TraitNamed(a, name_a), Key::TraitNamed(b, name_b)) => {
                a == b && name_a == name_b
            }
            _ => false,
        }
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    #[inline(always)]
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self, other) {
            (Key::Type(a, _), Key::Type(b, _)) => a.cmp(b),
            (Key::TypeNamed(a, _, name_a), Key::TypeNamed(b, _, name_b)) => {
                a.cmp(b).then_with(|| name_a.cmp(name_b))
            }
            (Key::Trait(a), Key::Trait(b)) => a.cmp(b),
            (Key::TraitNamed(a, name_a), Key::TraitNamed(b, name_b)) => {
                a.cmp(b).then_with(|| name_a.cmp(name_b))
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl std::hash::Hash for Key {
    #[inline(always)]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Key::Type(id, _) => id.hash(state),
            Key::TypeNamed(id, _, name) => {
                id.hash(state);
                name.hash(state);
            }
            Key::Trait(name) => name.hash(state),
            Key::TraitNamed(name, named) => {
                name.hash(state);
                named.hash(state);
            }
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.service_name() {
            Some(name) => write!(f, "{}[{}]", self.display_name(), name),
            None => f.write_str(self.display_name()),
        }
    }
}

/// Key of the default binding for a concrete type.
#[inline(always)]
pub fn key_of_type<T: 'static>() -> Key {
    Key::Type(TypeId::of::<T>(), std::any::type_name::<T>())
}

/// Key of the default binding for a trait object type such as `dyn Logger`.
#[inline(always)]
pub fn key_of_trait<T: ?Sized + 'static>() -> Key {
    Key::Trait(std::any::type_name::<T>())
}

/// Key of a named binding for a concrete type.
pub fn named_key_of_type<T: 'static>(name: &'static str) -> Key {
    Key::TypeNamed(TypeId::of::<T>(), std::any::type_name::<T>(), name)
}

/// Key of a named binding for a trait object type.
pub fn named_key_of_trait<T: ?Sized + 'static>(name: &'static str) -> Key {
    Key::TraitNamed(std::any::type_name::<T>(), name)
}

/// Builds a requirement list of concrete type keys.
///
/// ```rust
/// use tessera_di::{key_of_type, keys};
///
/// struct Database;
/// struct Cache;
///
/// let requires = keys![Database, Cache];
/// assert_eq!(requires, vec![key_of_type::<Database>(), key_of_type::<Cache>()]);
/// ```
#[macro_export]
macro_rules! keys {
    () => {
        ::std::vec::Vec::<$crate::Key>::new()
    };
    ($($ty:ty),+ $(,)?) => {
        ::std::vec![$($crate::key_of_type::<$ty>()),+]
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    trait Logger: Send + Sync {}

    #[test]
    fn named_and_default_keys_differ() {
        let base = key_of_type::<String>();
        let named = base.named("primary");
        assert_ne!(base, named);
        assert_eq!(named, named_key_of_type::<String>("primary"));
        assert_ne!(named, base.named("replica"));
        assert_eq!(named.unnamed(), base);
    }

    #[test]
    fn renaming_a_named_key_replaces_the_name() {
        let key = named_key_of_trait::<dyn Logger>("audit").named("console");
        assert_eq!(key.service_name(), Some("console"));
        assert_eq!(key.unnamed(), key_of_trait::<dyn Logger>());
    }

    #[test]
    fn hash_agrees_with_equality() {
        let mut set = HashSet::new();
        set.insert(key_of_type::<u32>());
        set.insert(key_of_type::<u32>());
        set.insert(named_key_of_type::<u32>("port"));
        set.insert(key_of_trait::<dyn Logger>());
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn display_includes_service_name() {
        assert_eq!(key_of_type::<u32>().to_string(), "u32");
        assert_eq!(named_key_of_type::<u32>("port").to_string(), "u32[port]");
    }

    #[test]
    fn ordering_groups_variants() {
        let mut keys = vec![
            key_of_trait::<dyn Logger>(),
            named_key_of_type::<u8>("x"),
            key_of_type::<u8>(),
        ];
        keys.sort();
        assert!(matches!(keys[0], Key::Type(_, _)));
        assert!(matches!(keys[1], Key::TypeNamed(_, _, _)));
        assert!(matches!(keys[2], Key::Trait(_)));
    }
}
