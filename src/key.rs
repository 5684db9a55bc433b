//! Key descriptor: how the table hashes and compares a key type.
//!
//! The engine never calls `Hash`/`Eq` directly. Everything it needs to
//! know about a key type goes through [`MapKey`], which also carries the
//! two type-level flags the probing and evacuation code depend on.

use core::hash::{Hash, Hasher};

/// Hashing and equality for keys stored in a [`HashMap`](crate::HashMap).
///
/// Unlike `Eq`, `key_eq` is allowed to be non-reflexive (floating point
/// NaN). Such keys can be inserted and iterated but are never found by
/// lookup, and every insert of one adds a new entry.
///
/// Use [`map_key_via_eq!`](crate::map_key_via_eq) to implement it for a
/// type that is already `Hash + Eq`.
///
/// Lookups accept any `Q` with `K: Borrow<Q>`; the `MapKey` impls of
/// `K` and `Q` must then agree on hashing and equality, as `String` and
/// `str` or `Vec<T>` and `[T]` do.
pub trait MapKey {
    /// `key_eq(k, k)` holds for every value of the type.
    const REFLEXIVE: bool = true;

    /// Keys that compare equal may still differ in representation (`0.0`
    /// and `-0.0`), so overwriting an entry also stores the new key.
    const NEEDS_KEY_UPDATE: bool = false;

    /// Feeds the key into `state`. Keys that are `key_eq` must hash
    /// identically.
    fn hash_key<H: Hasher>(&self, state: &mut H);

    fn key_eq(&self, other: &Self) -> bool;
}

/// Whether `key` compares equal to itself.
#[inline]
pub(crate) fn equals_itself<K: MapKey + ?Sized>(key: &K) -> bool {
    K::REFLEXIVE || key.key_eq(key)
}

/// Implements [`MapKey`] for types that are `Hash + Eq`.
///
/// ```
/// #[derive(Hash, PartialEq, Eq)]
/// struct Point {
///     x: i32,
///     y: i32,
/// }
/// incr_hashmap::map_key_via_eq!(Point);
///
/// let mut m = incr_hashmap::HashMap::new();
/// m.insert(Point { x: 1, y: 2 }, "a");
/// assert_eq!(m.get(&Point { x: 1, y: 2 }), Some(&"a"));
/// ```
#[macro_export]
macro_rules! map_key_via_eq {
    ($($t:ty),* $(,)?) => {
        $(
            impl $crate::MapKey for $t {
                #[inline]
                fn hash_key<H: ::core::hash::Hasher>(&self, state: &mut H) {
                    ::core::hash::Hash::hash(self, state)
                }

                #[inline]
                fn key_eq(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

map_key_via_eq!(
    u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, bool, char, str, String,
);

macro_rules! float_key {
    ($($t:ty),*) => {
        $(
            impl MapKey for $t {
                const REFLEXIVE: bool = false;
                const NEEDS_KEY_UPDATE: bool = true;

                #[inline]
                fn hash_key<H: Hasher>(&self, state: &mut H) {
                    if self.is_nan() {
                        // No NaN equals another, so there is nothing to keep
                        // consistent; scatter them instead of piling them
                        // into a single chain.
                        state.write_u64(rand::random());
                    } else if *self == 0.0 {
                        state.write_u64(0);
                    } else {
                        state.write_u64(u64::from(self.to_bits()));
                    }
                }

                #[inline]
                fn key_eq(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

float_key!(f32, f64);

impl<T: MapKey + ?Sized> MapKey for &T {
    const REFLEXIVE: bool = T::REFLEXIVE;
    const NEEDS_KEY_UPDATE: bool = T::NEEDS_KEY_UPDATE;

    #[inline]
    fn hash_key<H: Hasher>(&self, state: &mut H) {
        (**self).hash_key(state)
    }

    #[inline]
    fn key_eq(&self, other: &Self) -> bool {
        (**self).key_eq(*other)
    }
}

impl<T: MapKey + ?Sized> MapKey for Box<T> {
    const REFLEXIVE: bool = T::REFLEXIVE;
    const NEEDS_KEY_UPDATE: bool = T::NEEDS_KEY_UPDATE;

    #[inline]
    fn hash_key<H: Hasher>(&self, state: &mut H) {
        (**self).hash_key(state)
    }

    #[inline]
    fn key_eq(&self, other: &Self) -> bool {
        (**self).key_eq(&**other)
    }
}

impl<T: MapKey> MapKey for [T] {
    const REFLEXIVE: bool = T::REFLEXIVE;
    const NEEDS_KEY_UPDATE: bool = T::NEEDS_KEY_UPDATE;

    fn hash_key<H: Hasher>(&self, state: &mut H) {
        self.len().hash(state);
        for item in self {
            item.hash_key(state);
        }
    }

    fn key_eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| a.key_eq(b))
    }
}

impl<T: MapKey> MapKey for Vec<T> {
    const REFLEXIVE: bool = T::REFLEXIVE;
    const NEEDS_KEY_UPDATE: bool = T::NEEDS_KEY_UPDATE;

    #[inline]
    fn hash_key<H: Hasher>(&self, state: &mut H) {
        self.as_slice().hash_key(state)
    }

    #[inline]
    fn key_eq(&self, other: &Self) -> bool {
        self.as_slice().key_eq(other.as_slice())
    }
}

impl<T: MapKey> MapKey for Option<T> {
    const REFLEXIVE: bool = T::REFLEXIVE;
    const NEEDS_KEY_UPDATE: bool = T::NEEDS_KEY_UPDATE;

    fn hash_key<H: Hasher>(&self, state: &mut H) {
        match self {
            None => state.write_u8(0),
            Some(v) => {
                state.write_u8(1);
                v.hash_key(state);
            }
        }
    }

    fn key_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (None, None) => true,
            (Some(a), Some(b)) => a.key_eq(b),
            _ => false,
        }
    }
}

macro_rules! tuple_key {
    ($(($($name:ident $idx:tt),+)),+) => {
        $(
            impl<$($name: MapKey),+> MapKey for ($($name,)+) {
                const REFLEXIVE: bool = true $(&& $name::REFLEXIVE)+;
                const NEEDS_KEY_UPDATE: bool = false $(|| $name::NEEDS_KEY_UPDATE)+;

                #[inline]
                fn hash_key<H: Hasher>(&self, state: &mut H) {
                    $(self.$idx.hash_key(state);)+
                }

                #[inline]
                fn key_eq(&self, other: &Self) -> bool {
                    true $(&& self.$idx.key_eq(&other.$idx))+
                }
            }
        )+
    };
}

tuple_key!((A 0, B 1), (A 0, B 1, C 2), (A 0, B 1, C 2, D 3));
