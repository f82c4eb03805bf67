//! Set data structures used while analysing grammars.
//!
//! Two implementations share the [`Set`] interface:
//! - [`HashSet`], a thin wrapper over [`std::collections::HashSet`] which can hold anything
//!   hashable.
//! - [`BitSet`], a dense bit-vector over the ids handed out by a [`BitGrammar`].  Every
//!   [`BitSet`] is tied to exactly one [`BitGrammar`], and combining sets from different
//!   registries is a programmer error which panics.

mod bit_set;
mod hash_set;

use std::fmt::{Display, Formatter};

pub use bit_set::{BitGrammar, BitSet};
pub use hash_set::HashSet;

/// Dense identifier of a value registered in a [`BitGrammar`].  Real ids start at `1`; `0` is
/// reserved to mean 'absent'.
pub type Id = usize;

/// The id returned by lookups for values which have never been registered.
pub const NO_ID: Id = 0;

/// Operations shared by every set implementation in this module.
///
/// The `*_with` methods modify `self` in place; [`union`](Set::union),
/// [`intersect`](Set::intersect) and [`subtract`](Set::subtract) return fresh sets.
pub trait Set<T>: Clone {
    /// Adds `value`, returning `true` if it wasn't already present.
    fn add(&mut self, value: T) -> bool;
    /// Removes `value`, returning `true` if it was present.
    fn remove(&mut self, value: &T) -> bool;
    fn contains(&self, value: &T) -> bool;
    fn len(&self) -> usize;
    fn clear(&mut self);
    /// Returns `true` if `self` and `other` have at least one element in common.
    fn intersects(&self, other: &Self) -> bool;

    fn union_with(&mut self, other: &Self);
    fn intersect_with(&mut self, other: &Self);
    fn subtract_with(&mut self, other: &Self);

    /// The elements of `self`, in no particular order.
    fn to_vec(&self) -> Vec<T>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn union(&self, other: &Self) -> Self {
        let mut out = self.clone();
        out.union_with(other);
        out
    }

    fn intersect(&self, other: &Self) -> Self {
        let mut out = self.clone();
        out.intersect_with(other);
        out
    }

    fn subtract(&self, other: &Self) -> Self {
        let mut out = self.clone();
        out.subtract_with(other);
        out
    }
}

/// The ways that lookups or explicit bindings in a [`BitGrammar`] can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetError {
    /// No value has been bound to this id
    UnknownId(Id),
    /// `0` can never be bound, since it means 'absent'
    ZeroId,
    /// The id is already bound to a different value
    IdTaken(Id),
    /// The value is already bound, but to a different id (the one given here)
    ValueTaken(Id),
}

impl Display for SetError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            SetError::UnknownId(id) => write!(f, "no value is bound to id {}", id),
            SetError::ZeroId => write!(f, "id 0 is reserved and can't be bound"),
            SetError::IdTaken(id) => write!(f, "id {} is already bound to another value", id),
            SetError::ValueTaken(id) => write!(f, "value is already bound to id {}", id),
        }
    }
}

impl std::error::Error for SetError {}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;

    /// Checks the cardinality laws which every [`Set`] must satisfy for a pair of sets
    #[track_caller]
    fn check_laws<T, S: Set<T> + std::fmt::Debug>(a: &S, b: &S) {
        let union = a.union(b);
        let intersection = a.intersect(b);
        let difference = a.subtract(b);

        assert!(union.len() >= a.len().max(b.len()));
        assert!(union.len() <= a.len() + b.len());
        assert!(intersection.len() <= a.len().min(b.len()));
        assert_eq!(a.len(), intersection.len() + difference.len());
        assert_eq!(union.len() + intersection.len(), a.len() + b.len());
        assert_eq!(a.intersects(b), !intersection.is_empty());
        for v in difference.to_vec() {
            assert!(a.contains(&v));
            assert!(!b.contains(&v));
        }
    }

    fn random_values(rng: &mut StdRng) -> Vec<u32> {
        let len = rng.gen_range(0..40);
        (0..len).map(|_| rng.gen_range(0..100)).collect()
    }

    #[test]
    fn hash_set_laws() {
        let mut rng = StdRng::seed_from_u64(0x5e7);
        for _ in 0..200 {
            let a: HashSet<u32> = random_values(&mut rng).into_iter().collect();
            let b: HashSet<u32> = random_values(&mut rng).into_iter().collect();
            check_laws(&a, &b);
        }
    }

    #[test]
    fn bit_set_laws() {
        let mut rng = StdRng::seed_from_u64(0xb175);
        let grammar = Arc::new(BitGrammar::<u32>::new());
        for _ in 0..200 {
            let mut a = BitSet::new(&grammar);
            let mut b = BitSet::new(&grammar);
            for v in random_values(&mut rng) {
                a.add(v);
            }
            for v in random_values(&mut rng) {
                b.add(v);
            }
            check_laws(&a, &b);
        }
    }

    #[test]
    fn add_remove_contains() {
        let grammar = Arc::new(BitGrammar::<String>::new());
        let mut bits = BitSet::new(&grammar);
        let mut hashed = HashSet::new();

        for word in ["if", "else", "while", "if"].iter() {
            let newly_added = bits.add(word.to_string());
            assert_eq!(newly_added, hashed.add(word.to_string()));
            assert!(bits.contains(&word.to_string()));
            assert!(hashed.contains(&word.to_string()));
        }
        assert_eq!(bits.len(), 3);
        assert_eq!(hashed.len(), 3);

        assert!(bits.remove(&"else".to_owned()));
        assert!(hashed.remove(&"else".to_owned()));
        assert!(!bits.contains(&"else".to_owned()));
        assert!(!hashed.contains(&"else".to_owned()));
        assert!(!bits.remove(&"else".to_owned()));
        assert!(!bits.remove(&"never-seen".to_owned()));
        assert_eq!(bits.len(), 2);

        bits.clear();
        assert!(bits.is_empty());
    }
}
