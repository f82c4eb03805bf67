use std::{collections::hash_set, hash::Hash, iter::FromIterator};

use super::Set;

/// A [`Set`] backed by a standard hash set.  Used where the elements aren't registered in any
/// [`BitGrammar`](super::BitGrammar), e.g. while computing first sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashSet<T: Eq + Hash> {
    inner: std::collections::HashSet<T>,
}

impl<T: Eq + Hash> HashSet<T> {
    pub fn new() -> Self {
        Self {
            inner: std::collections::HashSet::new(),
        }
    }

    pub fn iter(&self) -> hash_set::Iter<T> {
        self.inner.iter()
    }

    /// Keeps only the elements for which `f` returns `true`
    pub fn retain(&mut self, f: impl FnMut(&T) -> bool) {
        self.inner.retain(f)
    }
}

impl<T: Eq + Hash> Default for HashSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash + Clone> Set<T> for HashSet<T> {
    fn add(&mut self, value: T) -> bool {
        self.inner.insert(value)
    }

    fn remove(&mut self, value: &T) -> bool {
        self.inner.remove(value)
    }

    fn contains(&self, value: &T) -> bool {
        self.inner.contains(value)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn clear(&mut self) {
        self.inner.clear()
    }

    fn intersects(&self, other: &Self) -> bool {
        // Probe the larger set with the elements of the smaller one
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.inner.iter().any(|v| large.inner.contains(v))
    }

    fn union_with(&mut self, other: &Self) {
        self.inner.extend(other.inner.iter().cloned());
    }

    fn intersect_with(&mut self, other: &Self) {
        self.inner.retain(|v| other.inner.contains(v));
    }

    fn subtract_with(&mut self, other: &Self) {
        self.inner.retain(|v| !other.inner.contains(v));
    }

    fn to_vec(&self) -> Vec<T> {
        self.inner.iter().cloned().collect()
    }
}

impl<T: Eq + Hash> FromIterator<T> for HashSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

impl<T: Eq + Hash> Extend<T> for HashSet<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.inner.extend(iter)
    }
}

impl<'a, T: Eq + Hash> IntoIterator for &'a HashSet<T> {
    type Item = &'a T;
    type IntoIter = hash_set::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}
