use std::{
    fmt::{Debug, Formatter},
    hash::Hash,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use bimap::BiHashMap;
use itertools::Itertools;

use super::{Id, Set, SetError, NO_ID};

const WORD_BITS: usize = u64::BITS as usize;

/// A bijective registry between values of `T` and dense positive [`Id`]s.
///
/// Registries are shared (through an [`Arc`]) by every [`BitSet`] built over them, and new values
/// can be registered through a shared reference.
pub struct BitGrammar<T: Eq + Hash> {
    inner: RwLock<Registry<T>>,
}

struct Registry<T: Eq + Hash> {
    ids: BiHashMap<T, Id>,
    /// The largest id ever bound.  Fresh ids are allocated above this, so ids bound explicitly
    /// with [`BitGrammar::add_as`] are never handed out twice.
    high_water: Id,
}

impl<T: Eq + Hash + Clone> BitGrammar<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Registry {
                ids: BiHashMap::new(),
                high_water: NO_ID,
            }),
        }
    }

    /// Returns the id of `value`, registering it under a fresh id if it hasn't been seen before.
    pub fn get_or_add(&self, value: T) -> Id {
        if let Some(&id) = self.read().ids.get_by_left(&value) {
            return id;
        }
        let mut registry = self.write();
        // Another thread may have registered `value` between the two locks
        if let Some(&id) = registry.ids.get_by_left(&value) {
            return id;
        }
        registry.high_water += 1;
        let id = registry.high_water;
        registry.ids.insert(value, id);
        id
    }

    /// Returns the id of `value`, or [`NO_ID`] if it has never been registered.
    pub fn get(&self, value: &T) -> Id {
        self.read().ids.get_by_left(value).copied().unwrap_or(NO_ID)
    }

    pub fn value_for_id(&self, id: Id) -> Result<T, SetError> {
        self.read()
            .ids
            .get_by_right(&id)
            .cloned()
            .ok_or(SetError::UnknownId(id))
    }

    /// Binds `value` to a specific `id`.  Binding the same pair twice is a no-op.
    pub fn add_as(&self, value: T, id: Id) -> Result<(), SetError> {
        if id == NO_ID {
            return Err(SetError::ZeroId);
        }
        let mut registry = self.write();
        let existing_id = registry.ids.get_by_left(&value).copied();
        let id_taken = registry.ids.contains_right(&id);
        match (existing_id, id_taken) {
            (Some(existing_id), _) if existing_id == id => Ok(()),
            (Some(existing_id), _) => Err(SetError::ValueTaken(existing_id)),
            (None, true) => Err(SetError::IdTaken(id)),
            (None, false) => {
                registry.ids.insert(value, id);
                registry.high_water = registry.high_water.max(id);
                Ok(())
            }
        }
    }

    /// The number of values registered so far
    pub fn len(&self) -> usize {
        self.read().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every registered `(id, value)` pair, sorted by id
    pub fn entries(&self) -> Vec<(Id, T)> {
        self.read()
            .ids
            .iter()
            .map(|(value, &id)| (id, value.clone()))
            .sorted_by_key(|(id, _)| *id)
            .collect_vec()
    }

    fn read(&self) -> RwLockReadGuard<Registry<T>> {
        // The registry is never left half-updated, so a poisoned lock is still usable
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<Registry<T>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Eq + Hash + Clone> Default for BitGrammar<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash + Clone + Debug> Debug for BitGrammar<T> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.debug_map().entries(self.entries()).finish()
    }
}

/// A growable set of values, stored as one bit per [`Id`] of its [`BitGrammar`].
pub struct BitSet<T: Eq + Hash> {
    grammar: Arc<BitGrammar<T>>,
    /// Bit `id % 64` of word `id / 64` is set iff `id` is in the set.  Trailing words may be zero.
    words: Vec<u64>,
}

impl<T: Eq + Hash + Clone> BitSet<T> {
    /// Creates an empty set over the ids of `grammar`
    pub fn new(grammar: &Arc<BitGrammar<T>>) -> Self {
        Self {
            grammar: grammar.clone(),
            words: Vec::new(),
        }
    }

    pub fn grammar(&self) -> &Arc<BitGrammar<T>> {
        &self.grammar
    }

    /// Adds an id directly, growing the set if needed.  Returns `true` if it wasn't present.
    /// [`NO_ID`] never names a value, so is never added.
    pub fn add_id(&mut self, id: Id) -> bool {
        if id == NO_ID {
            return false;
        }
        let (word, mask) = Self::locate(id);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let was_absent = self.words[word] & mask == 0;
        self.words[word] |= mask;
        was_absent
    }

    pub fn remove_id(&mut self, id: Id) -> bool {
        let (word, mask) = Self::locate(id);
        match self.words.get_mut(word) {
            Some(w) if *w & mask != 0 => {
                *w &= !mask;
                true
            }
            _ => false,
        }
    }

    pub fn contains_id(&self, id: Id) -> bool {
        let (word, mask) = Self::locate(id);
        self.words.get(word).map_or(false, |w| w & mask != 0)
    }

    /// Iterates over the ids in this set, in increasing order
    pub fn ids(&self) -> impl Iterator<Item = Id> + '_ {
        self.words
            .iter()
            .enumerate()
            .flat_map(|(word_idx, &word)| {
                (0..WORD_BITS)
                    .filter(move |bit| word & (1 << bit) != 0)
                    .map(move |bit| word_idx * WORD_BITS + bit)
            })
    }

    /// Number of words currently allocated.  Only ever grows through [`BitSet::add_id`] and
    /// [`Set::union_with`].
    pub fn capacity_words(&self) -> usize {
        self.words.len()
    }

    fn locate(id: Id) -> (usize, u64) {
        (id / WORD_BITS, 1 << (id % WORD_BITS))
    }

    #[track_caller]
    fn check_same_grammar(&self, other: &Self) {
        assert!(
            Arc::ptr_eq(&self.grammar, &other.grammar),
            "can't combine BitSets built over different BitGrammars"
        );
    }
}

impl<T: Eq + Hash + Clone> Set<T> for BitSet<T> {
    fn add(&mut self, value: T) -> bool {
        let id = self.grammar.get_or_add(value);
        self.add_id(id)
    }

    fn remove(&mut self, value: &T) -> bool {
        match self.grammar.get(value) {
            NO_ID => false,
            id => self.remove_id(id),
        }
    }

    fn contains(&self, value: &T) -> bool {
        match self.grammar.get(value) {
            NO_ID => false,
            id => self.contains_id(id),
        }
    }

    fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    fn intersects(&self, other: &Self) -> bool {
        self.check_same_grammar(other);
        self.words
            .iter()
            .zip(&other.words)
            .any(|(a, b)| a & b != 0)
    }

    fn union_with(&mut self, other: &Self) {
        self.check_same_grammar(other);
        if self.words.len() < other.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= b;
        }
    }

    fn intersect_with(&mut self, other: &Self) {
        self.check_same_grammar(other);
        for (idx, a) in self.words.iter_mut().enumerate() {
            *a &= other.words.get(idx).copied().unwrap_or(0);
        }
    }

    fn subtract_with(&mut self, other: &Self) {
        self.check_same_grammar(other);
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= !b;
        }
    }

    fn to_vec(&self) -> Vec<T> {
        self.ids()
            .filter_map(|id| self.grammar.value_for_id(id).ok())
            .collect()
    }
}

impl<T: Eq + Hash> Clone for BitSet<T> {
    fn clone(&self) -> Self {
        Self {
            grammar: self.grammar.clone(),
            words: self.words.clone(),
        }
    }
}

impl<T: Eq + Hash + Clone> PartialEq for BitSet<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.grammar, &other.grammar) && self.ids().eq(other.ids())
    }
}

impl<T: Eq + Hash + Clone> Eq for BitSet<T> {}

impl<T: Eq + Hash + Clone + Debug> Debug for BitSet<T> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.debug_set().entries(self.to_vec()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::set::{Set, SetError, NO_ID};

    use super::{BitGrammar, BitSet};

    #[test]
    fn grammar_ids() {
        let grammar = BitGrammar::<&str>::new();
        assert_eq!(grammar.get(&"a"), NO_ID);
        assert_eq!(grammar.get_or_add("a"), 1);
        assert_eq!(grammar.get_or_add("b"), 2);
        assert_eq!(grammar.get_or_add("a"), 1);
        assert_eq!(grammar.get(&"b"), 2);
        assert_eq!(grammar.value_for_id(2), Ok("b"));
        assert_eq!(grammar.value_for_id(3), Err(SetError::UnknownId(3)));
        assert_eq!(grammar.value_for_id(NO_ID), Err(SetError::UnknownId(0)));
        assert_eq!(grammar.len(), 2);
    }

    #[test]
    fn grammar_add_as() {
        let grammar = BitGrammar::<&str>::new();
        assert_eq!(grammar.add_as("x", 10), Ok(()));
        // Idempotent for the same pair
        assert_eq!(grammar.add_as("x", 10), Ok(()));
        assert_eq!(grammar.add_as("y", 10), Err(SetError::IdTaken(10)));
        assert_eq!(grammar.add_as("x", 11), Err(SetError::ValueTaken(10)));
        assert_eq!(grammar.add_as("z", 0), Err(SetError::ZeroId));
        // Fresh ids never collide with explicit bindings
        assert_eq!(grammar.get_or_add("y"), 11);
        assert_eq!(grammar.entries(), vec![(10, "x"), (11, "y")]);
    }

    #[test]
    fn zero_id_is_never_a_member() {
        let grammar = Arc::new(BitGrammar::<&str>::new());
        let mut set = BitSet::new(&grammar);
        assert!(!set.add_id(NO_ID));
        assert!(!set.contains_id(NO_ID));
        assert_eq!(set.ids().count(), 0);
        assert_eq!(set.capacity_words(), 0);
        assert!(set.add_id(3));
        assert!(!set.add_id(NO_ID));
        assert_eq!(set.ids().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn union_grows_receiver_only() {
        let grammar = Arc::new(BitGrammar::<usize>::new());
        for v in 0..200 {
            grammar.get_or_add(v);
        }
        let mut small = BitSet::new(&grammar);
        small.add_id(3);
        let mut large = BitSet::new(&grammar);
        large.add_id(3);
        large.add_id(150);

        let mut intersection = small.clone();
        intersection.intersect_with(&large);
        assert_eq!(intersection.capacity_words(), 1);
        assert_eq!(intersection.ids().collect::<Vec<_>>(), vec![3]);

        let mut difference = small.clone();
        difference.subtract_with(&large);
        assert_eq!(difference.capacity_words(), 1);
        assert!(difference.is_empty());

        small.union_with(&large);
        assert_eq!(small.capacity_words(), large.capacity_words());
        assert_eq!(small.ids().collect::<Vec<_>>(), vec![3, 150]);
        assert_eq!(small, large);
    }

    #[test]
    fn large_minus_small_keeps_high_bits() {
        let grammar = Arc::new(BitGrammar::<usize>::new());
        let mut large = BitSet::new(&grammar);
        large.add_id(1);
        large.add_id(130);
        let mut small = BitSet::new(&grammar);
        small.add_id(1);
        large.subtract_with(&small);
        assert_eq!(large.ids().collect::<Vec<_>>(), vec![130]);
        assert!(!large.intersects(&small));
    }

    #[test]
    #[should_panic(expected = "different BitGrammars")]
    fn mismatched_grammars_panic() {
        let a = BitSet::<u8>::new(&Arc::new(BitGrammar::new()));
        let b = BitSet::<u8>::new(&Arc::new(BitGrammar::new()));
        a.union(&b);
    }
}
