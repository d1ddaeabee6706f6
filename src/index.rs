//! Typed indices into per-function arenas (IR registers, cells and blocks).

use std::{fmt::Debug, hash::Hash, marker::PhantomData};

/// Implemented by every index newtype
pub trait Index: Copy + Eq + Hash + Debug + 'static {
    fn new(index: usize) -> Self;

    fn index(self) -> usize;
}

/// Declares a `u32` newtype implementing [`Index`]
macro_rules! simple_index {
    ($(#[$attr:meta])* $vis:vis struct $name:ident;) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        $vis struct $name(u32);

        impl $crate::index::Index for $name {
            fn new(index: usize) -> Self {
                Self(index as u32)
            }

            fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

pub(crate) use simple_index;

/// Append-only arena addressed by one index type. Elements never move, so an
/// index handed out by `push` stays valid for the arena's lifetime.
pub struct IndexVec<I: Index, T> {
    entries: Vec<T>,
    _marker: PhantomData<fn(&I)>,
}

impl<I: Index, T> IndexVec<I, T> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Stores `value` and returns its index
    pub fn push(&mut self, value: T) -> I {
        let index = self.next_index();
        self.entries.push(value);
        index
    }

    /// The index the next `push` will return
    pub fn next_index(&self) -> I {
        I::new(self.entries.len())
    }

    pub fn get(&self, index: I) -> Option<&T> {
        self.entries.get(index.index())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<I: Index, T> Default for IndexVec<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Index, T: Clone> Clone for IndexVec<I, T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            _marker: PhantomData,
        }
    }
}

impl<I: Index, T: Debug> Debug for IndexVec<I, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().enumerate())
            .finish()
    }
}

impl<'a, I: Index, T> IntoIterator for &'a IndexVec<I, T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<I: Index, T> core::ops::Index<I> for IndexVec<I, T> {
    type Output = T;

    fn index(&self, index: I) -> &T {
        &self.entries[index.index()]
    }
}

impl<I: Index, T> core::ops::IndexMut<I> for IndexVec<I, T> {
    fn index_mut(&mut self, index: I) -> &mut T {
        &mut self.entries[index.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    simple_index! {
        struct TestId;
    }

    #[test]
    fn push_returns_sequential_indices() {
        let mut values: IndexVec<TestId, &str> = IndexVec::new();

        let first = values.push("a");
        let second = values.push("b");

        assert_eq!(first.index(), 0);
        assert_eq!(second.index(), 1);
        assert_eq!(values[second], "b");
        assert_eq!(values.next_index().index(), 2);
        assert_eq!(values.iter().copied().collect::<Vec<_>>(), ["a", "b"]);
    }

    #[test]
    fn get_out_of_bounds_is_none() {
        let values: IndexVec<TestId, u8> = IndexVec::new();

        assert!(values.get(TestId::new(3)).is_none());
        assert!(values.is_empty());
    }
}
