//! Opaque position within one [`Storage`] generation.
//!
//! `Index` identifies a bucket the way spec.md §4.7 describes: an
//! opaque integer meaningful only against the particular allocation
//! that produced it. Using one against any other allocation — including
//! a later generation of the "same" container, after a copy-on-write
//! fork or a growth rehash — is a programming error, checked with a
//! pointer-identity comparison rather than a counter field.

use crate::raw::storage::Storage;

const INVALID_INDEX_MESSAGE: &str = "Attempting to access Collection elements using an invalid Index";

/// A position within a `Storage`'s buckets, tagged with the identity of
/// the allocation it was produced from. `endIndex` is represented as
/// `bucket == storage.bucket_count()`.
pub(crate) struct Index<T> {
    bucket: usize,
    generation: *const Storage<T>,
}

// Carries a bucket and a bare identity tag, never the data itself, so
// it is freely `Copy` regardless of `T`.
impl<T> Clone for Index<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Index<T> {}

impl<T> std::fmt::Debug for Index<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index").field("bucket", &self.bucket).finish()
    }
}

impl<T> PartialEq for Index<T> {
    fn eq(&self, other: &Self) -> bool {
        self.bucket == other.bucket && std::ptr::eq(self.generation, other.generation)
    }
}
impl<T> Eq for Index<T> {}

impl<T> Index<T> {
    fn new(bucket: usize, storage: &Storage<T>) -> Index<T> {
        Index {
            bucket,
            generation: storage as *const Storage<T>,
        }
    }

    fn check_generation(&self, storage: &Storage<T>) {
        assert!(
            std::ptr::eq(self.generation, storage as *const Storage<T>),
            "{INVALID_INDEX_MESSAGE}"
        );
    }

    /// The first occupied bucket in `storage`, or `endIndex` if empty.
    pub(crate) fn start(storage: &Storage<T>) -> Index<T> {
        Index::new(first_occupied_at_or_after(storage, 0), storage)
    }

    /// `endIndex`: one past the last bucket, valid only for comparison.
    pub(crate) fn end(storage: &Storage<T>) -> Index<T> {
        Index::new(storage.bucket_count(), storage)
    }

    pub(crate) fn is_end(&self, storage: &Storage<T>) -> bool {
        self.check_generation(storage);
        self.bucket >= storage.bucket_count()
    }

    /// Advances to the next occupied bucket, or `endIndex`.
    pub(crate) fn advance(&self, storage: &Storage<T>) -> Index<T> {
        self.check_generation(storage);
        Index::new(first_occupied_at_or_after(storage, self.bucket + 1), storage)
    }

    pub(crate) fn get<'a>(&self, storage: &'a Storage<T>) -> &'a T {
        self.check_generation(storage);
        assert!(!self.is_end(storage) && storage.is_occupied(self.bucket), "{INVALID_INDEX_MESSAGE}");
        storage.get(self.bucket)
    }
}

/// The first occupied bucket at or after `start`, or `bucket_count` if
/// none remain. Scans a [`Storage::occupancy`] view word at a time via
/// [`crate::bitset::Bitset::next_set_at_or_after`] rather than testing
/// buckets one at a time.
fn first_occupied_at_or_after<T>(storage: &Storage<T>, start: usize) -> usize {
    storage
        .occupancy()
        .next_set_at_or_after(start)
        .unwrap_or_else(|| storage.bucket_count())
}

/// Ascending iterator over a `Storage`'s occupied buckets. Borrows the
/// storage for its whole lifetime, which is how this crate realizes
/// spec.md §4.6's "any intervening mutation invalidates outstanding
/// iterators" — a COW facade can't mutate through a borrowed reference,
/// so the borrow checker enforces it instead of a generation check.
pub(crate) struct Iter<'a, T> {
    storage: &'a Storage<T>,
    current: Index<T>,
}

impl<'a, T> Iter<'a, T> {
    pub(crate) fn new(storage: &'a Storage<T>) -> Iter<'a, T> {
        Iter {
            storage,
            current: Index::start(storage),
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        if self.current.is_end(self.storage) {
            return None;
        }
        let value = self.current.get(self.storage);
        self.current = self.current.advance(self.storage);
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::storage::hash_element;

    fn populated(values: &[i64]) -> Storage<i64> {
        let secret = (11u64, 22u64);
        let mut storage: Storage<i64> = Storage::with_scale(4);
        for &value in values {
            let hash = hash_element(secret, storage.seed(), &value);
            let mut probe = storage.lookup_first(hash);
            while probe.1 {
                probe = storage.lookup_next(hash, probe.0);
            }
            storage.insert(probe.0, hash, value);
        }
        storage
    }

    #[test]
    fn start_is_end_when_empty() {
        let storage: Storage<i64> = Storage::with_scale(4);
        assert_eq!(Index::start(&storage), Index::end(&storage));
    }

    #[test]
    fn iterates_every_inserted_element_once() {
        let storage = populated(&[1, 2, 3, 4, 5]);
        let mut seen: Vec<i64> = Iter::new(&storage).copied().collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn advance_skips_unoccupied_buckets() {
        let storage = populated(&[7]);
        let mut index = Index::start(&storage);
        assert!(!index.is_end(&storage));
        index = index.advance(&storage);
        assert!(index.is_end(&storage));
    }

    #[test]
    #[should_panic(expected = "invalid Index")]
    fn using_an_index_against_a_different_generation_panics() {
        let a = populated(&[1]);
        let b = populated(&[2]);
        let index = Index::start(&a);
        let _ = index.get(&b);
    }
}
