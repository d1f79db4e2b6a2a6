//! `HashMap<K, V>`: the same table engine as [`crate::set::HashSet`],
//! storing `(key, value)` pairs but hashed and compared on the key
//! alone (spec.md §AMBIENT-2 of SPEC_FULL.md — not a new algorithm, the
//! same `Storage<T>` instantiated with `T = Entry<K, V>`).

use std::hash::Hash;
use std::rc::Rc;

use crate::index::Iter as RawIter;
use crate::raw::scale_for_capacity;
use crate::raw::storage::{hash_element, CapacityError, Storage};
use crate::secret_key::{KeySource, SecretKey};

/// An element of the shared table engine that hashes and compares only
/// on `key` — the projection AMBIENT-2 describes, kept as a private
/// wrapper so `Storage<T>`'s algorithms never need to know a map's
/// value exists at all.
struct Entry<K, V> {
    key: K,
    value: V,
}

impl<K: Clone, V: Clone> Clone for Entry<K, V> {
    fn clone(&self) -> Self {
        Entry {
            key: self.key.clone(),
            value: self.value.clone(),
        }
    }
}

impl<K: Hash, V> Hash for Entry<K, V> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

/// A dictionary with copy-on-write value semantics, mirroring
/// [`crate::set::HashSet`] — see its docs for the COW mechanics, which
/// are identical here.
pub struct HashMap<K, V> {
    storage: Rc<Storage<Entry<K, V>>>,
    secret: SecretKey,
}

impl<K, V> HashMap<K, V> {
    pub fn new() -> HashMap<K, V> {
        HashMap {
            storage: Rc::new(Storage::empty()),
            secret: SecretKey::global(),
        }
    }

    pub fn with_key_source(source: KeySource) -> HashMap<K, V> {
        HashMap {
            storage: Rc::new(Storage::empty()),
            secret: SecretKey::with_source(source),
        }
    }

    pub fn with_capacity(capacity: usize) -> HashMap<K, V> {
        HashMap {
            storage: Rc::new(Storage::with_scale(scale_for_capacity(capacity))),
            secret: SecretKey::global(),
        }
    }

    pub fn try_with_capacity(capacity: usize) -> Result<HashMap<K, V>, CapacityError> {
        Ok(HashMap {
            storage: Rc::new(Storage::try_with_scale(scale_for_capacity(capacity))?),
            secret: SecretKey::global(),
        })
    }

    pub fn len(&self) -> usize {
        self.storage.count()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.count() == 0
    }

    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: RawIter::new(&self.storage),
        }
    }
}

impl<K: Hash + Eq, V> HashMap<K, V> {
    pub fn contains_key(&self, key: &K) -> bool {
        self.locate(key).is_some()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.locate(key).map(|bucket| &self.storage.get(bucket).value)
    }

    fn locate(&self, key: &K) -> Option<usize> {
        let hash = hash_element(self.secret.keys(), self.storage.seed(), key);
        let mut probe = self.storage.lookup_first(hash);
        while probe.1 {
            if &self.storage.get(probe.0).key == key {
                return Some(probe.0);
            }
            probe = self.storage.lookup_next(hash, probe.0);
        }
        None
    }

    fn hash_of(&self, key: &K) -> u64 {
        hash_element(self.secret.keys(), self.storage.seed(), key)
    }
}

impl<K: Hash + Eq + Clone, V: Clone> HashMap<K, V> {
    /// Inserts `(key, value)`, returning the prior value for `key` if
    /// one existed (the mapping's analogue of spec.md §4.6 `update`).
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.try_insert(key, value)
            .expect("allocation failure while inserting into HashMap")
    }

    pub fn try_insert(&mut self, key: K, value: V) -> Result<Option<V>, CapacityError> {
        self.make_unique()?;
        loop {
            let hash = self.hash_of(&key);
            let mut probe = self.storage.lookup_first(hash);
            while probe.1 {
                if self.storage.get(probe.0).key == key {
                    let storage = unique_storage(&mut self.storage);
                    let prior = std::mem::replace(&mut storage.get_mut(probe.0).value, value);
                    return Ok(Some(prior));
                }
                probe = self.storage.lookup_next(hash, probe.0);
            }
            if self.storage.count() == self.storage.capacity() {
                self.grow()?;
                continue;
            }
            let storage = unique_storage(&mut self.storage);
            storage.insert(probe.0, hash, Entry { key, value });
            return Ok(None);
        }
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let hash = self.hash_of(key);
        let mut probe = self.storage.lookup_first(hash);
        let mut found = None;
        while probe.1 {
            if &self.storage.get(probe.0).key == key {
                found = Some(probe.0);
                break;
            }
            probe = self.storage.lookup_next(hash, probe.0);
        }
        let bucket = found?;
        self.make_unique()
            .expect("allocation failure while removing from HashMap");
        let storage = unique_storage(&mut self.storage);
        Some(storage.remove_at(bucket, hash, self.secret.keys()).value)
    }

    pub fn reserve(&mut self, additional: usize) {
        self.try_reserve(additional)
            .expect("allocation failure while reserving HashMap capacity")
    }

    pub fn try_reserve(&mut self, additional: usize) -> Result<(), CapacityError> {
        let target = self.storage.count() + additional;
        if target <= self.storage.capacity() {
            return Ok(());
        }
        let new_scale = scale_for_capacity(target).max(self.storage.scale() + 1);
        let grown = self.storage.try_grow(new_scale, self.secret.keys())?;
        self.storage = Rc::new(grown);
        Ok(())
    }

    fn make_unique(&mut self) -> Result<(), CapacityError> {
        if Rc::strong_count(&self.storage) > 1 {
            self.storage = Rc::new(self.storage.try_deep_clone()?);
        }
        Ok(())
    }

    fn grow(&mut self) -> Result<(), CapacityError> {
        let new_scale = self.storage.scale() + 1;
        let grown = self.storage.try_grow(new_scale, self.secret.keys())?;
        self.storage = Rc::new(grown);
        Ok(())
    }
}

impl<K, V> Default for HashMap<K, V> {
    fn default() -> HashMap<K, V> {
        HashMap::new()
    }
}

impl<K, V> Clone for HashMap<K, V> {
    fn clone(&self) -> HashMap<K, V> {
        HashMap {
            storage: Rc::clone(&self.storage),
            secret: self.secret,
        }
    }
}

impl<K: Hash + Eq + Clone, V: Clone> FromIterator<(K, V)> for HashMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> HashMap<K, V> {
        let mut map = HashMap::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

fn unique_storage<K, V>(storage: &mut Rc<Storage<Entry<K, V>>>) -> &mut Storage<Entry<K, V>> {
    Rc::get_mut(storage).expect("HashMap storage was not uniquely referenced after make_unique")
}

/// Borrowed iterator over a `HashMap`'s `(key, value)` pairs, in
/// ascending bucket order.
pub struct Iter<'a, K, V> {
    inner: RawIter<'a, Entry<K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<(&'a K, &'a V)> {
        self.inner.next().map(|entry| (&entry.key, &entry.value))
    }
}

impl<'a, K, V> IntoIterator for &'a HashMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}
