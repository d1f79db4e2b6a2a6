//! The copy-on-write backing allocation: metadata bytes plus element
//! slots, sized together by `scale`.
//!
//! spec.md §4.5 describes a single tail-allocated block. This crate
//! allocates metadata and slots as two separate boxed slices instead of
//! one manually-laid-out block — the pair is still invisible to callers
//! (nothing outside this module observes two allocations instead of
//! one), and it avoids hand-rolled unsafe layout/alignment arithmetic in
//! a crate that is never run through the compiler during review. See
//! DESIGN.md for the full rationale.

use std::collections::TryReserveError;
use std::hash::Hash;
use std::mem::MaybeUninit;

use super::{capacity_for_scale, insert_at, lookup_first, DeleteDelegate, MapEntry};
use crate::bitset::Bitset;
use crate::sip::Hasher;

/// Allocation failed while growing or copying table storage. The only
/// recoverable error this crate has — every other failure mode is
/// either a precondition violation (panics) or a normal `Option::None`.
#[derive(Debug, thiserror::Error)]
#[error("failed to allocate hash table storage: {0}")]
pub struct CapacityError(#[from] TryReserveError);

/// Hashes one element: a fresh [`Hasher`] keyed by the process secret,
/// with the table's `seed` mixed into the stream ahead of the element's
/// own bits (spec.md §4.6's "XOR-mix `seed` into the first two appended
/// words, or call an overridable extra-seed injection" — here realized
/// as prepending `seed` as the first appended word).
pub(crate) fn hash_element<T: Hash + ?Sized>(secret: (u64, u64), seed: u64, value: &T) -> u64 {
    let mut hasher = Hasher::new(secret.0, secret.1);
    hasher.append_u64(seed);
    value.hash(&mut hasher);
    hasher.finalize()
}

/// Tail-allocated-in-spirit storage for one hash table generation:
/// `bucketCount` metadata bytes and `bucketCount` element slots, always
/// allocated and freed together.
pub(crate) struct Storage<T> {
    metadata: Box<[MapEntry]>,
    slots: Box<[MaybeUninit<T>]>,
    count: usize,
    scale: u32,
}

impl<T> Storage<T> {
    /// The process-wide immutable empty configuration: `scale = 0`,
    /// `count = 0`, `capacity = 0` (spec.md §4.5). Every container
    /// created "empty" gets one of these; they are cheap enough (one
    /// metadata byte, one slot) that this crate allocates a fresh one
    /// per empty container rather than sharing a literal process-wide
    /// singleton — see DESIGN.md for why that optimization was dropped.
    pub(crate) fn empty() -> Storage<T> {
        Storage::with_scale(0)
    }

    pub(crate) fn with_scale(scale: u32) -> Storage<T> {
        Storage::try_with_scale(scale).expect("allocation failure while allocating hash table storage")
    }

    pub(crate) fn try_with_scale(scale: u32) -> Result<Storage<T>, CapacityError> {
        let bucket_count = 1usize << scale;

        let mut metadata = Vec::new();
        metadata.try_reserve_exact(bucket_count)?;
        metadata.resize(bucket_count, MapEntry::EMPTY);

        let mut slots = Vec::new();
        slots.try_reserve_exact(bucket_count)?;
        slots.resize_with(bucket_count, MaybeUninit::uninit);

        Ok(Storage {
            metadata: metadata.into_boxed_slice(),
            slots: slots.into_boxed_slice(),
            count: 0,
            scale,
        })
    }

    #[inline]
    pub(crate) fn scale(&self) -> u32 {
        self.scale
    }

    /// `seed = scale`, the current (non-upgraded) per-capacity seeding
    /// strategy from spec.md §9: it keeps two same-capacity tables from
    /// sharing identical bucket orderings across a naive copy.
    #[inline]
    pub(crate) fn seed(&self) -> u64 {
        self.scale as u64
    }

    #[inline]
    pub(crate) fn bucket_count(&self) -> usize {
        self.metadata.len()
    }

    #[inline]
    pub(crate) fn bucket_mask(&self) -> usize {
        self.bucket_count() - 1
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        capacity_for_scale(self.scale)
    }

    #[inline]
    pub(crate) fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub(crate) fn metadata(&self) -> &[MapEntry] {
        &self.metadata
    }

    #[inline]
    pub(crate) fn is_occupied(&self, bucket: usize) -> bool {
        self.metadata[bucket].occupied()
    }

    /// A fresh [`Bitset`] view of which buckets are occupied, derived
    /// from metadata. [`crate::index`]'s skip-to-next-occupied scan
    /// walks this a word at a time rather than testing one bucket at a
    /// time against `metadata` directly.
    pub(crate) fn occupancy(&self) -> Bitset {
        let mut view = Bitset::new(self.bucket_count());
        for bucket in 0..self.bucket_count() {
            if self.is_occupied(bucket) {
                view.insert(bucket);
            }
        }
        view
    }

    #[inline]
    pub(crate) fn get(&self, bucket: usize) -> &T {
        debug_assert!(self.is_occupied(bucket));
        unsafe { self.slots[bucket].assume_init_ref() }
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, bucket: usize) -> &mut T {
        debug_assert!(self.is_occupied(bucket));
        unsafe { self.slots[bucket].assume_init_mut() }
    }

    /// Marks `bucket` occupied and writes `value` into its slot.
    /// Precondition: `bucket` was returned by a matching `lookup_first`/
    /// `lookup_next` and is unoccupied.
    pub(crate) fn insert(&mut self, bucket: usize, hash: u64, value: T) {
        insert_at(&mut self.metadata, bucket, hash, self.scale);
        self.slots[bucket].write(value);
        self.count += 1;
    }

    /// Reads the element out of `bucket` without touching metadata or
    /// `count` — callers finish the bookkeeping (clear the bucket via
    /// `delete_with_repair`, decrement `count`).
    ///
    /// # Safety (precondition)
    /// `bucket` must be occupied, and the caller must not read it again
    /// without rewriting it first — this leaves the slot in a logically
    /// moved-from state that only metadata (cleared by the caller)
    /// prevents from being dropped twice.
    pub(crate) fn take(&mut self, bucket: usize) -> T {
        debug_assert!(self.is_occupied(bucket));
        unsafe { self.slots[bucket].assume_init_read() }
    }

    pub(crate) fn lookup_first(&self, hash: u64) -> (usize, bool) {
        lookup_first(&self.metadata, hash, self.bucket_mask(), self.scale)
    }

    pub(crate) fn lookup_next(&self, hash: u64, after: usize) -> (usize, bool) {
        super::lookup_next(&self.metadata, hash, after, self.bucket_mask(), self.scale)
    }

    /// Removes the occupied bucket at `bucket` and repairs the probe
    /// chain, returning the removed element.
    pub(crate) fn remove_at(&mut self, bucket: usize, hash: u64, secret: (u64, u64)) -> T
    where
        T: Hash,
    {
        let removed = self.take(bucket);
        let bucket_mask = self.bucket_mask();
        let seed = self.seed();
        let mut delegate = Delegate {
            slots: &mut self.slots,
            bucket_mask,
            seed,
            secret,
        };
        super::delete_with_repair(&mut self.metadata, bucket_mask, bucket, hash, &mut delegate);
        self.count -= 1;
        removed
    }

    /// Deep-copies every occupied element into a freshly allocated
    /// `Storage` of the same scale (spec.md §4.5's `copy`) — the COW
    /// escape hatch a facade takes when it must mutate through a
    /// non-uniquely-referenced handle.
    pub(crate) fn try_deep_clone(&self) -> Result<Storage<T>, CapacityError>
    where
        T: Clone,
    {
        let mut new_storage = Storage::try_with_scale(self.scale)?;
        new_storage.metadata.copy_from_slice(&self.metadata);
        for bucket in 0..self.bucket_count() {
            if self.is_occupied(bucket) {
                new_storage.slots[bucket].write(self.get(bucket).clone());
            }
        }
        new_storage.count = self.count;
        Ok(new_storage)
    }

    pub(crate) fn deep_clone(&self) -> Storage<T>
    where
        T: Clone,
    {
        self.try_deep_clone()
            .expect("allocation failure while copying hash table storage")
    }

    /// Clones every occupied element into a freshly allocated `Storage`
    /// of `new_scale`, rehashing each one against the new scale's seed
    /// (spec.md §4.6 step 3: "Growth triggers an unconditional rehash
    /// because the new `scale` changes the payload and bucket mapping").
    ///
    /// Takes `&self` rather than consuming elements out of the original:
    /// growth and the copy-on-write "not uniquely referenced" path both
    /// reduce to "build a new `Storage` from this one", so a shared
    /// read-only pass here lets both facades reuse the same method
    /// instead of needing a destructive, unique-storage-only variant.
    pub(crate) fn try_grow(&self, new_scale: u32, secret: (u64, u64)) -> Result<Storage<T>, CapacityError>
    where
        T: Hash + Clone,
    {
        debug_assert!(new_scale > self.scale);
        let mut new_storage = Storage::try_with_scale(new_scale)?;
        for bucket in 0..self.bucket_count() {
            if self.is_occupied(bucket) {
                let value = self.get(bucket).clone();
                let hash = hash_element(secret, new_storage.seed(), &value);
                let (slot, found) = new_storage.lookup_first(hash);
                debug_assert!(!found, "rehash produced a duplicate bucket match");
                new_storage.insert(slot, hash, value);
            }
        }
        Ok(new_storage)
    }

    pub(crate) fn grow(&self, new_scale: u32, secret: (u64, u64)) -> Storage<T>
    where
        T: Hash + Clone,
    {
        self.try_grow(new_scale, secret)
            .expect("allocation failure while growing hash table storage")
    }
}

impl<T> Drop for Storage<T> {
    fn drop(&mut self) {
        for bucket in 0..self.metadata.len() {
            if self.metadata[bucket].occupied() {
                unsafe {
                    std::ptr::drop_in_place(self.slots[bucket].as_mut_ptr());
                }
            }
        }
    }
}

/// Holds only the two fields `delete_with_repair`'s delegate calls
/// actually touch (slots, not metadata — the caller already holds
/// `&mut self.metadata` for the repair walk itself, so this borrows the
/// disjoint field instead of all of `Storage` to avoid a second,
/// overlapping mutable borrow through `storage.metadata`).
struct Delegate<'a, T> {
    slots: &'a mut [MaybeUninit<T>],
    bucket_mask: usize,
    seed: u64,
    secret: (u64, u64),
}

impl<'a, T: Hash> DeleteDelegate for Delegate<'a, T> {
    fn ideal_bucket(&self, bucket: usize) -> usize {
        let value = unsafe { self.slots[bucket].assume_init_ref() };
        let hash = hash_element(self.secret, self.seed, value);
        super::ideal_bucket(hash, self.bucket_mask)
    }

    fn move_element(&mut self, from: usize, to: usize) {
        let value = unsafe { self.slots[from].assume_init_read() };
        self.slots[to].write(value);
    }
}
