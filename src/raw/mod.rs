//! The hash table's metadata: occupancy plus a 7-bit payload per bucket,
//! probing, and the backward-shift deletion repair.
//!
//! This module knows nothing about element storage — it operates purely
//! on a `&mut [MapEntry]` and a bucket mask, the same split `hashbrown`
//! (and this pack's `musli-zerocopy/src/swiss/raw/mod.rs`) draws between
//! `RawTableInner` (control bytes, probing) and `RawTable<T>` (element
//! storage). The probing and capacity math below are grounded on that
//! source; the deletion algorithm is not — `hashbrown`-style tables use
//! tombstones, this one does not, so backward-shift repair (spec.md
//! §4.4) is original to this crate.

pub(crate) mod storage;

/// One byte of table metadata: the high bit marks the bucket occupied,
/// the low 7 bits cache `(hash >> scale) & 0x7F` so most probe steps can
/// be rejected without ever touching the element or calling `Eq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct MapEntry(u8);

const OCCUPIED_BIT: u8 = 0x80;
const PAYLOAD_MASK: u8 = 0x7F;

impl MapEntry {
    pub(crate) const EMPTY: MapEntry = MapEntry(0);

    #[inline]
    pub(crate) fn occupied(self) -> bool {
        self.0 & OCCUPIED_BIT != 0
    }

    #[inline]
    pub(crate) fn payload(self) -> u8 {
        self.0 & PAYLOAD_MASK
    }

    #[inline]
    pub(crate) fn set(&mut self, payload: u8) {
        self.0 = OCCUPIED_BIT | (payload & PAYLOAD_MASK);
    }

    #[inline]
    pub(crate) fn clear(&mut self) {
        self.0 = 0;
    }
}

/// The 7-bit payload cached in a bucket's metadata byte for a given hash
/// and table scale (spec.md §3: "payload byte at an occupied bucket
/// equals `(hash >> scale) & 0x7F`").
#[inline]
pub(crate) fn payload_for(hash: u64, scale: u32) -> u8 {
    ((hash >> scale) & 0x7F) as u8
}

/// The bucket `hash` would sit in absent collisions.
#[inline]
pub(crate) fn ideal_bucket(hash: u64, bucket_mask: usize) -> usize {
    (hash as usize) & bucket_mask
}

#[inline]
pub(crate) fn succ(bucket: usize, bucket_mask: usize) -> usize {
    (bucket + 1) & bucket_mask
}

#[inline]
pub(crate) fn pred(bucket: usize, bucket_mask: usize) -> usize {
    bucket.wrapping_sub(1) & bucket_mask
}

/// The smallest `scale` such that `bucketCount * 3/4 >= capacity`, where
/// `bucketCount = 1 << scale` (spec.md §4.4).
pub(crate) fn scale_for_capacity(capacity: usize) -> u32 {
    let mut scale = 0u32;
    while capacity_for_scale(scale) < capacity {
        scale += 1;
    }
    scale
}

/// `floor(bucketCount * 3/4)` for `bucketCount = 1 << scale`.
#[inline]
pub(crate) fn capacity_for_scale(scale: u32) -> usize {
    ((1usize << scale) * 3) / 4
}

/// Starting at `hash & bucketMask`, walks occupied buckets looking for
/// one whose cached payload matches `hash`'s. Returns the first matching
/// bucket (`found = true`), or the first unoccupied bucket probed
/// (`found = false`) — exactly the slot a subsequent `insert` should use.
pub(crate) fn lookup_first(metadata: &[MapEntry], hash: u64, bucket_mask: usize, scale: u32) -> (usize, bool) {
    lookup_from(metadata, ideal_bucket(hash, bucket_mask), hash, bucket_mask, scale)
}

/// Continues probing past `after` for further payload matches — used
/// once the bucket `lookup_first` returned failed the element's `Eq`
/// check.
pub(crate) fn lookup_next(
    metadata: &[MapEntry],
    hash: u64,
    after: usize,
    bucket_mask: usize,
    scale: u32,
) -> (usize, bool) {
    lookup_from(metadata, succ(after, bucket_mask), hash, bucket_mask, scale)
}

fn lookup_from(metadata: &[MapEntry], start: usize, hash: u64, bucket_mask: usize, scale: u32) -> (usize, bool) {
    let target = payload_for(hash, scale);
    let mut bucket = start;
    loop {
        let entry = metadata[bucket];
        if !entry.occupied() {
            return (bucket, false);
        }
        if entry.payload() == target {
            return (bucket, true);
        }
        bucket = succ(bucket, bucket_mask);
    }
}

/// Marks `bucket` occupied with `hash`'s payload.
///
/// Precondition: `bucket` is unoccupied and was returned by a matching
/// `lookup_first`/`lookup_next` call. Violating it corrupts the
/// contiguous-chain invariant, so it's checked even in release builds.
pub(crate) fn insert_at(metadata: &mut [MapEntry], bucket: usize, hash: u64, scale: u32) {
    assert!(
        !metadata[bucket].occupied(),
        "HashTable::insert_at: bucket {} is already occupied",
        bucket
    );
    metadata[bucket].set(payload_for(hash, scale));
}

/// Capability the backward-shift repair needs from whatever owns the
/// element slots: where an occupied bucket's element *wants* to live,
/// and how to relocate one element from one bucket to another. A
/// closure pair would do just as well — this is a trait only so
/// `Storage<T>` can implement it directly against its own slots.
pub(crate) trait DeleteDelegate {
    fn ideal_bucket(&self, bucket: usize) -> usize;
    fn move_element(&mut self, from: usize, to: usize);
}

/// Removes the entry at `bucket` (whose hash was `hash`) and repairs the
/// probe chain so every remaining element is still reachable by linear
/// probing from its ideal bucket (spec.md §4.4, the "Robin-Hood backward
/// shift"). The element itself must already have been read out of
/// `bucket` by the caller before calling this — this function only ever
/// touches metadata directly, and hands element relocation to `delegate`.
///
/// Precondition: `bucket` is occupied. Calling this on an unoccupied
/// bucket is a programming error — real callers only ever reach this
/// after a successful probe, so "not found" never reaches here in
/// practice (spec.md §7 classes it under precondition violations, not
/// the `remove`-on-absent-key case, which short-circuits before this
/// function is ever called).
pub(crate) fn delete_with_repair(
    metadata: &mut [MapEntry],
    bucket_mask: usize,
    bucket: usize,
    hash: u64,
    delegate: &mut impl DeleteDelegate,
) {
    assert!(
        metadata[bucket].occupied(),
        "HashTable::delete: bucket {} is not occupied",
        bucket
    );

    let mut hole = bucket;
    let ideal = ideal_bucket(hash, bucket_mask);

    // start = prevHole(before: ideal): nearest unoccupied bucket walking
    // backward from ideal. ideal is itself occupied (the chain invariant
    // guarantees every bucket on [ideal, bucket] is occupied), so the
    // walk always makes progress.
    let mut start = pred(ideal, bucket_mask);
    while metadata[start].occupied() {
        start = pred(start, bucket_mask);
    }

    // end = pred(nextHole(after: hole)): nearest unoccupied bucket
    // walking forward from hole, one step back.
    let mut next_hole = succ(hole, bucket_mask);
    while metadata[next_hole].occupied() {
        next_hole = succ(next_hole, bucket_mask);
    }
    let end = pred(next_hole, bucket_mask);

    while hole != end {
        let mut candidate = end;
        let mut shift_from = None;

        while candidate != hole {
            if metadata[candidate].occupied() {
                let ideal_b = delegate.ideal_bucket(candidate);
                let in_range = if start <= hole {
                    ideal_b >= start && ideal_b <= hole
                } else {
                    ideal_b >= start || ideal_b <= hole
                };
                if in_range {
                    shift_from = Some(candidate);
                    break;
                }
            }
            candidate = pred(candidate, bucket_mask);
        }

        match shift_from {
            Some(from) => {
                delegate.move_element(from, hole);
                metadata[hole] = metadata[from];
                metadata[from].clear();
                hole = from;
            }
            None => break,
        }
    }

    metadata[hole].clear();
}
