//! Collection aliases and small spatial indices used across the mesher.
//!
//! Hash maps use `rustc_hash`'s `FxHasher`, which is much faster than the
//! default SipHash for the integer-like keys used here (slotmap keys, grid
//! coordinates). Keys are never attacker-controlled.

use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use smallvec::SmallVec;

#[cfg(not(feature = "dense-slotmap"))]
use slotmap::SlotMap;

#[cfg(feature = "dense-slotmap")]
use slotmap::DenseSlotMap;

use crate::core::triangulation_data_structure::CellKey;
use crate::geometry::point::Point3;

// =============================================================================
// STORAGE BACKEND
// =============================================================================

/// Internal storage backend for vertices and cells.
///
/// `DenseSlotMap` by default (fast iteration), `SlotMap` when built with
/// `--no-default-features`.
#[cfg(not(feature = "dense-slotmap"))]
pub type StorageMap<K, V> = SlotMap<K, V>;

#[cfg(feature = "dense-slotmap")]
pub type StorageMap<K, V> = DenseSlotMap<K, V>;

// =============================================================================
// CORE OPTIMIZED TYPES
// =============================================================================

/// `HashMap` with the fast non-cryptographic `FxHasher`.
///
/// # Examples
///
/// ```rust
/// use implicit_mesh::core::collections::FastHashMap;
///
/// let mut map: FastHashMap<u64, usize> = FastHashMap::default();
/// map.insert(123, 456);
/// assert_eq!(map.get(&123), Some(&456));
/// ```
pub type FastHashMap<K, V> = FxHashMap<K, V>;

/// `HashSet` with the fast non-cryptographic `FxHasher`.
pub type FastHashSet<T> = FxHashSet<T>;

/// Hasher used by [`FastHashMap`] and [`FastHashSet`].
pub type FastHasher = FxHasher;

/// Stack-allocated vector that spills to the heap past `N` elements.
pub type SmallBuffer<T, const N: usize> = SmallVec<[T; N]>;

/// Inline capacity for per-insertion cell lists.
pub const CELL_BUFFER_SIZE: usize = 32;

/// Cell keys touched by a single operation (conflict regions, new cells,
/// vertex stars). Typical cavities hold 20 to 30 cells.
pub type CellKeyBuffer = SmallBuffer<CellKey, CELL_BUFFER_SIZE>;

/// Creates a [`FastHashMap`] with pre-allocated capacity.
#[must_use]
pub fn fast_hash_map_with_capacity<K, V>(capacity: usize) -> FastHashMap<K, V> {
    FastHashMap::with_capacity_and_hasher(capacity, rustc_hash::FxBuildHasher)
}

/// Creates a [`FastHashSet`] with pre-allocated capacity.
#[must_use]
pub fn fast_hash_set_with_capacity<T>(capacity: usize) -> FastHashSet<T> {
    FastHashSet::with_capacity_and_hasher(capacity, rustc_hash::FxBuildHasher)
}

// =============================================================================
// SPATIAL HASH GRID
// =============================================================================

const BUCKET_INLINE_CAPACITY: usize = 8;

type GridKey = [i64; 3];

/// A uniform hash grid over 3D points.
///
/// Points are bucketed by `floor(coord / cell_size)`; neighborhood queries
/// visit the 27 surrounding buckets, so any stored point within `cell_size`
/// of the query is found.
#[derive(Clone, Debug)]
pub struct HashGridIndex<K> {
    cell_size: f64,
    cells: FastHashMap<GridKey, SmallBuffer<(Point3, K), BUCKET_INLINE_CAPACITY>>,
}

impl<K: Copy> HashGridIndex<K> {
    /// Creates an empty grid. A non-positive or non-finite `cell_size`
    /// yields a grid that places everything in one bucket.
    #[must_use]
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size,
            cells: FastHashMap::default(),
        }
    }

    #[must_use]
    pub const fn cell_size(&self) -> f64 {
        self.cell_size
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.values().map(SmallVec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn key_for(&self, point: Point3) -> GridKey {
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) || !point.is_finite() {
            return [0; 3];
        }
        point.coords().map(|c| (c / self.cell_size).floor() as i64)
    }

    pub fn insert(&mut self, point: Point3, value: K) {
        let key = self.key_for(point);
        self.cells.entry(key).or_default().push((point, value));
    }

    /// Visits every stored entry in the 27 buckets around `point`. Stops early
    /// when `f` returns `false`.
    pub fn for_each_candidate<F>(&self, point: Point3, mut f: F)
    where
        F: FnMut(Point3, K) -> bool,
    {
        let base = self.key_for(point);
        for dx in -1..=1_i64 {
            for dy in -1..=1_i64 {
                for dz in -1..=1_i64 {
                    let key = [
                        base[0].saturating_add(dx),
                        base[1].saturating_add(dy),
                        base[2].saturating_add(dz),
                    ];
                    if let Some(bucket) = self.cells.get(&key) {
                        for &(p, value) in bucket {
                            if !f(p, value) {
                                return;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Returns `true` if some stored point lies strictly closer than
    /// `radius` to `point`. `radius` must not exceed the cell size.
    #[must_use]
    pub fn has_point_within(&self, point: Point3, radius: f64) -> bool {
        let radius2 = radius * radius;
        let mut found = false;
        self.for_each_candidate(point, |p, _| {
            found = p.distance_squared(point) < radius2;
            !found
        });
        found
    }
}

// =============================================================================
// TESTS
// =============================================================================
