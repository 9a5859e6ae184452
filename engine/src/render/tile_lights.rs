//! Per-Tile Light Lists
//!
//! [`NearestLights`] is the bounded, ascending-distance scratch list every tile
//! keeps while scanning candidates. It lives on the stack: a fixed backing
//! array of `MAX_TILE_CAPACITY` slots of which the first `capacity` (K) are in
//! use. Insertion is a linear scan for the first slot holding a larger ratio
//! followed by a shuffle-down that evicts the last slot.
//!
//! [`TileLightBuffer`] is the flattened output: `indices[tile * K + slot]` and
//! `counts[tile]`, matching the two storage buffers bound by the shading pass.
//! Entries past a tile's count are stale and never exposed.

use super::culling_config::MAX_TILE_CAPACITY;
use super::error::{CullError, Result};

/// Bounded sorted list of `(light, ratio)` pairs.
#[derive(Clone, Copy, Debug)]
pub struct NearestLights {
    capacity: usize,
    len: usize,
    lights: [u32; MAX_TILE_CAPACITY],
    ratios: [f32; MAX_TILE_CAPACITY],
}

impl NearestLights {
    /// Empty list holding at most `capacity` lights.
    ///
    /// Empty slots carry an infinite ratio so any finite candidate sorts
    /// before them. `capacity` is clamped to `1..=MAX_TILE_CAPACITY`.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.clamp(1, MAX_TILE_CAPACITY),
            len: 0,
            lights: std::array::from_fn(|i| i as u32),
            ratios: [f32::INFINITY; MAX_TILE_CAPACITY],
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// First slot whose stored ratio is strictly greater than `ratio`.
    ///
    /// `None` means the candidate is no closer than every kept light and
    /// would be dropped. Equal ratios keep the earlier light first.
    #[inline]
    pub fn insertion_point(&self, ratio: f32) -> Option<usize> {
        self.ratios[..self.capacity].iter().position(|&r| ratio < r)
    }

    /// Insert at `slot`, shifting `slot..K-1` down by one and dropping slot K-1.
    ///
    /// Touches exactly `K - slot` slots.
    #[inline]
    pub fn insert_at(&mut self, slot: usize, light: u32, ratio: f32) {
        debug_assert!(slot < self.capacity);
        let end = self.capacity;
        self.lights.copy_within(slot..end - 1, slot + 1);
        self.ratios.copy_within(slot..end - 1, slot + 1);
        self.lights[slot] = light;
        self.ratios[slot] = ratio;
        if self.len < self.capacity {
            self.len += 1;
        }
    }

    /// Insert if the candidate beats at least one slot; returns the slot used.
    pub fn try_insert(&mut self, light: u32, ratio: f32) -> Option<usize> {
        let slot = self.insertion_point(ratio)?;
        self.insert_at(slot, light, ratio);
        Some(slot)
    }

    /// Kept light indices, nearest first.
    pub fn indices(&self) -> &[u32] {
        &self.lights[..self.len]
    }

    /// Kept ratios, ascending.
    pub fn ratios(&self) -> &[f32] {
        &self.ratios[..self.len]
    }
}

/// Flattened per-tile results for one viewport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileLightBuffer {
    tiles_x: u32,
    tiles_y: u32,
    capacity: usize,
    /// `tile * capacity + slot` light indices
    pub indices: Vec<u32>,
    /// Populated count per tile (0..=capacity)
    pub counts: Vec<u32>,
}

impl TileLightBuffer {
    /// Allocate results for a `tiles_x × tiles_y` grid with K = `capacity`.
    pub fn new(tiles_x: u32, tiles_y: u32, capacity: usize) -> Self {
        let tiles = tiles_x as usize * tiles_y as usize;
        Self {
            tiles_x,
            tiles_y,
            capacity,
            indices: vec![0; tiles * capacity],
            counts: vec![0; tiles],
        }
    }

    /// Wrap buffers read back from the GPU.
    pub fn from_raw(
        tiles_x: u32,
        tiles_y: u32,
        capacity: usize,
        indices: Vec<u32>,
        counts: Vec<u32>,
    ) -> Result<Self> {
        let tiles = tiles_x as usize * tiles_y as usize;
        CullError::check_len("tile counts", tiles, counts.len())?;
        CullError::check_len("tile indices", tiles * capacity, indices.len())?;
        Ok(Self {
            tiles_x,
            tiles_y,
            capacity,
            indices,
            counts,
        })
    }

    /// True if both buffers hold the same populated prefix for every tile.
    ///
    /// Slots past a tile's count are ignored.
    pub fn same_assignments(&self, other: &Self) -> bool {
        self.tiles_x == other.tiles_x
            && self.tiles_y == other.tiles_y
            && self.counts == other.counts
            && (0..self.tile_count()).all(|t| self.tile_by_index(t) == other.tile_by_index(t))
    }

    pub fn tiles_x(&self) -> u32 {
        self.tiles_x
    }

    pub fn tiles_y(&self) -> u32 {
        self.tiles_y
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn tile_count(&self) -> usize {
        self.counts.len()
    }

    /// Row-major tile index, `None` outside the grid.
    pub fn tile_index(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.tiles_x || y >= self.tiles_y {
            return None;
        }
        Some(y as usize * self.tiles_x as usize + x as usize)
    }

    pub fn count(&self, x: u32, y: u32) -> Option<u32> {
        self.tile_index(x, y).map(|t| self.counts[t])
    }

    /// Populated prefix of tile `(x, y)`.
    pub fn tile(&self, x: u32, y: u32) -> Option<&[u32]> {
        self.tile_index(x, y).map(|t| self.tile_by_index(t))
    }

    /// Populated prefix of the tile at flat index `tile`.
    pub fn tile_by_index(&self, tile: usize) -> &[u32] {
        let base = tile * self.capacity;
        let count = (self.counts[tile] as usize).min(self.capacity);
        &self.indices[base..base + count]
    }

    /// Write one tile's result.
    pub fn store(&mut self, tile: usize, lights: &NearestLights) {
        store_tile(
            &mut self.indices[tile * self.capacity..(tile + 1) * self.capacity],
            &mut self.counts[tile],
            lights,
        );
    }

    pub fn indices_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    pub fn counts_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.counts)
    }

    /// Byte sizes of the two GPU buffers `(indices, counts)`.
    pub fn gpu_buffer_sizes(&self) -> (u64, u64) {
        (
            (self.indices.len() * std::mem::size_of::<u32>()) as u64,
            (self.counts.len() * std::mem::size_of::<u32>()) as u64,
        )
    }
}

/// Write a tile's count and its populated prefix; later slots are left alone.
#[inline]
pub(crate) fn store_tile(slots: &mut [u32], count: &mut u32, lights: &NearestLights) {
    let kept = lights.indices();
    slots[..kept.len()].copy_from_slice(kept);
    *count = kept.len() as u32;
}
