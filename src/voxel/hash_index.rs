//! Spatial hash index - block coordinate to pool storage
//!
//! The table is `bucket_count` primary entries followed by a bounded
//! excess list. Coordinates colliding on an occupied primary bucket are
//! chained through excess entries claimed from a free list.
//!
//! A primary entry that is freed while it still heads a chain keeps its
//! `next` link, so surviving chain entries stay reachable and every
//! [`EntryId`] stays stable until its own entry is removed.

use crate::core::{Error, Result};
use crate::voxel::block::BlockCoord;
use crate::voxel::block_pool::BlockIndex;

/// Index of an entry in the hash table (primary or excess)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub u32);

impl EntryId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where an entry's voxels currently live
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Residency {
    /// Entry is empty
    #[default]
    Unallocated,
    /// Voxels are in the working pool
    Resident(BlockIndex),
    /// Voxels were moved to secondary storage; the entry stays reserved
    SwappedOut,
}

/// One slot of the hash table
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HashEntry {
    /// Block coordinate (meaningless while unallocated)
    pub coord: BlockCoord,
    /// Storage state
    pub residency: Residency,
    /// Next entry of the collision chain
    pub next: Option<EntryId>,
    /// Whether the block is in the current visibility set
    pub visible: bool,
}

impl HashEntry {
    /// Check if this entry holds a block
    pub fn is_occupied(&self) -> bool {
        self.residency != Residency::Unallocated
    }

    /// Pool storage, when resident
    pub fn block(&self) -> Option<BlockIndex> {
        match self.residency {
            Residency::Resident(block) => Some(block),
            _ => None,
        }
    }
}

/// Why an insertion could not be completed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertError {
    /// Primary bucket taken and the excess list is empty
    ExcessExhausted,
}

/// Hash of a block coordinate, before masking
pub fn hash_coord(coord: BlockCoord) -> u32 {
    (coord.x as u32).wrapping_mul(73_856_093)
        ^ (coord.y as u32).wrapping_mul(19_349_669)
        ^ (coord.z as u32).wrapping_mul(83_492_791)
}

/// Spatial hash over voxel blocks with bounded overflow chaining
pub struct SpatialHashIndex {
    /// Primary buckets followed by excess entries
    entries: Vec<HashEntry>,
    /// Number of primary buckets (power of two)
    bucket_count: u32,
    /// Stack of free excess entries, lowest id on top
    excess_free: Vec<u32>,
    /// Entries currently in the visibility set
    visible: Vec<EntryId>,
    /// Dense list of occupied entries, so passes skip empty buckets
    occupied: Vec<EntryId>,
    /// Position of each entry in `occupied`, or `NOT_OCCUPIED`
    slots: Vec<u32>,
}

const NOT_OCCUPIED: u32 = u32::MAX;

impl SpatialHashIndex {
    /// Create an empty index
    pub fn new(bucket_count: u32, excess_capacity: u32) -> Result<Self> {
        if bucket_count == 0 || !bucket_count.is_power_of_two() {
            return Err(Error::InvalidConfig(format!(
                "hash bucket count must be a non-zero power of two, got {}",
                bucket_count
            )));
        }
        let total = bucket_count.checked_add(excess_capacity).ok_or_else(|| {
            Error::InvalidConfig("hash table size overflows u32".into())
        })?;

        Ok(Self {
            entries: vec![HashEntry::default(); total as usize],
            bucket_count,
            excess_free: (bucket_count..total).rev().collect(),
            visible: Vec::new(),
            occupied: Vec::new(),
            slots: vec![NOT_OCCUPIED; total as usize],
        })
    }

    /// Primary bucket of a coordinate
    pub fn bucket_of(&self, coord: BlockCoord) -> EntryId {
        EntryId(hash_coord(coord) & (self.bucket_count - 1))
    }

    /// Find the entry holding `coord`. Read-only, safe to call from many threads.
    pub fn find(&self, coord: BlockCoord) -> Option<EntryId> {
        let mut id = Some(self.bucket_of(coord));
        while let Some(current) = id {
            let entry = &self.entries[current.index()];
            if entry.is_occupied() && entry.coord == coord {
                return Some(current);
            }
            id = entry.next;
        }
        None
    }

    /// Insert a coordinate that is not yet present.
    ///
    /// Claims the primary bucket when it is empty, otherwise appends an
    /// excess entry to the bucket's chain.
    pub fn insert(&mut self, coord: BlockCoord, residency: Residency) -> std::result::Result<EntryId, InsertError> {
        debug_assert!(self.find(coord).is_none(), "duplicate insert of {:?}", coord);
        debug_assert!(residency != Residency::Unallocated);

        let bucket = self.bucket_of(coord);
        let primary = &mut self.entries[bucket.index()];
        if !primary.is_occupied() {
            primary.coord = coord;
            primary.residency = residency;
            primary.visible = false;
            self.track(bucket);
            return Ok(bucket);
        }

        let excess = self.excess_free.pop().ok_or(InsertError::ExcessExhausted)?;
        let id = EntryId(excess);
        self.entries[id.index()] = HashEntry {
            coord,
            residency,
            next: None,
            visible: false,
        };

        let tail = self.chain_tail(bucket);
        self.entries[tail.index()].next = Some(id);
        self.track(id);

        Ok(id)
    }

    /// Remove an entry, keeping the rest of its chain linked.
    ///
    /// Returns the removed entry, or `None` if it was already empty.
    pub fn remove(&mut self, id: EntryId) -> Option<HashEntry> {
        let entry = self.unlink(id)?;
        if entry.visible {
            self.visible.retain(|&v| v != id);
        }
        Some(entry)
    }

    /// Remove many entries, pruning the visibility set once at the end.
    ///
    /// Returns the entries that were occupied, in `ids` order.
    pub fn remove_many(&mut self, ids: &[EntryId]) -> Vec<HashEntry> {
        let removed: Vec<HashEntry> = ids.iter().filter_map(|&id| self.unlink(id)).collect();
        if removed.iter().any(|e| e.visible) {
            let entries = &self.entries;
            self.visible.retain(|v| entries[v.index()].visible);
        }
        removed
    }

    /// Take an entry out of its chain. Leaves the visibility list alone.
    fn unlink(&mut self, id: EntryId) -> Option<HashEntry> {
        let entry = self.entries[id.index()];
        if !entry.is_occupied() {
            return None;
        }

        if self.is_primary(id) {
            let primary = &mut self.entries[id.index()];
            primary.residency = Residency::Unallocated;
            primary.coord = BlockCoord::default();
            primary.visible = false;
        } else {
            let pred = self.predecessor(id)?;
            self.entries[pred.index()].next = entry.next;
            self.entries[id.index()] = HashEntry::default();
            self.excess_free.push(id.0);
        }

        self.untrack(id);
        Some(entry)
    }

    /// Clear every entry and refill the excess free list
    pub fn reset(&mut self) {
        self.entries.fill(HashEntry::default());
        let total = self.entries.len() as u32;
        self.excess_free.clear();
        self.excess_free.extend((self.bucket_count..total).rev());
        self.visible.clear();
        self.occupied.clear();
        self.slots.fill(NOT_OCCUPIED);
    }

    /// Replace the visibility set
    pub fn set_visible(&mut self, ids: Vec<EntryId>) {
        for id in std::mem::take(&mut self.visible) {
            self.entries[id.index()].visible = false;
        }
        for &id in &ids {
            self.entries[id.index()].visible = true;
        }
        self.visible = ids;
    }

    /// Entries in the current visibility set
    pub fn visible(&self) -> &[EntryId] {
        &self.visible
    }

    pub fn entry(&self, id: EntryId) -> &HashEntry {
        &self.entries[id.index()]
    }

    pub(crate) fn entry_mut(&mut self, id: EntryId) -> &mut HashEntry {
        &mut self.entries[id.index()]
    }

    /// All entries, primary buckets first
    pub fn entries(&self) -> &[HashEntry] {
        &self.entries
    }

    /// Ids of occupied entries. Order follows insertions and removals, not the table.
    pub fn occupied(&self) -> &[EntryId] {
        &self.occupied
    }

    pub fn occupied_ids(&self) -> impl Iterator<Item = EntryId> + '_ {
        self.occupied.iter().copied()
    }

    /// Check if the id refers to a primary bucket
    pub fn is_primary(&self, id: EntryId) -> bool {
        id.0 < self.bucket_count
    }

    pub fn bucket_count(&self) -> u32 {
        self.bucket_count
    }

    pub fn excess_capacity(&self) -> u32 {
        self.entries.len() as u32 - self.bucket_count
    }

    /// Number of free excess entries
    pub fn excess_free_count(&self) -> u32 {
        self.excess_free.len() as u32
    }

    /// Number of occupied entries
    pub fn occupied_count(&self) -> usize {
        self.occupied.len()
    }

    fn track(&mut self, id: EntryId) {
        self.slots[id.index()] = self.occupied.len() as u32;
        self.occupied.push(id);
    }

    fn untrack(&mut self, id: EntryId) {
        let slot = std::mem::replace(&mut self.slots[id.index()], NOT_OCCUPIED);
        debug_assert_ne!(slot, NOT_OCCUPIED);
        self.occupied.swap_remove(slot as usize);
        if let Some(&moved) = self.occupied.get(slot as usize) {
            self.slots[moved.index()] = slot;
        }
    }

    fn chain_tail(&self, bucket: EntryId) -> EntryId {
        let mut id = bucket;
        while let Some(next) = self.entries[id.index()].next {
            id = next;
        }
        id
    }

    fn predecessor(&self, target: EntryId) -> Option<EntryId> {
        let bucket = self.bucket_of(self.entries[target.index()].coord);
        let mut id = bucket;
        loop {
            let next = self.entries[id.index()].next?;
            if next == target {
                return Some(id);
            }
            id = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Coordinates whose hashes share the same primary bucket
    fn colliding(index: &SpatialHashIndex, count: usize) -> Vec<BlockCoord> {
        let target = index.bucket_of(BlockCoord::new(0, 0, 0));
        let mut found = vec![BlockCoord::new(0, 0, 0)];
        let mut x = 1;
        while found.len() < count {
            let c = BlockCoord::new(x, 0, 0);
            if index.bucket_of(c) == target {
                found.push(c);
            }
            x += 1;
        }
        found
    }

    fn resident(i: u32) -> Residency {
        Residency::Resident(BlockIndex(i))
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        assert!(SpatialHashIndex::new(100, 8).is_err());
        assert!(SpatialHashIndex::new(0, 8).is_err());
        assert!(SpatialHashIndex::new(64, 0).is_ok());
    }

    #[test]
    fn test_insert_and_find() {
        let mut index = SpatialHashIndex::new(64, 8).unwrap();
        let coord = BlockCoord::new(3, -2, 7);
        assert!(index.find(coord).is_none());

        let id = index.insert(coord, resident(5)).unwrap();
        assert_eq!(index.find(coord), Some(id));
        assert_eq!(index.entry(id).block(), Some(BlockIndex(5)));
        assert_eq!(index.occupied_count(), 1);
        assert!(index.is_primary(id));
    }

    #[test]
    fn test_collisions_use_excess_list() {
        let mut index = SpatialHashIndex::new(16, 4).unwrap();
        let coords = colliding(&index, 3);

        let ids: Vec<_> = coords
            .iter()
            .enumerate()
            .map(|(i, &c)| index.insert(c, resident(i as u32)).unwrap())
            .collect();

        assert!(index.is_primary(ids[0]));
        assert!(!index.is_primary(ids[1]));
        assert!(!index.is_primary(ids[2]));
        assert_eq!(index.excess_free_count(), 2);
        for (c, id) in coords.iter().zip(&ids) {
            assert_eq!(index.find(*c), Some(*id));
        }
    }

    #[test]
    fn test_excess_exhaustion_is_reported() {
        let mut index = SpatialHashIndex::new(16, 1).unwrap();
        let coords = colliding(&index, 3);

        index.insert(coords[0], resident(0)).unwrap();
        index.insert(coords[1], resident(1)).unwrap();
        assert_eq!(index.insert(coords[2], resident(2)), Err(InsertError::ExcessExhausted));
        assert!(index.find(coords[2]).is_none());
        assert_eq!(index.occupied_count(), 2);
    }

    #[test]
    fn test_remove_primary_keeps_chain() {
        let mut index = SpatialHashIndex::new(16, 4).unwrap();
        let coords = colliding(&index, 3);
        let ids: Vec<_> = coords
            .iter()
            .enumerate()
            .map(|(i, &c)| index.insert(c, resident(i as u32)).unwrap())
            .collect();

        index.remove(ids[0]).unwrap();
        assert!(index.find(coords[0]).is_none());
        assert_eq!(index.find(coords[1]), Some(ids[1]));
        assert_eq!(index.find(coords[2]), Some(ids[2]));

        // The empty primary is reused without disturbing the chain
        let again = index.insert(coords[0], resident(9)).unwrap();
        assert_eq!(again, ids[0]);
        assert_eq!(index.find(coords[2]), Some(ids[2]));
        assert_eq!(index.excess_free_count(), 2);
    }

    #[test]
    fn test_remove_middle_of_chain() {
        let mut index = SpatialHashIndex::new(16, 4).unwrap();
        let coords = colliding(&index, 4);
        let ids: Vec<_> = coords
            .iter()
            .enumerate()
            .map(|(i, &c)| index.insert(c, resident(i as u32)).unwrap())
            .collect();

        index.remove(ids[2]).unwrap();
        assert_eq!(index.excess_free_count(), 2);
        assert!(index.find(coords[2]).is_none());
        assert_eq!(index.find(coords[1]), Some(ids[1]));
        assert_eq!(index.find(coords[3]), Some(ids[3]));
        assert!(index.remove(ids[2]).is_none());
    }

    #[test]
    fn test_visibility_set() {
        let mut index = SpatialHashIndex::new(16, 4).unwrap();
        let a = index.insert(BlockCoord::new(1, 0, 0), resident(0)).unwrap();
        let b = index.insert(BlockCoord::new(0, 1, 0), resident(1)).unwrap();

        index.set_visible(vec![a, b]);
        assert!(index.entry(a).visible && index.entry(b).visible);

        index.set_visible(vec![b]);
        assert!(!index.entry(a).visible);
        assert_eq!(index.visible(), &[b]);

        index.remove(b);
        assert!(index.visible().is_empty());
    }

    #[test]
    fn test_remove_many() {
        let mut index = SpatialHashIndex::new(16, 4).unwrap();
        let coords = colliding(&index, 3);
        let ids: Vec<_> = coords
            .iter()
            .enumerate()
            .map(|(i, &c)| index.insert(c, resident(i as u32)).unwrap())
            .collect();
        let other = index.insert(BlockCoord::new(0, 0, 9), resident(3)).unwrap();
        index.set_visible(vec![ids[0], ids[1], other]);

        // Head and middle of one chain, plus an id that is already empty
        let removed = index.remove_many(&[ids[0], ids[1], ids[1]]);
        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0].coord, coords[0]);
        assert_eq!(removed[1].coord, coords[1]);

        assert_eq!(index.visible(), &[other]);
        assert!(index.entry(other).visible);
        assert!(index.find(coords[0]).is_none());
        assert!(index.find(coords[1]).is_none());
        assert_eq!(index.find(coords[2]), Some(ids[2]));
        assert_eq!(index.occupied_count(), 2);
        assert_eq!(index.excess_free_count(), 3);

        let mut occupied = index.occupied().to_vec();
        occupied.sort();
        assert_eq!(occupied, vec![ids[2], other]);
    }

    #[test]
    fn test_occupied_list_follows_churn() {
        let mut index = SpatialHashIndex::new(16, 16).unwrap();
        let mut live = Vec::new();
        for i in 0..12 {
            let id = index.insert(BlockCoord::new(i, i % 3, 0), resident(i as u32)).unwrap();
            live.push(id);
            if i % 4 == 3 {
                index.remove(live.remove(1)).unwrap();
            }
        }

        let mut listed = index.occupied().to_vec();
        listed.sort();
        let mut scanned: Vec<_> = (0..index.entries().len() as u32)
            .map(EntryId)
            .filter(|&id| index.entry(id).is_occupied())
            .collect();
        scanned.sort();
        live.sort();
        assert_eq!(listed, scanned);
        assert_eq!(listed, live);
    }

    #[test]
    fn test_reset() {
        let mut index = SpatialHashIndex::new(16, 4).unwrap();
        let coords = colliding(&index, 3);
        for (i, &c) in coords.iter().enumerate() {
            index.insert(c, resident(i as u32)).unwrap();
        }
        index.reset();
        assert_eq!(index.occupied_count(), 0);
        assert_eq!(index.excess_free_count(), 4);
        assert!(coords.iter().all(|&c| index.find(c).is_none()));
        assert_eq!(index.occupied_ids().count(), 0);
    }
}
