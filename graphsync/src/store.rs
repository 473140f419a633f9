//! Slotted record store with block-granular dirty tracking
//!
//! A [`RecordStore`] is a growable array of fixed-layout records plus a
//! parallel array of side data, addressed by slot index.
//!
//! # Allocation
//!
//! - Single-slot allocations reuse tombstoned slots from a free list.
//! - Otherwise slots are bump-allocated; when the capacity is exceeded it
//!   doubles (from 1) until the request fits, and a
//!   [`GraphEvent::BufferReplaced`] carrying a fresh [`SharedBuffer`] is
//!   published.
//!
//! # Dirty tracking
//!
//! Slots are grouped in blocks of `block_size` slots. Each block keeps a
//! bitmap of dirty offsets and the list of those offsets in first-marked
//! order. [`RecordStore::flush_changes`] walks only the dirty blocks, in the
//! order they became dirty, and for each block emits either:
//!
//! - one [`GraphEvent::RangeUpdate`] for the whole block, if at least
//!   `max_modified` offsets changed, or
//! - one [`GraphEvent::SlotUpdate`] per changed offset otherwise.
//!
//! # Backing memory
//!
//! Records live in per-block `Arc<Vec<u8>>`s. Writing to a block that an
//! outstanding [`SharedBuffer`] still references copies the block first, so
//! handles given to consumers stay immutable.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::emitter::Emitter;
use crate::events::GraphEvent;
use crate::io::SharedBuffer;
use crate::record::Record;

/// Dirty state of one block
#[derive(Debug, Clone)]
struct BlockInfo {
    dirty: Vec<u64>,
    modified: Vec<u16>,
}

impl BlockInfo {
    fn new(block_size: usize) -> Self {
        Self {
            dirty: vec![0; block_size.div_ceil(64)],
            modified: Vec::new(),
        }
    }

    /// Returns `true` if the offset was not yet dirty
    fn mark(&mut self, offset: u16) -> bool {
        let (word, bit) = (usize::from(offset) / 64, u64::from(offset) % 64);
        if self.dirty[word] & (1 << bit) != 0 {
            return false;
        }
        self.dirty[word] |= 1 << bit;
        self.modified.push(offset);
        true
    }

    fn clear(&mut self) {
        for &offset in &self.modified {
            self.dirty[usize::from(offset) / 64] &= !(1 << (u64::from(offset) % 64));
        }
        self.modified.clear();
    }
}

/// Growable array of records of type `T` with side data of type `R`
pub struct RecordStore<T: Record, R> {
    config: StoreConfig,
    /// Number of slots ever handed out by bump allocation
    len: usize,
    capacity: usize,

    blocks: Vec<Arc<Vec<u8>>>,
    side: Vec<R>,

    block_info: Vec<BlockInfo>,
    dirty_blocks: Vec<usize>,

    free: Vec<usize>,
    in_free_list: Vec<bool>,

    updates: Emitter<GraphEvent>,
    _record: PhantomData<T>,
}

impl<T: Record, R: Default> RecordStore<T, R> {
    /// Create an empty store with capacity 0
    ///
    /// The configuration is assumed to be valid, see
    /// [`StoreConfig::validate`].
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        debug_assert!(config.validate().is_ok(), "invalid store config: {config:?}");
        Self {
            config,
            len: 0,
            capacity: 0,
            blocks: Vec::new(),
            side: Vec::new(),
            block_info: Vec::new(),
            dirty_blocks: Vec::new(),
            free: Vec::new(),
            in_free_list: Vec::new(),
            updates: Emitter::new(),
            _record: PhantomData,
        }
    }

    /// Allocate `count` slots and return the first one
    ///
    /// A single slot is recycled from the free list when possible; recycled
    /// slots are not marked dirty, the caller is expected to [`set`](Self::set)
    /// them right away. Otherwise `count` contiguous fresh slots are
    /// allocated, growing the store if needed.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero or the slot count would overflow `usize`.
    pub fn add(&mut self, count: usize) -> usize {
        assert!(count > 0, "store.add({:?}): count must be positive", T::KIND);
        if count == 1 {
            if let Some(slot) = self.free.pop() {
                self.in_free_list[slot] = false;
                log::trace!("store.add({:?}): recycled slot {slot}", T::KIND);
                return slot;
            }
        }

        let first = self.len;
        let Some(needed) = first.checked_add(count) else {
            panic!("store.add({:?}): {first} + {count} slots overflow", T::KIND);
        };
        if needed > self.capacity {
            self.grow(needed);
        }
        self.len = needed;
        first
    }

    fn grow(&mut self, needed: usize) {
        let mut capacity = self.capacity.max(1);
        while capacity < needed {
            capacity = capacity.checked_mul(2).unwrap_or(needed);
        }

        let block_size = self.config.block_size;
        for block in 0..capacity.div_ceil(block_size) {
            let bytes = (capacity - block * block_size).min(block_size) * T::SIZE;
            if let Some(existing) = self.blocks.get_mut(block) {
                if existing.len() != bytes {
                    // Copies the block first if a handle still reads it
                    Arc::make_mut(existing).resize(bytes, 0);
                }
            } else {
                self.blocks.push(Arc::new(vec![0; bytes]));
                self.block_info.push(BlockInfo::new(block_size));
            }
        }
        self.side.resize_with(capacity, R::default);
        self.in_free_list.resize(capacity, false);

        log::debug!(
            "store.grow({:?}): capacity {} -> {capacity} ({} blocks)",
            T::KIND,
            self.capacity,
            self.blocks.len()
        );
        self.capacity = capacity;

        self.updates.emit(GraphEvent::BufferReplaced {
            kind: T::KIND,
            capacity,
            buffer: self.snapshot(),
        });
    }

    /// Overwrite the record at `slot`, or tombstone it if `value` is `None`
    ///
    /// Deleting sets the deleted flag on the existing record and puts the
    /// slot on the free list. Deleting an already free slot only marks it
    /// dirty again; it is never listed twice. Either way the slot is marked
    /// dirty so the change reaches consumers.
    pub fn set(&mut self, slot: usize, value: Option<T>) {
        debug_assert!(slot < self.len, "slot {slot} was never allocated (len {})", self.len);
        match value {
            Some(record) => {
                debug_assert!(!self.in_free_list[slot], "writing to free slot {slot}");
                self.write(slot, &record);
            }
            None => {
                let mut record = self.record(slot);
                record.mark_deleted();
                self.write(slot, &record);
                if self.in_free_list[slot] {
                    log::debug!("store.set({:?}): slot {slot} is already free", T::KIND);
                } else {
                    self.in_free_list[slot] = true;
                    self.free.push(slot);
                }
            }
        }
        self.mark(slot);
    }

    /// Record and side data at `slot`
    ///
    /// The slot must come from a prior [`add`](Self::add); whether it is
    /// still live is the caller's business, see [`is_live`](Self::is_live).
    #[must_use]
    pub fn get(&self, slot: usize) -> (T, &R) {
        (self.record(slot), &self.side[slot])
    }

    /// Copy of the record at `slot`
    #[must_use]
    pub fn record(&self, slot: usize) -> T {
        let (block, offset) = self.locate(slot);
        bytemuck::pod_read_unaligned(&self.blocks[block][offset..offset + T::SIZE])
    }

    #[must_use]
    pub fn side(&self, slot: usize) -> &R {
        &self.side[slot]
    }

    /// Side data is not shipped to consumers and is never marked dirty
    pub fn side_mut(&mut self, slot: usize) -> &mut R {
        &mut self.side[slot]
    }

    /// Whether `slot` was allocated and is neither free nor tombstoned
    #[must_use]
    pub fn is_live(&self, slot: usize) -> bool {
        slot < self.len && !self.in_free_list[slot] && !self.record(slot).is_deleted()
    }

    /// Live slots with their records, in slot order
    pub fn iter_live(&self) -> impl Iterator<Item = (usize, T)> + '_ {
        (0..self.len).filter(|&slot| self.is_live(slot)).map(|slot| (slot, self.record(slot)))
    }

    /// Emit the changes accumulated since the previous flush
    pub fn flush_changes(&mut self) {
        if self.dirty_blocks.is_empty() {
            return;
        }

        let buffer = self.snapshot();
        let block_size = self.config.block_size;
        let mut emitted = 0usize;

        for block in std::mem::take(&mut self.dirty_blocks) {
            let info = &mut self.block_info[block];
            let block_start = block * block_size;

            if info.modified.len() >= self.config.max_modified {
                self.updates.emit(GraphEvent::RangeUpdate {
                    kind: T::KIND,
                    start: block_start,
                    end: (block_start + block_size).min(self.capacity),
                    buffer: buffer.clone(),
                });
                emitted += 1;
            } else {
                for &offset in &info.modified {
                    self.updates.emit(GraphEvent::SlotUpdate {
                        kind: T::KIND,
                        slot: block_start + usize::from(offset),
                        buffer: buffer.clone(),
                    });
                }
                emitted += info.modified.len();
            }

            info.clear();
        }

        log::trace!("store.flush_changes({:?}): {emitted} events", T::KIND);
    }

    /// Handle to the current content of the whole array
    #[must_use]
    pub fn snapshot(&self) -> SharedBuffer {
        SharedBuffer::from_blocks(
            self.blocks.clone(),
            T::SIZE,
            self.config.block_size,
            self.capacity,
        )
    }

    /// Channel the store publishes its [`GraphEvent`]s on
    #[must_use]
    pub fn updates(&self) -> &Emitter<GraphEvent> {
        &self.updates
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Number of slots ever handed out; every allocated slot is below it
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Allocated slots that are not on the free list
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.len - self.free.len()
    }

    #[must_use]
    pub fn dirty_block_count(&self) -> usize {
        self.dirty_blocks.len()
    }

    /// Distinct dirty slots waiting for the next flush
    #[must_use]
    pub fn pending_changes(&self) -> usize {
        self.dirty_blocks
            .iter()
            .map(|&block| self.block_info[block].modified.len())
            .sum()
    }

    fn locate(&self, slot: usize) -> (usize, usize) {
        let block_size = self.config.block_size;
        (slot / block_size, (slot % block_size) * T::SIZE)
    }

    fn write(&mut self, slot: usize, record: &T) {
        let (block, offset) = self.locate(slot);
        let bytes = Arc::make_mut(&mut self.blocks[block]);
        bytes[offset..offset + T::SIZE].copy_from_slice(bytemuck::bytes_of(record));
    }

    fn mark(&mut self, slot: usize) {
        let block = slot / self.config.block_size;
        let info = &mut self.block_info[block];
        let was_clean = info.modified.is_empty();
        #[allow(clippy::cast_possible_truncation)]
        let offset = (slot % self.config.block_size) as u16;
        if info.mark(offset) && was_clean {
            self.dirty_blocks.push(block);
        }
    }
}

impl<T: Record, R> std::fmt::Debug for RecordStore<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("kind", &T::KIND)
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .field("free", &self.free.len())
            .field("dirty_blocks", &self.dirty_blocks.len())
            .finish_non_exhaustive()
    }
}
